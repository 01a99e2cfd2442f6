//! Declarative step definitions loaded from configuration
//!
//! A [`ModelManifest`] lists the steps a content model needs. The
//! [`ManifestProvider`] turns manifests into steps with validation, submit and
//! undo handlers, and exposes a [`ManifestForm`] action for each of them.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{HookKey, Step, StepKind, StepProvider};
use crate::form::{FieldError, FieldType, Form, FormField, StepAction};
use crate::session::{get_step_storage, SessionState, Values};

/// Field whose value becomes the label of every object under construction
pub const LABEL_FIELD: &str = "label";

/// Steps required by one content model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Content model identifier
    pub model: String,
    #[serde(default)]
    pub steps: Vec<StepManifest>,
}

/// Declarative definition of a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepManifest {
    pub id: String,
    /// Form title (defaults to the id)
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub kind: StepKind,
    /// Action name; defaults to `<model>/<id>`
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub required_resource: Option<PathBuf>,
    #[serde(default)]
    pub fields: Vec<FieldManifest>,
}

/// Declarative definition of a form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldManifest {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl FieldManifest {
    fn to_field(&self) -> FormField {
        FormField {
            name: self.name.clone(),
            label: self.label.clone().unwrap_or_else(|| self.name.clone()),
            field_type: self.field_type,
            required: self.required,
            options: self.options.clone(),
            description: self.description.clone(),
            value: None,
        }
    }
}

impl StepManifest {
    fn action_name(&self, model: &str) -> String {
        self.action
            .clone()
            .unwrap_or_else(|| format!("{}/{}", model, self.id))
    }
}

/// Builds a form from a manifest's fields
#[derive(Debug, Clone)]
pub struct ManifestForm {
    title: String,
    fields: Vec<FieldManifest>,
}

impl StepAction for ManifestForm {
    fn build(&self, _state: &SessionState, _args: &[Value]) -> anyhow::Result<Form> {
        let mut form = Form::new(self.title.clone());
        form.fields = self.fields.iter().map(FieldManifest::to_field).collect();
        Ok(form)
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Check required fields and enum options against the pending input
pub fn validate_fields(fields: &[FieldManifest], values: &Values) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    for field in fields {
        let value = values.get(&field.name);
        let label = field.label.as_deref().unwrap_or(&field.name);

        if field.required && is_blank(value) {
            errors.push(FieldError::field(&field.name, format!("{} is required", label)));
            continue;
        }

        if field.field_type == FieldType::Enum && !field.options.is_empty() {
            if let Some(Value::String(choice)) = value {
                if !choice.is_empty() && !field.options.iter().any(|o| o == choice) {
                    errors.push(FieldError::field(
                        &field.name,
                        format!("'{}' is not a valid choice for {}", choice, label),
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Record submitted values on every object; a `label` value relabels them
fn submit_values(step_id: &str, state: &mut SessionState) {
    let values = state.pending_values.clone();
    let new_label = values
        .get(LABEL_FIELD)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string);

    if let Some(label) = &new_label {
        let previous = state
            .primary_object()
            .map(|o| o.label.clone())
            .unwrap_or_default();
        if let Some(entry) = get_step_storage(state, Some(step_id)) {
            entry
                .data
                .insert("previous_label".to_string(), Value::String(previous));
        }
        for object in &mut state.objects {
            object.label = label.clone();
        }
    }

    for object in &mut state.objects {
        object
            .properties
            .insert(step_id.to_string(), Value::Object(values.clone()));
    }
}

/// Reverse [`submit_values`]
fn undo_values(step_id: &str, state: &mut SessionState) {
    for object in &mut state.objects {
        object.properties.remove(step_id);
    }

    let previous = get_step_storage(state, Some(step_id))
        .and_then(|entry| entry.data.remove("previous_label"))
        .and_then(|v| v.as_str().map(str::to_string));
    if let Some(label) = previous {
        for object in &mut state.objects {
            object.label = label.clone();
        }
    }
}

/// Step provider backed by model manifests
#[derive(Debug, Clone, Default)]
pub struct ManifestProvider {
    manifests: Vec<ModelManifest>,
}

impl ManifestProvider {
    pub fn new(manifests: Vec<ModelManifest>) -> Self {
        Self { manifests }
    }

    /// Form actions for every manifest step, keyed by action name.
    ///
    /// When several steps share an action name, the first one wins.
    pub fn actions(&self) -> Vec<(String, Arc<dyn StepAction>)> {
        let mut actions: Vec<(String, Arc<dyn StepAction>)> = Vec::new();
        for manifest in &self.manifests {
            for step in &manifest.steps {
                let name = step.action_name(&manifest.model);
                if actions.iter().any(|(existing, _)| *existing == name) {
                    continue;
                }
                let form = ManifestForm {
                    title: step.title.clone().unwrap_or_else(|| step.id.clone()),
                    fields: step.fields.clone(),
                };
                actions.push((name, Arc::new(form)));
            }
        }
        actions
    }

    fn build_step(model: &str, manifest: &StepManifest) -> Step {
        let action = manifest.action_name(model);
        let mut step = match manifest.kind {
            StepKind::Interactive => Step::interactive(&manifest.id, action),
            StepKind::Batch => Step::batch(&manifest.id, action),
        }
        .with_weight(manifest.weight)
        .with_args(manifest.args.clone());

        if let Some(path) = &manifest.required_resource {
            step = step.with_required_resource(path.clone());
        }

        if manifest.kind == StepKind::Batch {
            return step;
        }

        let fields = manifest.fields.clone();
        let submit_id = manifest.id.clone();
        let undo_id = manifest.id.clone();
        step.on_validate(move |state: &SessionState| validate_fields(&fields, &state.pending_values))
            .on_submit(move |state: &mut SessionState| {
                submit_values(&submit_id, state);
                Ok(())
            })
            .on_undo(move |state: &mut SessionState| undo_values(&undo_id, state))
    }
}

impl StepProvider for ManifestProvider {
    fn name(&self) -> &str {
        "manifest"
    }

    fn contribute(&self, hook: &HookKey, _state: &SessionState) -> Vec<Step> {
        let Some(model) = hook.model() else {
            return Vec::new();
        };
        self.manifests
            .iter()
            .filter(|m| m.model == model)
            .flat_map(|m| m.steps.iter().map(|s| Self::build_step(&m.model, s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::DefaultObjectFactory;
    use crate::session::WizardConfig;
    use serde_json::json;

    fn field(name: &str, field_type: FieldType, required: bool) -> FieldManifest {
        FieldManifest {
            name: name.to_string(),
            label: None,
            field_type,
            required,
            options: Vec::new(),
            description: None,
        }
    }

    fn step(id: &str, weight: i32, fields: Vec<FieldManifest>) -> StepManifest {
        StepManifest {
            id: id.to_string(),
            title: None,
            weight,
            kind: StepKind::Interactive,
            action: None,
            args: Vec::new(),
            required_resource: None,
            fields,
        }
    }

    fn thesis_manifest() -> ModelManifest {
        ModelManifest {
            model: "modelA".to_string(),
            steps: vec![
                step("files", 10, vec![field("file", FieldType::String, true)]),
                step(
                    "metadata",
                    0,
                    vec![
                        field(LABEL_FIELD, FieldType::String, true),
                        field("abstract", FieldType::Text, false),
                    ],
                ),
            ],
        }
    }

    fn new_state() -> SessionState {
        SessionState::initialize(
            WizardConfig::new(["modelA"]).with_label("Untitled"),
            &DefaultObjectFactory,
            "ns",
        )
        .unwrap()
    }

    #[test]
    fn test_contributes_only_for_matching_model() {
        let provider = ManifestProvider::new(vec![thesis_manifest()]);
        let state = new_state();

        assert!(provider.contribute(&HookKey::All, &state).is_empty());
        assert!(provider
            .contribute(&HookKey::Model("modelB".into()), &state)
            .is_empty());

        let steps = provider.contribute(&HookKey::Model("modelA".into()), &state);
        let ids: Vec<_> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["files", "metadata"]);
        assert_eq!(steps[0].action_reference, "modelA/files");
        assert!(steps[0].handlers.validate.is_some());
    }

    #[test]
    fn test_actions_build_forms_from_fields() {
        let provider = ManifestProvider::new(vec![thesis_manifest()]);
        let actions = provider.actions();
        assert_eq!(actions.len(), 2);

        let (name, action) = &actions[1];
        assert_eq!(name, "modelA/metadata");
        let form = action.build(&new_state(), &[]).unwrap();
        assert_eq!(form.title, "metadata");
        assert!(form.field(LABEL_FIELD).unwrap().required);
    }

    #[test]
    fn test_validate_reports_missing_required_fields() {
        let fields = vec![
            field("title", FieldType::String, true),
            field("note", FieldType::Text, false),
        ];
        let mut values = Values::new();
        values.insert("title".into(), json!("   "));

        let errors = validate_fields(&fields, &values).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("title"));

        values.insert("title".into(), json!("A thesis"));
        assert!(validate_fields(&fields, &values).is_ok());
    }

    #[test]
    fn test_validate_checks_enum_options() {
        let mut genre = field("genre", FieldType::Enum, false);
        genre.options = vec!["thesis".into(), "article".into()];
        let mut values = Values::new();
        values.insert("genre".into(), json!("poem"));

        let errors = validate_fields(&[genre.clone()], &values).unwrap_err();
        assert!(errors[0].message.contains("poem"));

        values.insert("genre".into(), json!("thesis"));
        assert!(validate_fields(&[genre], &values).is_ok());
    }

    #[test]
    fn test_submit_then_undo_restores_objects() {
        let provider = ManifestProvider::new(vec![thesis_manifest()]);
        let mut state = new_state();
        let original = state.objects.clone();
        let steps = provider.contribute(&HookKey::Model("modelA".into()), &state);
        let metadata = steps.iter().find(|s| s.id == "metadata").unwrap();

        state.pending_values.insert(LABEL_FIELD.into(), json!("My Thesis"));
        (metadata.handlers.submit.as_ref().unwrap())(&mut state).unwrap();
        assert_eq!(state.objects[0].label, "My Thesis");
        assert_eq!(
            state.objects[0].properties["metadata"][LABEL_FIELD],
            json!("My Thesis")
        );

        (metadata.handlers.undo.as_ref().unwrap())(&mut state);
        assert_eq!(state.objects, original);
    }

    #[test]
    fn test_batch_manifest_step_has_no_handlers() {
        let mut manifest = thesis_manifest();
        manifest.steps[0].kind = StepKind::Batch;
        let provider = ManifestProvider::new(vec![manifest]);

        let steps = provider.contribute(&HookKey::Model("modelA".into()), &new_state());
        let files = steps.iter().find(|s| s.id == "files").unwrap();
        assert_eq!(files.kind, StepKind::Batch);
        assert!(files.handlers.submit.is_none());
    }

    #[test]
    fn test_manifest_deserializes_from_toml() {
        let manifest: ModelManifest = toml::from_str(
            r#"
            model = "modelA"

            [[steps]]
            id = "metadata"
            weight = -5

            [[steps.fields]]
            name = "label"
            type = "string"
            required = true
            "#,
        )
        .unwrap();

        assert_eq!(manifest.steps[0].weight, -5);
        assert_eq!(manifest.steps[0].kind, StepKind::Interactive);
        assert!(manifest.steps[0].fields[0].required);
    }
}
