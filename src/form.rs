//! Renderable units produced by step actions
//!
//! The engine does not render anything itself. A step action returns a
//! [`Form`] describing its fields; the engine attaches navigation actions and
//! hands the result to whatever front end drives the wizard.

use serde::{Deserialize, Serialize};

use crate::session::{SessionState, Values};

/// Types of fields a form can contain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Single-line text input
    #[default]
    String,
    /// Multi-line text input
    Text,
    /// Selection from predefined options
    Enum,
    /// True/false checkbox
    Bool,
    /// Date field (YYYY-MM-DD format)
    Date,
}

/// A single input on a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Current value (restored from the step's storage)
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl FormField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            field_type,
            required: false,
            options: Vec::new(),
            description: None,
            value: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Navigation affordances attached by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormAction {
    Previous,
    Next,
    Ingest,
}

impl FormAction {
    pub fn label(&self) -> &'static str {
        match self {
            FormAction::Previous => "Previous",
            FormAction::Next => "Next",
            FormAction::Ingest => "Ingest",
        }
    }
}

/// A validation message, optionally tied to a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub field: Option<String>,
    pub message: String,
}

impl FieldError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

/// The renderable unit for one step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub fields: Vec<FormField>,
    #[serde(default)]
    pub actions: Vec<FormAction>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl Form {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_action(&self, action: FormAction) -> bool {
        self.actions.contains(&action)
    }

    /// Fill field values from submitted or restored input
    pub fn populate(&mut self, values: &Values) {
        for field in &mut self.fields {
            if let Some(value) = values.get(&field.name) {
                field.value = Some(value.clone());
            }
        }
    }
}

/// Executable unit behind a step's `action_reference`
pub trait StepAction: Send + Sync {
    /// Build the step's form from the session state and the step's declared args
    fn build(&self, state: &SessionState, args: &[serde_json::Value]) -> anyhow::Result<Form>;
}

impl<F> StepAction for F
where
    F: Fn(&SessionState, &[serde_json::Value]) -> anyhow::Result<Form> + Send + Sync,
{
    fn build(&self, state: &SessionState, args: &[serde_json::Value]) -> anyhow::Result<Form> {
        self(state, args)
    }
}

/// Post-processing hook for forms built by one specific action
pub trait FormAlter: Send + Sync {
    fn alter(&self, form: &mut Form, state: &SessionState);
}

impl<F> FormAlter for F
where
    F: Fn(&mut Form, &SessionState) + Send + Sync,
{
    fn alter(&self, form: &mut Form, state: &SessionState) {
        self(form, state);
    }
}
