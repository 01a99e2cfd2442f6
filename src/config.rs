use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::DEFAULT_NAMESPACE;
use crate::form::FieldType;
use crate::steps::{FieldManifest, ModelManifest, StepKind, StepManifest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Step manifests per content model
    #[serde(default)]
    pub models: Vec<ModelManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding one JSON file per wizard session
    pub sessions: String,
    /// Directory committed objects are written to
    pub repository: String,
    pub state: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to a file under the state directory instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Namespace new object ids are minted in
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
    /// Models used by `start` when none are given
    #[serde(default)]
    pub default_models: Vec<String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
            default_models: Vec::new(),
        }
    }
}

impl Config {
    /// Path to the project config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".ingest/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the wizard works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        // User config in ~/.config/ingest-wizard/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ingest-wizard").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("INGEST_WIZARD")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .ingest/config.toml
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::project_config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(config_path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    fn absolute(path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    pub fn sessions_path(&self) -> PathBuf {
        Self::absolute(&self.paths.sessions)
    }

    pub fn repository_path(&self) -> PathBuf {
        Self::absolute(&self.paths.repository)
    }

    pub fn state_path(&self) -> PathBuf {
        Self::absolute(&self.paths.state)
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    /// Manifest for `model`, if configured
    pub fn model(&self, model: &str) -> Option<&ModelManifest> {
        self.models.iter().find(|m| m.model == model)
    }
}

fn field(name: &str, label: &str, field_type: FieldType, required: bool) -> FieldManifest {
    FieldManifest {
        name: name.to_string(),
        label: Some(label.to_string()),
        field_type,
        required,
        options: Vec::new(),
        description: None,
    }
}

/// Sample model shipped with the defaults: a two-step basic image ingest
fn basic_image_model() -> ModelManifest {
    ModelManifest {
        model: "islandora:sp_basic_image".to_string(),
        steps: vec![
            StepManifest {
                id: "metadata".to_string(),
                title: Some("Describe the image".to_string()),
                weight: 0,
                kind: StepKind::Interactive,
                action: None,
                args: Vec::new(),
                required_resource: None,
                fields: vec![
                    field("label", "Title", FieldType::String, true),
                    field("description", "Description", FieldType::Text, false),
                    FieldManifest {
                        options: vec!["still image".to_string(), "photograph".to_string()],
                        ..field("genre", "Genre", FieldType::Enum, false)
                    },
                ],
            },
            StepManifest {
                id: "upload".to_string(),
                title: Some("Attach the image file".to_string()),
                weight: 10,
                kind: StepKind::Interactive,
                action: None,
                args: Vec::new(),
                required_resource: None,
                fields: vec![field("file", "Image file", FieldType::String, true)],
            },
        ],
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                sessions: ".ingest/sessions".to_string(), // Relative to cwd
                repository: ".ingest/objects".to_string(),
                state: ".ingest".to_string(),
            },
            logging: LoggingConfig::default(),
            ingest: IngestConfig::default(),
            models: vec![basic_image_model()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.to_file);
        assert_eq!(config.ingest.default_namespace, "islandora");
        let model = config.model("islandora:sp_basic_image").unwrap();
        assert_eq!(model.steps.len(), 2);
    }

    #[test]
    fn test_logs_path_under_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.state = temp_dir.path().to_string_lossy().to_string();

        let logs_dir = config.logs_path();
        assert!(logs_dir.ends_with("logs"));
        assert!(logs_dir.starts_with(temp_dir.path()));
    }

    #[test]
    fn test_relative_paths_resolve_against_cwd() {
        let config = Config::default();
        let sessions = config.sessions_path();
        assert!(sessions.is_absolute());
        assert!(sessions.ends_with(".ingest/sessions"));
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wizard.toml");
        std::fs::write(
            &path,
            r#"
[logging]
level = "debug"

[ingest]
default_namespace = "thesis"

[[models]]
model = "ir:thesisCModel"

[[models.steps]]
id = "abstract"
weight = -5
"#,
        )
        .unwrap();

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.ingest.default_namespace, "thesis");
        assert!(config.model("ir:thesisCModel").is_some());
        // Paths not mentioned keep their defaults
        assert_eq!(config.paths.repository, ".ingest/objects");
    }

    #[test]
    fn test_save_writes_loadable_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.ingest.default_models = vec!["islandora:sp_basic_image".to_string()];

        config.save_to(&path).unwrap();

        let loaded = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.ingest.default_models, config.ingest.default_models);
        assert_eq!(loaded.models, config.models);
    }
}
