use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use ingest_wizard::engine::{RenderedStep, Trigger, WizardEngine, WizardRequest, WizardResponse};
use ingest_wizard::form::FormAction;
use ingest_wizard::logging;
use ingest_wizard::repository::FileRepository;
use ingest_wizard::session::{FileSessionStore, SessionStore, Values, WizardConfig};
use ingest_wizard::Config;

#[derive(Parser)]
#[command(name = "ingest-wizard")]
#[command(about = "Step-by-step object ingest wizard")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print responses as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new wizard session and show its first step
    Start {
        /// Content model of the new object (repeatable)
        #[arg(short, long = "model")]
        models: Vec<String>,

        /// Collection the object joins (repeatable)
        #[arg(long = "collection")]
        collections: Vec<String>,

        /// Initial object label
        #[arg(short, long, default_value = "")]
        label: String,

        /// Namespace to mint the object id in
        #[arg(long)]
        namespace: Option<String>,

        /// Explicit object id
        #[arg(long)]
        id: Option<String>,

        /// Session id (generated when omitted)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show the active step of a session
    Show { session: String },

    /// Submit the active step and move forward
    Next {
        session: String,

        /// Field value as key=value (repeatable)
        #[arg(long = "set", value_parser = parse_key_value)]
        values: Vec<(String, Value)>,
    },

    /// Go back one step
    Prev { session: String },

    /// Submit the last step and commit the objects
    Ingest {
        session: String,

        /// Field value as key=value (repeatable)
        #[arg(long = "set", value_parser = parse_key_value)]
        values: Vec<(String, Value)>,
    },

    /// List the steps a model would go through
    Steps {
        #[arg(short, long = "model", required = true)]
        models: Vec<String>,
    },

    /// List open sessions
    Sessions,

    /// Discard a session without committing
    Abandon { session: String },

    /// Write the default configuration to .ingest/config.toml
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
}

/// Parse `key=value`; the value is read as JSON when it parses, else as a string
fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;

    let logging_handle = logging::init_logging(&config, cli.debug)?;

    let result = run(&cli, &config);

    if let Some(log_path) = logging_handle.log_file_path {
        if log_path.metadata().map(|m| m.len() > 0).unwrap_or(false) {
            eprintln!("Session log: {}", log_path.display());
        }
    }

    result
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    let store = FileSessionStore::new(config.sessions_path());
    let repository = Arc::new(FileRepository::new(config.repository_path()));
    let mut engine = WizardEngine::from_config(config, repository);

    match &cli.command {
        Commands::Start {
            models,
            collections,
            label,
            namespace,
            id,
            session,
        } => {
            let models = if models.is_empty() {
                config.ingest.default_models.clone()
            } else {
                models.clone()
            };
            let wizard_config = WizardConfig {
                models,
                collections: collections.clone(),
                label: label.clone(),
                namespace: namespace.clone(),
                id: id.clone(),
                ..WizardConfig::default()
            };
            let session_id = session
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()[..12].to_string());
            if store.load(&session_id)?.is_some() {
                bail!("Session '{}' already exists", session_id);
            }

            let response = engine
                .invoke(&store, &session_id, WizardRequest::new(wizard_config))
                .context("Failed to start wizard")?;
            if !cli.json && !matches!(response, WizardResponse::Aborted { .. }) {
                println!("Session: {}", session_id);
                println!();
            }
            print_response(&response, &session_id, cli.json)?;
        }
        Commands::Show { session } => {
            let response = drive(&mut engine, &store, session, None, Vec::new())?;
            print_response(&response, session, cli.json)?;
        }
        Commands::Next { session, values } => {
            let response = drive(&mut engine, &store, session, Some(Trigger::Next), values.clone())?;
            print_response(&response, session, cli.json)?;
        }
        Commands::Prev { session } => {
            let response =
                drive(&mut engine, &store, session, Some(Trigger::Previous), Vec::new())?;
            print_response(&response, session, cli.json)?;
        }
        Commands::Ingest { session, values } => {
            let response =
                drive(&mut engine, &store, session, Some(Trigger::Ingest), values.clone())?;
            print_response(&response, session, cli.json)?;
        }
        Commands::Steps { models } => {
            cmd_steps(&engine, models.clone(), cli.json)?;
        }
        Commands::Sessions => {
            let sessions = store.list()?;
            if sessions.is_empty() {
                println!("No open sessions");
            }
            for session in sessions {
                println!("{}", session);
            }
        }
        Commands::Abandon { session } => {
            if store.load(session)?.is_none() {
                bail!("No wizard session '{}'", session);
            }
            engine.abandon(&store, session)?;
            println!("Abandoned session {}", session);
        }
        Commands::Init { force } => {
            let path = Config::project_config_path();
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config.save()?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

/// Run one round trip against an existing session
fn drive(
    engine: &mut WizardEngine,
    store: &FileSessionStore,
    session_id: &str,
    trigger: Option<Trigger>,
    values: Vec<(String, Value)>,
) -> Result<WizardResponse> {
    if store.load(session_id)?.is_none() {
        bail!("No wizard session '{}' (use 'ingest-wizard start')", session_id);
    }
    let request = WizardRequest {
        trigger,
        input: values.into_iter().collect::<Values>(),
        ..WizardRequest::default()
    };
    engine
        .invoke(store, session_id, request)
        .with_context(|| format!("Failed to run session {}", session_id))
}

fn cmd_steps(engine: &WizardEngine, models: Vec<String>, json: bool) -> Result<()> {
    let ordering = engine.approximate_steps(&WizardConfig::new(models));

    if json {
        let steps: Vec<_> = ordering
            .iter()
            .map(|s| {
                serde_json::json!({
                    "id": s.id,
                    "weight": s.weight,
                    "kind": s.kind,
                    "action": s.action_reference,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    if ordering.is_empty() {
        println!("No steps apply; objects can be created directly");
        return Ok(());
    }

    println!("Steps ({})", ordering.len());
    println!("{}", "─".repeat(60));
    for (i, step) in ordering.iter().enumerate() {
        println!(
            "{:>2}. {:<20} weight {:>4}  {}",
            i + 1,
            step.id,
            step.weight,
            step.action_reference
        );
    }
    Ok(())
}

fn print_response(response: &WizardResponse, session_id: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    match response {
        WizardResponse::Form(rendered) => print_form(rendered, session_id),
        WizardResponse::NoContent { step_id } => {
            println!("Step '{}' has nothing to show", step_id);
        }
        WizardResponse::Committed(report) => {
            for object in &report.committed {
                println!("✓ Ingested {} ({})", object.label, object.id);
            }
            for failure in &report.failed {
                println!("✗ Failed to ingest {} ({}): {}", failure.label, failure.id, failure.reason);
            }
            if let Some(id) = report.redirect_to() {
                println!();
                println!("View: {}", id);
            }
        }
        WizardResponse::Aborted { message } => {
            eprintln!("Cannot run the wizard: {}", message);
            eprintln!("Go back and start again with a valid configuration.");
        }
    }
    Ok(())
}

fn print_form(rendered: &RenderedStep, session_id: &str) {
    let form = &rendered.form;
    println!("Step {}/{}: {}", rendered.position, rendered.total, form.title);
    println!("{}", "─".repeat(60));
    if let Some(description) = &form.description {
        println!("{}", description);
        println!();
    }

    for field in &form.fields {
        let marker = if field.required { "*" } else { " " };
        let value = field
            .value
            .as_ref()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        println!("{} {:<24} {:<16} {}", marker, field.label, field.name, value);
        if !field.options.is_empty() {
            println!("    options: {}", field.options.join(", "));
        }
        if let Some(help) = &field.description {
            println!("    {}", help);
        }
    }

    if !form.errors.is_empty() {
        println!();
        for error in &form.errors {
            match &error.field {
                Some(field) => println!("! {}: {}", field, error.message),
                None => println!("! {}", error.message),
            }
        }
    }

    println!();
    let actions: Vec<String> = form
        .actions
        .iter()
        .map(|a| {
            let command = match a {
                FormAction::Previous => "prev",
                FormAction::Next => "next",
                FormAction::Ingest => "ingest",
            };
            format!("{} (ingest-wizard {} {})", a.label(), command, session_id)
        })
        .collect();
    println!("Actions: {}", actions.join(", "));
}
