//! Ingest Wizard - a multi-step object creation engine
//!
//! Steps are contributed by pluggable providers, ordered by weight and walked
//! one at a time with forward and backward navigation. Each step's input is
//! kept across moves, and the final step commits every object under
//! construction to a repository.

pub mod config;
pub mod engine;
pub mod error;
pub mod form;
pub mod logging;
pub mod navigation;
pub mod objects;
pub mod repository;
pub mod session;
pub mod steps;

pub use config::Config;
pub use engine::{
    CommitFailure, CommitReport, CommittedObject, RenderedStep, Trigger, WizardEngine,
    WizardRequest, WizardResponse,
};
pub use error::{CommitError, WizardError};
pub use session::{SessionState, WizardConfig};
