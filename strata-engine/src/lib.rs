//! Deployment execution engine
//!
//! Turns a deployment record and its template into real infrastructure by
//! driving an external provisioning tool through a fixed pipeline:
//! - [`workspace`] renders the template and variable bindings to disk
//! - [`process`] runs one tool step at a time with captured output and a deadline
//! - [`store`] defines the persistence seams and in-memory implementations
//! - [`orchestrator`] owns the lifecycle state machine and background pipelines

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod store;
pub mod workspace;

pub use config::EngineConfig;
pub use error::{EngineError, Result, StoreError};
pub use orchestrator::{Orchestrator, PipelineHandle};
pub use process::{PipelineRunner, StepOutput, TerraformRunner};
