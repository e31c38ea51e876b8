//! Error types for the execution engine

use strata_core::domain::deployment::DeploymentStatus;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the orchestrator's entry points
///
/// Failures that happen after a pipeline has started are never returned here;
/// they are recorded on the deployment as a status and log update instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown template, unresolvable variables, or a missing workspace
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Deployment record does not exist
    #[error("Deployment {0} not found")]
    NotFound(Uuid),

    /// Requested action is not an edge out of the current status
    #[error("Cannot {action} deployment {id} in status {status}")]
    InvalidState {
        id: Uuid,
        status: DeploymentStatus,
        action: &'static str,
    },

    /// Another pipeline holds the lease for this deployment
    #[error("A pipeline is already in progress for deployment {0}")]
    PipelineInProgress(Uuid),

    /// The stored status moved away from the one this pipeline expected
    #[error("Deployment {id} is no longer in status {expected}")]
    StatusChanged {
        id: Uuid,
        expected: DeploymentStatus,
    },

    /// Malformed request
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Workspace directory could not be allocated or written
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Persistence layer failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record {id}: {message}")]
    Corrupt { id: String, message: String },
}

impl EngineError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn workspace(message: impl Into<String>) -> Self {
        Self::Workspace(message.into())
    }

    /// Check if this error was raised before any state changed
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}
