//! Persistence seams
//!
//! The engine never talks to a database directly. It is handed implementations
//! of these traits at construction time:
//! - [`TemplateStore`]: read-only template lookup
//! - [`DeploymentStore`]: deployment records, status transitions, logs and leases
//!
//! In-memory implementations live in [`memory`]; the server provides Postgres ones.

pub mod memory;

use async_trait::async_trait;
use std::time::Duration;
use strata_core::domain::deployment::{Deployment, DeploymentStatus};
use strata_core::domain::template::Template;
use uuid::Uuid;

use crate::error::StoreError;

pub use memory::{InMemoryDeploymentStore, InMemoryTemplateStore};

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read-only view of the template catalog
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn lookup(&self, id: &str) -> StoreResult<Option<Template>>;

    async fn list(&self) -> StoreResult<Vec<Template>>;
}

/// What a transition does to the captured infrastructure snapshot
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SnapshotChange {
    #[default]
    Keep,
    Set(serde_json::Value),
    Clear,
}

/// One persisted step of a pipeline
///
/// Applied as a compare-and-swap: it only takes effect when the stored status
/// still equals `from`. The log text is appended, never substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: DeploymentStatus,
    pub to: DeploymentStatus,
    pub last_action: String,
    pub log_append: String,
    pub snapshot: SnapshotChange,
}

impl Transition {
    pub fn new(from: DeploymentStatus, to: DeploymentStatus, last_action: impl Into<String>) -> Self {
        Self {
            from,
            to,
            last_action: last_action.into(),
            log_append: String::new(),
            snapshot: SnapshotChange::Keep,
        }
    }

    /// Sets the text appended to the log
    ///
    /// NUL bytes are replaced since text columns cannot store them.
    pub fn with_log(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.log_append = if text.contains('\0') {
            text.replace('\0', "\u{FFFD}")
        } else {
            text
        };
        self
    }

    pub fn with_snapshot(mut self, snapshot: SnapshotChange) -> Self {
        self.snapshot = snapshot;
        self
    }
}

/// Deployment records and the per-deployment pipeline lease
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn insert(&self, deployment: &Deployment) -> StoreResult<()>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Deployment>>;

    /// All deployments, newest first
    async fn list_all(&self) -> StoreResult<Vec<Deployment>>;

    /// Applies `transition` if the current status equals `transition.from`
    ///
    /// Returns `false` when the record is missing or its status moved on.
    async fn record_transition(&self, id: Uuid, transition: Transition) -> StoreResult<bool>;

    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// Takes (or renews) the pipeline lease for a deployment
    ///
    /// Succeeds when nobody holds the lease, `holder` already holds it, or the
    /// current lease has expired.
    async fn try_acquire_lease(&self, id: Uuid, holder: &str, ttl: Duration) -> StoreResult<bool>;

    /// Releases the lease if `holder` still owns it
    async fn release_lease(&self, id: Uuid, holder: &str) -> StoreResult<()>;
}
