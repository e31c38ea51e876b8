//! Deployment domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::variable::VariableValue;

/// One instantiation of a template with concrete variable bindings
///
/// Structure shared between the engine (mutates through pipelines) and the
/// server (persists and serves it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub name: String,
    pub template_id: String,
    pub environment: String,
    pub variables: BTreeMap<String, VariableValue>,
    pub status: DeploymentStatus,
    /// Assigned once at creation, derived from `id`
    pub workspace_path: PathBuf,
    /// Append-only pipeline output
    pub log: String,
    /// Captured infrastructure state, present only after a successful provision
    pub state_snapshot: Option<serde_json::Value>,
    pub last_action: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Deployment lifecycle status
///
/// Provision: `pending -> running -> success | failed`.
/// Destroy: `success | failed -> destroying -> destroyed | destroy_failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Success,
    Failed,
    Destroying,
    Destroyed,
    DestroyFailed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Destroying => "destroying",
            DeploymentStatus::Destroyed => "destroyed",
            DeploymentStatus::DestroyFailed => "destroy_failed",
        }
    }

    /// Whether `next` is an edge of the lifecycle graph starting at `self`
    ///
    /// `running -> running` is the step-to-step edge inside a provision.
    /// Edges out of `failed`, `destroyed` and `destroy_failed` start a new
    /// pipeline invocation.
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;

        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Running)
                | (Running, Success)
                | (Running, Failed)
                | (Failed, Running)
                | (Destroyed, Running)
                | (Success, Destroying)
                | (Failed, Destroying)
                | (DestroyFailed, Destroying)
                | (Destroying, Destroyed)
                | (Destroying, DestroyFailed)
        )
    }

    /// Statuses a provision pipeline may start from
    pub fn can_provision(self) -> bool {
        self.can_transition_to(DeploymentStatus::Running) && self != DeploymentStatus::Running
    }

    /// Statuses a destroy pipeline may start from
    pub fn can_destroy(self) -> bool {
        self.can_transition_to(DeploymentStatus::Destroying)
    }

    /// A pipeline is currently driving this deployment
    pub fn is_active(self) -> bool {
        matches!(self, DeploymentStatus::Running | DeploymentStatus::Destroying)
    }

    /// Records may only be removed once nothing is left running against them
    pub fn can_delete(self) -> bool {
        matches!(self, DeploymentStatus::Destroyed | DeploymentStatus::Failed)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeploymentStatus::Pending),
            "running" => Ok(DeploymentStatus::Running),
            "success" => Ok(DeploymentStatus::Success),
            "failed" => Ok(DeploymentStatus::Failed),
            "destroying" => Ok(DeploymentStatus::Destroying),
            "destroyed" => Ok(DeploymentStatus::Destroyed),
            "destroy_failed" => Ok(DeploymentStatus::DestroyFailed),
            other => Err(format!("unknown deployment status: {}", other)),
        }
    }
}

/// One external-tool invocation within a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Init,
    Plan,
    Apply,
    Destroy,
}

impl PipelineStep {
    /// Steps of the provision pipeline, in execution order
    pub const PROVISION: [PipelineStep; 3] =
        [PipelineStep::Init, PipelineStep::Plan, PipelineStep::Apply];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Init => "init",
            PipelineStep::Plan => "plan",
            PipelineStep::Apply => "apply",
            PipelineStep::Destroy => "destroy",
        }
    }

    /// `last_action` recorded when this step exits non-zero
    pub fn failed_action(&self) -> String {
        format!("{}_failed", self.as_str())
    }

    /// `last_action` recorded when this step exceeds its deadline
    pub fn timed_out_action(&self) -> String {
        format!("{}_timed_out", self.as_str())
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
