//! Deployment DTOs for the API layer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::deployment::{Deployment, DeploymentStatus};
use crate::domain::variable::VariableValue;

/// Request to create a new deployment from a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeployment {
    pub name: String,
    pub template_id: String,
    pub environment: String,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableValue>,
}

/// Request to tear down a deployment's infrastructure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDestroy {
    pub deployment_id: Uuid,
}

/// Lightweight deployment view for listings (no log, no snapshot)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub id: Uuid,
    pub name: String,
    pub template_id: String,
    pub environment: String,
    pub status: DeploymentStatus,
    pub last_action: Option<String>,
    pub has_snapshot: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Deployment> for DeploymentSummary {
    fn from(deployment: Deployment) -> Self {
        Self {
            id: deployment.id,
            name: deployment.name,
            template_id: deployment.template_id,
            environment: deployment.environment,
            status: deployment.status,
            last_action: deployment.last_action,
            has_snapshot: deployment.state_snapshot.is_some(),
            created_at: deployment.created_at,
            updated_at: deployment.updated_at,
        }
    }
}
