//! Deployment Repository
//!
//! Deployment records, compare-and-swap status transitions, the append-only
//! log and the per-deployment pipeline lease.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use strata_core::domain::deployment::{Deployment, DeploymentStatus};
use strata_engine::error::StoreError;
use strata_engine::store::{DeploymentStore, SnapshotChange, StoreResult, Transition};
use uuid::Uuid;

use super::db_error;

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, template_id, environment, variables, status, workspace_path,
           log, state_snapshot, last_action, created_at, updated_at
    FROM deployments
"#;

/// Postgres-backed [`DeploymentStore`]
#[derive(Clone)]
pub struct PgDeploymentStore {
    pool: PgPool,
}

impl PgDeploymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeploymentStore for PgDeploymentStore {
    async fn insert(&self, deployment: &Deployment) -> StoreResult<()> {
        let variables = serde_json::to_value(&deployment.variables).map_err(|e| {
            StoreError::Corrupt {
                id: deployment.id.to_string(),
                message: format!("unserializable variables: {}", e),
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO deployments (
                id, name, template_id, environment, variables, status,
                workspace_path, log, state_snapshot, last_action, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(deployment.id)
        .bind(&deployment.name)
        .bind(&deployment.template_id)
        .bind(&deployment.environment)
        .bind(variables)
        .bind(deployment.status.as_str())
        .bind(deployment.workspace_path.to_string_lossy().to_string())
        .bind(&deployment.log)
        .bind(&deployment.state_snapshot)
        .bind(&deployment.last_action)
        .bind(deployment.created_at)
        .bind(deployment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Deployment>> {
        let row = sqlx::query_as::<_, DeploymentRow>(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Deployment::try_from).transpose()
    }

    async fn list_all(&self) -> StoreResult<Vec<Deployment>> {
        let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
            "{} ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Deployment::try_from).collect()
    }

    async fn record_transition(&self, id: Uuid, transition: Transition) -> StoreResult<bool> {
        let (snapshot_mode, snapshot) = snapshot_params(transition.snapshot);

        let result = sqlx::query(
            r#"
            UPDATE deployments
            SET status = $1,
                last_action = $2,
                log = log || $3,
                state_snapshot = CASE $4
                    WHEN 'set' THEN $5
                    WHEN 'clear' THEN NULL
                    ELSE state_snapshot
                END,
                updated_at = $6
            WHERE id = $7 AND status = $8
            "#,
        )
        .bind(transition.to.as_str())
        .bind(&transition.last_action)
        .bind(&transition.log_append)
        .bind(snapshot_mode)
        .bind(snapshot)
        .bind(chrono::Utc::now())
        .bind(id)
        .bind(transition.from.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM deployments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn try_acquire_lease(&self, id: Uuid, holder: &str, ttl: Duration) -> StoreResult<bool> {
        let now = chrono::Utc::now();
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| {
            StoreError::Database(format!("lease ttl out of range: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE deployments
            SET lease_holder = $1, lease_expires_at = $2
            WHERE id = $3
              AND (lease_holder IS NULL OR lease_holder = $1 OR lease_expires_at <= $4)
            "#,
        )
        .bind(holder)
        .bind(now + ttl)
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_lease(&self, id: Uuid, holder: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE deployments
            SET lease_holder = NULL, lease_expires_at = NULL
            WHERE id = $1 AND lease_holder = $2
            "#,
        )
        .bind(id)
        .bind(holder)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Splits a snapshot change into the mode flag and value bound to the update
fn snapshot_params(change: SnapshotChange) -> (&'static str, Option<serde_json::Value>) {
    match change {
        SnapshotChange::Keep => ("keep", None),
        SnapshotChange::Set(value) => ("set", Some(value)),
        SnapshotChange::Clear => ("clear", None),
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: Uuid,
    name: String,
    template_id: String,
    environment: String,
    variables: serde_json::Value,
    status: String,
    workspace_path: String,
    log: String,
    state_snapshot: Option<serde_json::Value>,
    last_action: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = StoreError;

    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        let corrupt = |message: String| StoreError::Corrupt {
            id: row.id.to_string(),
            message,
        };

        let status: DeploymentStatus = row.status.parse().map_err(corrupt)?;
        let variables = serde_json::from_value(row.variables)
            .map_err(|e| corrupt(format!("invalid variables: {}", e)))?;

        Ok(Deployment {
            id: row.id,
            name: row.name,
            template_id: row.template_id,
            environment: row.environment,
            variables,
            status,
            workspace_path: row.workspace_path.into(),
            log: row.log,
            state_snapshot: row.state_snapshot,
            last_action: row.last_action,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
