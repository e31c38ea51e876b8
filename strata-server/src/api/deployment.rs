//! Deployment API Handlers
//!
//! HTTP endpoints for deployment lifecycle management. Pipelines run in the
//! background; mutating endpoints answer as soon as the first status change is
//! persisted and clients poll the record for progress.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use strata_core::domain::deployment::Deployment;
use strata_core::dto::deployment::{CreateDeployment, DeploymentSummary, TriggerDestroy};
use strata_engine::Orchestrator;
use uuid::Uuid;

use crate::api::error::ApiResult;

/// POST /deployment/create
/// Create a deployment and launch its provision pipeline
pub async fn create_deployment(
    State(orchestrator): State<Orchestrator>,
    Json(req): Json<CreateDeployment>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    tracing::info!(
        "Creating deployment '{}' from template {}",
        req.name,
        req.template_id
    );

    let handle = orchestrator.create_and_provision(req).await?;

    Ok((StatusCode::CREATED, Json(handle.deployment)))
}

/// GET /deployment/list
pub async fn list_deployments(
    State(orchestrator): State<Orchestrator>,
) -> ApiResult<Json<Vec<DeploymentSummary>>> {
    tracing::debug!("Listing all deployments");

    let deployments = orchestrator.list_deployments().await?;

    Ok(Json(deployments.into_iter().map(Into::into).collect()))
}

/// GET /deployment/{id}
pub async fn get_deployment(
    State(orchestrator): State<Orchestrator>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    tracing::debug!("Getting deployment: {}", id);

    Ok(Json(orchestrator.get_deployment(id).await?))
}

/// GET /deployment/{id}/logs
/// Accumulated pipeline output as plain text
pub async fn get_deployment_logs(
    State(orchestrator): State<Orchestrator>,
    Path(id): Path<Uuid>,
) -> ApiResult<String> {
    tracing::debug!("Getting logs for deployment: {}", id);

    Ok(orchestrator.get_deployment(id).await?.log)
}

/// POST /deployment/{id}/provision
/// Re-run the provision pipeline for a pending, failed or destroyed deployment
pub async fn provision_deployment(
    State(orchestrator): State<Orchestrator>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    tracing::info!("Provisioning deployment: {}", id);

    let handle = orchestrator.launch_provision(id).await?;

    Ok((StatusCode::ACCEPTED, Json(handle.deployment)))
}

/// POST /deployment/destroy
pub async fn destroy_deployment(
    State(orchestrator): State<Orchestrator>,
    Json(req): Json<TriggerDestroy>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    tracing::info!("Destroying deployment: {}", req.deployment_id);

    let handle = orchestrator.launch_destroy(req.deployment_id).await?;

    Ok((StatusCode::ACCEPTED, Json(handle.deployment)))
}

/// DELETE /deployment/{id}
pub async fn delete_deployment(
    State(orchestrator): State<Orchestrator>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting deployment: {}", id);

    orchestrator.delete_deployment(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
