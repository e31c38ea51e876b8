//! API Module
//!
//! HTTP API layer for the deployment engine.
//! Each submodule handles endpoints for a specific domain.

pub mod deployment;
pub mod error;
pub mod health;
pub mod template;

use axum::{
    Router,
    routing::{delete, get, post},
};
use strata_engine::Orchestrator;
use tower_http::trace::TraceLayer;

/// Create the main API router with all endpoints
pub fn create_router(orchestrator: Orchestrator) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Deployment endpoints
        .route("/deployment/create", post(deployment::create_deployment))
        .route("/deployment/destroy", post(deployment::destroy_deployment))
        .route("/deployment/list", get(deployment::list_deployments))
        .route("/deployment/{id}", get(deployment::get_deployment))
        .route("/deployment/{id}", delete(deployment::delete_deployment))
        .route("/deployment/{id}/logs", get(deployment::get_deployment_logs))
        .route(
            "/deployment/{id}/provision",
            post(deployment::provision_deployment),
        )
        // Template endpoints
        .route("/template/list", get(template::list_templates))
        // Add state and middleware
        .with_state(orchestrator)
        .layer(TraceLayer::new_for_http())
}
