//! Template API Handlers
//!
//! Read-only view of the catalog the engine provisions from.

use axum::{Json, extract::State};
use strata_core::domain::template::Template;
use strata_engine::Orchestrator;

use crate::api::error::ApiResult;

/// GET /template/list
pub async fn list_templates(State(orchestrator): State<Orchestrator>) -> ApiResult<Json<Vec<Template>>> {
    tracing::debug!("Listing all templates");

    Ok(Json(orchestrator.list_templates().await?))
}
