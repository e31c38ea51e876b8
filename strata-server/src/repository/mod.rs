//! Repository Module
//!
//! Postgres implementations of the engine's store traits.

pub mod deployment;
pub mod template;

use strata_engine::error::StoreError;

pub use deployment::PgDeploymentStore;
pub use template::PgTemplateStore;

fn db_error(err: sqlx::Error) -> StoreError {
    tracing::error!("Database error: {:?}", err);
    StoreError::Database(err.to_string())
}
