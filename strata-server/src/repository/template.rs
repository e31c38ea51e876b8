//! Template Repository
//!
//! Read-only access to the template catalog.

use async_trait::async_trait;
use sqlx::PgPool;
use strata_core::domain::template::{Template, VariableSpec};
use strata_engine::error::StoreError;
use strata_engine::store::{StoreResult, TemplateStore};

use super::db_error;

/// Postgres-backed [`TemplateStore`]
#[derive(Clone)]
pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn lookup(&self, id: &str) -> StoreResult<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, name, code, variable_schema
            FROM templates
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Template::try_from).transpose()
    }

    async fn list(&self) -> StoreResult<Vec<Template>> {
        let rows = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, name, code, variable_schema
            FROM templates
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Template::try_from).collect()
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: String,
    name: String,
    code: String,
    variable_schema: serde_json::Value,
}

impl TryFrom<TemplateRow> for Template {
    type Error = StoreError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let variable_schema: Vec<VariableSpec> = serde_json::from_value(row.variable_schema)
            .map_err(|e| StoreError::Corrupt {
                id: row.id.clone(),
                message: format!("invalid variable schema: {}", e),
            })?;

        Ok(Template {
            id: row.id,
            name: row.name,
            code: row.code,
            variable_schema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::domain::variable::VariableType;

    #[test]
    fn test_row_conversion() {
        let row = TemplateRow {
            id: "web".to_string(),
            name: "Web".to_string(),
            code: "resource \"null_resource\" \"x\" {}".to_string(),
            variable_schema: serde_json::json!([
                {"name": "replicas", "type": "number", "default": 2}
            ]),
        };

        let template = Template::try_from(row).unwrap();

        assert_eq!(template.variable_schema.len(), 1);
        assert_eq!(template.variable_schema[0].var_type, VariableType::Number);
    }

    #[test]
    fn test_corrupt_schema_is_reported() {
        let row = TemplateRow {
            id: "broken".to_string(),
            name: "Broken".to_string(),
            code: String::new(),
            variable_schema: serde_json::json!({"not": "a list"}),
        };

        let err = Template::try_from(row).unwrap_err();

        assert!(matches!(err, StoreError::Corrupt { ref id, .. } if id == "broken"));
    }
}
