//! Template domain types

use serde::{Deserialize, Serialize};

use crate::domain::variable::{VariableType, VariableValue};

/// Parameterized infrastructure template
///
/// Owned by the template catalog; read-only from the engine's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    /// Configuration body handed to the provisioning tool
    pub code: String,
    /// Declared variables, in the order they are rendered
    pub variable_schema: Vec<VariableSpec>,
}

impl Template {
    /// Looks up a variable declaration by name
    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variable_schema.iter().find(|spec| spec.name == name)
    }
}

/// A single declared template variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub var_type: VariableType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<VariableValue>,
    #[serde(default)]
    pub allowed_values: Option<Vec<VariableValue>>,
    #[serde(default)]
    pub description: Option<String>,
}
