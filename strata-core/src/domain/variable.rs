//! Variable domain types
//!
//! Values supplied for template variables are an explicit tagged union rather
//! than an untyped bag, so every value can be checked against the template's
//! schema and rendered into the provisioning tool's literal syntax.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A concrete variable value
///
/// Serialized untagged so API payloads stay natural JSON:
/// `{"count": 2, "tags": {"env": "dev"}, "zones": ["a", "b"]}`.
/// Maps are ordered to keep every rendering deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<VariableValue>),
    Map(BTreeMap<String, VariableValue>),
}

impl VariableValue {
    /// Short name of the value's kind, used in validation messages
    pub fn kind(&self) -> &'static str {
        match self {
            VariableValue::Bool(_) => "bool",
            VariableValue::Number(_) => "number",
            VariableValue::String(_) => "string",
            VariableValue::List(_) => "list",
            VariableValue::Map(_) => "map",
        }
    }

    /// Whether this value is acceptable for a variable declared with `ty`
    pub fn conforms_to(&self, ty: VariableType) -> bool {
        matches!(
            (ty, self),
            (VariableType::Any, _)
                | (VariableType::String, VariableValue::String(_))
                | (VariableType::Number, VariableValue::Number(_))
                | (VariableType::Bool, VariableValue::Bool(_))
                | (VariableType::List, VariableValue::List(_))
                | (VariableType::Map, VariableValue::Map(_))
        )
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::String(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        VariableValue::String(value)
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        VariableValue::Bool(value)
    }
}

impl From<i64> for VariableValue {
    fn from(value: i64) -> Self {
        VariableValue::Number(value.into())
    }
}

impl From<Vec<VariableValue>> for VariableValue {
    fn from(value: Vec<VariableValue>) -> Self {
        VariableValue::List(value)
    }
}

impl From<BTreeMap<String, VariableValue>> for VariableValue {
    fn from(value: BTreeMap<String, VariableValue>) -> Self {
        VariableValue::Map(value)
    }
}

/// Declared type of a template variable
///
/// Parsed leniently from the schema's type string: collection constructors such
/// as `list(string)` or `object({...})` collapse to their outer shape, and
/// anything unrecognised accepts any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VariableType {
    String,
    Number,
    Bool,
    List,
    Map,
    #[default]
    Any,
}

impl From<String> for VariableType {
    fn from(raw: String) -> Self {
        VariableType::from(raw.as_str())
    }
}

impl From<&str> for VariableType {
    fn from(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        let outer = normalized
            .split_once('(')
            .map(|(head, _)| head.trim())
            .unwrap_or(normalized.as_str());

        match outer {
            "string" => VariableType::String,
            "number" => VariableType::Number,
            "bool" | "boolean" => VariableType::Bool,
            "list" | "set" | "tuple" => VariableType::List,
            "map" | "object" => VariableType::Map,
            _ => VariableType::Any,
        }
    }
}

impl From<VariableType> for String {
    fn from(ty: VariableType) -> Self {
        ty.to_string()
    }
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VariableType::String => "string",
            VariableType::Number => "number",
            VariableType::Bool => "bool",
            VariableType::List => "list",
            VariableType::Map => "map",
            VariableType::Any => "any",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json_shapes() {
        let json = serde_json::json!({
            "name": "demo",
            "count": 2,
            "ratio": 0.5,
            "enabled": true,
            "zones": ["a", "b"],
            "tags": {"env": "dev"}
        });

        let values: BTreeMap<String, VariableValue> = serde_json::from_value(json).unwrap();

        assert_eq!(values["name"], VariableValue::from("demo"));
        assert_eq!(values["count"], VariableValue::from(2));
        assert_eq!(values["ratio"].kind(), "number");
        assert_eq!(values["enabled"], VariableValue::Bool(true));
        assert_eq!(values["zones"].kind(), "list");
        assert_eq!(values["tags"].kind(), "map");
    }

    #[test]
    fn test_null_is_rejected() {
        let result = serde_json::from_str::<VariableValue>("null");
        assert!(result.is_err());
    }

    #[test]
    fn test_variable_type_parsing() {
        assert_eq!(VariableType::from("string"), VariableType::String);
        assert_eq!(VariableType::from("Number"), VariableType::Number);
        assert_eq!(VariableType::from("boolean"), VariableType::Bool);
        assert_eq!(VariableType::from("list(string)"), VariableType::List);
        assert_eq!(VariableType::from("set(number)"), VariableType::List);
        assert_eq!(VariableType::from("map(string)"), VariableType::Map);
        assert_eq!(
            VariableType::from("object({ name = string })"),
            VariableType::Map
        );
        assert_eq!(VariableType::from(""), VariableType::Any);
        assert_eq!(VariableType::from("whatever"), VariableType::Any);
    }

    #[test]
    fn test_variable_type_serde() {
        let ty: VariableType = serde_json::from_str("\"list(string)\"").unwrap();
        assert_eq!(ty, VariableType::List);
        assert_eq!(serde_json::to_string(&ty).unwrap(), "\"list\"");
    }

    #[test]
    fn test_conforms_to() {
        assert!(VariableValue::from("x").conforms_to(VariableType::String));
        assert!(VariableValue::from("x").conforms_to(VariableType::Any));
        assert!(!VariableValue::from("x").conforms_to(VariableType::Number));
        assert!(VariableValue::from(3).conforms_to(VariableType::Number));
        assert!(!VariableValue::Bool(true).conforms_to(VariableType::List));
    }
}
