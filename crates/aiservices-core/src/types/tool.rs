//! Capability extensions attached to a model invocation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A callable function offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name the model calls it by.
    pub name: String,

    /// What the function does, for the model's benefit.
    pub description: String,

    /// JSON-schema description of the function's parameters, sanitized so
    /// that every declared object property is required and no additional
    /// properties are accepted.
    pub parameters: Value,
}

impl FunctionDeclaration {
    /// Create a declaration. The parameter schema is sanitized on
    /// construction; the name must be non-empty.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::validation("function declaration requires a name"));
        }
        if !parameters.is_object() {
            return Err(Error::validation(
                "function parameters must be a JSON-schema object",
            ));
        }
        Ok(Self {
            name,
            description: description.into(),
            parameters: sanitize_parameters_schema(&parameters),
        })
    }
}

/// A capability extension attached to a model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    /// Offer the model a set of callable functions.
    FunctionDeclarations(Vec<FunctionDeclaration>),

    /// Ground responses with web search, optionally constrained by domain.
    #[serde(rename_all = "camelCase")]
    WebSearch {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        allowed_domains: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        disallowed_domains: Vec<String>,
    },
}

impl Tool {
    /// Create a function-declarations tool.
    pub fn function_declarations(declarations: Vec<FunctionDeclaration>) -> Self {
        Self::FunctionDeclarations(declarations)
    }

    /// Create an unconstrained web-search tool.
    pub fn web_search() -> Self {
        Self::WebSearch {
            allowed_domains: Vec::new(),
            disallowed_domains: Vec::new(),
        }
    }

    /// Create a web-search tool with domain constraints.
    pub fn web_search_with_domains(
        allowed_domains: Vec<String>,
        disallowed_domains: Vec<String>,
    ) -> Self {
        Self::WebSearch {
            allowed_domains,
            disallowed_domains,
        }
    }
}

/// Sanitize a function-parameter JSON schema.
///
/// For every `type: object` schema carrying a `properties` map, `required`
/// becomes exactly the property key set and `additionalProperties` is forced
/// to `false`. The rewrite recurses through nested object properties and
/// array `items`.
pub fn sanitize_parameters_schema(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return schema.clone();
    };

    let mut sanitized = obj.clone();

    let is_object_schema = sanitized.get("type").and_then(Value::as_str) == Some("object");
    if is_object_schema {
        if let Some(Value::Object(properties)) = sanitized.get("properties").cloned() {
            let mut rewritten = Map::new();
            let mut required = Vec::new();
            for (key, sub_schema) in &properties {
                required.push(Value::String(key.clone()));
                rewritten.insert(key.clone(), sanitize_parameters_schema(sub_schema));
            }
            sanitized.insert("properties".to_string(), Value::Object(rewritten));
            sanitized.insert("required".to_string(), Value::Array(required));
            sanitized.insert("additionalProperties".to_string(), Value::Bool(false));
        }
    }

    if let Some(items) = sanitized.get("items").cloned() {
        sanitized.insert("items".to_string(), sanitize_parameters_schema(&items));
    }

    Value::Object(sanitized)
}
