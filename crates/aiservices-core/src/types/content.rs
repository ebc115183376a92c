//! Role-tagged sequences of parts: the unit of prompt and response.

use crate::error::{Error, Result};
use crate::types::Part;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;

/// Who authored a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentRole {
    /// The end user.
    User,
    /// The model.
    Model,
    /// System instructions.
    System,
}

impl ContentRole {
    /// Wire identifier for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentRole::User => "user",
            ContentRole::Model => "model",
            ContentRole::System => "system",
        }
    }

    /// Parse a wire identifier.
    pub fn from_str_value(value: &str) -> Result<Self> {
        match value {
            "user" => Ok(ContentRole::User),
            "model" => Ok(ContentRole::Model),
            "system" => Ok(ContentRole::System),
            other => Err(Error::validation(format!("unknown content role `{other}`"))),
        }
    }
}

impl fmt::Display for ContentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role plus an ordered sequence of [`Part`]s.
///
/// Used both as a single prompt payload and as one turn of chat history.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: ContentRole,
    pub parts: Vec<Part>,
}

impl Content {
    /// Create content with an explicit role and parts.
    pub fn new(role: ContentRole, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Create a user turn containing a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ContentRole::User, vec![Part::text(text)])
    }

    /// Create a model turn containing a single text part.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(ContentRole::Model, vec![Part::text(text)])
    }

    /// Create a system turn containing a single text part.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(ContentRole::System, vec![Part::text(text)])
    }

    /// Build content from its wire representation.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::validation("content must be an object"))?;

        let role = obj
            .get("role")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("content `role` must be a string"))?;
        let role = ContentRole::from_str_value(role)?;

        let parts = obj
            .get("parts")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::validation("content `parts` must be an array"))?;
        let parts = parts.iter().map(Part::from_value).collect::<Result<_>>()?;

        Ok(Self { role, parts })
    }

    /// The wire representation of this content.
    pub fn to_value(&self) -> Value {
        json!({
            "role": self.role.as_str(),
            "parts": self.parts.iter().map(Part::to_value).collect::<Vec<_>>(),
        })
    }

    /// Concatenated text of every text part.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// JSON-schema self-description of the wire shape, for external
    /// consumers that validate payloads before handing them to the core.
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "role": {
                    "type": "string",
                    "enum": ["user", "model", "system"],
                },
                "parts": {
                    "type": "array",
                    "items": { "type": "object" },
                },
            },
            "required": ["role", "parts"],
            "additionalProperties": false,
        })
    }
}

impl Serialize for Content {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Content::from_value(&value).map_err(D::Error::custom)
    }
}
