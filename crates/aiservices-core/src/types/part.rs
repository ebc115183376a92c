//! The atomic unit of content exchanged with a model.

use crate::error::{Error, Result};
use base64::Engine;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

/// One atomic unit of [`Content`](crate::Content): text, inline binary
/// data, a file reference, a function call, or a function response.
///
/// Exactly one variant is populated per part. Parts are immutable once
/// constructed; [`Part::from_value`] rejects malformed data instead of
/// building a partial part.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Plain text.
    Text { text: String },

    /// Base64-encoded bytes with a MIME type.
    InlineData { mime_type: String, data: String },

    /// A reference to externally hosted data.
    FileData { mime_type: String, file_uri: String },

    /// A function call requested by the model.
    FunctionCall {
        id: String,
        name: String,
        args: Map<String, Value>,
    },

    /// The caller-supplied result of a function call.
    FunctionResponse {
        id: String,
        name: String,
        response: Value,
    },
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an inline-data part from already base64-encoded data.
    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Create an inline-data part from raw bytes.
    pub fn inline_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::InlineData {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Create a file-data part.
    pub fn file_data(mime_type: impl Into<String>, file_uri: impl Into<String>) -> Self {
        Self::FileData {
            mime_type: mime_type.into(),
            file_uri: file_uri.into(),
        }
    }

    /// Create a function-call part. At least one of `id`/`name` must be
    /// non-empty.
    pub fn function_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: Map<String, Value>,
    ) -> Result<Self> {
        let id = id.into();
        let name = name.into();
        if id.is_empty() && name.is_empty() {
            return Err(Error::validation(
                "functionCall requires at least one of `id` and `name`",
            ));
        }
        Ok(Self::FunctionCall { id, name, args })
    }

    /// Create a function-response part. At least one of `id`/`name` must be
    /// non-empty.
    pub fn function_response(
        id: impl Into<String>,
        name: impl Into<String>,
        response: Value,
    ) -> Result<Self> {
        let id = id.into();
        let name = name.into();
        if id.is_empty() && name.is_empty() {
            return Err(Error::validation(
                "functionResponse requires at least one of `id` and `name`",
            ));
        }
        Ok(Self::FunctionResponse { id, name, response })
    }

    /// Build a part from its wire representation.
    ///
    /// The wire shape is an object with exactly one of the variant keys
    /// `text`, `inlineData`, `fileData`, `functionCall`, `functionResponse`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::validation("part must be an object"))?;

        const VARIANT_KEYS: [&str; 5] = [
            "text",
            "inlineData",
            "fileData",
            "functionCall",
            "functionResponse",
        ];
        let present: Vec<&str> = VARIANT_KEYS
            .into_iter()
            .filter(|k| obj.contains_key(*k))
            .collect();
        if present.len() != 1 {
            return Err(Error::validation(format!(
                "part must contain exactly one of {}, found {}",
                VARIANT_KEYS.join("/"),
                present.len()
            )));
        }

        match present[0] {
            "text" => {
                let text = require_str(obj, "text")?;
                Ok(Self::text(text))
            }
            "inlineData" => {
                let data = require_obj(obj, "inlineData")?;
                Ok(Self::InlineData {
                    mime_type: require_str(data, "mimeType")?.to_string(),
                    data: require_str(data, "data")?.to_string(),
                })
            }
            "fileData" => {
                let data = require_obj(obj, "fileData")?;
                Ok(Self::FileData {
                    mime_type: require_str(data, "mimeType")?.to_string(),
                    file_uri: require_str(data, "fileUri")?.to_string(),
                })
            }
            "functionCall" => {
                let data = require_obj(obj, "functionCall")?;
                let args = match data.get("args") {
                    Some(Value::Object(map)) => map.clone(),
                    Some(_) => {
                        return Err(Error::validation("functionCall.args must be an object"))
                    }
                    None => Map::new(),
                };
                Self::function_call(optional_str(data, "id")?, optional_str(data, "name")?, args)
            }
            "functionResponse" => {
                let data = require_obj(obj, "functionResponse")?;
                let response = data.get("response").cloned().unwrap_or(Value::Null);
                Self::function_response(
                    optional_str(data, "id")?,
                    optional_str(data, "name")?,
                    response,
                )
            }
            _ => unreachable!(),
        }
    }

    /// The wire representation of this part.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text { text } => json!({ "text": text }),
            Self::InlineData { mime_type, data } => json!({
                "inlineData": { "mimeType": mime_type, "data": data }
            }),
            Self::FileData {
                mime_type,
                file_uri,
            } => json!({
                "fileData": { "mimeType": mime_type, "fileUri": file_uri }
            }),
            Self::FunctionCall { id, name, args } => {
                let mut inner = Map::new();
                if !id.is_empty() {
                    inner.insert("id".to_string(), Value::String(id.clone()));
                }
                if !name.is_empty() {
                    inner.insert("name".to_string(), Value::String(name.clone()));
                }
                inner.insert("args".to_string(), Value::Object(args.clone()));
                json!({ "functionCall": inner })
            }
            Self::FunctionResponse { id, name, response } => {
                let mut inner = Map::new();
                if !id.is_empty() {
                    inner.insert("id".to_string(), Value::String(id.clone()));
                }
                if !name.is_empty() {
                    inner.insert("name".to_string(), Value::String(name.clone()));
                }
                inner.insert("response".to_string(), response.clone());
                json!({ "functionResponse": inner })
            }
        }
    }

    /// The concatenated text of this part, if it is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Part::from_value(&value).map_err(D::Error::custom)
    }
}

fn require_obj<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Map<String, Value>> {
    obj.get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| Error::validation(format!("`{key}` must be an object")))
}

fn require_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::validation(format!("`{key}` must be a string")))
}

fn optional_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    match obj.get(key) {
        None => Ok(""),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(Error::validation(format!("`{key}` must be a string"))),
    }
}
