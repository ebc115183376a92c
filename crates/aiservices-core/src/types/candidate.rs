//! Generated alternatives returned by a model invocation.

use crate::types::Content;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Why the model stopped generating a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of the response.
    Stop,
    /// Hit the output token limit.
    MaxTokens,
    /// Stopped by a safety filter.
    Safety,
    /// The model wants a declared function to be called.
    ToolCall,
    /// A provider-specific reason not covered above.
    Other(String),
}

impl FinishReason {
    /// Wire identifier for this reason.
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::MaxTokens => "max_tokens",
            FinishReason::Safety => "safety",
            FinishReason::ToolCall => "tool_call",
            FinishReason::Other(s) => s,
        }
    }

    /// Parse a wire identifier; unknown values become [`FinishReason::Other`].
    pub fn from_str_value(value: &str) -> Self {
        match value {
            "stop" => FinishReason::Stop,
            "max_tokens" => FinishReason::MaxTokens,
            "safety" => FinishReason::Safety,
            "tool_call" => FinishReason::ToolCall,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

impl Serialize for FinishReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FinishReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value.as_str() {
            Some(s) => Ok(FinishReason::from_str_value(s)),
            None => Err(D::Error::custom("finish reason must be a string")),
        }
    }
}

/// One generated alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// The generated content.
    pub content: Content,

    /// Why generation stopped, when the provider reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Position among sibling alternatives, when the provider reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl Candidate {
    /// Create a candidate with no metadata.
    pub fn new(content: Content) -> Self {
        Self {
            content,
            finish_reason: None,
            index: None,
        }
    }

    /// Set the finish reason.
    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    /// Set the sibling index.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// JSON-schema self-description of the wire shape, for external
    /// consumers that validate payloads before handing them to the core.
    pub fn json_schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": Content::json_schema(),
                "finish_reason": { "type": "string" },
                "index": { "type": "integer", "minimum": 0 },
            },
            "required": ["content"],
            "additionalProperties": false,
        })
    }
}

/// An ordered, append-only collection of [`Candidate`]s.
///
/// Non-chat providers normally return exactly one element; providers that
/// produce several alternatives return more. Iteration order is insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidates {
    items: Vec<Candidate>,
}

impl Candidates {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate.
    pub fn push(&mut self, candidate: Candidate) {
        self.items.push(candidate);
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over the candidates in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.items.iter()
    }

    /// The first candidate, if any.
    pub fn first(&self) -> Option<&Candidate> {
        self.items.first()
    }

    /// Concatenated text of the first candidate's text parts.
    pub fn first_text(&self) -> Option<String> {
        self.first().map(|c| c.content.text())
    }
}

impl From<Vec<Candidate>> for Candidates {
    fn from(items: Vec<Candidate>) -> Self {
        Self { items }
    }
}

impl IntoIterator for Candidates {
    type Item = Candidate;
    type IntoIter = std::vec::IntoIter<Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Candidates {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
