//! Shared request/response plumbing for OpenAI-compatible chat APIs.
//!
//! Mistral, Perplexity, and xAI all speak a dialect of the OpenAI chat
//! completions shape; each provider module layers its own config transformer
//! table and tool preparation on top of the helpers here.

use crate::client::extract_key;
use crate::error::{ProviderError, Result};
use aiservices_core::{
    Candidate, Candidates, Content, ContentRole, FinishReason, FunctionDeclaration,
    GenerationConfig, Part,
};
use serde_json::{json, Map, Value};

/// One row of a provider's generation-config transformer table: a canonical
/// config field mapped to the provider's wire field.
pub struct ConfigRule {
    /// Canonical field name (documentation only).
    pub canonical: &'static str,
    /// Provider wire field name.
    pub wire: &'static str,
    /// Reads the canonical field; `None` leaves the wire field unset.
    pub map: fn(&GenerationConfig) -> Option<Value>,
}

/// The plain OpenAI-compatible table. Providers that deviate declare their
/// own table instead of patching this one.
pub const BASE_CONFIG_RULES: &[ConfigRule] = &[
    ConfigRule {
        canonical: "maxOutputTokens",
        wire: "max_completion_tokens",
        map: |c| c.max_output_tokens.map(Value::from),
    },
    ConfigRule {
        canonical: "temperature",
        wire: "temperature",
        map: |c| c.temperature.map(Value::from),
    },
    ConfigRule {
        canonical: "topP",
        wire: "top_p",
        map: |c| c.top_p.map(Value::from),
    },
    ConfigRule {
        canonical: "stopSequences",
        wire: "stop",
        map: |c| c.stop_sequences.clone().map(Value::from),
    },
    ConfigRule {
        canonical: "candidateCount",
        wire: "n",
        map: |c| c.candidate_count.map(Value::from),
    },
    ConfigRule {
        canonical: "presencePenalty",
        wire: "presence_penalty",
        map: |c| c.presence_penalty.map(Value::from),
    },
    ConfigRule {
        canonical: "frequencyPenalty",
        wire: "frequency_penalty",
        map: |c| c.frequency_penalty.map(Value::from),
    },
];

/// Merge a generation config into a request body through a transformer
/// table.
///
/// The overflow bag goes in first; named fields overwrite it on collision,
/// so a canonical setting always wins over a provider-specific duplicate.
pub fn apply_generation_config(
    body: &mut Map<String, Value>,
    config: &GenerationConfig,
    rules: &[ConfigRule],
) {
    for (key, value) in &config.additional {
        body.insert(key.clone(), value.clone());
    }
    for rule in rules {
        if let Some(value) = (rule.map)(config) {
            body.insert(rule.wire.to_string(), value);
        }
    }
}

/// Convert a system instruction plus chat history into OpenAI-compatible
/// messages.
pub fn messages_from_contents(
    system_instruction: Option<&Content>,
    history: &[Content],
) -> Result<Vec<Value>> {
    let mut messages = Vec::new();

    if let Some(instruction) = system_instruction {
        messages.push(json!({
            "role": "system",
            "content": instruction.text(),
        }));
    }

    for content in history {
        messages.extend(messages_from_content(content)?);
    }

    Ok(messages)
}

fn messages_from_content(content: &Content) -> Result<Vec<Value>> {
    let role = match content.role {
        ContentRole::User => "user",
        ContentRole::Model => "assistant",
        ContentRole::System => "system",
    };

    let mut messages = Vec::new();
    let mut content_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut text_only = true;

    for part in &content.parts {
        match part {
            Part::Text { text } => {
                content_parts.push(json!({ "type": "text", "text": text }));
            }
            Part::InlineData { mime_type, data } => {
                text_only = false;
                content_parts.push(json!({
                    "type": "image_url",
                    "image_url": { "url": format!("data:{mime_type};base64,{data}") },
                }));
            }
            Part::FileData { file_uri, .. } => {
                text_only = false;
                content_parts.push(json!({
                    "type": "image_url",
                    "image_url": { "url": file_uri },
                }));
            }
            Part::FunctionCall { id, name, args } => {
                tool_calls.push(json!({
                    "id": if id.is_empty() { name } else { id },
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": serde_json::to_string(args)?,
                    },
                }));
            }
            Part::FunctionResponse { id, name, response } => {
                // Each function response is its own tool-role message.
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": if id.is_empty() { name } else { id },
                    "content": serde_json::to_string(response)?,
                }));
            }
        }
    }

    if !content_parts.is_empty() || !tool_calls.is_empty() {
        let content_value = if content_parts.is_empty() {
            Value::Null
        } else if text_only && content_parts.len() == 1 {
            content_parts[0]["text"].clone()
        } else {
            Value::Array(content_parts)
        };

        let mut message = Map::new();
        message.insert("role".to_string(), Value::String(role.to_string()));
        message.insert("content".to_string(), content_value);
        if !tool_calls.is_empty() {
            message.insert("tool_calls".to_string(), Value::Array(tool_calls));
        }
        messages.push(Value::Object(message));
    }

    Ok(messages)
}

/// OpenAI-format tools array for a set of function declarations.
pub fn function_tools_value(declarations: &[FunctionDeclaration]) -> Value {
    Value::Array(
        declarations
            .iter()
            .map(|d| {
                json!({
                    "type": "function",
                    "function": {
                        "name": d.name,
                        "description": d.description,
                        "parameters": d.parameters,
                    },
                })
            })
            .collect(),
    )
}

fn finish_reason_from_wire(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::MaxTokens,
        "content_filter" => FinishReason::Safety,
        "tool_calls" => FinishReason::ToolCall,
        other => FinishReason::Other(other.to_string()),
    }
}

fn candidate_from_choice(choice: &Value, message_key: &str) -> Result<Candidate> {
    let message = extract_key(choice, message_key)?;

    let mut parts = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            parts.push(Part::text(text));
        }
    }

    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let function = extract_key(tool_call, "function")?;
            let name = function.get("name").and_then(Value::as_str).unwrap_or("");
            let id = tool_call.get("id").and_then(Value::as_str).unwrap_or("");
            let args = match function.get("arguments").and_then(Value::as_str) {
                Some(arguments) if !arguments.is_empty() => {
                    serde_json::from_str::<Map<String, Value>>(arguments)?
                }
                _ => Map::new(),
            };
            parts.push(Part::function_call(id, name, args)?);
        }
    }

    let mut candidate = Candidate::new(Content::new(ContentRole::Model, parts));
    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        candidate = candidate.with_finish_reason(finish_reason_from_wire(reason));
    }
    if let Some(index) = choice.get("index").and_then(Value::as_u64) {
        candidate = candidate.with_index(index as u32);
    }
    Ok(candidate)
}

/// Parse a chat-completions response into candidates. A missing `choices`
/// key is a hard failure.
pub fn candidates_from_response(response: &Value) -> Result<Candidates> {
    let choices = extract_key(response, "choices")?
        .as_array()
        .ok_or_else(|| ProviderError::missing_key("choices"))?;

    let mut candidates = Candidates::new();
    for choice in choices {
        candidates.push(candidate_from_choice(choice, "message")?);
    }
    Ok(candidates)
}

/// Parse one streamed chat-completions chunk into candidates. Deltas carry
/// incremental text; the final chunk carries the finish reason.
pub fn candidates_from_stream_chunk(chunk: &Value) -> Result<Candidates> {
    let choices = extract_key(chunk, "choices")?
        .as_array()
        .ok_or_else(|| ProviderError::missing_key("choices"))?;

    let mut candidates = Candidates::new();
    for choice in choices {
        let delta = extract_key(choice, "delta")?;

        let mut parts = Vec::new();
        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                parts.push(Part::text(text));
            }
        }

        let mut candidate = Candidate::new(Content::new(ContentRole::Model, parts));
        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            candidate = candidate.with_finish_reason(finish_reason_from_wire(reason));
        }
        if let Some(index) = choice.get("index").and_then(Value::as_u64) {
            candidate = candidate.with_index(index as u32);
        }
        candidates.push(candidate);
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_text_turn_collapses_to_string_content() {
        let messages = messages_from_contents(None, &[Content::user("hello")]).unwrap();
        assert_eq!(messages, vec![json!({ "role": "user", "content": "hello" })]);
    }

    #[test]
    fn test_system_instruction_comes_first() {
        let messages = messages_from_contents(
            Some(&Content::system("be terse")),
            &[Content::user("hi"), Content::model("hello")],
        )
        .unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
    }

    #[test]
    fn test_multimodal_turn_becomes_part_array() {
        let content = Content::new(
            ContentRole::User,
            vec![
                Part::text("what is this?"),
                Part::inline_data("image/png", "aGk="),
            ],
        );
        let messages = messages_from_contents(None, &[content]).unwrap();

        let parts = messages[0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/png;base64,aGk="
        );
    }

    #[test]
    fn test_function_round_trip_messages() {
        let mut args = Map::new();
        args.insert("city".to_string(), json!("Berlin"));

        let history = vec![
            Content::user("weather?"),
            Content::new(
                ContentRole::Model,
                vec![Part::function_call("call_1", "get_weather", args).unwrap()],
            ),
            Content::new(
                ContentRole::User,
                vec![Part::function_response("call_1", "get_weather", json!({ "temp": 21 }))
                    .unwrap()],
            ),
        ];
        let messages = messages_from_contents(None, &history).unwrap();

        assert_eq!(messages.len(), 3);
        let call = &messages[1]["tool_calls"][0];
        assert_eq!(call["id"], "call_1");
        assert_eq!(call["function"]["name"], "get_weather");

        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_named_config_field_wins_over_additional() {
        let config = GenerationConfig::new()
            .with_temperature(0.9)
            .with_additional("temperature", json!(0.1))
            .with_additional("safe_prompt", json!(true));

        let mut body = Map::new();
        apply_generation_config(&mut body, &config, BASE_CONFIG_RULES);

        assert_eq!(body["temperature"], json!(0.9));
        assert_eq!(body["safe_prompt"], json!(true));
    }

    #[test]
    fn test_base_rules_wire_names() {
        let config = GenerationConfig::new()
            .with_max_output_tokens(100)
            .with_candidate_count(2)
            .with_stop_sequences(vec!["END".to_string()]);

        let mut body = Map::new();
        apply_generation_config(&mut body, &config, BASE_CONFIG_RULES);

        assert_eq!(body["max_completion_tokens"], json!(100));
        assert_eq!(body["n"], json!(2));
        assert_eq!(body["stop"], json!(["END"]));
        assert!(!body.contains_key("maxOutputTokens"));
    }

    #[test]
    fn test_parse_response() {
        let response = json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello back" },
                "finish_reason": "stop",
            }],
        });

        let candidates = candidates_from_response(&response).unwrap();
        assert_eq!(candidates.len(), 1);
        let candidate = candidates.first().unwrap();
        assert_eq!(candidate.content.role, ContentRole::Model);
        assert_eq!(candidate.content.text(), "Hello back");
        assert_eq!(candidate.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": { "name": "get_weather", "arguments": "{\"city\":\"Berlin\"}" },
                    }],
                },
                "finish_reason": "tool_calls",
            }],
        });

        let candidates = candidates_from_response(&response).unwrap();
        let candidate = candidates.first().unwrap();
        assert_eq!(candidate.finish_reason, Some(FinishReason::ToolCall));
        match &candidate.content.parts[0] {
            Part::FunctionCall { id, name, args } => {
                assert_eq!(id, "call_9");
                assert_eq!(name, "get_weather");
                assert_eq!(args.get("city"), Some(&json!("Berlin")));
            }
            other => panic!("expected function call, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_choices_is_hard_failure() {
        let err = candidates_from_response(&json!({ "id": "x" })).unwrap_err();
        assert!(matches!(err, ProviderError::MissingResponseKey(k) if k == "choices"));

        let err = candidates_from_stream_chunk(&json!({})).unwrap_err();
        assert!(matches!(err, ProviderError::MissingResponseKey(_)));
    }

    #[test]
    fn test_stream_chunk_delta() {
        let chunk = json!({
            "choices": [{ "index": 0, "delta": { "content": "Hel" } }],
        });
        let candidates = candidates_from_stream_chunk(&chunk).unwrap();
        assert_eq!(candidates.first_text().as_deref(), Some("Hel"));

        let done = json!({
            "choices": [{ "index": 0, "delta": {}, "finish_reason": "stop" }],
        });
        let candidates = candidates_from_stream_chunk(&done).unwrap();
        assert_eq!(
            candidates.first().unwrap().finish_reason,
            Some(FinishReason::Stop)
        );
    }
}
