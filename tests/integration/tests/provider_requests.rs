//! HTTP-level provider scenarios against a mocked server.
//!
//! These verify the wire shape providers actually send, not just the parsed
//! results.

use aiservices_core::{Capability, GenerationConfig, Tool};
use aiservices_providers::{
    CachedService, ContentInput, InMemoryTransients, MistralService, ModelParams,
    PerplexityService, Service,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_completion_body(text: &str) -> Value {
    json!({
        "id": "cmpl-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop",
        }],
    })
}

#[tokio::test]
async fn test_perplexity_web_search_tool_sets_domain_filter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("ok")))
        .mount(&server)
        .await;

    let service = PerplexityService::new("test-key")
        .unwrap()
        .with_base_url(server.uri());
    let model = service
        .get_model(
            ModelParams::new()
                .with_model("sonar")
                .with_tool(Tool::web_search_with_domains(
                    vec![],
                    vec!["spam.com".to_string()],
                )),
        )
        .await
        .unwrap();

    model.generate_text(ContentInput::from("search this")).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["search_domain_filter"], json!(["-spam.com"]));
    assert_eq!(body["model"], "sonar");
}

#[tokio::test]
async fn test_mistral_generation_config_reaches_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "mistral-small-latest",
                "capabilities": { "completion_chat": true, "function_calling": true },
            }],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_body("Bonjour")))
        .mount(&server)
        .await;

    let service = MistralService::new("test-key")
        .unwrap()
        .with_base_url(server.uri());
    let model = service
        .get_model(
            ModelParams::new()
                .require(Capability::TextGeneration)
                .with_generation_config(
                    GenerationConfig::new()
                        .with_max_output_tokens(64)
                        .with_temperature(0.3),
                ),
        )
        .await
        .unwrap();

    // Preference sorting picked the only listed model.
    assert_eq!(model.metadata().slug, "mistral-small-latest");

    let candidates = model.generate_text(ContentInput::from("Salut")).await.unwrap();
    assert_eq!(candidates.first_text().as_deref(), Some("Bonjour"));

    let requests = server.received_requests().await.unwrap();
    let generate = requests
        .iter()
        .find(|r| r.url.path().ends_with("/chat/completions"))
        .unwrap();
    let body: Value = serde_json::from_slice(&generate.body).unwrap();
    assert_eq!(body["max_tokens"], json!(64));
    assert_eq!(body["temperature"], json!(0.3));
    assert_eq!(body["messages"][0]["content"], "Salut");
}

#[tokio::test]
async fn test_cached_service_lists_upstream_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "mistral-small-latest" }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let inner = Arc::new(
        MistralService::new("test-key")
            .unwrap()
            .with_base_url(server.uri()),
    );
    let cached = CachedService::new(inner, Arc::new(InMemoryTransients::new()));

    let first = cached.list_models().await.unwrap();
    let second = cached.list_models().await.unwrap();
    assert_eq!(first, second);

    // The mock's expect(1) verifies the upstream saw a single request.
    server.verify().await;
}

#[tokio::test]
async fn test_upstream_error_surfaces_with_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "quota exhausted" },
        })))
        .mount(&server)
        .await;

    let service = PerplexityService::new("test-key")
        .unwrap()
        .with_base_url(server.uri());
    let model = service
        .get_model(ModelParams::new().with_model("sonar"))
        .await
        .unwrap();

    let err = model.generate_text(ContentInput::from("hi")).await.unwrap_err();
    assert!(err.to_string().contains("quota exhausted"));
}
