use httpmock::prelude::*;
use model::{
    ChatMessage, ChatRequest, FinishReason, GeminiConfig, GeminiProvider, ModelError,
    ModelProvider,
};
use serde_json::json;
use std::time::Duration;

const MODEL: &str = "gemini-2.0-flash-exp";
const TIMEOUT: Duration = Duration::from_secs(30);

fn make_provider(base_url: &str) -> GeminiProvider {
    GeminiProvider::new(
        GeminiConfig::new("test-key")
            .with_base_url(base_url)
            .with_timeout(TIMEOUT),
    )
    .expect("provider creation")
}

#[tokio::test]
async fn test_basic_chat() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/v1beta/models/{}:generateContent", MODEL))
                .header("x-goog-api-key", "test-key")
                .body_contains(r#""systemInstruction":{"parts":[{"text":"Be nice"}]}"#)
                .body_contains(r#""role":"user","parts":[{"text":"What is 2+2?"}]"#);
            then.status(200).json_body(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "4"}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {
                    "promptTokenCount": 7,
                    "candidatesTokenCount": 1,
                    "totalTokenCount": 8
                }
            }));
        })
        .await;

    let provider = make_provider(&server.base_url());
    let request = ChatRequest::new(MODEL, vec![ChatMessage::user("What is 2+2?")])
        .with_system("Be nice");

    let response = provider.chat(request).await.expect("chat failed");
    mock.assert_async().await;

    assert_eq!(response.choices.len(), 1);
    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.first_content(), Some("4"));

    let usage = response.usage.as_ref().expect("usage must exist");
    assert_eq!(usage.prompt_tokens, 7);
    assert_eq!(usage.completion_tokens, 1);
}

#[tokio::test]
async fn test_rate_limit_is_mapped() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/v1beta/models/{}:generateContent", MODEL));
            then.status(429).body("quota exhausted");
        })
        .await;

    let provider = make_provider(&server.base_url());
    let request = ChatRequest::new(MODEL, vec![ChatMessage::user("hi")]);

    let err = provider.chat(request).await.unwrap_err();
    assert!(matches!(err, ModelError::RateLimit), "got {:?}", err);
}

#[tokio::test]
async fn test_list_models_and_health() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1beta/models");
            then.status(200).json_body(json!({
                "models": [
                    {"name": "models/gemini-2.0-flash-exp", "displayName": "Gemini 2.0 Flash", "inputTokenLimit": 1048576},
                    {"name": "models/gemini-1.5-pro"}
                ]
            }));
        })
        .await;

    let provider = make_provider(&server.base_url());
    let models = provider.list_models().await.expect("list_models failed");
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, MODEL);
    assert_eq!(models[0].display_name.as_deref(), Some("Gemini 2.0 Flash"));

    provider.health_check().await.expect("health_check failed");
    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_list_models_follows_page_tokens() {
    let server = MockServer::start_async().await;
    // Registered first so it takes precedence over the unfiltered first page.
    let second_page = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1beta/models")
                .query_param("pageToken", "p2");
            then.status(200)
                .json_body(json!({"models": [{"name": "models/gemini-2.0-flash-exp"}]}));
        })
        .await;
    let first_page = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1beta/models");
            then.status(200).json_body(json!({
                "models": [{"name": "models/gemini-1.5-pro"}],
                "nextPageToken": "p2"
            }));
        })
        .await;

    let provider = make_provider(&server.base_url());
    assert_eq!(provider.config().model, MODEL);

    let names: Vec<String> = provider
        .list_models()
        .await
        .expect("list_models failed")
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["gemini-1.5-pro", MODEL]);

    provider.health_check().await.expect("health_check failed");
    first_page.assert_hits_async(2).await;
    second_page.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_health_check_missing_model() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1beta/models");
            then.status(200)
                .json_body(json!({"models": [{"name": "models/gemini-1.5-pro"}]}));
        })
        .await;

    let provider = make_provider(&server.base_url());
    let err = provider.health_check().await.unwrap_err();
    assert!(matches!(err, ModelError::ModelNotFound { .. }));
}

#[tokio::test]
#[ignore]
async fn test_live_chat() {
    let api_key = std::env::var("API_KEY").expect("API_KEY must be set");
    let provider = GeminiProvider::new(GeminiConfig::new(api_key)).expect("provider creation");
    let request = ChatRequest::new(MODEL, vec![ChatMessage::user("Say hello")]);

    let response = tokio::time::timeout(TIMEOUT, provider.chat(request))
        .await
        .expect("chat timed out")
        .expect("chat failed");

    assert!(response.first_content().is_some());
}
