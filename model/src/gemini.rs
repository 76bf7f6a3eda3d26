use crate::config::GeminiConfig;
use crate::provider::{ModelError, ModelProvider, ModelResult};
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, FinishReason, MessageRole, ModelInfo, Usage,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// `generateContent` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModelsResponse {
    #[serde(default)]
    models: Vec<GeminiModelData>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModelData {
    name: String,
    display_name: Option<String>,
    input_token_limit: Option<u32>,
    output_token_limit: Option<u32>,
}

pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> ModelResult<Self> {
        config
            .validate()
            .map_err(|msg| ModelError::InvalidConfig { message: msg })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::Unknown {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn convert_message_role(role: MessageRole) -> &'static str {
        match role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "model",
        }
    }

    /// Splits system messages into the system instruction and folds the rest
    /// into alternating `user`/`model` turns.
    fn convert_messages(
        messages: &[ChatMessage],
    ) -> ModelResult<(Option<GeminiContent>, Vec<GeminiContent>)> {
        let mut system_parts = Vec::new();
        let mut contents: Vec<GeminiContent> = Vec::new();

        for msg in messages {
            if msg.role == MessageRole::System {
                system_parts.push(GeminiPart {
                    text: msg.content.clone(),
                });
                continue;
            }

            let role = Self::convert_message_role(msg.role);
            match contents.last_mut() {
                Some(last) if last.role.as_deref() == Some(role) => {
                    if let Some(part) = last.parts.last_mut() {
                        part.text.push('\n');
                        part.text.push_str(&msg.content);
                    }
                }
                _ => contents.push(GeminiContent {
                    role: Some(role.to_string()),
                    parts: vec![GeminiPart {
                        text: msg.content.clone(),
                    }],
                }),
            }
        }

        if contents.is_empty() {
            return Err(ModelError::InvalidConfig {
                message: "Conversation has no user or model turns".to_string(),
            });
        }

        let system_instruction = if system_parts.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: system_parts,
            })
        };

        Ok((system_instruction, contents))
    }

    fn convert_finish_reason(reason: Option<String>) -> Option<FinishReason> {
        reason.map(|r| match r.as_str() {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
                FinishReason::ContentFilter
            }
            _ => FinishReason::Other,
        })
    }

    fn build_request(&self, request: &ChatRequest) -> ModelResult<GeminiRequest> {
        let (system_instruction, contents) = Self::convert_messages(&request.messages)?;

        Ok(GeminiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(self.config.temperature),
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens: request.max_tokens.unwrap_or(self.config.max_output_tokens),
                response_mime_type: self.config.response_mime_type.clone(),
            },
        })
    }

    fn convert_response(response: GeminiResponse) -> ModelResult<ChatResponse> {
        if response.candidates.is_empty() {
            if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(ModelError::Blocked { reason });
            }
            return Err(ModelError::EmptyResponse);
        }

        let choices = response
            .candidates
            .into_iter()
            .map(|candidate| {
                let text = candidate
                    .content
                    .map(|c| {
                        c.parts
                            .into_iter()
                            .map(|p| p.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();

                Choice {
                    message: ChatMessage::assistant(text),
                    finish_reason: Self::convert_finish_reason(candidate.finish_reason),
                }
            })
            .collect();

        let usage = response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ChatResponse { choices, usage })
    }

    fn handle_http_error(err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            ModelError::ServiceUnavailable {
                message: "Cannot connect to Gemini API".to_string(),
            }
        } else {
            ModelError::Network(err)
        }
    }

    fn error_for_status(&self, status: StatusCode, body: String) -> ModelError {
        match status.as_u16() {
            400 if body.contains("API key") => ModelError::Authentication,
            401 | 403 => ModelError::Authentication,
            404 => ModelError::ModelNotFound {
                model: self.config.model.clone(),
            },
            429 => ModelError::RateLimit,
            503 => ModelError::ServiceUnavailable {
                message: "Gemini API unavailable".to_string(),
            },
            _ => ModelError::Unknown {
                message: format!("Gemini API error ({}): {}", status, body),
            },
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> ModelResult<reqwest::Response> {
        let response = builder
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Gemini request failed with status {}", status);
            return Err(self.error_for_status(status, error_text));
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn chat(&self, request: ChatRequest) -> ModelResult<ChatResponse> {
        debug!("Starting chat request with model: {}", request.model);

        let body = self.build_request(&request)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, request.model
        );

        let response = self.send(self.client.post(&url).json(&body)).await?;
        let gemini_response: GeminiResponse =
            response.json().await.map_err(Self::handle_http_error)?;

        let chat_response = Self::convert_response(gemini_response)?;

        info!("Chat request completed successfully");
        Ok(chat_response)
    }

    async fn list_models(&self) -> ModelResult<Vec<ModelInfo>> {
        debug!("Listing available models");

        let url = format!("{}/v1beta/models", self.config.base_url);
        let mut model_infos = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut builder = self.client.get(&url);
            if let Some(token) = &page_token {
                builder = builder.query(&[("pageToken", token.as_str())]);
            }

            let response = self.send(builder).await?;
            let page: GeminiModelsResponse =
                response.json().await.map_err(Self::handle_http_error)?;

            model_infos.extend(page.models.into_iter().map(|model| ModelInfo {
                name: model
                    .name
                    .strip_prefix("models/")
                    .map(str::to_string)
                    .unwrap_or(model.name),
                display_name: model.display_name,
                input_token_limit: model.input_token_limit,
                output_token_limit: model.output_token_limit,
            }));

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!("Retrieved {} models", model_infos.len());
        Ok(model_infos)
    }

    async fn health_check(&self) -> ModelResult<()> {
        debug!("Performing health check");

        let models = self.list_models().await?;
        if models.iter().any(|m| m.name == self.config.model) {
            info!("Health check passed");
            Ok(())
        } else {
            error!("Configured model {} is not available", self.config.model);
            Err(ModelError::ModelNotFound {
                model: self.config.model.clone(),
            })
        }
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(GeminiConfig::new("test-key")).unwrap()
    }

    #[test]
    fn test_provider_creation() {
        let provider = provider();
        assert_eq!(provider.provider_name(), "gemini");
        assert_eq!(provider.default_model(), "gemini-2.0-flash-exp");
    }

    #[test]
    fn test_provider_rejects_missing_key() {
        let result = GeminiProvider::new(GeminiConfig::default());
        assert!(matches!(result, Err(ModelError::InvalidConfig { .. })));
    }

    #[test]
    fn test_role_conversion() {
        assert_eq!(GeminiProvider::convert_message_role(MessageRole::User), "user");
        assert_eq!(
            GeminiProvider::convert_message_role(MessageRole::Assistant),
            "model"
        );
    }

    #[test]
    fn test_message_conversion_merges_turns() {
        let messages = vec![
            ChatMessage::system("persona"),
            ChatMessage::user("hi"),
            ChatMessage::user("anyone there?"),
            ChatMessage::assistant("yes"),
            ChatMessage::user("cool"),
        ];

        let (system, contents) = GeminiProvider::convert_messages(&messages).unwrap();
        let system = system.unwrap();
        assert_eq!(system.role, None);
        assert_eq!(system.parts[0].text, "persona");

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[0].parts[0].text, "hi\nanyone there?");
        assert_eq!(contents[1].role.as_deref(), Some("model"));
        assert_eq!(contents[2].parts[0].text, "cool");
    }

    #[test]
    fn test_message_conversion_requires_turns() {
        let messages = vec![ChatMessage::system("persona only")];
        assert!(GeminiProvider::convert_messages(&messages).is_err());
    }

    #[test]
    fn test_request_uses_config_defaults() {
        let provider = provider();
        let request = ChatRequest::new("gemini-2.0-flash-exp", vec![ChatMessage::user("hi")]);
        let body = provider.build_request(&request).unwrap();
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(json["generationConfig"]["responseMimeType"], "text/plain");
        assert!(json.get("systemInstruction").is_none());

        let request = request.with_temperature(0.2).with_max_tokens(64);
        let body = provider.build_request(&request).unwrap();
        assert_eq!(body.generation_config.temperature, 0.2);
        assert_eq!(body.generation_config.max_output_tokens, 64);
    }

    #[test]
    fn test_finish_reason_conversion() {
        assert_eq!(
            GeminiProvider::convert_finish_reason(Some("STOP".to_string())),
            Some(FinishReason::Stop)
        );
        assert_eq!(
            GeminiProvider::convert_finish_reason(Some("MAX_TOKENS".to_string())),
            Some(FinishReason::Length)
        );
        assert_eq!(
            GeminiProvider::convert_finish_reason(Some("SAFETY".to_string())),
            Some(FinishReason::ContentFilter)
        );
        assert_eq!(
            GeminiProvider::convert_finish_reason(Some("LANGUAGE".to_string())),
            Some(FinishReason::Other)
        );
        assert_eq!(GeminiProvider::convert_finish_reason(None), None);
    }

    #[test]
    fn test_response_conversion() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let chat = GeminiProvider::convert_response(response).unwrap();

        assert_eq!(chat.first_content(), Some("Hello there"));
        assert_eq!(chat.usage.unwrap().total_tokens, 5);
    }

    #[test]
    fn test_blocked_prompt() {
        let raw = serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let err = GeminiProvider::convert_response(response).unwrap_err();
        assert!(matches!(err, ModelError::Blocked { reason } if reason == "SAFETY"));

        let response: GeminiResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(matches!(
            GeminiProvider::convert_response(response),
            Err(ModelError::EmptyResponse)
        ));
    }

    #[test]
    fn test_status_mapping() {
        let provider = provider();
        assert!(matches!(
            provider.error_for_status(StatusCode::BAD_REQUEST, "API key not valid".to_string()),
            ModelError::Authentication
        ));
        assert!(matches!(
            provider.error_for_status(StatusCode::NOT_FOUND, String::new()),
            ModelError::ModelNotFound { .. }
        ));
        assert!(matches!(
            provider.error_for_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ModelError::RateLimit
        ));
        assert!(matches!(
            provider.error_for_status(StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
            ModelError::Unknown { message } if message.contains("boom")
        ));
    }
}
