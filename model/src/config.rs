use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub base_url: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            temperature: 1.25,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            response_mime_type: "text/plain".to_string(),
        }
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Base URL cannot be empty".to_string());
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with http:// or https://".to_string());
        }

        if self.api_key.trim().is_empty() {
            return Err("API key cannot be empty".to_string());
        }

        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err("Temperature must be between 0.0 and 2.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.top_p) {
            return Err("top_p must be between 0.0 and 1.0".to_string());
        }

        if self.top_k == 0 {
            return Err("top_k must be greater than 0".to_string());
        }

        if self.max_output_tokens == 0 {
            return Err("Max output tokens must be greater than 0".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GeminiConfig::new("key");
        assert_eq!(config.base_url, DEFAULT_GEMINI_URL);
        assert_eq!(config.model, "gemini-2.0-flash-exp");
        assert_eq!(config.temperature, 1.25);
        assert_eq!(config.top_k, 40);
        assert_eq!(config.max_output_tokens, 8192);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_without_key_is_invalid() {
        assert!(GeminiConfig::default().validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = GeminiConfig::new("key")
            .with_base_url("http://localhost:9000")
            .with_model("gemini-1.5-pro")
            .with_temperature(0.5)
            .with_max_output_tokens(256)
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.model, "gemini-1.5-pro");
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.max_output_tokens, 256);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = GeminiConfig::new("key");

        config.base_url = "".to_string();
        assert!(config.validate().is_err());

        config.base_url = "invalid-url".to_string();
        assert!(config.validate().is_err());

        config.base_url = DEFAULT_GEMINI_URL.to_string();
        config.model = " ".to_string();
        assert!(config.validate().is_err());

        config.model = DEFAULT_GEMINI_MODEL.to_string();
        config.temperature = 3.0;
        assert!(config.validate().is_err());

        config.temperature = 1.0;
        config.top_p = 1.5;
        assert!(config.validate().is_err());

        config.top_p = 0.9;
        config.top_k = 0;
        assert!(config.validate().is_err());

        config.top_k = 40;
        config.timeout = Duration::from_secs(0);
        assert!(config.validate().is_err());

        config.timeout = Duration::from_secs(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialization_skips_api_key() {
        let config = GeminiConfig::new("super-secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(json.contains("gemini-2.0-flash-exp"));
    }
}
