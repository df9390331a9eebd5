//! HTTP generator adapter for a messages-style completion API
//!
//! Sends each prompt as a single user message and returns the concatenated
//! text blocks of the reply.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::client::{Generator, GeneratorError};

/// Configuration for the HTTP generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpGeneratorConfig {
    pub endpoint: String,
    pub api_version: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_key_env: String,
    pub request_timeout_ms: u64,
}

impl Default for HttpGeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            api_version: "2023-06-01".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            request_timeout_ms: 300_000,
        }
    }
}

/// Generator backed by an HTTP completion endpoint
pub struct HttpGenerator {
    client: Client,
    api_key: String,
    config: HttpGeneratorConfig,
}

impl HttpGenerator {
    /// Create a generator, reading the API key from `config.api_key_env`
    pub fn new(config: HttpGeneratorConfig) -> Result<Self, GeneratorError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| GeneratorError::MissingApiKey {
            env_var: config.api_key_env.clone(),
        })?;
        Self::with_api_key(api_key, config)
    }

    /// Create a generator with an explicit API key
    pub fn with_api_key(api_key: String, config: HttpGeneratorConfig) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn build_request(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }

    fn extract_text(body: &Value) -> Result<String, GeneratorError> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| GeneratorError::InvalidResponse("missing content array".to_string()))?;

        let text: Vec<&str> = blocks
            .iter()
            .filter(|b| b["type"].as_str() == Some("text"))
            .filter_map(|b| b["text"].as_str())
            .collect();

        if text.is_empty() {
            return Err(GeneratorError::InvalidResponse("no text blocks in response".to_string()));
        }
        Ok(text.join("\n"))
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .json(&self.build_request(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        Self::extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> HttpGenerator {
        HttpGenerator::with_api_key("test-key".to_string(), HttpGeneratorConfig::default()).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = HttpGeneratorConfig::default();
        assert_eq!(config.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.max_tokens, 4096);
    }

    #[test]
    fn test_build_request() {
        let body = generator().build_request("hello");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn test_extract_text_joins_blocks() {
        let body = json!({"content": [
            {"type": "text", "text": "{\"a\":"},
            {"type": "tool_use", "id": "x"},
            {"type": "text", "text": "1}"}
        ]});
        assert_eq!(HttpGenerator::extract_text(&body).unwrap(), "{\"a\":\n1}");
    }

    #[test]
    fn test_extract_text_errors() {
        assert!(HttpGenerator::extract_text(&json!({})).is_err());
        assert!(HttpGenerator::extract_text(&json!({"content": []})).is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let config = HttpGeneratorConfig {
            api_key_env: "DEUSFLOW_TEST_SURELY_UNSET_KEY".to_string(),
            ..Default::default()
        };
        let err = HttpGenerator::new(config).err().unwrap();
        assert!(matches!(err, GeneratorError::MissingApiKey { .. }));
    }
}
