use crate::capability::LanguageModel;
use crate::config::AnthropicConfig;
use crate::error::{ConstructError, VoiceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Language model backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicLlm {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicLlm {
    /// # Errors
    ///
    /// Returns `ConstructError::MissingCredential` without an API key.
    pub fn from_config(config: &AnthropicConfig) -> Result<Self, ConstructError> {
        if config.api_key.is_empty() {
            return Err(ConstructError::MissingCredential(
                "ANTHROPIC_API_KEY".to_string(),
            ));
        }
        Ok(Self {
            http: super::http_client(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicLlm {
    fn model(&self) -> &str {
        &self.model
    }

    async fn respond(&self, instructions: &str, prompt: &str) -> Result<String, VoiceError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: instructions,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Llm(format!("{status}: {detail}")));
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }
}
