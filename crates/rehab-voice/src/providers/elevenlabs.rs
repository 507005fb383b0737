use crate::capability::TextToSpeech;
use crate::config::ElevenLabsConfig;
use crate::error::{ConstructError, VoiceError};
use async_trait::async_trait;

const ELEVENLABS_SAMPLE_RATE: u32 = 22_050;
const ELEVENLABS_OUTPUT_FORMAT: &str = "pcm_22050";

/// ElevenLabs text-to-speech (first choice for the agent's voice).
#[derive(Debug, Clone)]
pub struct ElevenLabsTts {
    http: reqwest::Client,
    api_key: String,
    voice_id: String,
    model_id: String,
    base_url: String,
}

impl ElevenLabsTts {
    /// # Errors
    ///
    /// Returns `ConstructError::MissingCredential` without an API key and
    /// `ConstructError::Config` without a voice id.
    pub fn from_config(config: &ElevenLabsConfig) -> Result<Self, ConstructError> {
        if config.api_key.is_empty() {
            return Err(ConstructError::MissingCredential(
                "ELEVENLABS_API_KEY".to_string(),
            ));
        }
        if config.voice_id.is_empty() {
            return Err(ConstructError::Config(
                "elevenlabs voice_id must be set".to_string(),
            ));
        }
        Ok(Self {
            http: super::http_client(),
            api_key: config.api_key.clone(),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    fn sample_rate(&self) -> u32 {
        ELEVENLABS_SAMPLE_RATE
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        let response = self
            .http
            .post(format!(
                "{}/v1/text-to-speech/{}",
                self.base_url, self.voice_id
            ))
            .query(&[("output_format", ELEVENLABS_OUTPUT_FORMAT)])
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.model_id,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("{status}: {detail}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
