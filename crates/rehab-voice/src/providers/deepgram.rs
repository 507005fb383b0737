use crate::capability::{SpeechToText, TextToSpeech};
use crate::config::DeepgramConfig;
use crate::error::{ConstructError, VoiceError};
use async_trait::async_trait;
use serde::Deserialize;

/// Sample rate requested from the Aura voices.
const AURA_SAMPLE_RATE: u32 = 24_000;

fn credentials(config: &DeepgramConfig) -> Result<(String, String), ConstructError> {
    if config.api_key.is_empty() {
        return Err(ConstructError::MissingCredential(
            "DEEPGRAM_API_KEY".to_string(),
        ));
    }
    Ok((
        config.api_key.clone(),
        config.base_url.trim_end_matches('/').to_string(),
    ))
}

/// Pre-recorded transcription through Deepgram `/v1/listen`.
#[derive(Debug, Clone)]
pub struct DeepgramStt {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    #[serde(default)]
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    transcript: String,
}

impl ListenResponse {
    fn best_transcript(self) -> String {
        self.results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default()
    }
}

impl DeepgramStt {
    /// # Errors
    ///
    /// Returns `ConstructError::MissingCredential` without an API key.
    pub fn from_config(config: &DeepgramConfig) -> Result<Self, ConstructError> {
        let (api_key, base_url) = credentials(config)?;
        Ok(Self {
            http: super::http_client(),
            api_key,
            model: config.stt_model.clone(),
            base_url,
        })
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        let response = self
            .http
            .post(format!("{}/v1/listen", self.base_url))
            .query(&[("model", self.model.as_str()), ("smart_format", "true")])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("{status}: {detail}")));
        }

        let parsed: ListenResponse = response.json().await?;
        Ok(parsed.best_transcript())
    }
}

/// Aura text-to-speech through Deepgram `/v1/speak`.
#[derive(Debug, Clone)]
pub struct DeepgramTts {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl DeepgramTts {
    /// # Errors
    ///
    /// Returns `ConstructError::MissingCredential` without an API key.
    pub fn from_config(config: &DeepgramConfig) -> Result<Self, ConstructError> {
        let (api_key, base_url) = credentials(config)?;
        Ok(Self {
            http: super::http_client(),
            api_key,
            model: config.tts_model.clone(),
            base_url,
        })
    }
}

#[async_trait]
impl TextToSpeech for DeepgramTts {
    fn sample_rate(&self) -> u32 {
        AURA_SAMPLE_RATE
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        let sample_rate = AURA_SAMPLE_RATE.to_string();
        let response = self
            .http
            .post(format!("{}/v1/speak", self.base_url))
            .query(&[
                ("model", self.model.as_str()),
                ("encoding", "linear16"),
                ("container", "none"),
                ("sample_rate", sample_rate.as_str()),
            ])
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&serde_json::json!({ "text": text }))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_directions_require_api_key() {
        let config = DeepgramConfig::default();
        assert!(matches!(
            DeepgramStt::from_config(&config),
            Err(ConstructError::MissingCredential(_))
        ));
        assert!(matches!(
            DeepgramTts::from_config(&config),
            Err(ConstructError::MissingCredential(_))
        ));
    }

    #[test]
    fn picks_first_alternative_of_first_channel() {
        let parsed: ListenResponse = serde_json::from_str(
            r#"{"results":{"channels":[{"alternatives":[{"transcript":"left knee"},{"transcript":"lift me"}]}]}}"#,
        )
        .unwrap();
        assert_eq!(parsed.best_transcript(), "left knee");

        let empty: ListenResponse = serde_json::from_str(r#"{"results":{"channels":[]}}"#).unwrap();
        assert_eq!(empty.best_transcript(), "");
    }
}
