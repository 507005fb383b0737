use crate::capability::TextToSpeech;
use crate::config::LocalVoiceConfig;
use crate::error::{ConstructError, VoiceError};
use crate::providers::subprocess::run_piped;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for TTS process execution.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Output rate of the medium-quality Piper voices.
const PIPER_SAMPLE_RATE: u32 = 22_050;

/// Offline text-to-speech through the Piper binary.
#[derive(Debug, Clone)]
pub struct PiperTts {
    binary: PathBuf,
    model: PathBuf,
    speed: f32,
}

impl PiperTts {
    /// Builds the provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConstructError::Config` when the binary or model is not
    /// configured, the model file is missing, or the speed is out of range.
    pub fn from_config(config: &LocalVoiceConfig) -> Result<Self, ConstructError> {
        if config.piper_binary.is_empty() || config.piper_model.is_empty() {
            return Err(ConstructError::Config(
                "piper_binary and piper_model must be set".to_string(),
            ));
        }

        let model = PathBuf::from(&config.piper_model);
        if !model.exists() {
            return Err(ConstructError::Config(format!(
                "Model file not found: {:?}",
                model
            )));
        }

        if !(0.1..=10.0).contains(&config.piper_speed) {
            return Err(ConstructError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }

        Ok(Self {
            binary: PathBuf::from(&config.piper_binary),
            model,
            speed: config.piper_speed,
        })
    }
}

#[async_trait]
impl TextToSpeech for PiperTts {
    fn sample_rate(&self) -> u32 {
        PIPER_SAMPLE_RATE
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let mut command = Command::new(&self.binary);
        command
            .arg("--model")
            .arg(&self.model)
            .arg("--output_raw")
            // Length scale is the inverse of speed.
            .arg("--length_scale")
            .arg((1.0 / self.speed).to_string());

        run_piped(command, text.as_bytes().to_vec(), TTS_TIMEOUT)
            .await
            .map_err(|e| VoiceError::Tts(format!("piper: {}", e)))
    }
}
