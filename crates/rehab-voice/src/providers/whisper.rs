use crate::capability::SpeechToText;
use crate::config::LocalVoiceConfig;
use crate::error::{ConstructError, VoiceError};
use crate::providers::subprocess::run_piped;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for STT process execution.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Offline speech-to-text through a whisper.cpp binary.
#[derive(Debug, Clone)]
pub struct WhisperStt {
    model_path: PathBuf,
    binary_path: PathBuf,
}

impl WhisperStt {
    pub fn new(model_path: impl Into<PathBuf>, binary_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
        }
    }

    /// Builds the provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConstructError::Config` when the binary or model is not
    /// configured, or the model file does not exist.
    pub fn from_config(config: &LocalVoiceConfig) -> Result<Self, ConstructError> {
        if config.whisper_binary.is_empty() || config.whisper_model.is_empty() {
            return Err(ConstructError::Config(
                "whisper_binary and whisper_model must be set".to_string(),
            ));
        }
        let stt = Self::new(&config.whisper_model, &config.whisper_binary);
        if !stt.model_path.exists() {
            return Err(ConstructError::Config(format!(
                "whisper model not found: {:?}",
                stt.model_path
            )));
        }
        Ok(stt)
    }
}

#[async_trait]
impl SpeechToText for WhisperStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        // -m <model>, -f - reads the WAV from stdin; the transcript is
        // printed to stdout.
        let mut command = Command::new(&self.binary_path);
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg("-")
            .arg("--no-timestamps");

        let stdout = run_piped(command, audio.to_vec(), STT_TIMEOUT)
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;

        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}
