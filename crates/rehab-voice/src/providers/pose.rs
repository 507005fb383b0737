use crate::capability::VisionProcessor;
use crate::config::PoseConfig;
use crate::error::{ConstructError, VoiceError};
use crate::providers::subprocess::run_piped;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Maximum encoded frame size (8 MiB).
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// A single frame must be processed well within a coaching beat.
const POSE_TIMEOUT: Duration = Duration::from_secs(10);

/// YOLO pose estimation through a wrapper executable.
///
/// The wrapper reads one encoded frame on stdin and prints the detected
/// keypoints as a JSON document on stdout.
#[derive(Debug, Clone)]
pub struct YoloPoseProcessor {
    binary: PathBuf,
    model_path: PathBuf,
    device: String,
    conf_threshold: f32,
}

impl YoloPoseProcessor {
    /// # Errors
    ///
    /// Returns `ConstructError::Config` if no wrapper binary is configured,
    /// the model file is missing, or the confidence threshold is not within
    /// `0.0..=1.0`.
    pub fn from_config(config: &PoseConfig) -> Result<Self, ConstructError> {
        if config.binary.is_empty() {
            return Err(ConstructError::Config(
                "pose processor binary is not configured".to_string(),
            ));
        }
        let model_path = PathBuf::from(&config.model_path);
        if !model_path.exists() {
            return Err(ConstructError::Config(format!(
                "pose model not found: {:?}",
                model_path
            )));
        }
        if !(0.0..=1.0).contains(&config.conf_threshold) {
            return Err(ConstructError::Config(format!(
                "conf_threshold must be within 0.0..=1.0, got {}",
                config.conf_threshold
            )));
        }
        Ok(Self {
            binary: PathBuf::from(&config.binary),
            model_path,
            device: config.device.clone(),
            conf_threshold: config.conf_threshold,
        })
    }
}

#[async_trait]
impl VisionProcessor for YoloPoseProcessor {
    fn name(&self) -> &str {
        "yolo-pose"
    }

    async fn process_frame(&self, frame: &[u8]) -> Result<serde_json::Value, VoiceError> {
        if frame.len() > MAX_FRAME_BYTES {
            return Err(VoiceError::Vision(format!(
                "frame exceeds maximum size: {} bytes (limit: {} bytes)",
                frame.len(),
                MAX_FRAME_BYTES
            )));
        }

        let mut command = Command::new(&self.binary);
        command
            .arg("--model")
            .arg(&self.model_path)
            .arg("--device")
            .arg(&self.device)
            .arg("--conf")
            .arg(self.conf_threshold.to_string());

        let stdout = run_piped(command, frame.to_vec(), POSE_TIMEOUT)
            .await
            .map_err(|e| VoiceError::Vision(format!("pose processor: {}", e)))?;

        serde_json::from_slice(&stdout)
            .map_err(|e| VoiceError::Vision(format!("invalid keypoint output: {}", e)))
    }
}
