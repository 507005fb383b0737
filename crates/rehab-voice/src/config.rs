use serde::{Deserialize, Serialize};
use std::fmt;

const REDACTED: &str = "[REDACTED]";

fn default_token_ttl_seconds() -> u64 {
    3600
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_remote_grace_seconds() -> u64 {
    120
}

fn default_anthropic_model() -> String {
    "claude-haiku-4-5".to_string()
}

fn default_anthropic_max_tokens() -> u32 {
    300
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_deepgram_stt_model() -> String {
    "nova-2".to_string()
}

fn default_deepgram_tts_model() -> String {
    "aura-2-orion-en".to_string()
}

fn default_deepgram_base_url() -> String {
    "https://api.deepgram.com".to_string()
}

fn default_elevenlabs_voice_id() -> String {
    "onwK4e9ZLuTAKqWW03F9".to_string()
}

fn default_elevenlabs_model_id() -> String {
    "eleven_turbo_v2_5".to_string()
}

fn default_elevenlabs_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_piper_speed() -> f32 {
    1.0
}

fn default_pose_model_path() -> String {
    "yolo11n-pose.pt".to_string()
}

fn default_pose_device() -> String {
    "cpu".to_string()
}

fn default_pose_conf_threshold() -> f32 {
    0.5
}

/// All provider settings, grouped per vendor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub livekit: LiveKitConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub deepgram: DeepgramConfig,
    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,
    #[serde(default)]
    pub local: LocalVoiceConfig,
    #[serde(default)]
    pub pose: PoseConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    #[serde(default)]
    pub url: String,
    /// Browser-facing URL handed to patients. Falls back to `url` when empty.
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for LiveKit join tokens. Default: 3600 (1 hour).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    /// How often the agent polls room participants while monitoring a call.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long the agent waits for a patient before treating the call as
    /// interrupted.
    #[serde(default = "default_remote_grace_seconds")]
    pub remote_grace_seconds: u64,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            public_url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
            remote_grace_seconds: default_remote_grace_seconds(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("public_url", &self.public_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &REDACTED)
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("remote_grace_seconds", &self.remote_grace_seconds)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }

    /// Returns `true` when URL, key and secret are all present.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default = "default_anthropic_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_anthropic_model(),
            max_tokens: default_anthropic_max_tokens(),
            base_url: default_anthropic_base_url(),
        }
    }
}

impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &REDACTED)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DeepgramConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_deepgram_stt_model")]
    pub stt_model: String,
    #[serde(default = "default_deepgram_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_deepgram_base_url")]
    pub base_url: String,
}

impl Default for DeepgramConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            stt_model: default_deepgram_stt_model(),
            tts_model: default_deepgram_tts_model(),
            base_url: default_deepgram_base_url(),
        }
    }
}

impl fmt::Debug for DeepgramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepgramConfig")
            .field("api_key", &REDACTED)
            .field("stt_model", &self.stt_model)
            .field("tts_model", &self.tts_model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_elevenlabs_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_elevenlabs_model_id")]
    pub model_id: String,
    #[serde(default = "default_elevenlabs_base_url")]
    pub base_url: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: default_elevenlabs_voice_id(),
            model_id: default_elevenlabs_model_id(),
            base_url: default_elevenlabs_base_url(),
        }
    }
}

impl fmt::Debug for ElevenLabsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevenLabsConfig")
            .field("api_key", &REDACTED)
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Offline fallbacks: whisper.cpp for STT and Piper for TTS.
///
/// Empty paths mean "not installed"; the matching provider then refuses to
/// construct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalVoiceConfig {
    #[serde(default)]
    pub whisper_binary: String,
    #[serde(default)]
    pub whisper_model: String,
    #[serde(default)]
    pub piper_binary: String,
    #[serde(default)]
    pub piper_model: String,
    /// Speech speed multiplier (1.0 is normal).
    #[serde(default = "default_piper_speed")]
    pub piper_speed: f32,
}

impl Default for LocalVoiceConfig {
    fn default() -> Self {
        Self {
            whisper_binary: String::new(),
            whisper_model: String::new(),
            piper_binary: String::new(),
            piper_model: String::new(),
            piper_speed: default_piper_speed(),
        }
    }
}

/// Pose-estimation processor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseConfig {
    /// Wrapper executable that reads one frame on stdin and prints keypoints
    /// as JSON. Empty disables the processor.
    #[serde(default)]
    pub binary: String,
    #[serde(default = "default_pose_model_path")]
    pub model_path: String,
    #[serde(default = "default_pose_device")]
    pub device: String,
    #[serde(default = "default_pose_conf_threshold")]
    pub conf_threshold: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            binary: String::new(),
            model_path: default_pose_model_path(),
            device: default_pose_device(),
            conf_threshold: default_pose_conf_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = VoiceConfig::default();
        config.livekit = LiveKitConfig::new("ws://localhost:7880", "key", "very-secret");
        config.anthropic.api_key = "sk-ant-secret".into();
        config.deepgram.api_key = "dg-secret".into();
        config.elevenlabs.api_key = "el-secret".into();

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("sk-ant-secret"));
        assert!(!rendered.contains("dg-secret"));
        assert!(!rendered.contains("el-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn livekit_configured_needs_all_three() {
        assert!(!LiveKitConfig::default().is_configured());
        assert!(!LiveKitConfig::new("ws://x", "key", "").is_configured());
        assert!(LiveKitConfig::new("ws://x", "key", "secret").is_configured());
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut config = AnthropicConfig::default();
        config.api_key = "sk-ant-secret".into();
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("api_key").is_none());
        assert_eq!(json["model"], "claude-haiku-4-5");
    }
}
