//! Server configuration loading from file and environment variables.

use rehab_voice::{AgentIdentity, VoiceConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Coaching agent settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Call transport and media provider settings.
    #[serde(default)]
    pub voice: VoiceConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "rehab_agent=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Coaching agent configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Participant identity the agent joins calls with.
    #[serde(default = "default_agent_id")]
    pub id: String,

    /// Display name shown to the patient.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Delay between accepting a start request and starting the session,
    /// giving the patient time to join the call first.
    #[serde(default = "default_launch_delay_ms")]
    pub launch_delay_ms: u64,

    /// Number of finished sessions returned by the history listing.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// How long shutdown waits for live sessions to leave their calls.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl AgentConfig {
    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    "rehab.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_agent_id() -> String {
    AgentIdentity::default().id
}

fn default_agent_name() -> String {
    AgentIdentity::default().name
}

fn default_launch_delay_ms() -> u64 {
    4_000
}

fn default_history_limit() -> u32 {
    50
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            name: default_agent_name(),
            launch_delay_ms: default_launch_delay_ms(),
            history_limit: default_history_limit(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides (see [`apply_env_overrides`]).
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies environment overrides through `lookup`.
///
/// - `REHAB_HOST`, `REHAB_PORT` override `server.*`
/// - `REHAB_DB_PATH` overrides `database.path`
/// - `REHAB_LOG_LEVEL`, `REHAB_LOG_JSON` ("true" or "1") override `logging.*`
/// - `REHAB_AGENT_ID`, `REHAB_AGENT_NAME`, `REHAB_LAUNCH_DELAY_MS` override `agent.*`
/// - `LIVEKIT_URL`, `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET` override `voice.livekit.*`
/// - `ANTHROPIC_API_KEY`, `ANTHROPIC_MODEL` override `voice.anthropic.*`
/// - `DEEPGRAM_API_KEY`, `DEEPGRAM_MODEL`, `DEEPGRAM_TTS_MODEL` override `voice.deepgram.*`
/// - `ELEVENLABS_API_KEY`, `ELEVENLABS_VOICE_ID`, `ELEVENLABS_MODEL_ID` override
///   `voice.elevenlabs.*`
///
/// Unparseable numeric or address values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(parsed) = lookup("REHAB_HOST").and_then(|v| v.parse().ok()) {
        config.server.host = parsed;
    }
    if let Some(parsed) = lookup("REHAB_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = parsed;
    }
    if let Some(db_path) = lookup("REHAB_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = lookup("REHAB_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("REHAB_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(id) = lookup("REHAB_AGENT_ID") {
        config.agent.id = id;
    }
    if let Some(name) = lookup("REHAB_AGENT_NAME") {
        config.agent.name = name;
    }
    if let Some(parsed) = lookup("REHAB_LAUNCH_DELAY_MS").and_then(|v| v.parse().ok()) {
        config.agent.launch_delay_ms = parsed;
    }
    if let Some(parsed) = lookup("REHAB_SHUTDOWN_GRACE_MS").and_then(|v| v.parse().ok()) {
        config.agent.shutdown_grace_ms = parsed;
    }

    let voice = &mut config.voice;
    let overrides: [(&str, &mut String); 11] = [
        ("LIVEKIT_URL", &mut voice.livekit.url),
        ("LIVEKIT_API_KEY", &mut voice.livekit.api_key),
        ("LIVEKIT_API_SECRET", &mut voice.livekit.api_secret),
        ("ANTHROPIC_API_KEY", &mut voice.anthropic.api_key),
        ("ANTHROPIC_MODEL", &mut voice.anthropic.model),
        ("DEEPGRAM_API_KEY", &mut voice.deepgram.api_key),
        ("DEEPGRAM_MODEL", &mut voice.deepgram.stt_model),
        ("DEEPGRAM_TTS_MODEL", &mut voice.deepgram.tts_model),
        ("ELEVENLABS_API_KEY", &mut voice.elevenlabs.api_key),
        ("ELEVENLABS_VOICE_ID", &mut voice.elevenlabs.voice_id),
        ("ELEVENLABS_MODEL_ID", &mut voice.elevenlabs.model_id),
    ];
    for (key, field) in overrides {
        if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
            *field = value;
        }
    }
}
