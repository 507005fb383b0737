use thiserror::Error;

/// Runtime failures of a constructed capability.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("LiveKit API error: {0}")]
    LiveKit(#[from] livekit_api::access_token::AccessTokenError),

    #[error("Room service error: {0}")]
    RoomService(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("Vision error: {0}")]
    Vision(String),
}

/// Why one construction attempt for a provider failed.
///
/// Only [`ConstructError::WrongArity`] lets the resolver try the next
/// strategy of the same provider; every other variant moves on to the next
/// provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructError {
    /// The provider does not accept this constructor shape.
    #[error("wrong constructor shape: {0}")]
    WrongArity(String),

    /// A credential the provider needs is not configured.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// The provider's configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Any other construction failure.
    #[error("{0}")]
    Other(String),
}

impl ConstructError {
    /// Returns `true` if the next strategy of the same provider may succeed.
    pub fn is_wrong_arity(&self) -> bool {
        matches!(self, Self::WrongArity(_))
    }
}
