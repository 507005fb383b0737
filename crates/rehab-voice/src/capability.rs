//! Capability contracts the coaching agent is assembled from.
//!
//! Each provider in the registry produces one [`Capability`]. The transport
//! is the only capability the session orchestrator drives directly; the
//! others are opaque handles carried into the transport's join as
//! [`AgentMedia`].

use crate::client::ClientHandle;
use crate::error::{ConstructError, VoiceError};
use async_trait::async_trait;
use rehab_types::{CapabilityKind, SessionEnd};
use std::fmt;
use std::sync::Arc;

/// Identity the agent uses when it joins a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub id: String,
    pub name: String,
}

impl Default for AgentIdentity {
    fn default() -> Self {
        Self {
            id: "rehab-ai-agent".to_string(),
            name: "REHAB AI".to_string(),
        }
    }
}

/// A call created on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHandle {
    pub call_type: String,
    pub call_id: String,
    /// Transport-specific room name.
    pub room: String,
}

/// Everything a transport needs to act as the agent once joined.
#[derive(Clone)]
pub struct AgentMedia {
    pub agent: AgentIdentity,
    /// System instructions for the language model.
    pub instructions: String,
    pub llm: Arc<dyn LanguageModel>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub vision: Option<Arc<dyn VisionProcessor>>,
}

impl fmt::Debug for AgentMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentMedia")
            .field("agent", &self.agent)
            .field("llm", &self.llm.model())
            .field("vision", &self.vision.as_ref().map(|v| v.name().to_string()))
            .finish_non_exhaustive()
    }
}

fn no_client_slot(kind: CapabilityKind) -> ConstructError {
    ConstructError::WrongArity(format!("{kind} provider has no client slot"))
}

/// Video-call transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attaches the call-service client after a no-argument construction.
    fn assign_client(&mut self, _client: ClientHandle) -> Result<(), ConstructError> {
        Err(no_client_slot(CapabilityKind::Transport))
    }

    /// Creates (or reuses) the call identified by `call_type` and `call_id`.
    async fn create_call(&self, call_type: &str, call_id: &str) -> Result<CallHandle, VoiceError>;

    /// Joins the call as the agent. The returned membership must be released
    /// with [`Membership::leave`].
    async fn join(
        &self,
        call: &CallHandle,
        media: AgentMedia,
    ) -> Result<Box<dyn Membership>, VoiceError>;
}

/// The agent's presence in a joined call.
#[async_trait]
pub trait Membership: Send + Sync {
    /// Speaks `text` into the call.
    async fn send_utterance(&self, text: &str) -> Result<(), VoiceError>;

    /// Suspends until the call ends. Dropping the future stops waiting.
    async fn await_session_end(&self) -> Result<SessionEnd, VoiceError>;

    /// Leaves the call and releases transport resources.
    async fn leave(&self) -> Result<(), VoiceError>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn assign_client(&mut self, _client: ClientHandle) -> Result<(), ConstructError> {
        Err(no_client_slot(CapabilityKind::LanguageModel))
    }

    /// Model identifier, for diagnostics.
    fn model(&self) -> &str;

    /// Produces one reply to `prompt` under `instructions`.
    async fn respond(&self, instructions: &str, prompt: &str) -> Result<String, VoiceError>;
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn assign_client(&mut self, _client: ClientHandle) -> Result<(), ConstructError> {
        Err(no_client_slot(CapabilityKind::SpeechToText))
    }

    /// Transcribes an audio buffer to text.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    fn assign_client(&mut self, _client: ClientHandle) -> Result<(), ConstructError> {
        Err(no_client_slot(CapabilityKind::TextToSpeech))
    }

    /// Sample rate of the PCM produced by [`TextToSpeech::synthesize`].
    fn sample_rate(&self) -> u32;

    /// Renders `text` as raw PCM (s16le, mono).
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError>;
}

#[async_trait]
pub trait VisionProcessor: Send + Sync {
    fn assign_client(&mut self, _client: ClientHandle) -> Result<(), ConstructError> {
        Err(no_client_slot(CapabilityKind::VisionProcessor))
    }

    fn name(&self) -> &str;

    /// Runs the processor on one encoded video frame.
    async fn process_frame(&self, frame: &[u8]) -> Result<serde_json::Value, VoiceError>;
}

/// A constructed provider instance of some capability kind.
pub enum Capability {
    Transport(Box<dyn Transport>),
    LanguageModel(Box<dyn LanguageModel>),
    SpeechToText(Box<dyn SpeechToText>),
    TextToSpeech(Box<dyn TextToSpeech>),
    VisionProcessor(Box<dyn VisionProcessor>),
}

impl Capability {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Transport(_) => CapabilityKind::Transport,
            Self::LanguageModel(_) => CapabilityKind::LanguageModel,
            Self::SpeechToText(_) => CapabilityKind::SpeechToText,
            Self::TextToSpeech(_) => CapabilityKind::TextToSpeech,
            Self::VisionProcessor(_) => CapabilityKind::VisionProcessor,
        }
    }

    /// Assigns the client handle onto the instance (the second half of the
    /// `NoArgThenAssignClient` strategy).
    pub fn assign_client(&mut self, client: ClientHandle) -> Result<(), ConstructError> {
        match self {
            Self::Transport(inner) => inner.assign_client(client),
            Self::LanguageModel(inner) => inner.assign_client(client),
            Self::SpeechToText(inner) => inner.assign_client(client),
            Self::TextToSpeech(inner) => inner.assign_client(client),
            Self::VisionProcessor(inner) => inner.assign_client(client),
        }
    }

    pub fn into_transport(self) -> Option<Box<dyn Transport>> {
        match self {
            Self::Transport(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn into_language_model(self) -> Option<Box<dyn LanguageModel>> {
        match self {
            Self::LanguageModel(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn into_speech_to_text(self) -> Option<Box<dyn SpeechToText>> {
        match self {
            Self::SpeechToText(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn into_text_to_speech(self) -> Option<Box<dyn TextToSpeech>> {
        match self {
            Self::TextToSpeech(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn into_vision_processor(self) -> Option<Box<dyn VisionProcessor>> {
        match self {
            Self::VisionProcessor(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.kind()).finish()
    }
}
