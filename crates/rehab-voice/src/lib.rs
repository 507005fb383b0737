//! Voice and call capabilities for the rehab coaching agent.
//!
//! The agent is assembled from pluggable capabilities: a call transport, a
//! language model, speech-to-text, text-to-speech and an optional pose
//! processor. Which concrete provider backs each capability is not known
//! until runtime (it depends on the credentials and binaries present), so
//! providers are declared in a static [`CapabilityRegistry`] and a
//! [`CapabilityResolver`] picks the first one that constructs.
//!
//! LiveKit is the call transport; hosted (Anthropic, Deepgram, ElevenLabs)
//! and local (whisper.cpp, Piper, YOLO pose) engines fill the other slots.

pub mod capability;
pub mod client;
pub mod config;
pub mod error;
pub mod providers;
pub mod registry;
pub mod resolver;

pub use capability::{
    AgentIdentity, AgentMedia, CallHandle, Capability, LanguageModel, Membership, SpeechToText,
    TextToSpeech, Transport, VisionProcessor,
};
pub use client::{CallClient, ClientHandle};
pub use config::{
    AnthropicConfig, DeepgramConfig, ElevenLabsConfig, LiveKitConfig, LocalVoiceConfig,
    PoseConfig, VoiceConfig,
};
pub use error::{ConstructError, VoiceError};
pub use providers::default_registry;
pub use registry::{CapabilityRegistry, ConstructArgs, ProviderDescriptor, RegistryBuilder};
pub use resolver::{
    CapabilityResolver, CapabilityUnavailable, ResolveAttempt, ResolveContext, ResolvedCapability,
};
