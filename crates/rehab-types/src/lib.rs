//! Shared types and constants for the rehab coaching agent.
//!
//! This crate provides the vocabulary used across the workspace: the
//! capability kinds an agent is assembled from, the constructor strategies a
//! provider can declare, the lifecycle states of a coaching session, and the
//! exercise catalogue used to build greetings and coaching instructions.
//!
//! It has no runtime dependencies beyond `serde` and `thiserror`, so every
//! other crate can depend on it without pulling in I/O.

pub mod exercise;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use exercise::{coaching_instructions, display_name, greeting, is_supported};

/// Call type used when a start request does not specify one.
pub const DEFAULT_CALL_TYPE: &str = "default";

/// Exercise identifier used when a start request does not specify one.
pub const DEFAULT_EXERCISE: &str = "general";

/// An abstract capability an agent needs to run a coaching session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// The video-call transport (create call, join, speak, observe call end).
    Transport,
    /// The large language model backing the agent's replies.
    LanguageModel,
    /// Speech-to-text for the patient's voice.
    SpeechToText,
    /// Text-to-speech for the agent's voice.
    TextToSpeech,
    /// Optional pose-estimation processor for the video feed.
    VisionProcessor,
}

impl CapabilityKind {
    /// Capabilities that must resolve before a session may join a call, in
    /// resolution order.
    pub const MANDATORY: [CapabilityKind; 4] = [
        CapabilityKind::Transport,
        CapabilityKind::LanguageModel,
        CapabilityKind::SpeechToText,
        CapabilityKind::TextToSpeech,
    ];

    /// Returns `true` if a session cannot proceed without this capability.
    pub fn is_mandatory(self) -> bool {
        !matches!(self, Self::VisionProcessor)
    }

    /// Returns the string label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::LanguageModel => "language_model",
            Self::SpeechToText => "speech_to_text",
            Self::TextToSpeech => "text_to_speech",
            Self::VisionProcessor => "vision_processor",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider expects to be constructed.
///
/// A provider descriptor lists one or more strategies; the resolver tries
/// them in order and falls through on wrong-arity failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructionStrategy {
    /// Construct passing the pre-authenticated client handle.
    WithClientArg,
    /// Construct without arguments, then assign the client handle.
    NoArgThenAssignClient,
    /// Construct without arguments and without a client handle.
    NoArgPlain,
}

impl ConstructionStrategy {
    /// Returns the string label for this strategy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WithClientArg => "with_client_arg",
            Self::NoArgThenAssignClient => "no_arg_then_assign_client",
            Self::NoArgPlain => "no_arg_plain",
        }
    }

    /// Returns `true` if the strategy needs a client handle in the context.
    pub fn needs_client(self) -> bool {
        !matches!(self, Self::NoArgPlain)
    }
}

impl fmt::Display for ConstructionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the monitor phase of a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    /// The remote side ended the call.
    EndedByRemote,
    /// An explicit finish was requested through the session's finish handle.
    FinishRequested,
    /// The call ended unexpectedly (e.g. the patient never showed up).
    Interrupted,
}

impl SessionEnd {
    /// Returns `true` for an unexpected end.
    pub fn is_interruption(self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Lifecycle state of a coaching session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Assembled,
    CallCreated,
    Joined,
    GreetingSent,
    Finishing,
    /// Terminal: the session ran to completion. `interrupted` is set when the
    /// call ended unexpectedly rather than by the remote side or a finish.
    Completed { interrupted: bool },
    /// Terminal: the session failed.
    Failed,
}

impl SessionState {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed)
    }

    /// Returns the string label for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Assembled => "assembled",
            Self::CallCreated => "call_created",
            Self::Joined => "joined",
            Self::GreetingSent => "greeting_sent",
            Self::Finishing => "finishing",
            Self::Completed { .. } => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a state label cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown session state: {0}")]
pub struct UnknownSessionState(pub String);

impl FromStr for SessionState {
    type Err = UnknownSessionState;

    /// Parses a label produced by [`SessionState::as_str`]. `completed`
    /// parses as an uninterrupted completion.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "assembled" => Ok(Self::Assembled),
            "call_created" => Ok(Self::CallCreated),
            "joined" => Ok(Self::Joined),
            "greeting_sent" => Ok(Self::GreetingSent),
            "finishing" => Ok(Self::Finishing),
            "completed" => Ok(Self::Completed { interrupted: false }),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownSessionState(other.to_string())),
        }
    }
}

fn default_call_type() -> String {
    DEFAULT_CALL_TYPE.to_string()
}

fn default_exercise() -> String {
    DEFAULT_EXERCISE.to_string()
}

/// A request to start one coaching session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Opaque call identifier shared with the patient's client.
    pub call_id: String,
    /// Call-type tag understood by the transport.
    #[serde(default = "default_call_type")]
    pub call_type: String,
    /// Exercise identifier selecting the coaching protocol.
    #[serde(default = "default_exercise")]
    pub exercise: String,
}

impl StartRequest {
    /// Creates a request with the default call type and exercise.
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            call_type: default_call_type(),
            exercise: default_exercise(),
        }
    }

    /// Sets the exercise identifier.
    pub fn with_exercise(mut self, exercise: impl Into<String>) -> Self {
        self.exercise = exercise.into();
        self
    }

    /// Sets the call-type tag.
    pub fn with_call_type(mut self, call_type: impl Into<String>) -> Self {
        self.call_type = call_type.into();
        self
    }

    /// Checks the request and fills blank optional fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStartRequest` if the call id is empty or whitespace.
    pub fn normalized(mut self) -> Result<Self, InvalidStartRequest> {
        self.call_id = self.call_id.trim().to_string();
        if self.call_id.is_empty() {
            return Err(InvalidStartRequest::EmptyCallId);
        }
        if self.call_type.trim().is_empty() {
            self.call_type = default_call_type();
        }
        if self.exercise.trim().is_empty() {
            self.exercise = default_exercise();
        }
        Ok(self)
    }
}

/// Validation failures for a [`StartRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidStartRequest {
    #[error("call_id must not be empty")]
    EmptyCallId,
}
