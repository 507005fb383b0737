use rehab_types::InvalidStartRequest;
use rehab_voice::CapabilityUnavailable;
use thiserror::Error;

/// Terminal failure of a coaching session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid start request: {0}")]
    InvalidRequest(#[from] InvalidStartRequest),

    #[error(transparent)]
    CapabilityUnavailable(#[from] CapabilityUnavailable),

    #[error("failed to create call {call_id}: {reason}")]
    CallCreationFailed { call_id: String, reason: String },

    #[error("failed to join call {call_id}: {reason}")]
    JoinFailed { call_id: String, reason: String },

    /// The transport failed after the agent joined the call.
    #[error("transport failed during {stage} on call {call_id}: {reason}")]
    Transport {
        call_id: String,
        stage: &'static str,
        reason: String,
    },
}

impl SessionError {
    /// Stable label used when recording the failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::CapabilityUnavailable(_) => "capability_unavailable",
            Self::CallCreationFailed { .. } => "call_creation_failed",
            Self::JoinFailed { .. } => "join_failed",
            Self::Transport { .. } => "transport",
        }
    }
}
