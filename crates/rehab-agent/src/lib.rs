//! Coaching session lifecycle for the rehab agent.
//!
//! A session assembles its capabilities through the resolver, creates the
//! call, joins it as the agent, greets the patient and then serves patient
//! speech and camera frames until the call ends or an explicit finish. The
//! transport membership acquired at join is released exactly once on every
//! path that acquired it.

pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod turns;

pub use error::SessionError;
pub use orchestrator::{
    finish_signal, FinishHandle, FinishListener, SessionOrchestrator, SessionReport,
};
pub use pipeline::{AgentPipeline, ProviderSelection};
pub use turns::{media_channel, MediaReceiver, MediaSender, PatientMedia, TurnError, TurnOutcome};
