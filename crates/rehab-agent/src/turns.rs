//! Patient media forwarded into a running session.
//!
//! The patient's client hands recorded speech and camera frames to the
//! session through a [`MediaSender`]. The session takes them one at a time
//! while it monitors the call: speech is transcribed, answered by the
//! language model under the coaching instructions and spoken back; frames
//! go to the pose processor when one was resolved.

use rehab_voice::{AgentMedia, Membership, VoiceError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Pending media a session buffers before it stops accepting more.
const MEDIA_QUEUE_DEPTH: usize = 8;

/// Creates a connected media sender and receiver.
pub fn media_channel() -> (MediaSender, MediaReceiver) {
    let (tx, rx) = mpsc::channel(MEDIA_QUEUE_DEPTH);
    (MediaSender { tx }, MediaReceiver { rx })
}

/// One piece of patient media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientMedia {
    /// Recorded speech in a format the speech-to-text provider accepts.
    Speech(Vec<u8>),
    /// One encoded camera frame.
    Frame(Vec<u8>),
}

/// What the session did with one piece of media.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The patient spoke and the agent answered aloud.
    Reply { transcript: String, reply: String },
    /// The audio held no speech; nothing was said back.
    Silence,
    /// Keypoints detected in a frame.
    Pose { keypoints: serde_json::Value },
}

/// Why a piece of media produced no outcome. None of these end the session.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("the session is not accepting media")]
    SessionClosed,
    #[error("no pose processor is available for this session")]
    VisionUnavailable,
    #[error("transcription failed: {0}")]
    Transcription(VoiceError),
    #[error("language model failed: {0}")]
    Response(VoiceError),
    #[error("failed to speak the reply: {0}")]
    Delivery(VoiceError),
    #[error("pose processing failed: {0}")]
    Vision(VoiceError),
}

impl TurnError {
    /// Returns `true` when the failure came from a provider rather than the
    /// session's state.
    pub fn is_provider_failure(&self) -> bool {
        !matches!(self, Self::SessionClosed | Self::VisionUnavailable)
    }
}

#[derive(Debug)]
pub(crate) struct MediaRequest {
    pub(crate) media: PatientMedia,
    pub(crate) reply: oneshot::Sender<Result<TurnOutcome, TurnError>>,
}

/// Forwards patient media to one session.
#[derive(Debug, Clone)]
pub struct MediaSender {
    tx: mpsc::Sender<MediaRequest>,
}

impl MediaSender {
    /// Hands `media` to the session and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns `TurnError::SessionClosed` if the session ended before taking
    /// the media, otherwise the failure of the turn itself.
    pub async fn send(&self, media: PatientMedia) -> Result<TurnOutcome, TurnError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(MediaRequest { media, reply })
            .await
            .map_err(|_| TurnError::SessionClosed)?;
        outcome.await.map_err(|_| TurnError::SessionClosed)?
    }
}

/// The session side of a [`MediaSender`].
#[derive(Debug)]
pub struct MediaReceiver {
    rx: mpsc::Receiver<MediaRequest>,
}

impl MediaReceiver {
    pub(crate) async fn next(&mut self) -> Option<MediaRequest> {
        self.rx.recv().await
    }
}

/// Runs one turn against the session's capabilities.
pub(crate) async fn take_turn(
    media: &AgentMedia,
    membership: &dyn Membership,
    input: PatientMedia,
) -> Result<TurnOutcome, TurnError> {
    match input {
        PatientMedia::Speech(audio) => {
            let transcript = media
                .stt
                .transcribe(&audio)
                .await
                .map_err(TurnError::Transcription)?;
            if transcript.trim().is_empty() {
                return Ok(TurnOutcome::Silence);
            }
            let reply = media
                .llm
                .respond(&media.instructions, &transcript)
                .await
                .map_err(TurnError::Response)?;
            membership
                .send_utterance(&reply)
                .await
                .map_err(TurnError::Delivery)?;
            Ok(TurnOutcome::Reply { transcript, reply })
        }
        PatientMedia::Frame(frame) => {
            let vision = media.vision.as_ref().ok_or(TurnError::VisionUnavailable)?;
            let keypoints = vision
                .process_frame(&frame)
                .await
                .map_err(TurnError::Vision)?;
            Ok(TurnOutcome::Pose { keypoints })
        }
    }
}
