//! LiveKit call transport.
//!
//! The agent acts server-side and never joins as a participant: rooms are
//! managed through the LiveKit Room Service, utterances are synthesised
//! locally and published to the room as data packets (a caption packet
//! followed by PCM chunks), and call end is detected by polling room
//! membership.

use crate::capability::{AgentMedia, CallHandle, Membership, Transport};
use crate::client::ClientHandle;
use crate::error::{ConstructError, VoiceError};
use async_trait::async_trait;
use rehab_types::SessionEnd;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Data topic carrying utterance captions.
pub const CAPTION_TOPIC: &str = "rehab.caption";

/// Data topic carrying synthesised PCM audio.
pub const AUDIO_TOPIC: &str = "rehab.audio";

/// Reliable data packets are capped at roughly 15 KiB by the SFU.
const AUDIO_CHUNK_BYTES: usize = 14 * 1024;

#[derive(Debug, Serialize)]
struct Caption<'a> {
    speaker: &'a str,
    text: &'a str,
    sample_rate: u32,
    audio_bytes: usize,
}

/// Transport that creates and joins LiveKit rooms.
#[derive(Debug, Default)]
pub struct LiveKitTransport {
    client: Option<ClientHandle>,
}

impl LiveKitTransport {
    pub fn new(client: Option<ClientHandle>) -> Self {
        Self { client }
    }

    /// # Errors
    ///
    /// Returns `ConstructError::MissingCredential` if the client carries no
    /// LiveKit credentials.
    pub fn with_client(client: ClientHandle) -> Result<Self, ConstructError> {
        check_client(&client)?;
        Ok(Self::new(Some(client)))
    }

    fn client(&self) -> Result<&ClientHandle, VoiceError> {
        self.client
            .as_ref()
            .ok_or_else(|| VoiceError::Config("transport has no call client".to_string()))
    }
}

fn check_client(client: &ClientHandle) -> Result<(), ConstructError> {
    if client.is_enabled() {
        Ok(())
    } else {
        Err(ConstructError::MissingCredential(
            "LIVEKIT_URL / LIVEKIT_API_KEY / LIVEKIT_API_SECRET".to_string(),
        ))
    }
}

#[async_trait]
impl Transport for LiveKitTransport {
    fn assign_client(&mut self, client: ClientHandle) -> Result<(), ConstructError> {
        check_client(&client)?;
        self.client = Some(client);
        Ok(())
    }

    async fn create_call(&self, call_type: &str, call_id: &str) -> Result<CallHandle, VoiceError> {
        let client = self.client()?;
        // The patient's client joins the room named after the call id.
        let room = client.create_room(call_id).await?;
        info!(room = %room.name, call_type, "call room ready");

        Ok(CallHandle {
            call_type: call_type.to_string(),
            call_id: call_id.to_string(),
            room: room.name,
        })
    }

    async fn join(
        &self,
        call: &CallHandle,
        media: AgentMedia,
    ) -> Result<Box<dyn Membership>, VoiceError> {
        let client = self.client()?.clone();
        // Fails if the room is gone before the session starts.
        let present = client.participant_identities(&call.room).await?;
        info!(
            room = %call.room,
            agent = %media.agent.id,
            participants = present.len(),
            "agent attached to room (server-side)"
        );

        let config = client.config();
        let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
        let remote_grace = Duration::from_secs(config.remote_grace_seconds);

        Ok(Box::new(LiveKitMembership {
            client,
            room: call.room.clone(),
            media,
            poll_interval,
            remote_grace,
        }))
    }
}

/// The agent's presence in one LiveKit room.
///
/// Membership is server-side only: the agent never connects as a room
/// participant. It speaks through data packets and observes the room
/// through the Room Service, so leaving releases nothing on the SFU.
pub struct LiveKitMembership {
    client: ClientHandle,
    room: String,
    media: AgentMedia,
    poll_interval: Duration,
    remote_grace: Duration,
}

#[async_trait]
impl Membership for LiveKitMembership {
    async fn send_utterance(&self, text: &str) -> Result<(), VoiceError> {
        let audio = self.media.tts.synthesize(text).await?;

        let caption = Caption {
            speaker: &self.media.agent.id,
            text,
            sample_rate: self.media.tts.sample_rate(),
            audio_bytes: audio.len(),
        };
        let payload = serde_json::to_vec(&caption)
            .map_err(|e| VoiceError::RoomService(format!("failed to encode caption: {}", e)))?;
        self.client.send_data(&self.room, CAPTION_TOPIC, payload).await?;

        for chunk in audio.chunks(AUDIO_CHUNK_BYTES) {
            self.client
                .send_data(&self.room, AUDIO_TOPIC, chunk.to_vec())
                .await?;
        }

        debug!(room = %self.room, bytes = audio.len(), "published utterance");
        Ok(())
    }

    async fn await_session_end(&self) -> Result<SessionEnd, VoiceError> {
        let started = Instant::now();
        let mut presence = PresenceTracker::new(&self.media.agent.id, self.remote_grace);

        loop {
            tokio::time::sleep(self.poll_interval).await;
            let identities = self.client.participant_identities(&self.room).await?;
            if let Some(end) = presence.observe(&identities, started.elapsed()) {
                info!(room = %self.room, ?end, "call ended");
                return Ok(end);
            }
        }
    }

    async fn leave(&self) -> Result<(), VoiceError> {
        info!(room = %self.room, agent = %self.media.agent.id, "agent detached from room");
        Ok(())
    }
}

/// Decides when a polled room counts as ended.
///
/// Once any remote participant has been seen, an empty room means the remote
/// side hung up. If nobody shows up within the grace period the session is
/// interrupted.
#[derive(Debug)]
pub(crate) struct PresenceTracker<'a> {
    agent_id: &'a str,
    grace: Duration,
    seen_remote: bool,
}

impl<'a> PresenceTracker<'a> {
    pub(crate) fn new(agent_id: &'a str, grace: Duration) -> Self {
        Self {
            agent_id,
            grace,
            seen_remote: false,
        }
    }

    pub(crate) fn observe(&mut self, identities: &[String], elapsed: Duration) -> Option<SessionEnd> {
        let remote = identities.iter().filter(|id| *id != self.agent_id).count();
        if remote > 0 {
            self.seen_remote = true;
            None
        } else if self.seen_remote {
            Some(SessionEnd::EndedByRemote)
        } else if elapsed >= self.grace {
            Some(SessionEnd::Interrupted)
        } else {
            None
        }
    }
}
