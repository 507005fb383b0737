use crate::config::LiveKitConfig;
use crate::error::VoiceError;
use livekit_api::access_token::{AccessToken, VideoGrants};
use livekit_api::services::room::{CreateRoomOptions, RoomClient, SendDataOptions};
use livekit_protocol::Room;
use std::sync::Arc;
use std::time::Duration;

/// Shared, pre-authenticated handle to the call service.
///
/// This is the "client" a transport provider receives under the
/// `WithClientArg` and `NoArgThenAssignClient` construction strategies.
pub type ClientHandle = Arc<CallClient>;

/// Server-side LiveKit client: room management and token minting.
#[derive(Debug)]
pub struct CallClient {
    config: LiveKitConfig,
    room_client: RoomClient,
}

impl CallClient {
    pub fn new(config: LiveKitConfig) -> Self {
        let room_client =
            RoomClient::with_api_key(&config.url, &config.api_key, &config.api_secret);
        Self {
            config,
            room_client,
        }
    }

    /// Wraps the client into a shareable [`ClientHandle`].
    pub fn into_handle(self) -> ClientHandle {
        Arc::new(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    pub fn config(&self) -> &LiveKitConfig {
        &self.config
    }

    /// Returns the browser-facing URL. Falls back to the internal URL if no
    /// public URL is configured.
    pub fn public_url(&self) -> &str {
        if self.config.public_url.is_empty() {
            &self.config.url
        } else {
            &self.config.public_url
        }
    }

    pub async fn create_room(&self, name: &str) -> Result<Room, VoiceError> {
        let options = CreateRoomOptions::default();

        self.room_client
            .create_room(name, options)
            .await
            .map_err(|e| VoiceError::RoomService(e.to_string()))
    }

    pub fn generate_join_token(
        &self,
        room_name: &str,
        participant_identity: &str,
        participant_name: &str,
    ) -> Result<String, VoiceError> {
        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(participant_identity)
            .with_name(participant_name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(Duration::from_secs(self.config.token_ttl_seconds));

        token.to_jwt().map_err(VoiceError::LiveKit)
    }

    /// Lists the identities of everyone currently in a room.
    ///
    /// Unlike a participant count, a failure here is reported: while a
    /// session is monitoring a call, a missing room means the call is gone.
    pub async fn participant_identities(&self, room: &str) -> Result<Vec<String>, VoiceError> {
        self.room_client
            .list_participants(room)
            .await
            .map(|participants| participants.into_iter().map(|p| p.identity).collect())
            .map_err(|e| VoiceError::RoomService(e.to_string()))
    }

    /// Publishes a reliable data packet on `topic` to every participant.
    pub async fn send_data(&self, room: &str, topic: &str, data: Vec<u8>) -> Result<(), VoiceError> {
        let options = SendDataOptions {
            topic: Some(topic.to_string()),
            ..Default::default()
        };
        self.room_client
            .send_data(room, data, options)
            .await
            .map_err(|e| VoiceError::RoomService(e.to_string()))
    }
}
