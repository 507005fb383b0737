use rehab_voice::{CallClient, LiveKitConfig, VoiceConfig};
use std::env;

const DEFAULT_URL: &str = "http://localhost:7880";
const DEFAULT_KEY: &str = "devkey";
const DEFAULT_SECRET: &str = "secret";

#[tokio::test]
async fn test_generate_join_token() {
    let config = LiveKitConfig::new(DEFAULT_URL, DEFAULT_KEY, DEFAULT_SECRET);
    let client = CallClient::new(config);

    let token = client
        .generate_join_token("rehab-room", "patient-001", "Patient")
        .expect("Failed to generate token");

    assert!(!token.is_empty());
}

#[tokio::test]
async fn test_create_room() {
    // Only meaningful when a LiveKit server is reachable.
    let url = env::var("LIVEKIT_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());

    let config = LiveKitConfig::new(&url, DEFAULT_KEY, DEFAULT_SECRET);
    let client = CallClient::new(config);

    match client.create_room("rehab-integration-room").await {
        Ok(room) => {
            assert_eq!(room.name, "rehab-integration-room");
        }
        Err(e) => {
            // Allow the test to pass without the LiveKit sidecar.
            eprintln!("Skipping room creation test: {:?}", e);
        }
    }
}

#[tokio::test]
async fn test_token_grants_and_identity() {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
    use serde::Deserialize;

    let config = LiveKitConfig::new(DEFAULT_URL, DEFAULT_KEY, DEFAULT_SECRET);
    let client = CallClient::new(config);

    let token = client
        .generate_join_token("knee-room", "rehab-ai-agent", "REHAB AI")
        .expect("Failed to generate token");

    #[derive(Deserialize)]
    struct Claims {
        sub: String,
        video: VideoClaims,
    }

    #[derive(Deserialize)]
    struct VideoClaims {
        #[serde(rename = "canPublish")]
        can_publish: bool,
        #[serde(rename = "canPublishData")]
        can_publish_data: bool,
        #[serde(rename = "roomJoin")]
        room_join: bool,
        room: String,
    }

    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(DEFAULT_SECRET.as_bytes());
    let token_data = decode::<Claims>(&token, &key, &validation).expect("Failed to decode token");

    assert_eq!(token_data.claims.sub, "rehab-ai-agent");
    assert_eq!(token_data.claims.video.room, "knee-room");
    assert!(token_data.claims.video.room_join, "roomJoin should be true");
    assert!(token_data.claims.video.can_publish, "canPublish should be true");
    assert!(
        token_data.claims.video.can_publish_data,
        "canPublishData should be true"
    );
}

#[test]
fn test_public_url_falls_back_to_internal() {
    let mut config = LiveKitConfig::new(DEFAULT_URL, DEFAULT_KEY, DEFAULT_SECRET);
    let client = CallClient::new(config.clone());
    assert_eq!(client.public_url(), DEFAULT_URL);

    config.public_url = "wss://calls.example.com".into();
    let client = CallClient::new(config);
    assert_eq!(client.public_url(), "wss://calls.example.com");
}

#[test]
fn test_voice_config_toml() {
    let toml_str = r#"
        [livekit]
        url = "ws://localhost:7880"
        api_key = "key"
        api_secret = "secret"
        poll_interval_ms = 500

        [anthropic]
        model = "claude-sonnet-4-5"

        [elevenlabs]
        voice_id = "custom-voice"

        [local]
        piper_binary = "/usr/local/bin/piper"
    "#;

    let config: VoiceConfig = toml::from_str(toml_str).expect("parse TOML");
    assert!(config.livekit.is_configured());
    assert_eq!(config.livekit.poll_interval_ms, 500);
    assert_eq!(config.livekit.token_ttl_seconds, 3600);
    assert_eq!(config.anthropic.model, "claude-sonnet-4-5");
    assert!(config.anthropic.api_key.is_empty());
    assert_eq!(config.elevenlabs.voice_id, "custom-voice");
    assert_eq!(config.elevenlabs.model_id, "eleven_turbo_v2_5");
    assert_eq!(config.deepgram.stt_model, "nova-2");
    assert_eq!(config.local.piper_binary, "/usr/local/bin/piper");
    assert_eq!(config.local.piper_speed, 1.0);
}

#[test]
fn test_empty_voice_config_uses_defaults() {
    let config: VoiceConfig = toml::from_str("").expect("parse TOML");
    assert!(!config.livekit.is_configured());
    assert_eq!(config.deepgram.tts_model, "aura-2-orion-en");
    assert_eq!(config.pose.device, "cpu");
}
