use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rehab_server::config::Config;
use rehab_server::sessions::SessionManager;
use rehab_server::{app, AppState};
use rehab_types::{CapabilityKind, ConstructionStrategy, SessionEnd, SessionState};
use rehab_voice::{
    AgentMedia, CallHandle, Capability, CapabilityRegistry, ConstructError, LanguageModel,
    Membership, ProviderDescriptor, SpeechToText, TextToSpeech, Transport, VoiceError,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use ConstructionStrategy::{NoArgPlain, WithClientArg};

/// A call that stays open until the session is told to finish.
#[derive(Clone, Default)]
struct OpenCall {
    leaves: Arc<AtomicUsize>,
    spoken: Arc<Mutex<Vec<String>>>,
    panic_on_greeting: bool,
}

impl OpenCall {
    fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for OpenCall {
    async fn create_call(&self, call_type: &str, call_id: &str) -> Result<CallHandle, VoiceError> {
        Ok(CallHandle {
            call_type: call_type.to_string(),
            call_id: call_id.to_string(),
            room: call_id.to_string(),
        })
    }

    async fn join(
        &self,
        _call: &CallHandle,
        _media: AgentMedia,
    ) -> Result<Box<dyn Membership>, VoiceError> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Membership for OpenCall {
    async fn send_utterance(&self, text: &str) -> Result<(), VoiceError> {
        if self.panic_on_greeting {
            panic!("voice engine aborted");
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn await_session_end(&self) -> Result<SessionEnd, VoiceError> {
        std::future::pending().await
    }

    async fn leave(&self) -> Result<(), VoiceError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

const COACH_REPLY: &str = "Good. Keep going.";

struct SteadyLlm;

#[async_trait]
impl LanguageModel for SteadyLlm {
    fn model(&self) -> &str {
        "steady"
    }

    async fn respond(&self, _instructions: &str, _prompt: &str) -> Result<String, VoiceError> {
        Ok(COACH_REPLY.to_string())
    }
}

/// Treats the audio bytes as the transcript.
struct TextStt;

#[async_trait]
impl SpeechToText for TextStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        Ok(String::from_utf8_lossy(audio).trim().to_string())
    }
}

struct QuietTts;

#[async_trait]
impl TextToSpeech for QuietTts {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, VoiceError> {
        Ok(Vec::new())
    }
}

fn mock_registry(call: OpenCall) -> CapabilityRegistry {
    CapabilityRegistry::builder()
        .provider(
            CapabilityKind::Transport,
            ProviderDescriptor::new("open-call", [WithClientArg, NoArgPlain], move |args| {
                if args.client().is_none() {
                    return Err(ConstructError::WrongArity("client required".into()));
                }
                Ok(Capability::Transport(Box::new(call.clone())))
            }),
        )
        .provider(
            CapabilityKind::LanguageModel,
            ProviderDescriptor::new("steady-llm", [NoArgPlain], |_| {
                Ok(Capability::LanguageModel(Box::new(SteadyLlm)))
            }),
        )
        .provider(
            CapabilityKind::SpeechToText,
            ProviderDescriptor::new("text-stt", [NoArgPlain], |_| {
                Ok(Capability::SpeechToText(Box::new(TextStt)))
            }),
        )
        .provider(
            CapabilityKind::TextToSpeech,
            ProviderDescriptor::new("quiet-tts", [NoArgPlain], |_| {
                Ok(Capability::TextToSpeech(Box::new(QuietTts)))
            }),
        )
        .build()
}

fn config(dir: &TempDir, livekit: bool, launch_delay_ms: u64) -> Config {
    let mut config = Config::default();
    config.database.path = dir
        .path()
        .join("rehab.db")
        .to_string_lossy()
        .into_owned();
    config.agent.launch_delay_ms = launch_delay_ms;
    if livekit {
        config.voice.livekit.url = "ws://livekit.internal:7880".to_string();
        config.voice.livekit.public_url = "wss://calls.example.test".to_string();
        config.voice.livekit.api_key = "devkey".to_string();
        config.voice.livekit.api_secret = "a-test-secret-that-is-long-enough".to_string();
    }
    config
}

fn state(config: Config, call: OpenCall) -> AppState {
    let pool = rehab_db::create_pool(
        &config.database.path,
        rehab_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .unwrap();
    rehab_db::run_migrations(&pool.get().unwrap()).unwrap();
    AppState::with_registry(config, pool, mock_registry(call))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_bytes(uri: &str, body: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/octet-stream")
        .body(Body::from(body.to_vec()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn health_reports_credential_presence() {
    let dir = TempDir::new().unwrap();
    let app = app(state(config(&dir, true, 0), OpenCall::default()));

    let (status, json) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["env"]["LIVEKIT_URL"], "SET");
    assert_eq!(json["env"]["LIVEKIT_API_SECRET"], "SET");
    assert_eq!(json["env"]["ANTHROPIC_API_KEY"], "MISSING");
    assert_eq!(json["active_sessions"], 0);
    assert!(!json.to_string().contains("a-test-secret"));
}

#[tokio::test]
async fn token_requires_call_id() {
    let dir = TempDir::new().unwrap();
    let app = app(state(config(&dir, true, 0), OpenCall::default()));

    let (status, json) = send(&app, get("/token?user_id=alice")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("call_id"));
}

#[tokio::test]
async fn token_without_livekit_is_server_error() {
    let dir = TempDir::new().unwrap();
    let app = app(state(config(&dir, false, 0), OpenCall::default()));

    let (status, _) = send(&app, get("/token?call_id=call-1")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn token_defaults_the_patient_identity() {
    let dir = TempDir::new().unwrap();
    let app = app(state(config(&dir, true, 0), OpenCall::default()));

    let (status, json) = send(&app, get("/token?call_id=call-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_id"], "patient-001");
    assert_eq!(json["call_id"], "call-1");
    assert_eq!(json["url"], "wss://calls.example.test");
    assert_eq!(json["token"].as_str().unwrap().split('.').count(), 3);
}

#[tokio::test]
async fn start_agent_rejects_blank_call_id() {
    let dir = TempDir::new().unwrap();
    let app = app(state(config(&dir, true, 0), OpenCall::default()));

    let (status, _) = send(
        &app,
        post_json("/start-agent", serde_json::json!({"call_id": "  "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn start_agent_without_livekit_is_server_error() {
    let dir = TempDir::new().unwrap();
    let state = state(config(&dir, false, 0), OpenCall::default());
    let sessions = state.sessions.clone();
    let app = app(state);

    let (status, _) = send(
        &app,
        post_json("/start-agent", serde_json::json!({"call_id": "c"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!sessions.is_active("c"));
}

#[tokio::test]
async fn unknown_call_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = app(state(config(&dir, true, 0), OpenCall::default()));

    let (status, _) = send(&app, post_empty("/api/sessions/missing/finish")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/sessions/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn finish_during_launch_delay_skips_the_call() {
    let dir = TempDir::new().unwrap();
    let call = OpenCall::default();
    let state = state(config(&dir, true, 60_000), call.clone());
    let sessions = state.sessions.clone();
    let app = app(state);

    let (status, json) = send(
        &app,
        post_json(
            "/start-agent",
            serde_json::json!({"call_id": "call-7", "exercise": "KNEE_BEND"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "agent_launching");
    assert_eq!(json["call_id"], "call-7");

    let (status, _) = send(
        &app,
        post_json("/start-agent", serde_json::json!({"call_id": "call-7"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = send(&app, get("/api/sessions/call-7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["live"], true);
    assert_eq!(json["session"]["state"], "created");
    assert_eq!(json["session"]["exercise"], "KNEE_BEND");

    let (status, json) = send(&app, post_bytes("/api/sessions/call-7/speech", b"ready")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("created"));

    let (status, json) = send(&app, post_empty("/api/sessions/call-7/finish")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "finishing");

    wait_until(|| !sessions.is_active("call-7")).await;

    let (status, json) = send(&app, get("/api/sessions/call-7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["live"], false);
    assert_eq!(json["session"]["state"], "completed");
    assert_eq!(json["session"]["interrupted"], false);
    assert_eq!(json["session"]["end_reason"], "finish_requested");
    assert_eq!(call.leaves(), 0);
}

#[tokio::test]
async fn live_session_finishes_and_leaves_once() {
    let dir = TempDir::new().unwrap();
    let call = OpenCall::default();
    let state = state(config(&dir, true, 0), call.clone());
    let sessions = state.sessions.clone();
    let app = app(state);

    let (status, _) = send(
        &app,
        post_json("/start-agent", serde_json::json!({"call_id": "call-9"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    wait_until(|| {
        sessions
            .snapshot("call-9")
            .is_some_and(|s| s.state.as_str() == "greeting_sent")
    })
    .await;

    let (status, json) = send(&app, get("/api/sessions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["live"].as_array().unwrap().len(), 1);
    assert_eq!(json["live"][0]["call_id"], "call-9");
    assert_eq!(json["live"][0]["finish_requested"], false);
    assert_eq!(json["recent"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, post_empty("/api/sessions/call-9/finish")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    wait_until(|| !sessions.is_active("call-9")).await;
    assert_eq!(call.leaves(), 1);
    assert_eq!(call.spoken(), vec![COACH_REPLY.to_string()]);

    let (status, json) = send(&app, get("/api/sessions?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["live"].as_array().unwrap().is_empty());
    let recent = &json["recent"][0];
    assert_eq!(recent["call_id"], "call-9");
    assert_eq!(recent["state"], "completed");
    assert_eq!(recent["end_reason"], "finish_requested");
    assert_eq!(recent["providers"]["transport"], "open-call");
    assert_eq!(recent["providers"]["text_to_speech"], "quiet-tts");
    assert!(recent["providers"]["vision"].is_null());
}

async fn greeted(app: &Router, sessions: &SessionManager, call_id: &str) {
    let (status, _) = send(
        app,
        post_json("/start-agent", serde_json::json!({ "call_id": call_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    wait_until(|| {
        sessions
            .snapshot(call_id)
            .is_some_and(|s| s.state == SessionState::GreetingSent)
    })
    .await;
}

#[tokio::test]
async fn patient_media_reaches_the_live_session() {
    let dir = TempDir::new().unwrap();
    let call = OpenCall::default();
    let state = state(config(&dir, true, 0), call.clone());
    let sessions = state.sessions.clone();
    let app = app(state);
    greeted(&app, &sessions, "call-11").await;

    let (status, json) = send(&app, post_bytes("/api/sessions/call-11/speech", b"ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "reply");
    assert_eq!(json["transcript"], "ready");
    assert_eq!(json["reply"], COACH_REPLY);

    let (status, json) = send(&app, post_bytes("/api/sessions/call-11/speech", b"  ")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "silence");

    let (status, _) = send(&app, post_bytes("/api/sessions/call-11/speech", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, post_bytes("/api/sessions/call-11/frames", &[0xff; 32])).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("pose processor"));

    let (status, _) = send(&app, post_bytes("/api/sessions/other/frames", &[0xff; 32])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(call.spoken().len(), 2);
    sessions.finish("call-11");
    wait_until(|| !sessions.is_active("call-11")).await;
}

#[tokio::test]
async fn shutdown_drain_waits_for_sessions_to_leave() {
    let dir = TempDir::new().unwrap();
    let call = OpenCall::default();
    let state = state(config(&dir, true, 0), call.clone());
    let sessions = state.sessions.clone();
    let app = app(state);
    greeted(&app, &sessions, "call-12").await;

    assert_eq!(sessions.finish_all(), 1);
    assert!(sessions.drain(Duration::from_secs(5)).await);

    assert_eq!(call.leaves(), 1);
    assert!(!sessions.is_active("call-12"));
    let (status, json) = send(&app, get("/api/sessions/call-12")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["live"], false);
    assert_eq!(json["session"]["state"], "completed");
    assert_eq!(json["session"]["end_reason"], "finish_requested");
}

#[tokio::test]
async fn drain_gives_up_after_the_grace_period() {
    let dir = TempDir::new().unwrap();
    let state = state(config(&dir, true, 0), OpenCall::default());
    let sessions = state.sessions.clone();
    let app = app(state);
    greeted(&app, &sessions, "call-13").await;

    assert!(!sessions.drain(Duration::from_millis(50)).await);
}

#[tokio::test]
async fn panicked_session_frees_its_call() {
    let dir = TempDir::new().unwrap();
    let call = OpenCall {
        panic_on_greeting: true,
        ..OpenCall::default()
    };
    let state = state(config(&dir, true, 0), call);
    let sessions = state.sessions.clone();
    let app = app(state);

    let (status, _) = send(
        &app,
        post_json("/start-agent", serde_json::json!({"call_id": "call-14"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    wait_until(|| !sessions.is_active("call-14")).await;

    let (status, _) = send(
        &app,
        post_json("/start-agent", serde_json::json!({"call_id": "call-14"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    wait_until(|| !sessions.is_active("call-14")).await;
    assert!(sessions.drain(Duration::from_secs(5)).await);
}
