use async_trait::async_trait;
use rehab_types::{CapabilityKind, ConstructionStrategy};
use rehab_voice::{
    AgentMedia, CallClient, CallHandle, Capability, CapabilityRegistry, CapabilityResolver,
    ClientHandle, ConstructError, LiveKitConfig, Membership, ProviderDescriptor, ResolveContext,
    TextToSpeech, Transport, VoiceError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ConstructionStrategy::{NoArgPlain, NoArgThenAssignClient, WithClientArg};

struct StubTransport {
    client: Option<ClientHandle>,
}

#[async_trait]
impl Transport for StubTransport {
    fn assign_client(&mut self, client: ClientHandle) -> Result<(), ConstructError> {
        self.client = Some(client);
        Ok(())
    }

    async fn create_call(&self, call_type: &str, call_id: &str) -> Result<CallHandle, VoiceError> {
        if self.client.is_none() {
            return Err(VoiceError::Config("no client assigned".into()));
        }
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
        Err(VoiceError::RoomService("stub transport cannot join".into()))
    }
}

struct SilentTts;

#[async_trait]
impl TextToSpeech for SilentTts {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, VoiceError> {
        Ok(Vec::new())
    }
}

fn client_handle() -> ClientHandle {
    CallClient::new(LiveKitConfig::new(
        "http://localhost:7880",
        "devkey",
        "secret",
    ))
    .into_handle()
}

fn resolver(registry: CapabilityRegistry) -> CapabilityResolver {
    CapabilityResolver::new(Arc::new(registry))
}

/// A transport provider whose factory counts its invocations.
fn counted<F>(
    name: &str,
    strategies: &[ConstructionStrategy],
    calls: &Arc<AtomicUsize>,
    behaviour: F,
) -> ProviderDescriptor
where
    F: Fn(Option<&ClientHandle>) -> Result<Capability, ConstructError> + Send + Sync + 'static,
{
    let calls = Arc::clone(calls);
    ProviderDescriptor::new(name, strategies.to_vec(), move |args| {
        calls.fetch_add(1, Ordering::SeqCst);
        behaviour(args.client())
    })
}

fn stub_transport(client: Option<&ClientHandle>) -> Capability {
    Capability::Transport(Box::new(StubTransport {
        client: client.cloned(),
    }))
}

#[test]
fn highest_priority_success_wins_and_stops_the_search() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let registry = CapabilityRegistry::builder()
        .provider(
            CapabilityKind::Transport,
            counted("primary", &[WithClientArg], &first, |c| Ok(stub_transport(c))),
        )
        .provider(
            CapabilityKind::Transport,
            counted("secondary", &[WithClientArg], &second, |c| Ok(stub_transport(c))),
        )
        .build();

    let resolved = resolver(registry)
        .resolve(
            CapabilityKind::Transport,
            &ResolveContext::with_client(client_handle()),
        )
        .expect("transport should resolve");

    assert_eq!(resolved.provider, "primary");
    assert_eq!(resolved.strategy, WithClientArg);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0, "lower priority must not be consulted");
}

#[test]
fn legacy_provider_resolves_through_its_second_strategy() {
    let legacy = Arc::new(AtomicUsize::new(0));
    let modern = Arc::new(AtomicUsize::new(0));

    let registry = CapabilityRegistry::builder()
        .provider(
            CapabilityKind::Transport,
            counted(
                "Legacy",
                &[WithClientArg, NoArgThenAssignClient],
                &legacy,
                |client| match client {
                    Some(_) => Err(ConstructError::WrongArity(
                        "Legacy() takes no arguments".into(),
                    )),
                    None => Ok(stub_transport(None)),
                },
            ),
        )
        .provider(
            CapabilityKind::Transport,
            counted("Modern", &[WithClientArg], &modern, |c| Ok(stub_transport(c))),
        )
        .build();

    let resolved = resolver(registry)
        .resolve(
            CapabilityKind::Transport,
            &ResolveContext::with_client(client_handle()),
        )
        .expect("Legacy should resolve");

    assert_eq!(resolved.provider, "Legacy");
    assert_eq!(resolved.strategy, NoArgThenAssignClient);
    assert_eq!(legacy.load(Ordering::SeqCst), 2);
    assert_eq!(modern.load(Ordering::SeqCst), 0);
}

#[test]
fn exhausted_kind_lists_every_provider_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let wrong_arity = |_: Option<&ClientHandle>| -> Result<Capability, ConstructError> {
        Err(ConstructError::WrongArity("unexpected arguments".into()))
    };

    let registry = CapabilityRegistry::builder()
        .provider(
            CapabilityKind::LanguageModel,
            counted(
                "alpha",
                &[WithClientArg, NoArgThenAssignClient, NoArgPlain],
                &calls,
                wrong_arity,
            ),
        )
        .provider(
            CapabilityKind::LanguageModel,
            counted("beta", &[NoArgPlain], &calls, wrong_arity),
        )
        .provider(
            CapabilityKind::LanguageModel,
            counted("gamma", &[WithClientArg, NoArgPlain], &calls, wrong_arity),
        )
        .build();

    let err = resolver(registry)
        .resolve(
            CapabilityKind::LanguageModel,
            &ResolveContext::with_client(client_handle()),
        )
        .expect_err("no provider can construct");

    assert_eq!(err.kind, CapabilityKind::LanguageModel);
    assert_eq!(err.attempted_providers(), vec!["alpha", "beta", "gamma"]);
    // Every strategy was tried: 3 + 1 + 2.
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert!(err.attempts[0].reason.contains("no_arg_plain"));

    let message = err.to_string();
    assert!(message.contains("language_model"));
    assert!(message.contains("alpha"));
    assert!(message.contains("gamma"));
}

#[test]
fn other_errors_skip_remaining_strategies_of_that_provider() {
    let broken = Arc::new(AtomicUsize::new(0));
    let fallback = Arc::new(AtomicUsize::new(0));

    let registry = CapabilityRegistry::builder()
        .provider(
            CapabilityKind::TextToSpeech,
            counted("broken", &[NoArgPlain, NoArgPlain], &broken, |_| {
                Err(ConstructError::MissingCredential("ELEVENLABS_API_KEY".into()))
            }),
        )
        .provider(
            CapabilityKind::TextToSpeech,
            counted("fallback", &[NoArgPlain], &fallback, |_| {
                Ok(Capability::TextToSpeech(Box::new(SilentTts)))
            }),
        )
        .build();

    let resolved = resolver(registry)
        .resolve(CapabilityKind::TextToSpeech, &ResolveContext::new())
        .expect("fallback should resolve");

    assert_eq!(resolved.provider, "fallback");
    assert_eq!(broken.load(Ordering::SeqCst), 1);
    assert_eq!(fallback.load(Ordering::SeqCst), 1);
}

#[test]
fn client_strategies_without_a_client_fall_through() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = CapabilityRegistry::builder()
        .provider(
            CapabilityKind::Transport,
            counted(
                "flexible",
                &[WithClientArg, NoArgThenAssignClient, NoArgPlain],
                &calls,
                |c| Ok(stub_transport(c)),
            ),
        )
        .build();

    let resolved = resolver(registry)
        .resolve(CapabilityKind::Transport, &ResolveContext::new())
        .expect("plain construction should succeed");

    assert_eq!(resolved.strategy, NoArgPlain);
    // The client strategies fail before the factory is reached.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn assign_client_without_a_slot_is_wrong_arity() {
    let registry = CapabilityRegistry::builder()
        .provider(
            CapabilityKind::TextToSpeech,
            ProviderDescriptor::new("voice", [NoArgThenAssignClient, NoArgPlain], |_| {
                Ok(Capability::TextToSpeech(Box::new(SilentTts)))
            }),
        )
        .build();

    let resolved = resolver(registry)
        .resolve(
            CapabilityKind::TextToSpeech,
            &ResolveContext::with_client(client_handle()),
        )
        .expect("falls through to the plain strategy");
    assert_eq!(resolved.strategy, NoArgPlain);
}

#[test]
fn provider_of_the_wrong_kind_is_rejected() {
    let registry = CapabilityRegistry::builder()
        .provider(
            CapabilityKind::SpeechToText,
            ProviderDescriptor::new("confused", [NoArgPlain], |_| {
                Ok(Capability::TextToSpeech(Box::new(SilentTts)))
            }),
        )
        .build();

    let err = resolver(registry)
        .resolve(CapabilityKind::SpeechToText, &ResolveContext::new())
        .expect_err("kind mismatch must not resolve");
    assert_eq!(err.attempted_providers(), vec!["confused"]);
    assert!(err.attempts[0].reason.contains("expected speech_to_text"));
}

#[test]
fn optional_capability_degrades_to_none() {
    let registry = CapabilityRegistry::builder()
        .provider(
            CapabilityKind::VisionProcessor,
            ProviderDescriptor::new("yolo-pose", [NoArgPlain], |_| {
                Err(ConstructError::Config("pose model not found".into()))
            }),
        )
        .build();
    let resolver = resolver(registry);

    assert!(resolver
        .resolve_optional(CapabilityKind::VisionProcessor, &ResolveContext::new())
        .is_none());

    let empty = CapabilityResolver::new(Arc::new(CapabilityRegistry::default()));
    let err = empty
        .resolve(CapabilityKind::Transport, &ResolveContext::new())
        .unwrap_err();
    assert!(err.attempts.is_empty());
    assert!(err.to_string().contains("no providers registered"));
}

#[tokio::test]
async fn assigned_client_reaches_the_instance() {
    let registry = CapabilityRegistry::builder()
        .provider(
            CapabilityKind::Transport,
            ProviderDescriptor::new("late-bound", [NoArgThenAssignClient], |args| {
                args.expect_no_args("late-bound")?;
                Ok(stub_transport(None))
            }),
        )
        .build();

    let resolved = resolver(registry)
        .resolve(
            CapabilityKind::Transport,
            &ResolveContext::with_client(client_handle()),
        )
        .unwrap();
    let transport = resolved.capability.into_transport().unwrap();
    let call = transport.create_call("default", "rehab-7").await.unwrap();
    assert_eq!(call.room, "rehab-7");
}
