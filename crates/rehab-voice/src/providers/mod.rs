//! Concrete capability providers and the default registry wiring them up.

mod anthropic;
mod deepgram;
mod elevenlabs;
mod livekit;
mod piper;
mod pose;
mod subprocess;
mod whisper;

pub use anthropic::AnthropicLlm;
pub use deepgram::{DeepgramStt, DeepgramTts};
pub use elevenlabs::ElevenLabsTts;
pub use livekit::{LiveKitMembership, LiveKitTransport, AUDIO_TOPIC, CAPTION_TOPIC};
pub use piper::PiperTts;
pub use pose::YoloPoseProcessor;
pub use whisper::WhisperStt;

use crate::capability::Capability;
use crate::config::VoiceConfig;
use crate::registry::{CapabilityRegistry, ProviderDescriptor};
use rehab_types::{CapabilityKind, ConstructionStrategy};
use std::time::Duration;

/// Request timeout for hosted providers.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("rehab-voice/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Builds the registry of every provider this crate ships, in preference
/// order per capability kind.
///
/// Hosted providers refuse to construct without their API key and local ones
/// without their binaries, so the resolver falls through to whatever is
/// actually available on this host.
pub fn default_registry(config: &VoiceConfig) -> CapabilityRegistry {
    use ConstructionStrategy::{NoArgPlain, NoArgThenAssignClient, WithClientArg};

    let anthropic = config.anthropic.clone();
    let deepgram_stt = config.deepgram.clone();
    let deepgram_tts = config.deepgram.clone();
    let elevenlabs = config.elevenlabs.clone();
    let whisper = config.local.clone();
    let piper = config.local.clone();
    let pose = config.pose.clone();

    CapabilityRegistry::builder()
        .provider(
            CapabilityKind::Transport,
            ProviderDescriptor::new("livekit", [WithClientArg, NoArgThenAssignClient], |args| {
                let transport = match args.client() {
                    Some(client) => LiveKitTransport::with_client(client.clone())?,
                    None => LiveKitTransport::default(),
                };
                Ok(Capability::Transport(Box::new(transport)))
            }),
        )
        .provider(
            CapabilityKind::LanguageModel,
            ProviderDescriptor::new("anthropic", [NoArgPlain], move |args| {
                args.expect_no_args("anthropic")?;
                Ok(Capability::LanguageModel(Box::new(
                    AnthropicLlm::from_config(&anthropic)?,
                )))
            }),
        )
        .provider(
            CapabilityKind::SpeechToText,
            ProviderDescriptor::new("deepgram", [NoArgPlain], move |args| {
                args.expect_no_args("deepgram")?;
                Ok(Capability::SpeechToText(Box::new(
                    DeepgramStt::from_config(&deepgram_stt)?,
                )))
            }),
        )
        .provider(
            CapabilityKind::SpeechToText,
            ProviderDescriptor::new("whisper-local", [NoArgPlain], move |args| {
                args.expect_no_args("whisper-local")?;
                Ok(Capability::SpeechToText(Box::new(WhisperStt::from_config(
                    &whisper,
                )?)))
            }),
        )
        .provider(
            CapabilityKind::TextToSpeech,
            ProviderDescriptor::new("elevenlabs", [NoArgPlain], move |args| {
                args.expect_no_args("elevenlabs")?;
                Ok(Capability::TextToSpeech(Box::new(
                    ElevenLabsTts::from_config(&elevenlabs)?,
                )))
            }),
        )
        .provider(
            CapabilityKind::TextToSpeech,
            ProviderDescriptor::new("deepgram-aura", [NoArgPlain], move |args| {
                args.expect_no_args("deepgram-aura")?;
                Ok(Capability::TextToSpeech(Box::new(
                    DeepgramTts::from_config(&deepgram_tts)?,
                )))
            }),
        )
        .provider(
            CapabilityKind::TextToSpeech,
            ProviderDescriptor::new("piper-local", [NoArgPlain], move |args| {
                args.expect_no_args("piper-local")?;
                Ok(Capability::TextToSpeech(Box::new(PiperTts::from_config(
                    &piper,
                )?)))
            }),
        )
        .provider(
            CapabilityKind::VisionProcessor,
            ProviderDescriptor::new("yolo-pose", [NoArgPlain], move |args| {
                args.expect_no_args("yolo-pose")?;
                Ok(Capability::VisionProcessor(Box::new(
                    YoloPoseProcessor::from_config(&pose)?,
                )))
            }),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_priorities() {
        let registry = default_registry(&VoiceConfig::default());
        assert_eq!(registry.provider_names(CapabilityKind::Transport), vec!["livekit"]);
        assert_eq!(
            registry.provider_names(CapabilityKind::SpeechToText),
            vec!["deepgram", "whisper-local"]
        );
        assert_eq!(
            registry.provider_names(CapabilityKind::TextToSpeech),
            vec!["elevenlabs", "deepgram-aura", "piper-local"]
        );
        assert_eq!(
            registry.provider_names(CapabilityKind::VisionProcessor),
            vec!["yolo-pose"]
        );
    }
}
