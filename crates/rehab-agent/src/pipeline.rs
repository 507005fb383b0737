//! Assembly of the capabilities one session runs with.

use rehab_types::{coaching_instructions, is_supported, CapabilityKind};
use rehab_voice::{
    AgentIdentity, AgentMedia, Capability, CapabilityResolver, CapabilityUnavailable,
    ResolveAttempt, ResolveContext, ResolvedCapability, Transport,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Names of the providers that back a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSelection {
    pub transport: String,
    pub language_model: String,
    pub speech_to_text: String,
    pub text_to_speech: String,
    pub vision: Option<String>,
}

/// The transport plus the media handles carried into the join.
///
/// Owned by exactly one session and dropped when it terminates.
pub struct AgentPipeline {
    pub transport: Box<dyn Transport>,
    pub media: AgentMedia,
    pub providers: ProviderSelection,
}

impl AgentPipeline {
    /// Resolves every mandatory capability in order, then the optional
    /// vision processor.
    ///
    /// # Errors
    ///
    /// Returns the first `CapabilityUnavailable`; kinds after it are not
    /// resolved.
    pub fn assemble(
        resolver: &CapabilityResolver,
        context: &ResolveContext,
        agent: AgentIdentity,
        exercise: &str,
    ) -> Result<Self, CapabilityUnavailable> {
        let (transport_name, transport) = mandatory(
            resolver,
            context,
            CapabilityKind::Transport,
            Capability::into_transport,
        )?;
        let (llm_name, llm) = mandatory(
            resolver,
            context,
            CapabilityKind::LanguageModel,
            Capability::into_language_model,
        )?;
        let (stt_name, stt) = mandatory(
            resolver,
            context,
            CapabilityKind::SpeechToText,
            Capability::into_speech_to_text,
        )?;
        let (tts_name, tts) = mandatory(
            resolver,
            context,
            CapabilityKind::TextToSpeech,
            Capability::into_text_to_speech,
        )?;

        let vision = resolver
            .resolve_optional(CapabilityKind::VisionProcessor, context)
            .and_then(|resolved| {
                let provider = resolved.provider;
                resolved
                    .capability
                    .into_vision_processor()
                    .map(|processor| (provider, processor))
            });
        let (vision_name, vision) = match vision {
            Some((name, processor)) => (Some(name), Some(Arc::from(processor))),
            None => (None, None),
        };

        let providers = ProviderSelection {
            transport: transport_name,
            language_model: llm_name,
            speech_to_text: stt_name,
            text_to_speech: tts_name,
            vision: vision_name,
        };
        info!(
            ?providers,
            exercise,
            supported = is_supported(exercise),
            "agent pipeline assembled"
        );

        Ok(Self {
            transport,
            media: AgentMedia {
                agent,
                instructions: coaching_instructions(exercise),
                llm: Arc::from(llm),
                stt: Arc::from(stt),
                tts: Arc::from(tts),
                vision,
            },
            providers,
        })
    }
}

impl fmt::Debug for AgentPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentPipeline")
            .field("media", &self.media)
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

fn mandatory<T>(
    resolver: &CapabilityResolver,
    context: &ResolveContext,
    kind: CapabilityKind,
    extract: fn(Capability) -> Option<T>,
) -> Result<(String, T), CapabilityUnavailable> {
    let ResolvedCapability {
        provider,
        capability,
        ..
    } = resolver.resolve(kind, context)?;

    match extract(capability) {
        Some(inner) => Ok((provider, inner)),
        // The resolver already checks kinds; this only guards the extractor.
        None => Err(CapabilityUnavailable {
            kind,
            attempts: vec![ResolveAttempt {
                provider,
                reason: format!("resolved capability is not a {kind}"),
            }],
        }),
    }
}
