//! Static registry of capability providers.
//!
//! The registry maps each [`CapabilityKind`] to an ordered list of
//! [`ProviderDescriptor`]s. Order is priority: earlier descriptors are tried
//! first. A registry is built once at startup through [`RegistryBuilder`] and
//! never mutated afterwards, so it can be shared behind an `Arc` by every
//! session without locking.

use crate::capability::Capability;
use crate::client::ClientHandle;
use crate::error::ConstructError;
use rehab_types::{CapabilityKind, ConstructionStrategy};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Arguments handed to a provider factory for one construction attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstructArgs<'a> {
    client: Option<&'a ClientHandle>,
}

impl<'a> ConstructArgs<'a> {
    /// Arguments for a no-argument construction.
    pub fn none() -> Self {
        Self { client: None }
    }

    /// Arguments carrying the client handle.
    pub fn with_client(client: &'a ClientHandle) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn client(&self) -> Option<&'a ClientHandle> {
        self.client
    }

    /// Fails with a wrong-arity error if a client handle was passed to a
    /// provider whose constructor takes no arguments.
    pub fn expect_no_args(&self, provider: &str) -> Result<(), ConstructError> {
        match self.client {
            Some(_) => Err(ConstructError::WrongArity(format!(
                "{provider} takes no constructor arguments"
            ))),
            None => Ok(()),
        }
    }
}

/// Constructor function of a provider.
pub type ProviderFactory =
    Arc<dyn Fn(&ConstructArgs<'_>) -> Result<Capability, ConstructError> + Send + Sync>;

/// A named provider, the strategies it may be constructed with, and its
/// constructor.
#[derive(Clone)]
pub struct ProviderDescriptor {
    name: String,
    strategies: Vec<ConstructionStrategy>,
    factory: ProviderFactory,
}

impl ProviderDescriptor {
    pub fn new<F>(
        name: impl Into<String>,
        strategies: impl IntoIterator<Item = ConstructionStrategy>,
        factory: F,
    ) -> Self
    where
        F: Fn(&ConstructArgs<'_>) -> Result<Capability, ConstructError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            strategies: strategies.into_iter().collect(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Strategies in the order they are attempted.
    pub fn strategies(&self) -> &[ConstructionStrategy] {
        &self.strategies
    }

    pub(crate) fn construct(&self, args: &ConstructArgs<'_>) -> Result<Capability, ConstructError> {
        (self.factory)(args)
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("strategies", &self.strategies)
            .finish_non_exhaustive()
    }
}

/// Immutable mapping from capability kind to providers in priority order.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    providers: HashMap<CapabilityKind, Vec<ProviderDescriptor>>,
}

impl CapabilityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Providers registered for `kind`, highest priority first.
    pub fn providers(&self, kind: CapabilityKind) -> &[ProviderDescriptor] {
        self.providers.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Provider names registered for `kind`, highest priority first.
    pub fn provider_names(&self, kind: CapabilityKind) -> Vec<&str> {
        self.providers(kind).iter().map(|p| p.name()).collect()
    }

    /// Returns the total number of registered descriptors.
    pub fn len(&self) -> usize {
        self.providers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects provider descriptors before freezing them into a registry.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    providers: HashMap<CapabilityKind, Vec<ProviderDescriptor>>,
}

impl RegistryBuilder {
    /// Appends a provider for `kind` with lower priority than any provider
    /// already registered for that kind.
    pub fn provider(mut self, kind: CapabilityKind, descriptor: ProviderDescriptor) -> Self {
        self.providers.entry(kind).or_default().push(descriptor);
        self
    }

    pub fn build(self) -> CapabilityRegistry {
        for (kind, descriptors) in &self.providers {
            tracing::debug!(
                %kind,
                providers = ?descriptors.iter().map(|d| d.name()).collect::<Vec<_>>(),
                "registered capability providers"
            );
        }
        CapabilityRegistry {
            providers: self.providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(name: &str) -> ProviderDescriptor {
        let owned = name.to_string();
        ProviderDescriptor::new(name, [ConstructionStrategy::NoArgPlain], move |_| {
            Err(ConstructError::Other(format!("{owned} unavailable")))
        })
    }

    #[test]
    fn registration_order_is_priority() {
        let registry = CapabilityRegistry::builder()
            .provider(CapabilityKind::TextToSpeech, failing("first"))
            .provider(CapabilityKind::SpeechToText, failing("stt"))
            .provider(CapabilityKind::TextToSpeech, failing("second"))
            .build();

        assert_eq!(
            registry.provider_names(CapabilityKind::TextToSpeech),
            vec!["first", "second"]
        );
        assert_eq!(registry.len(), 3);
        assert!(registry.providers(CapabilityKind::Transport).is_empty());
    }

    #[test]
    fn construct_args_reject_unexpected_client() {
        assert!(ConstructArgs::none().expect_no_args("plain").is_ok());
        assert!(ConstructArgs::default().client().is_none());
    }
}
