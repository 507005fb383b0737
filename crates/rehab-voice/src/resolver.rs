//! Ordered, fallback-driven construction of capability providers.

use crate::capability::Capability;
use crate::client::ClientHandle;
use crate::error::ConstructError;
use crate::registry::{CapabilityRegistry, ConstructArgs, ProviderDescriptor};
use rehab_types::{CapabilityKind, ConstructionStrategy};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Inputs shared by every construction attempt.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    client: Option<ClientHandle>,
}

impl ResolveContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: ClientHandle) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn client(&self) -> Option<&ClientHandle> {
        self.client.as_ref()
    }
}

/// A constructed capability, tagged with where it came from.
#[derive(Debug)]
pub struct ResolvedCapability {
    pub provider: String,
    pub strategy: ConstructionStrategy,
    pub capability: Capability,
}

/// One rejected provider and the reasons its strategies failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveAttempt {
    pub provider: String,
    pub reason: String,
}

/// Every provider for a mandatory capability failed to construct.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no usable {kind} provider ({})", describe_attempts(.attempts))]
pub struct CapabilityUnavailable {
    pub kind: CapabilityKind,
    /// Each attempted provider exactly once, in priority order.
    pub attempts: Vec<ResolveAttempt>,
}

impl CapabilityUnavailable {
    pub fn attempted_providers(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.provider.as_str()).collect()
    }
}

fn describe_attempts(attempts: &[ResolveAttempt]) -> String {
    if attempts.is_empty() {
        return "no providers registered".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.provider, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Resolves capability kinds against a shared registry.
#[derive(Debug, Clone)]
pub struct CapabilityResolver {
    registry: Arc<CapabilityRegistry>,
}

impl CapabilityResolver {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Constructs the highest-priority provider of `kind` that succeeds.
    ///
    /// Strategies of one provider are tried in order; a wrong-arity failure
    /// moves to the next strategy, any other failure moves to the next
    /// provider. Providers after the first success are never consulted.
    ///
    /// # Errors
    ///
    /// Returns `CapabilityUnavailable` listing every attempted provider when
    /// none could be constructed.
    pub fn resolve(
        &self,
        kind: CapabilityKind,
        context: &ResolveContext,
    ) -> Result<ResolvedCapability, CapabilityUnavailable> {
        let mut attempts = Vec::new();

        for descriptor in self.registry.providers(kind) {
            debug!(%kind, provider = descriptor.name(), "trying capability provider");

            match try_provider(kind, descriptor, context) {
                Ok((strategy, capability)) => {
                    info!(
                        %kind,
                        provider = descriptor.name(),
                        %strategy,
                        "resolved capability"
                    );
                    return Ok(ResolvedCapability {
                        provider: descriptor.name().to_string(),
                        strategy,
                        capability,
                    });
                }
                Err(reasons) => {
                    let reason = reasons.join("; ");
                    warn!(%kind, provider = descriptor.name(), %reason, "provider rejected");
                    attempts.push(ResolveAttempt {
                        provider: descriptor.name().to_string(),
                        reason,
                    });
                }
            }
        }

        Err(CapabilityUnavailable { kind, attempts })
    }

    /// Like [`resolve`](Self::resolve), but absence degrades to `None`.
    pub fn resolve_optional(
        &self,
        kind: CapabilityKind,
        context: &ResolveContext,
    ) -> Option<ResolvedCapability> {
        match self.resolve(kind, context) {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                info!(%kind, "optional capability unavailable, continuing without it: {}", e);
                None
            }
        }
    }
}

fn try_provider(
    kind: CapabilityKind,
    descriptor: &ProviderDescriptor,
    context: &ResolveContext,
) -> Result<(ConstructionStrategy, Capability), Vec<String>> {
    let mut reasons = Vec::new();

    if descriptor.strategies().is_empty() {
        reasons.push("no construction strategies declared".to_string());
    }

    for &strategy in descriptor.strategies() {
        match construct(kind, descriptor, strategy, context) {
            Ok(capability) => return Ok((strategy, capability)),
            Err(e) if e.is_wrong_arity() => {
                debug!(
                    %kind,
                    provider = descriptor.name(),
                    %strategy,
                    "constructor shape rejected, trying next strategy: {}",
                    e
                );
                reasons.push(format!("{strategy}: {e}"));
            }
            Err(e) => {
                reasons.push(format!("{strategy}: {e}"));
                break;
            }
        }
    }

    Err(reasons)
}

fn construct(
    kind: CapabilityKind,
    descriptor: &ProviderDescriptor,
    strategy: ConstructionStrategy,
    context: &ResolveContext,
) -> Result<Capability, ConstructError> {
    let client = if strategy.needs_client() {
        Some(require_client(context)?)
    } else {
        None
    };
    let capability = match (strategy, client) {
        (ConstructionStrategy::WithClientArg, Some(client)) => {
            descriptor.construct(&ConstructArgs::with_client(client))?
        }
        (ConstructionStrategy::NoArgThenAssignClient, Some(client)) => {
            let mut capability = descriptor.construct(&ConstructArgs::none())?;
            capability.assign_client(Arc::clone(client))?;
            capability
        }
        _ => descriptor.construct(&ConstructArgs::none())?,
    };

    if capability.kind() != kind {
        return Err(ConstructError::Other(format!(
            "provider produced a {} capability, expected {kind}",
            capability.kind()
        )));
    }

    Ok(capability)
}

fn require_client(context: &ResolveContext) -> Result<&ClientHandle, ConstructError> {
    context
        .client()
        .ok_or_else(|| ConstructError::WrongArity("no client handle available".to_string()))
}
