//! Provider chains
//!
//! Every pipeline step declares an ordered list of providers plus what to do
//! when one of them fails. `attempt_in_order` is the only place that walks a
//! chain, so fallback behavior is identical across steps.

use super::provider::{AnalysisProvider, ProviderKind};
use crate::error::{PipelineError, ProviderError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Reaction to a failed provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Record the failure and end the step without a result
    Skip,
    /// Record the failure and try the next provider
    Fallback,
    /// Fail the whole step immediately
    Abort,
}

/// Ordered provider list for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPolicy {
    pub order: Vec<ProviderKind>,
    pub on_failure: OnFailure,
}

impl ProviderPolicy {
    pub fn new(order: Vec<ProviderKind>, on_failure: OnFailure) -> Self {
        Self { order, on_failure }
    }

    /// Gemini first, OpenAI as fallback
    pub fn analysis_default() -> Self {
        Self::new(
            vec![ProviderKind::Gemini, ProviderKind::OpenAi],
            OnFailure::Fallback,
        )
    }

    /// OpenAI first so the verifier differs from the usual analyst
    pub fn verification_default() -> Self {
        Self::new(
            vec![ProviderKind::OpenAi, ProviderKind::Gemini],
            OnFailure::Fallback,
        )
    }

    /// Optional second opinion; never blocks the turn
    pub fn consultation_default() -> Self {
        Self::new(vec![ProviderKind::OpenAi], OnFailure::Skip)
    }
}

/// Registered provider adapters, keyed by kind
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<ProviderKind, Arc<dyn AnalysisProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own kind, replacing any previous one
    pub fn with(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn AnalysisProvider>> {
        self.providers.get(&kind)
    }
}

/// Outcome of walking a chain
#[derive(Debug)]
pub struct ChainResult<T> {
    /// First successful provider and its value
    pub value: Option<(ProviderKind, T)>,
    /// Failures recorded before the chain stopped, in attempt order
    pub failures: Vec<ProviderError>,
}

impl<T> ChainResult<T> {
    /// Convert to a hard result, failing when no provider produced a value
    pub fn required(self, step: &'static str) -> Result<(ProviderKind, T), PipelineError> {
        match self.value {
            Some(value) => Ok(value),
            None => Err(PipelineError::AllProvidersFailed {
                step,
                failures: self.failures,
            }),
        }
    }
}

/// Attempt `call` against each provider of `policy.order` until one succeeds.
///
/// A provider without a credential (or not registered at all) is always
/// skipped over, whatever the policy says. Any other failure is handled per
/// `policy.on_failure`.
pub async fn attempt_in_order<T, F, Fut>(
    step: &'static str,
    providers: &ProviderSet,
    policy: &ProviderPolicy,
    mut call: F,
) -> Result<ChainResult<T>, PipelineError>
where
    F: FnMut(Arc<dyn AnalysisProvider>) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    if policy.order.is_empty() {
        return Err(PipelineError::NoProviders { step });
    }

    let mut failures = Vec::new();

    for kind in &policy.order {
        let Some(provider) = providers.get(*kind) else {
            tracing::debug!(step, provider = %kind, "Provider not registered, skipping");
            failures.push(ProviderError::MissingCredential { provider: *kind });
            continue;
        };

        match call(Arc::clone(provider)).await {
            Ok(value) => {
                tracing::info!(step, provider = %kind, "Provider succeeded");
                return Ok(ChainResult {
                    value: Some((*kind, value)),
                    failures,
                });
            }
            Err(e) if e.is_missing_credential() => {
                tracing::warn!(step, provider = %kind, "Provider has no credential, skipping");
                failures.push(e);
            }
            Err(e) => {
                tracing::warn!(step, provider = %kind, error = %e, "Provider failed");
                match policy.on_failure {
                    OnFailure::Abort => {
                        return Err(PipelineError::Aborted { step, source: e });
                    }
                    OnFailure::Skip => {
                        failures.push(e);
                        return Ok(ChainResult {
                            value: None,
                            failures,
                        });
                    }
                    OnFailure::Fallback => failures.push(e),
                }
            }
        }
    }

    Ok(ChainResult {
        value: None,
        failures,
    })
}
