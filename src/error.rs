//! Error types for every layer of the intake pipeline.
//!
//! Provider-level errors are caught by the orchestrator and degraded into
//! inline content wherever a sibling result can still be shown; only a total
//! failure aborts a turn.

use crate::ai::ProviderKind;
use thiserror::Error;

/// Failure of a single provider call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// No API key configured. Treated as "skip this provider", never fatal.
    #[error("{provider} API key is not configured")]
    MissingCredential { provider: ProviderKind },

    /// The request never produced a response (DNS, TLS, timeout, ...)
    #[error("{provider} request failed: {message}")]
    Transport {
        provider: ProviderKind,
        message: String,
    },

    /// Non-success HTTP status
    #[error("{provider} API error ({status}): {message}")]
    Http {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    /// Body could not be decoded into the expected shape
    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse {
        provider: ProviderKind,
        message: String,
    },

    /// Body decoded but carried no text
    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: ProviderKind },

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: ProviderKind,
        operation: &'static str,
    },
}

impl ProviderError {
    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::MissingCredential { provider }
            | Self::Transport { provider, .. }
            | Self::Http { provider, .. }
            | Self::MalformedResponse { provider, .. }
            | Self::EmptyResponse { provider }
            | Self::Unsupported { provider, .. } => *provider,
        }
    }

    /// Configuration errors are skipped by every policy
    pub fn is_missing_credential(&self) -> bool {
        matches!(self, Self::MissingCredential { .. })
    }
}

/// Failure of a whole turn
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// Another turn is still running against this orchestrator
    #[error("a turn is already in progress")]
    TurnInFlight,

    /// Every provider declared for a step failed
    #[error("all providers failed during {step}: {}", summarize(.failures))]
    AllProvidersFailed {
        step: &'static str,
        failures: Vec<ProviderError>,
    },

    /// A provider failed under an `abort` policy
    #[error("{step} aborted: {source}")]
    Aborted {
        step: &'static str,
        source: ProviderError,
    },

    /// A step was requested with an empty provider chain
    #[error("no provider is declared for {step}")]
    NoProviders { step: &'static str },
}

fn summarize(failures: &[ProviderError]) -> String {
    if failures.is_empty() {
        return "no provider attempted".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure while rendering a sealed document
#[derive(Debug, Error)]
pub enum SealError {
    #[error("failed to encode QR metadata: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("failed to build PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("failed to serialize QR payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("failed to write sealed report: {0}")]
    Io(#[from] std::io::Error),

    #[error("rendering task failed: {0}")]
    Task(String),

    #[error("message {0} not found")]
    MessageNotFound(String),

    #[error("message {0} is not a report")]
    NotAReport(String),
}

/// Failure of the remote anchoring step
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnchorError {
    #[error("cloud anchor is not configured: {0}")]
    NotConfigured(String),

    #[error("anonymous sign-in failed: {0}")]
    Auth(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("metadata record write failed: {0}")]
    Record(String),
}

/// Failure of the local case store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to (de)serialize case: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to prepare store location: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Failure of the credential layer
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API key not found for {0}")]
    NotFound(String),

    #[error("API key for {provider} is malformed: {reason}")]
    Invalid { provider: String, reason: String },

    #[error("secure credential storage unavailable: {0}")]
    Keychain(#[from] keyring::Error),
}
