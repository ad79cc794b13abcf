//! Provider abstraction shared by the Gemini and OpenAI adapters.
//!
//! Adapters are stateless per call: every method receives an immutable
//! snapshot of the turn and returns the provider's normalized text.

use crate::case::FileType;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which external model provider produced or reviewed a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::OpenAi => "OpenAI",
        }
    }

}

impl FromStr for ProviderKind {
    type Err = String;

    /// Case-insensitive, with "google" and "gpt" as aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" | "gpt" => Ok(Self::OpenAi),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approximate user location, used only as a jurisdiction hint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn jurisdiction_hint(&self) -> String {
        format!(
            "User's approximate location for jurisdictional context: Latitude {}, Longitude {}.",
            self.latitude, self.longitude
        )
    }
}

/// Inline file payload sent to multimodal endpoints, read from disk once per turn
#[derive(Debug, Clone, PartialEq)]
pub struct FilePayload {
    pub name: String,
    pub mime_type: String,
    pub file_type: FileType,
    pub base64: String,
}

impl FilePayload {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// What the caller expects back from `analyze`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    /// Full court-style report
    Report,
    /// Findings plus 1-3 proposed strategies, reviewed by another model later
    Preliminary,
}

/// Immutable per-turn snapshot handed to every provider call
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub prompt: String,
    pub files: Vec<FilePayload>,
    pub stage: AnalysisStage,
    /// Complex mode: larger model and thinking budget where supported
    pub deep: bool,
    pub location: Option<Location>,
}

impl AnalysisRequest {
    pub fn file_names(&self) -> String {
        self.files
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// " - name (mime)" lines used by verification prompts
    pub fn file_listing(&self) -> String {
        if self.files.is_empty() {
            return "None".to_string();
        }
        self.files
            .iter()
            .map(|f| format!(" - {} ({})", f.name, f.mime_type))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn images(&self) -> impl Iterator<Item = &FilePayload> {
        self.files.iter().filter(|f| f.file_type == FileType::Image)
    }
}

/// Material a synthesis call merges into one final report
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisInput {
    /// Two independent strategies from a complex-mode turn
    DualStrategies { gemini: String, openai: String },
    /// Own preliminary analysis plus a consultant's advice
    Consultation {
        preliminary: String,
        consultant_advice: String,
    },
}

/// A large-language-model backend used for analysis, consultation or verification
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Conversational turn without attachments
    async fn chat(&self, prompt: &str, location: Option<Location>)
        -> Result<String, ProviderError>;

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, ProviderError>;

    async fn consult(
        &self,
        _request: &AnalysisRequest,
        _preliminary: &str,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: self.kind(),
            operation: "consultation",
        })
    }

    async fn synthesize(
        &self,
        _request: &AnalysisRequest,
        _input: &SynthesisInput,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: self.kind(),
            operation: "synthesis",
        })
    }

    async fn verify(
        &self,
        request: &AnalysisRequest,
        report: &str,
    ) -> Result<String, ProviderError>;
}
