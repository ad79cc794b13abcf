use crate::ai::ProviderKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Ai,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Audio,
    Document,
}

impl FileType {
    /// Classify by MIME type prefix; anything unrecognized is a document
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else {
            Self::Document
        }
    }
}

/// A piece of evidence attached to the case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub mime_type: String,
    pub size: u64,
    /// Source of the raw bytes. Not persisted: a reloaded record is offline
    /// until the same file is attached again.
    #[serde(skip)]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl UploadedFile {
    /// Build a file record from a path on disk
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis())
            .unwrap_or_default();

        Ok(Self {
            id: format!("{}-{}", name, modified_ms),
            file_type: FileType::from_mime(&mime_type),
            name,
            mime_type,
            size: metadata.len(),
            path: Some(path.to_path_buf()),
            sha512: None,
            added_at: Some(Utc::now()),
        })
    }

    pub fn has_source(&self) -> bool {
        self.path.is_some()
    }
}

/// Slot a provider filled in a multi-provider report, or `none` when skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    None,
}

impl From<ProviderKind> for ProviderRole {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Gemini => Self::Gemini,
            ProviderKind::OpenAi => Self::OpenAi,
        }
    }
}

impl From<Option<ProviderKind>> for ProviderRole {
    fn from(kind: Option<ProviderKind>) -> Self {
        kind.map(Self::from).unwrap_or(Self::None)
    }
}

/// Provenance of a verified report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub notes: String,
    pub analyst: ProviderKind,
    pub consultant: ProviderRole,
    pub verifier: ProviderRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualStrategies {
    pub gemini: String,
    pub openai: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ReportVerification {
    Verified(VerificationResult),
    Unverified { reason: String },
}

/// What a message is, independent of its text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageKind {
    Text,
    Report {
        verification: ReportVerification,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strategies: Option<DualStrategies>,
    },
    /// Two raw strategies awaiting a synthesis turn
    DualStrategy { strategies: DualStrategies },
    /// The single message left behind by a failed turn
    PipelineError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudAnchorStatus {
    pub status: AnchorState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firestore_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CloudAnchorStatus {
    pub fn pending() -> Self {
        Self {
            status: AnchorState::Pending,
            storage_path: None,
            firestore_id: None,
            error: None,
        }
    }

    pub fn confirmed(storage_path: String, firestore_id: String) -> Self {
        Self {
            status: AnchorState::Confirmed,
            storage_path: Some(storage_path),
            firestore_id: Some(firestore_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: AnchorState::Failed,
            storage_path: None,
            firestore_id: None,
            error: Some(error.into()),
        }
    }
}

/// Summary encoded into the QR code of a sealed report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrMeta {
    pub created_at: String,
    pub file_count: usize,
    /// First 16 hex characters of the content hash, followed by "..."
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealingMetadata {
    /// SHA-512 of the rendered document bytes
    pub sha512: String,
    /// SHA-512 of the report text
    pub content_hash: String,
    pub qr_meta: QrMeta,
    pub page_count: usize,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_anchor: Option<CloudAnchorStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub author: Author,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<UploadedFile>>,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealing_metadata: Option<SealingMetadata>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(prefix: &str, author: Author, content: String, kind: MessageKind) -> Self {
        Self {
            id: format!("{}-{}", prefix, Uuid::new_v4()),
            author,
            content,
            files: None,
            kind,
            sealing_metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(prompt: impl Into<String>, files: Vec<UploadedFile>) -> Self {
        let mut message = Self::new("user", Author::User, prompt.into(), MessageKind::Text);
        if !files.is_empty() {
            message.files = Some(files);
        }
        message
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", Author::System, content.into(), MessageKind::Text)
    }

    /// Plain AI text that is not a report (greetings, notices)
    pub fn ai_text(content: impl Into<String>) -> Self {
        Self::new("ai", Author::Ai, content.into(), MessageKind::Text)
    }

    pub fn report(content: impl Into<String>, verification: ReportVerification) -> Self {
        Self::new(
            "ai",
            Author::Ai,
            content.into(),
            MessageKind::Report {
                verification,
                strategies: None,
            },
        )
    }

    pub fn dual_strategy(content: impl Into<String>, strategies: DualStrategies) -> Self {
        Self::new(
            "ai",
            Author::Ai,
            content.into(),
            MessageKind::DualStrategy { strategies },
        )
    }

    pub fn pipeline_error(content: impl Into<String>) -> Self {
        Self::new("error", Author::Ai, content.into(), MessageKind::PipelineError)
    }

    pub fn is_report(&self) -> bool {
        matches!(self.kind, MessageKind::Report { .. })
    }

    pub fn verification_result(&self) -> Option<&VerificationResult> {
        match &self.kind {
            MessageKind::Report {
                verification: ReportVerification::Verified(result),
                ..
            } => Some(result),
            _ => None,
        }
    }

    /// Strategies of a pending dual-strategy message or of the report synthesized from one
    pub fn dual_strategies(&self) -> Option<&DualStrategies> {
        match &self.kind {
            MessageKind::DualStrategy { strategies } => Some(strategies),
            MessageKind::Report { strategies, .. } => strategies.as_ref(),
            _ => None,
        }
    }

    pub fn is_pending_dual_strategy(&self) -> bool {
        matches!(self.kind, MessageKind::DualStrategy { .. })
    }
}
