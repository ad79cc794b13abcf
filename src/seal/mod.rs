//! Sealing: hash evidence, render the report to a QR-stamped PDF, export it,
//! and optionally anchor a copy remotely.

pub mod anchor;
pub mod checksum;
pub mod email;
pub mod layout;
pub mod pdf;
pub mod qr;

pub use anchor::{anchor_status, AnchorReceipt, AnchorUpload, CloudAnchor, FirebaseAnchor, FirebaseConfig};
pub use email::SubmissionEmail;
pub use pdf::{render_sealed_document, Evidence, SealInput, SealedDocument};

use crate::case::{Author, CaseSession, CloudAnchorStatus, SealingMetadata};
use crate::error::SealError;
use chrono::{Local, Offset, Utc};
use std::path::PathBuf;

pub const REPORT_TITLE: &str = "Sealed Forensic Report";

#[derive(Debug, Clone)]
pub struct SealOptions {
    pub export_dir: PathBuf,
    pub file_prefix: String,
    pub app_version: String,
}

/// Where a sealed report ended up
#[derive(Debug, Clone)]
pub struct SealOutcome {
    pub path: PathBuf,
    pub file_name: String,
    pub sha512: String,
    pub page_count: usize,
    pub cloud_anchor: Option<CloudAnchorStatus>,
}

/// Seal a report message of `session`.
///
/// The local export always completes first; the cloud anchor runs afterwards
/// and its outcome, success or failure, is stored on the message.
pub async fn seal_message(
    session: &mut CaseSession,
    message_id: &str,
    options: &SealOptions,
    anchor: Option<&dyn CloudAnchor>,
) -> Result<SealOutcome, SealError> {
    session.hash_pending_files().await;

    let index = session
        .messages
        .iter()
        .position(|m| m.id == message_id)
        .ok_or_else(|| SealError::MessageNotFound(message_id.to_string()))?;
    if !session.messages[index].is_report() {
        return Err(SealError::NotAReport(message_id.to_string()));
    }

    let created_at = Utc::now();
    let input = SealInput {
        title: REPORT_TITLE.to_string(),
        report: session.messages[index].content.clone(),
        evidence: session
            .files
            .iter()
            .map(|f| Evidence {
                name: f.name.clone(),
                sha512: f.sha512.clone(),
            })
            .collect(),
        created_at,
        local_offset: Local::now().offset().fix(),
        app_version: options.app_version.clone(),
    };

    // Rendering is CPU-bound
    let sealed = tokio::task::spawn_blocking(move || render_sealed_document(&input))
        .await
        .map_err(|e| SealError::Task(e.to_string()))??;

    let file_name = pdf::export_file_name(&options.file_prefix, created_at);
    let path = pdf::write_export(&options.export_dir, &file_name, &sealed.bytes).await?;

    let message = &mut session.messages[index];
    message.content = sealed.content.clone();
    message.sealing_metadata = Some(SealingMetadata {
        sha512: sealed.sha512.clone(),
        content_hash: sealed.content_hash.clone(),
        qr_meta: sealed.qr_meta.clone(),
        page_count: sealed.page_count,
        file_name: file_name.clone(),
        cloud_anchor: anchor.map(|_| CloudAnchorStatus::pending()),
    });

    let cloud_anchor = match anchor {
        Some(anchor) => {
            let upload = AnchorUpload {
                file_name: file_name.clone(),
                bytes: sealed.bytes,
                hash: sealed.sha512.clone(),
                original_prompt: prompt_before(session, index).unwrap_or_default(),
                file_count: session.files.len(),
                created_at,
            };
            let status = anchor_status(anchor, &upload).await;
            if let Some(metadata) = session.messages[index].sealing_metadata.as_mut() {
                metadata.cloud_anchor = Some(status.clone());
            }
            Some(status)
        }
        None => None,
    };

    Ok(SealOutcome {
        path,
        file_name,
        sha512: sealed.sha512,
        page_count: sealed.page_count,
        cloud_anchor,
    })
}

/// The user prompt that led to the message at `index`
fn prompt_before(session: &CaseSession, index: usize) -> Option<String> {
    session.messages[..index]
        .iter()
        .rev()
        .find(|m| m.author == Author::User)
        .map(|m| m.content.clone())
}
