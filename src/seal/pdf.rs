//! Sealed PDF Rendering
//!
//! `render_sealed_document` is a pure function of its input: the creation
//! time is part of the input, and the PDF carries no other clock or random
//! data, so equal inputs give byte-identical documents and hashes.

use super::checksum::{sha512_hex, short_hash};
use super::layout::{
    layout_document, DocumentLayout, EvidenceLine, FontStyle, LayoutInput, PAGE_HEIGHT,
    PAGE_WIDTH, QR_SIZE, QR_X, QR_Y,
};
use super::qr::{self, EvidenceEntry, QrPayload};
use crate::case::QrMeta;
use crate::error::SealError;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::path::{Path, PathBuf};

const REGULAR_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";

/// Template markers a report may contain, with what replaces them
const HASH_PLACEHOLDERS: [&str; 3] = [
    "[Placeholder for SHA-512 hash of this report]",
    "[SHA-512 Placeholder]",
    "[Placeholder]",
];
const TIMESTAMP_PLACEHOLDER: &str = "[Timestamp]";
const FILE_COUNT_PLACEHOLDER: &str = "[Number of files analyzed]";

#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub name: String,
    /// Missing while hashing is still pending
    pub sha512: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SealInput {
    pub title: String,
    pub report: String,
    pub evidence: Vec<Evidence>,
    pub created_at: DateTime<Utc>,
    /// Offset used for the "local" timestamp line
    pub local_offset: FixedOffset,
    pub app_version: String,
}

impl SealInput {
    pub fn created_at_iso(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[derive(Debug, Clone)]
pub struct SealedDocument {
    pub bytes: Vec<u8>,
    /// SHA-512 of `bytes`
    pub sha512: String,
    /// SHA-512 of the report text as it was before substitution
    pub content_hash: String,
    pub page_count: usize,
    pub qr_meta: QrMeta,
    /// Report text with placeholders filled in
    pub content: String,
}

/// Fill the sealing placeholders of a report
pub fn substitute_placeholders(
    report: &str,
    content_hash: &str,
    created_at: &str,
    file_count: usize,
) -> String {
    let mut text = report.to_string();
    // Longest markers first so "[Placeholder]" never eats part of a longer one
    for marker in HASH_PLACEHOLDERS {
        text = text.replace(marker, content_hash);
    }
    text.replace(TIMESTAMP_PLACEHOLDER, created_at)
        .replace(FILE_COUNT_PLACEHOLDER, &file_count.to_string())
}

pub fn render_sealed_document(input: &SealInput) -> Result<SealedDocument, SealError> {
    let content_hash = sha512_hex(input.report.as_bytes());
    let created_at = input.created_at_iso();
    let file_count = input.evidence.len();
    let content = substitute_placeholders(&input.report, &content_hash, &created_at, file_count);

    // Footer carries the primary evidence hash, or the report's own when there is none
    let footer_hash = input
        .evidence
        .first()
        .and_then(|e| e.sha512.as_deref())
        .unwrap_or(&content_hash);
    let footer = format!(
        "\u{2122} Patent Pending Verum Omnis | Evidence Hash: {}",
        short_hash(footer_hash)
    );

    let local = input.created_at.with_timezone(&input.local_offset);
    let evidence_lines: Vec<EvidenceLine> = input
        .evidence
        .iter()
        .map(|e| EvidenceLine {
            name: e.name.clone(),
            sha512: e.sha512.clone(),
        })
        .collect();

    // Page count does not depend on the metadata values, only on their number
    let mut metadata = metadata_lines(input, &local.to_rfc2822(), &created_at, 0, &content_hash);
    let first_pass = layout_document(&LayoutInput {
        title: &input.title,
        report: &content,
        evidence: &evidence_lines,
        metadata: &metadata,
        footer: &footer,
    });
    let page_count = first_pass.page_count();
    metadata = metadata_lines(input, &local.to_rfc2822(), &created_at, page_count, &content_hash);
    let layout = layout_document(&LayoutInput {
        title: &input.title,
        report: &content,
        evidence: &evidence_lines,
        metadata: &metadata,
        footer: &footer,
    });

    let payload = QrPayload {
        created_at: created_at.clone(),
        file_count,
        hash: short_hash(&content_hash),
        page_count: layout.page_count(),
        app_version: input.app_version.clone(),
        evidence: input
            .evidence
            .iter()
            .map(|e| EvidenceEntry {
                name: e.name.clone(),
                sha512: e.sha512.clone(),
            })
            .collect(),
    };
    let matrix = qr::encode(&payload)?;

    let bytes = build_pdf(&layout, &matrix, input)?;
    let sha512 = sha512_hex(&bytes);

    tracing::info!(
        pages = layout.page_count(),
        bytes = bytes.len(),
        hash = %short_hash(&sha512),
        "Rendered sealed report"
    );

    Ok(SealedDocument {
        bytes,
        sha512,
        content_hash,
        page_count: layout.page_count(),
        qr_meta: payload.meta(),
        content,
    })
}

fn metadata_lines(
    input: &SealInput,
    local: &str,
    utc: &str,
    page_count: usize,
    content_hash: &str,
) -> Vec<String> {
    vec![
        format!("Local Timestamp: {}", local),
        format!("UTC Timestamp: {}", utc),
        format!("Version: {}", input.app_version),
        format!("Files: {}", input.evidence.len()),
        format!("Page Count: {}", page_count),
        format!("Content SHA-512: {}", content_hash),
    ]
}

fn build_pdf(
    layout: &DocumentLayout,
    matrix: &qr::QrMatrix,
    input: &SealInput,
) -> Result<Vec<u8>, SealError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR_FONT => regular_id,
            BOLD_FONT => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for page in &layout.pages {
        let mut operations = Vec::new();
        for line in &page.lines {
            let font = match line.style {
                FontStyle::Regular => REGULAR_FONT,
                FontStyle::Bold => BOLD_FONT,
            };
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![font.into(), Object::Real(line.size.into())]),
                Operation::new("g", vec![Object::Real(line.gray.into())]),
                Operation::new(
                    "Td",
                    vec![Object::Real(line.x.into()), Object::Real(line.y.into())],
                ),
                Operation::new(
                    "Tj",
                    vec![Object::String(encode_win_ansi(&line.text), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ]);
        }
        if page.has_qr {
            operations.extend(qr::draw_operations(matrix, QR_X, QR_Y, QR_SIZE));
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(PAGE_WIDTH.into()),
                Object::Real(PAGE_HEIGHT.into()),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(input.title.as_str()),
        "Producer" => Object::string_literal(format!("Verum Omnis {}", input.app_version)),
        "CreationDate" => Object::string_literal(
            input.created_at.format("D:%Y%m%d%H%M%SZ").to_string()
        ),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Map text onto the WinAnsi code page of the standard fonts
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u8,
            '\u{20ac}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2122}' => 0x99,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

/// `<prefix>_<unix millis>.pdf`
pub fn export_file_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.pdf", prefix, at.timestamp_millis())
}

/// Write a sealed document into `dir`, creating it if needed
pub async fn write_export(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, SealError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, bytes).await?;
    tracing::info!(path = %path.display(), "Exported sealed report");
    Ok(path)
}
