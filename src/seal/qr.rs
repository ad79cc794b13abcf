//! QR metadata payload and its vector drawing.

use super::checksum::short_hash;
use crate::case::QrMeta;
use crate::error::SealError;
use lopdf::content::Operation;
use lopdf::Object;
use qrcode::types::QrError;
use qrcode::{Color, EcLevel, QrCode};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceEntry {
    pub name: String,
    pub sha512: Option<String>,
}

/// JSON encoded into the QR code of a sealed report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub created_at: String,
    pub file_count: usize,
    /// Shortened content hash
    pub hash: String,
    pub page_count: usize,
    pub app_version: String,
    pub evidence: Vec<EvidenceEntry>,
}

impl QrPayload {
    pub fn meta(&self) -> QrMeta {
        QrMeta {
            created_at: self.created_at.clone(),
            file_count: self.file_count,
            hash: self.hash.clone(),
        }
    }

    /// Same payload with evidence hashes shortened, for cases with many files
    fn compact(&self) -> Self {
        let mut compact = self.clone();
        for entry in &mut compact.evidence {
            entry.sha512 = entry.sha512.as_deref().map(short_hash);
        }
        compact
    }

    /// Counts and content hash only; the per-file list stays in the document body
    fn summary(&self) -> Self {
        Self {
            evidence: Vec::new(),
            ..self.clone()
        }
    }
}

/// Dark/light module grid, row-major from the top-left
#[derive(Debug, Clone, PartialEq)]
pub struct QrMatrix {
    pub width: usize,
    pub dark: Vec<bool>,
}

fn matrix(data: &[u8]) -> Result<QrMatrix, QrError> {
    let code = QrCode::with_error_correction_level(data, EcLevel::M)?;
    Ok(QrMatrix {
        width: code.width(),
        dark: code
            .to_colors()
            .into_iter()
            .map(|c| c == Color::Dark)
            .collect(),
    })
}

/// Encode the payload in the richest form that fits: full evidence hashes,
/// then shortened hashes, then the summary alone
pub fn encode(payload: &QrPayload) -> Result<QrMatrix, SealError> {
    encode_fitting(payload).map(|(matrix, _)| matrix)
}

fn encode_fitting(payload: &QrPayload) -> Result<(QrMatrix, Vec<u8>), SealError> {
    for candidate in [payload.clone(), payload.compact()] {
        let data = serde_json::to_vec(&candidate)?;
        match matrix(&data) {
            Ok(matrix) => return Ok((matrix, data)),
            Err(QrError::DataTooLong) => {
                tracing::debug!(bytes = data.len(), "QR payload too long, reducing");
            }
            Err(e) => return Err(e.into()),
        }
    }
    let data = serde_json::to_vec(&payload.summary())?;
    Ok((matrix(&data)?, data))
}

/// Filled rectangles drawing `matrix` into a `size` square at (`x`, `y`)
pub fn draw_operations(matrix: &QrMatrix, x: f32, y: f32, size: f32) -> Vec<Operation> {
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("g", vec![Object::Real(0.0)]),
    ];
    if matrix.width == 0 {
        ops.push(Operation::new("Q", vec![]));
        return ops;
    }

    let module = size / matrix.width as f32;
    for (index, dark) in matrix.dark.iter().enumerate() {
        if !dark {
            continue;
        }
        let row = index / matrix.width;
        let col = index % matrix.width;
        // PDF space grows upwards
        let left = x + col as f32 * module;
        let bottom = y + (matrix.width - 1 - row) as f32 * module;
        ops.push(Operation::new(
            "re",
            vec![
                Object::Real(left.into()),
                Object::Real(bottom.into()),
                Object::Real(module.into()),
                Object::Real(module.into()),
            ],
        ));
    }
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new("Q", vec![]));
    ops
}
