//! In-memory state of the current case: transcript plus evidence.

use super::types::{Author, ChatMessage, UploadedFile};
use crate::ai::FilePayload;
use crate::seal::checksum::sha512_file;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const WELCOME_MESSAGE: &str = "Welcome to Verum Omnis V5. Please upload your case files and ask a question to begin the triple-verified analysis. For example: 'Summarize the attached evidence and highlight any contradictions.'";

pub const CLEARED_MESSAGE: &str = "Case file cleared. You can now begin a new analysis.";

/// Everything the store persists for a case
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CaseSnapshot {
    pub messages: Vec<ChatMessage>,
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Clone)]
pub struct CaseSession {
    pub messages: Vec<ChatMessage>,
    pub files: Vec<UploadedFile>,
}

impl Default for CaseSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseSession {
    /// Fresh case with the greeting message
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::ai_text(WELCOME_MESSAGE)],
            files: Vec::new(),
        }
    }

    pub fn from_snapshot(snapshot: CaseSnapshot) -> Self {
        Self {
            messages: snapshot.messages,
            files: snapshot.files,
        }
    }

    pub fn snapshot(&self) -> CaseSnapshot {
        CaseSnapshot {
            messages: self.messages.clone(),
            files: self.files.clone(),
        }
    }

    /// Attach files from disk and post a system notice. Returns how many were added.
    ///
    /// A file already on record (same name and modification time) is not
    /// added twice; its record gets the source back instead.
    pub fn add_files(&mut self, paths: &[PathBuf]) -> std::io::Result<usize> {
        let mut incoming = Vec::with_capacity(paths.len());
        for path in paths {
            incoming.push(UploadedFile::from_path(path)?);
        }

        let mut added: Vec<UploadedFile> = Vec::with_capacity(incoming.len());
        for file in incoming {
            match self.files.iter_mut().find(|f| f.id == file.id) {
                Some(known) => {
                    tracing::debug!(file = %known.name, "Reattached evidence source");
                    known.path = file.path;
                }
                None if added.iter().any(|f| f.id == file.id) => {}
                None => added.push(file),
            }
        }

        let count = added.len();
        if count == 0 {
            return Ok(0);
        }

        tracing::info!(count, "Files added to case");
        self.files.extend(added);
        self.messages.push(ChatMessage::system(format!(
            "{} file(s) added to case. Ready for analysis.",
            count
        )));
        Ok(count)
    }

    /// Compute SHA-512 for every file that has a source and no hash yet.
    ///
    /// Hashing runs on the blocking pool; a file that fails to hash keeps an
    /// empty hash slot and is retried on the next call.
    pub async fn hash_pending_files(&mut self) -> usize {
        let pending: Vec<(usize, PathBuf)> = self
            .files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.sha512.is_none())
            .filter_map(|(i, f)| f.path.clone().map(|p| (i, p)))
            .collect();

        let handles: Vec<_> = pending
            .into_iter()
            .map(|(index, path)| {
                tokio::task::spawn_blocking(move || (index, sha512_file(&path)))
            })
            .collect();

        let mut hashed = 0;
        for handle in futures::future::join_all(handles).await {
            match handle {
                Ok((index, Ok(hash))) => {
                    if let Some(file) = self.files.get_mut(index) {
                        file.sha512 = Some(hash);
                        hashed += 1;
                    }
                }
                Ok((index, Err(e))) => {
                    let name = self.files.get(index).map(|f| f.name.as_str()).unwrap_or("?");
                    tracing::warn!(file = name, error = %e, "Failed to hash evidence file");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Hashing task panicked");
                }
            }
        }
        hashed
    }

    /// Read every file with a source into an inline payload for this turn.
    ///
    /// Records restored from the store have no bytes and are left out.
    pub async fn load_payloads(&self) -> Vec<FilePayload> {
        let engine = base64::engine::general_purpose::STANDARD;
        let mut payloads = Vec::with_capacity(self.files.len());

        for file in &self.files {
            let Some(path) = &file.path else {
                tracing::debug!(file = %file.name, "No source bytes, not sent to providers");
                continue;
            };
            match tokio::fs::read(path).await {
                Ok(bytes) => payloads.push(FilePayload {
                    name: file.name.clone(),
                    mime_type: file.mime_type.clone(),
                    file_type: file.file_type,
                    base64: engine.encode(bytes),
                }),
                Err(e) => {
                    tracing::warn!(file = %file.name, error = %e, "Failed to read evidence file");
                }
            }
        }
        payloads
    }

    /// Start over with an empty case
    pub fn clear(&mut self) {
        self.files.clear();
        self.messages = vec![ChatMessage::ai_text(CLEARED_MESSAGE)];
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Index of the most recent AI message
    pub fn last_ai_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|m| m.author == Author::Ai)
    }

    /// Most recent report, the default target for sealing
    pub fn latest_report(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.is_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::types::MessageKind;
    use crate::seal::checksum::sha512_hex;
    use tempfile::TempDir;

    fn write(temp: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = temp.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_new_session_greets() {
        let session = CaseSession::new();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].author, Author::Ai);
        assert_eq!(session.messages[0].kind, MessageKind::Text);
    }

    #[test]
    fn test_add_files_posts_notice() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.txt", b"a");
        let b = write(&temp, "b.jpg", b"b");

        let mut session = CaseSession::new();
        assert_eq!(session.add_files(&[a, b]).unwrap(), 2);
        assert_eq!(session.files.len(), 2);

        let notice = session.messages.last().unwrap();
        assert_eq!(notice.author, Author::System);
        assert_eq!(notice.content, "2 file(s) added to case. Ready for analysis.");
    }

    #[test]
    fn test_add_files_is_all_or_nothing() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.txt", b"a");

        let mut session = CaseSession::new();
        assert!(session.add_files(&[a, temp.path().join("missing")]).is_err());
        assert!(session.files.is_empty());
    }

    #[tokio::test]
    async fn test_hash_pending_files() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.txt", b"evidence");

        let mut session = CaseSession::new();
        session.add_files(&[a]).unwrap();
        assert!(session.files[0].sha512.is_none());

        assert_eq!(session.hash_pending_files().await, 1);
        assert_eq!(session.files[0].sha512.as_deref(), Some(sha512_hex(b"evidence").as_str()));

        // Already hashed
        assert_eq!(session.hash_pending_files().await, 0);
    }

    #[tokio::test]
    async fn test_restored_files_are_not_rehashed_or_sent() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.txt", b"evidence");

        let mut session = CaseSession::new();
        session.add_files(&[a]).unwrap();

        let json = serde_json::to_string(&session.snapshot()).unwrap();
        let mut restored = CaseSession::from_snapshot(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.hash_pending_files().await, 0);
        assert!(restored.load_payloads().await.is_empty());
    }

    #[tokio::test]
    async fn test_reattaching_restores_source() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.txt", b"evidence");

        let mut session = CaseSession::new();
        session.add_files(&[a.clone()]).unwrap();
        session.hash_pending_files().await;

        let json = serde_json::to_string(&session.snapshot()).unwrap();
        let mut restored = CaseSession::from_snapshot(serde_json::from_str(&json).unwrap());
        let messages = restored.messages.len();

        assert_eq!(restored.add_files(&[a.clone(), a]).unwrap(), 0);
        assert_eq!(restored.files.len(), 1);
        assert_eq!(restored.messages.len(), messages);
        assert!(restored.files[0].has_source());
        assert_eq!(restored.files[0].sha512, session.files[0].sha512);
        assert_eq!(restored.load_payloads().await.len(), 1);
    }

    #[tokio::test]
    async fn test_load_payloads_encodes_base64() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.txt", b"hello");

        let mut session = CaseSession::new();
        session.add_files(&[a]).unwrap();

        let payloads = session.load_payloads().await;
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].base64, "aGVsbG8=");
        assert_eq!(payloads[0].mime_type, "text/plain");
    }

    #[test]
    fn test_clear_resets_case() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.txt", b"a");

        let mut session = CaseSession::new();
        session.add_files(&[a]).unwrap();
        session.clear();

        assert!(session.files.is_empty());
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].content, CLEARED_MESSAGE);
    }
}
