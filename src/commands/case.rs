use super::AppState;
use crate::ai::Location;
use crate::case::{CaseSnapshot, TurnIntent, TurnOutcome, TurnRequest};
use crate::error::PipelineError;
use crate::seal::email::{open_uri, SubmissionEmail, DEFAULT_RECIPIENT};
use crate::seal::{seal_message, SealOutcome};
use chrono::Utc;
use std::path::PathBuf;

/// Arguments of a "send prompt" action
#[derive(Debug, Clone, Default)]
pub struct SendMessage {
    pub prompt: String,
    pub complex: bool,
    pub intent: TurnIntent,
    pub location: Option<Location>,
    /// Evidence to attach (or reattach) before the turn runs
    pub files: Vec<PathBuf>,
}

/// Run one turn and persist the transcript, including a failure message
pub async fn send_message(state: &AppState, args: SendMessage) -> Result<TurnOutcome, String> {
    if args.prompt.trim().is_empty() {
        return Err("Prompt is empty".to_string());
    }

    // A second send while a turn runs is rejected, not queued
    let mut session = state
        .session
        .try_lock()
        .map_err(|_| PipelineError::TurnInFlight.to_string())?;

    if !args.files.is_empty() {
        session.add_files(&args.files).map_err(|e| e.to_string())?;
        session.hash_pending_files().await;
    }

    let request = TurnRequest::new(args.prompt)
        .complex(args.complex)
        .intent(args.intent)
        .location(args.location);
    let result = state.orchestrator.run_turn(&mut session, request).await;

    state.persist(&session);
    result.map_err(|e| e.to_string())
}

/// Attach evidence files to the case and hash them while their bytes are at hand
pub async fn add_files(state: &AppState, paths: Vec<PathBuf>) -> Result<usize, String> {
    let mut session = state.session.lock().await;
    let added = session.add_files(&paths).map_err(|e| e.to_string())?;
    session.hash_pending_files().await;
    state.persist(&session);
    Ok(added)
}

/// Seal a report (the latest one unless `message_id` is given) and export it
pub async fn seal_report(
    state: &AppState,
    message_id: Option<String>,
) -> Result<SealOutcome, String> {
    let mut session = state.session.lock().await;
    let id = match message_id {
        Some(id) => id,
        None => session
            .latest_report()
            .map(|m| m.id.clone())
            .ok_or_else(|| "There is no report to seal yet".to_string())?,
    };

    let result = seal_message(
        &mut session,
        &id,
        &state.seal_options,
        state.anchor.as_deref(),
    )
    .await;

    state.persist(&session);
    result.map_err(|e| e.to_string())
}

/// A sealed report plus the draft that submits it
#[derive(Debug, Clone)]
pub struct EmailDraft {
    pub sealed: SealOutcome,
    pub email: SubmissionEmail,
    pub mailto: String,
}

/// Seal, then compose the submission email. With `open`, the draft is handed
/// to the default mail client.
pub async fn seal_and_email(
    state: &AppState,
    message_id: Option<String>,
    recipient: Option<String>,
    open: bool,
) -> Result<EmailDraft, String> {
    let sealed = seal_report(state, message_id).await?;

    let names: Vec<String> = {
        let session = state.session.lock().await;
        session.files.iter().map(|f| f.name.clone()).collect()
    };
    let email = SubmissionEmail::new(
        recipient.as_deref().unwrap_or(DEFAULT_RECIPIENT),
        &sealed.sha512,
        Utc::now(),
        &names,
    );
    let mailto = email.mailto_uri();

    if open {
        open_uri(&mailto).map_err(|e| format!("Failed to open mail client: {}", e))?;
        tracing::info!(recipient = %email.recipient, "Opened submission email");
    }

    Ok(EmailDraft {
        sealed,
        email,
        mailto,
    })
}

/// Drop the current case, in memory and on disk
pub async fn clear_case(state: &AppState) -> Result<(), String> {
    let mut session = state.session.lock().await;
    state.store.clear().map_err(|e| e.to_string())?;
    session.clear();
    state.persist(&session);
    Ok(())
}

pub async fn get_case(state: &AppState) -> CaseSnapshot {
    state.session.lock().await.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{
        AnalysisProvider, AnalysisRequest, ProviderKind, ProviderSet,
    };
    use crate::case::{Orchestrator, OrchestratorConfig, TurnBranch};
    use crate::error::ProviderError;
    use crate::seal::SealOptions;
    use crate::store::{CaseStore, SqliteCaseStore};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Echo(ProviderKind);

    #[async_trait]
    impl AnalysisProvider for Echo {
        fn kind(&self) -> ProviderKind {
            self.0
        }

        async fn chat(&self, prompt: &str, _: Option<Location>) -> Result<String, ProviderError> {
            Ok(format!("re: {}", prompt))
        }

        async fn analyze(&self, _: &AnalysisRequest) -> Result<String, ProviderError> {
            Ok("## Findings\nHash: [Placeholder]".to_string())
        }

        async fn verify(&self, _: &AnalysisRequest, _: &str) -> Result<String, ProviderError> {
            Ok("Consistent with evidence".to_string())
        }
    }

    fn state(temp: &TempDir) -> AppState {
        state_with(temp, Arc::new(SqliteCaseStore::open_in_memory().unwrap()))
    }

    /// A fresh process over the case database at `db`
    fn reopened(temp: &TempDir, db: &std::path::Path) -> AppState {
        let state = state_with(temp, Arc::new(SqliteCaseStore::open(db).unwrap()));
        state.restore().unwrap();
        state
    }

    fn state_with(temp: &TempDir, store: Arc<dyn CaseStore>) -> AppState {
        let providers = ProviderSet::new()
            .with(Arc::new(Echo(ProviderKind::Gemini)))
            .with(Arc::new(Echo(ProviderKind::OpenAi)));
        AppState::new(
            Orchestrator::new(providers, OrchestratorConfig::default()),
            store,
            None,
            SealOptions {
                export_dir: temp.path().join("exports"),
                file_prefix: "Report".to_string(),
                app_version: "test".to_string(),
            },
        )
    }

    fn send(prompt: &str) -> SendMessage {
        SendMessage {
            prompt: prompt.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_send_message_persists_transcript() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp);

        let outcome = send_message(&state, send("hello")).await.unwrap();
        assert_eq!(outcome.branch, TurnBranch::Chat);

        let stored = state.store.load().unwrap().unwrap();
        assert_eq!(stored.messages.len(), 3);
        assert_eq!(stored.messages[2].content, "re: hello");
    }

    #[tokio::test]
    async fn test_evidence_carries_across_runs() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("case.db");
        let evidence = temp.path().join("lease.png");
        std::fs::write(&evidence, b"lease scan").unwrap();
        let digest = crate::seal::checksum::sha512_hex(b"lease scan");

        {
            let first = reopened(&temp, &db);
            assert_eq!(add_files(&first, vec![evidence.clone()]).await.unwrap(), 1);
        }

        // Hashed at attach time, so the restored record keeps it
        let second = reopened(&temp, &db);
        let restored = get_case(&second).await;
        assert_eq!(restored.files[0].sha512.as_deref(), Some(digest.as_str()));
        assert!(restored.files[0].path.is_none());
        drop(second);

        let third = reopened(&temp, &db);
        let outcome = send_message(
            &third,
            SendMessage {
                files: vec![evidence],
                ..send("Analyze the lease")
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome.branch, TurnBranch::Analysis);
        assert_eq!(get_case(&third).await.files.len(), 1);
        drop(third);

        let fourth = reopened(&temp, &db);
        let sealed = seal_report(&fourth, None).await.unwrap();
        assert!(sealed.path.exists());
        let case = get_case(&fourth).await;
        assert_eq!(case.files[0].sha512.as_deref(), Some(digest.as_str()));
        let report = case.messages.iter().find(|m| m.id == outcome.message_id).unwrap();
        assert_eq!(report.sealing_metadata.as_ref().unwrap().qr_meta.file_count, 1);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp);
        assert!(send_message(&state, send("   ")).await.is_err());
        assert_eq!(get_case(&state).await.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_seal_and_email_latest_report() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp);
        let evidence = temp.path().join("lease.txt");
        std::fs::write(&evidence, b"lease terms").unwrap();

        assert_eq!(add_files(&state, vec![evidence]).await.unwrap(), 1);
        let outcome = send_message(&state, send("Analyze the lease")).await.unwrap();
        assert_eq!(outcome.branch, TurnBranch::Analysis);

        let draft = seal_and_email(&state, None, None, false).await.unwrap();
        assert!(draft.sealed.path.exists());
        assert!(draft.mailto.starts_with("mailto:submissions@verum-foundation.org"));
        assert!(draft.email.body.contains(&draft.sealed.sha512));
        assert!(draft.email.body.contains("lease.txt"));

        let stored = state.store.load().unwrap().unwrap();
        let report = stored.messages.iter().find(|m| m.id == outcome.message_id).unwrap();
        assert!(report.sealing_metadata.is_some());
    }

    #[tokio::test]
    async fn test_seal_without_report_fails() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp);
        let err = seal_report(&state, None).await.unwrap_err();
        assert!(err.contains("no report"));
    }

    #[tokio::test]
    async fn test_clear_case_resets_and_persists() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp);
        send_message(&state, send("hello")).await.unwrap();

        clear_case(&state).await.unwrap();

        let snapshot = get_case(&state).await;
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(
            snapshot.messages[0].content,
            crate::case::session::CLEARED_MESSAGE
        );
        assert_eq!(state.store.load().unwrap().unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_restore_loads_stored_case() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp);
        send_message(&state, send("hello")).await.unwrap();

        let saved = state.store.load().unwrap().unwrap();
        *state.session.lock().await = crate::case::CaseSession::new();

        assert!(state.restore().unwrap());
        assert_eq!(get_case(&state).await, saved);
    }
}
