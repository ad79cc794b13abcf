//! Turn Orchestrator
//!
//! Turns one user prompt into exactly one AI message (or a replaced one, for
//! synthesis). Branches:
//! 1. No files: chat with the analyst, optionally verified
//! 2. Files: analysis (optionally preliminary + consultation + synthesis), then verification
//! 3. Files + complex mode: both providers analyze concurrently into a dual strategy
//! 4. Synthesis intent on a pending dual strategy: merge, verify, replace in place

use super::intent::TurnIntent;
use super::session::CaseSession;
use super::types::{
    ChatMessage, DualStrategies, MessageKind, ProviderRole, ReportVerification,
    VerificationResult,
};
use crate::ai::{
    attempt_in_order, AnalysisRequest, AnalysisStage, FilePayload, Location, OnFailure,
    ProviderKind, ProviderPolicy, ProviderSet, SynthesisInput,
};
use crate::error::{PipelineError, ProviderError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

const CONSULTATION_UNAVAILABLE: &str = "Consultation was not available.";
const CONSULTATION_UNCONFIGURED: &str =
    "Consultation was not available due to missing configuration.";

/// What the UI shows while a turn runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingState {
    #[default]
    Idle,
    Analyzing,
    Consulting,
    Synthesizing,
    Verifying,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Conversational turns without files
    pub chat: ProviderPolicy,
    /// Report production, preliminary analysis and synthesis
    pub analysis: ProviderPolicy,
    pub verification: ProviderPolicy,
    pub consultation: ProviderPolicy,
    /// Run the verification chain on no-file chat turns too
    pub verify_chat_turns: bool,
    /// Preliminary analysis, second opinion, then synthesis instead of a direct report
    pub consult_before_report: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chat: ProviderPolicy::new(vec![ProviderKind::Gemini], OnFailure::Fallback),
            analysis: ProviderPolicy::analysis_default(),
            verification: ProviderPolicy::verification_default(),
            consultation: ProviderPolicy::consultation_default(),
            verify_chat_turns: false,
            consult_before_report: false,
        }
    }
}

/// One "user sends prompt" event
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub prompt: String,
    pub intent: TurnIntent,
    pub complex: bool,
    pub location: Option<Location>,
}

impl TurnRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            intent: TurnIntent::Auto,
            complex: false,
            location: None,
        }
    }

    pub fn complex(mut self, complex: bool) -> Self {
        self.complex = complex;
        self
    }

    pub fn intent(mut self, intent: TurnIntent) -> Self {
        self.intent = intent;
        self
    }

    pub fn location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnBranch {
    Chat,
    Analysis,
    DualStrategy,
    Synthesis,
}

/// Result of a completed turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub branch: TurnBranch,
    /// Id of the message created (or replaced) by this turn
    pub message_id: String,
}

/// Clears the busy flag and resets the loading state however a turn ends
struct TurnGuard<'a> {
    busy: &'a AtomicBool,
    loading: &'a watch::Sender<LoadingState>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.loading.send_replace(LoadingState::Idle);
        self.busy.store(false, Ordering::SeqCst);
    }
}

pub struct Orchestrator {
    providers: ProviderSet,
    config: OrchestratorConfig,
    busy: AtomicBool,
    loading: watch::Sender<LoadingState>,
}

impl Orchestrator {
    pub fn new(providers: ProviderSet, config: OrchestratorConfig) -> Self {
        let (loading, _) = watch::channel(LoadingState::Idle);
        Self {
            providers,
            config,
            busy: AtomicBool::new(false),
            loading,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Observe loading state changes
    pub fn subscribe(&self) -> watch::Receiver<LoadingState> {
        self.loading.subscribe()
    }

    pub fn loading_state(&self) -> LoadingState {
        *self.loading.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn begin_turn(&self) -> Result<TurnGuard<'_>, PipelineError> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| PipelineError::TurnInFlight)?;
        Ok(TurnGuard {
            busy: &self.busy,
            loading: &self.loading,
        })
    }

    fn set_loading(&self, state: LoadingState) {
        tracing::debug!(state = ?state, "Loading state");
        self.loading.send_replace(state);
    }

    /// Run one turn against `session`.
    ///
    /// On a total failure the transcript receives a single error message and
    /// the error is also returned. `TurnInFlight` leaves the transcript untouched.
    pub async fn run_turn(
        &self,
        session: &mut CaseSession,
        request: TurnRequest,
    ) -> Result<TurnOutcome, PipelineError> {
        let _guard = self.begin_turn()?;

        // Only the AI message right before this prompt can be resolved
        let pending_dual = session
            .last_ai_index()
            .filter(|&i| session.messages[i].is_pending_dual_strategy());

        session.push(ChatMessage::user(&request.prompt, session.files.clone()));

        let result = match pending_dual {
            Some(index) if request.intent.wants_synthesis(&request.prompt) => {
                self.synthesis_turn(session, index, &request).await
            }
            _ => self.standard_turn(session, &request).await,
        };

        match result {
            Ok(outcome) => {
                tracing::info!(branch = ?outcome.branch, message_id = %outcome.message_id, "Turn completed");
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                session.push(ChatMessage::pipeline_error(format!(
                    "I'm sorry, a critical error occurred in the AI analysis pipeline. This could be due to network issues or invalid API keys. Please try again.\n\n**Error:** {}",
                    e
                )));
                Err(e)
            }
        }
    }

    async fn standard_turn(
        &self,
        session: &mut CaseSession,
        request: &TurnRequest,
    ) -> Result<TurnOutcome, PipelineError> {
        let files = session.load_payloads().await;

        let (branch, message) = if files.is_empty() {
            (TurnBranch::Chat, self.chat(request).await?)
        } else if request.complex {
            (
                TurnBranch::DualStrategy,
                self.dual_strategy(request, files).await?,
            )
        } else if self.config.consult_before_report {
            (TurnBranch::Analysis, self.consulted_report(request, files).await?)
        } else {
            (TurnBranch::Analysis, self.direct_report(request, files).await?)
        };

        let message_id = message.id.clone();
        session.push(message);
        Ok(TurnOutcome { branch, message_id })
    }

    async fn chat(&self, request: &TurnRequest) -> Result<ChatMessage, PipelineError> {
        self.set_loading(LoadingState::Analyzing);
        let prompt = request.prompt.as_str();
        let location = request.location;

        let (analyst, text) = attempt_in_order("chat", &self.providers, &self.config.chat, |p| {
            async move { p.chat(prompt, location).await }
        })
        .await?
        .required("chat")?;

        let verification = if self.config.verify_chat_turns {
            let snapshot = self.snapshot(request, Vec::new(), AnalysisStage::Report, false);
            self.verify(&snapshot, &text, analyst, ProviderRole::None)
                .await?
        } else {
            ReportVerification::Unverified {
                reason: "Conversational turns without evidence are not verified.".to_string(),
            }
        };

        Ok(ChatMessage::report(text, verification))
    }

    async fn direct_report(
        &self,
        request: &TurnRequest,
        files: Vec<FilePayload>,
    ) -> Result<ChatMessage, PipelineError> {
        self.set_loading(LoadingState::Analyzing);
        let snapshot = self.snapshot(request, files, AnalysisStage::Report, false);

        let (analyst, report) = self.analyze("analysis", &snapshot).await?;
        let verification = self
            .verify(&snapshot, &report, analyst, ProviderRole::None)
            .await?;

        Ok(ChatMessage::report(report, verification))
    }

    async fn consulted_report(
        &self,
        request: &TurnRequest,
        files: Vec<FilePayload>,
    ) -> Result<ChatMessage, PipelineError> {
        self.set_loading(LoadingState::Analyzing);
        let preliminary_request = self.snapshot(request, files, AnalysisStage::Preliminary, false);
        let (analyst, preliminary) = self
            .analyze("preliminary analysis", &preliminary_request)
            .await?;

        self.set_loading(LoadingState::Consulting);
        let consultation = attempt_in_order(
            "consultation",
            &self.providers,
            &self.config.consultation,
            |p| {
                let req = &preliminary_request;
                let prelim = preliminary.as_str();
                async move { p.consult(req, prelim).await }
            },
        )
        .await?;

        let (consultant, advice) = match consultation.value {
            Some((kind, advice)) => (ProviderRole::from(kind), advice),
            None => {
                let unconfigured = consultation
                    .failures
                    .iter()
                    .all(ProviderError::is_missing_credential);
                let note = if unconfigured {
                    CONSULTATION_UNCONFIGURED
                } else {
                    CONSULTATION_UNAVAILABLE
                };
                tracing::warn!(failures = consultation.failures.len(), "Proceeding without consultation");
                (ProviderRole::None, note.to_string())
            }
        };

        self.set_loading(LoadingState::Synthesizing);
        let report_request = AnalysisRequest {
            stage: AnalysisStage::Report,
            ..preliminary_request
        };
        let input = SynthesisInput::Consultation {
            preliminary,
            consultant_advice: advice,
        };
        // The analyst merges its own preliminary findings
        let policy = ProviderPolicy::new(vec![analyst], OnFailure::Fallback);
        let (analyst, report) = self.synthesize(&policy, &report_request, &input).await?;

        let verification = self
            .verify(&report_request, &report, analyst, consultant)
            .await?;
        Ok(ChatMessage::report(report, verification))
    }

    async fn dual_strategy(
        &self,
        request: &TurnRequest,
        files: Vec<FilePayload>,
    ) -> Result<ChatMessage, PipelineError> {
        self.set_loading(LoadingState::Analyzing);
        let snapshot = self.snapshot(request, files, AnalysisStage::Preliminary, true);

        let (gemini, openai) = futures::join!(
            self.analyze_with(ProviderKind::Gemini, &snapshot),
            self.analyze_with(ProviderKind::OpenAi, &snapshot)
        );

        let strategies = match (gemini, openai) {
            (Err(a), Err(b)) => {
                return Err(PipelineError::AllProvidersFailed {
                    step: "dual analysis",
                    failures: vec![a, b],
                });
            }
            (gemini, openai) => DualStrategies {
                gemini: gemini.unwrap_or_else(|e| failure_notice(&e)),
                openai: openai.unwrap_or_else(|e| failure_notice(&e)),
            },
        };

        Ok(ChatMessage::dual_strategy(
            format_dual_strategies(&strategies),
            strategies,
        ))
    }

    async fn synthesis_turn(
        &self,
        session: &mut CaseSession,
        index: usize,
        request: &TurnRequest,
    ) -> Result<TurnOutcome, PipelineError> {
        let pending = match &session.messages[index].kind {
            MessageKind::DualStrategy { strategies } => Some(strategies.clone()),
            _ => None,
        };
        let Some(strategies) = pending else {
            return self.standard_turn(session, request).await;
        };

        self.set_loading(LoadingState::Synthesizing);
        let files = session.load_payloads().await;
        let snapshot = self.snapshot(request, files, AnalysisStage::Report, request.complex);
        let input = SynthesisInput::DualStrategies {
            gemini: strategies.gemini.clone(),
            openai: strategies.openai.clone(),
        };

        let (analyst, report) = self
            .synthesize(&self.config.analysis, &snapshot, &input)
            .await?;
        let verification = self
            .verify(&snapshot, &report, analyst, ProviderRole::None)
            .await?;

        let target = &mut session.messages[index];
        target.content = report;
        target.kind = MessageKind::Report {
            verification,
            strategies: Some(strategies),
        };
        target.created_at = Utc::now();

        Ok(TurnOutcome {
            branch: TurnBranch::Synthesis,
            message_id: target.id.clone(),
        })
    }

    fn snapshot(
        &self,
        request: &TurnRequest,
        files: Vec<FilePayload>,
        stage: AnalysisStage,
        deep: bool,
    ) -> AnalysisRequest {
        AnalysisRequest {
            prompt: request.prompt.clone(),
            files,
            stage,
            deep,
            location: request.location,
        }
    }

    async fn analyze(
        &self,
        step: &'static str,
        request: &AnalysisRequest,
    ) -> Result<(ProviderKind, String), PipelineError> {
        attempt_in_order(step, &self.providers, &self.config.analysis, |p| async move {
            p.analyze(request).await
        })
        .await?
        .required(step)
    }

    async fn analyze_with(
        &self,
        kind: ProviderKind,
        request: &AnalysisRequest,
    ) -> Result<String, ProviderError> {
        match self.providers.get(kind) {
            Some(provider) => provider.analyze(request).await,
            None => Err(ProviderError::MissingCredential { provider: kind }),
        }
    }

    async fn synthesize(
        &self,
        policy: &ProviderPolicy,
        request: &AnalysisRequest,
        input: &SynthesisInput,
    ) -> Result<(ProviderKind, String), PipelineError> {
        attempt_in_order("synthesis", &self.providers, policy, |p| async move {
            p.synthesize(request, input).await
        })
        .await?
        .required("synthesis")
    }

    /// Run the verification chain over a finished report.
    ///
    /// When every verifier fails the report is kept and marked unverified;
    /// an `abort` policy fails the turn instead.
    async fn verify(
        &self,
        request: &AnalysisRequest,
        report: &str,
        analyst: ProviderKind,
        consultant: ProviderRole,
    ) -> Result<ReportVerification, PipelineError> {
        self.set_loading(LoadingState::Verifying);
        let result = attempt_in_order(
            "verification",
            &self.providers,
            &self.config.verification,
            |p| async move { p.verify(request, report).await },
        )
        .await?;

        Ok(match result.value {
            Some((verifier, notes)) => ReportVerification::Verified(VerificationResult {
                notes,
                analyst,
                consultant,
                verifier: verifier.into(),
            }),
            None => ReportVerification::Unverified {
                reason: format!(
                    "Verification unavailable: {}",
                    PipelineError::AllProvidersFailed {
                        step: "verification",
                        failures: result.failures,
                    }
                ),
            },
        })
    }
}

fn failure_notice(error: &ProviderError) -> String {
    format!(
        "**{} analysis failed.** {}",
        error.provider().display_name(),
        error
    )
}

fn format_dual_strategies(strategies: &DualStrategies) -> String {
    format!(
        "## Strategy A (Gemini)\n\n{}\n\n---\n\n## Strategy B (OpenAI)\n\n{}\n\n---\n\nReply with \"synthesize\" to merge both strategies into a final, verified report.",
        strategies.gemini, strategies.openai
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AnalysisProvider;
    use crate::case::types::Author;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        op: &'static str,
        files: usize,
        deep: bool,
        stage: Option<AnalysisStage>,
    }

    struct Fake {
        kind: ProviderKind,
        failing: Vec<&'static str>,
        keyless: bool,
        calls: Mutex<Vec<Call>>,
    }

    impl Fake {
        fn new(kind: ProviderKind) -> Arc<Self> {
            Self::build(kind, vec![], false)
        }

        fn failing(kind: ProviderKind, ops: Vec<&'static str>) -> Arc<Self> {
            Self::build(kind, ops, false)
        }

        fn keyless(kind: ProviderKind) -> Arc<Self> {
            Self::build(kind, vec![], true)
        }

        fn build(kind: ProviderKind, failing: Vec<&'static str>, keyless: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                failing,
                keyless,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn ops(&self) -> Vec<&'static str> {
            self.calls().into_iter().map(|c| c.op).collect()
        }

        fn respond(
            &self,
            op: &'static str,
            request: Option<&AnalysisRequest>,
        ) -> Result<String, ProviderError> {
            self.calls.lock().unwrap().push(Call {
                op,
                files: request.map(|r| r.files.len()).unwrap_or(0),
                deep: request.map(|r| r.deep).unwrap_or(false),
                stage: request.map(|r| r.stage),
            });
            if self.keyless {
                return Err(ProviderError::MissingCredential {
                    provider: self.kind,
                });
            }
            if self.failing.contains(&op) {
                return Err(ProviderError::Http {
                    provider: self.kind,
                    status: 500,
                    message: format!("{} exploded", op),
                });
            }
            Ok(format!("{} {}", self.kind, op))
        }
    }

    #[async_trait]
    impl AnalysisProvider for Fake {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn chat(&self, _: &str, _: Option<Location>) -> Result<String, ProviderError> {
            self.respond("chat", None)
        }

        async fn analyze(&self, request: &AnalysisRequest) -> Result<String, ProviderError> {
            self.respond("analyze", Some(request))
        }

        async fn consult(
            &self,
            request: &AnalysisRequest,
            _: &str,
        ) -> Result<String, ProviderError> {
            self.respond("consult", Some(request))
        }

        async fn synthesize(
            &self,
            request: &AnalysisRequest,
            input: &SynthesisInput,
        ) -> Result<String, ProviderError> {
            let text = self.respond("synthesize", Some(request))?;
            Ok(match input {
                SynthesisInput::DualStrategies { gemini, openai } => {
                    format!("{} of [{}] and [{}]", text, gemini, openai)
                }
                SynthesisInput::Consultation {
                    consultant_advice, ..
                } => format!("{} with [{}]", text, consultant_advice),
            })
        }

        async fn verify(&self, request: &AnalysisRequest, _: &str) -> Result<String, ProviderError> {
            self.respond("verify", Some(request))
        }
    }

    fn orchestrator(gemini: Arc<Fake>, openai: Arc<Fake>) -> Orchestrator {
        orchestrator_with(gemini, openai, OrchestratorConfig::default())
    }

    fn orchestrator_with(
        gemini: Arc<Fake>,
        openai: Arc<Fake>,
        config: OrchestratorConfig,
    ) -> Orchestrator {
        Orchestrator::new(ProviderSet::new().with(gemini).with(openai), config)
    }

    fn session_with_file(temp: &TempDir) -> CaseSession {
        let path: PathBuf = temp.path().join("contract.png");
        std::fs::write(&path, b"png bytes").unwrap();
        let mut session = CaseSession::new();
        session.add_files(&[path]).unwrap();
        session
    }

    fn last(session: &CaseSession) -> &ChatMessage {
        session.messages.last().unwrap()
    }

    #[tokio::test]
    async fn test_no_files_chat_never_sends_files() {
        let gemini = Fake::new(ProviderKind::Gemini);
        let openai = Fake::new(ProviderKind::OpenAi);
        let orch = orchestrator(gemini.clone(), openai.clone());
        let mut session = CaseSession::new();

        let outcome = orch
            .run_turn(&mut session, TurnRequest::new("What is a lease?"))
            .await
            .unwrap();

        assert_eq!(outcome.branch, TurnBranch::Chat);
        assert_eq!(gemini.ops(), vec!["chat"]);
        assert!(openai.calls().is_empty());

        let reply = last(&session);
        assert_eq!(reply.content, "gemini chat");
        assert!(matches!(
            reply.kind,
            MessageKind::Report {
                verification: ReportVerification::Unverified { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_chat_verification_is_opt_in_and_fileless() {
        let gemini = Fake::new(ProviderKind::Gemini);
        let openai = Fake::new(ProviderKind::OpenAi);
        let config = OrchestratorConfig {
            verify_chat_turns: true,
            ..OrchestratorConfig::default()
        };
        let orch = orchestrator_with(gemini.clone(), openai.clone(), config);
        let mut session = CaseSession::new();

        orch.run_turn(&mut session, TurnRequest::new("hello"))
            .await
            .unwrap();

        let verify = &openai.calls()[0];
        assert_eq!(verify.op, "verify");
        assert_eq!(verify.files, 0);

        let result = last(&session).verification_result().unwrap();
        assert_eq!(result.analyst, ProviderKind::Gemini);
        assert_eq!(result.verifier, ProviderRole::OpenAi);
        assert_eq!(result.notes, "openai verify");
    }

    #[tokio::test]
    async fn test_direct_analysis_then_verification() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::new(ProviderKind::Gemini);
        let openai = Fake::new(ProviderKind::OpenAi);
        let orch = orchestrator(gemini.clone(), openai.clone());
        let mut session = session_with_file(&temp);

        let outcome = orch
            .run_turn(&mut session, TurnRequest::new("Find contradictions"))
            .await
            .unwrap();

        assert_eq!(outcome.branch, TurnBranch::Analysis);
        assert_eq!(gemini.ops(), vec!["analyze"]);
        assert_eq!(gemini.calls()[0].files, 1);
        assert_eq!(gemini.calls()[0].stage, Some(AnalysisStage::Report));
        assert_eq!(openai.ops(), vec!["verify"]);

        let report = last(&session);
        assert_eq!(report.id, outcome.message_id);
        assert_eq!(report.content, "gemini analyze");
        let result = report.verification_result().unwrap();
        assert_eq!(result.analyst, ProviderKind::Gemini);
        assert_eq!(result.consultant, ProviderRole::None);
        assert_eq!(result.verifier, ProviderRole::OpenAi);
    }

    #[tokio::test]
    async fn test_analysis_falls_back_to_second_provider() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::failing(ProviderKind::Gemini, vec!["analyze"]);
        let openai = Fake::new(ProviderKind::OpenAi);
        let orch = orchestrator(gemini, openai.clone());
        let mut session = session_with_file(&temp);

        orch.run_turn(&mut session, TurnRequest::new("Analyze"))
            .await
            .unwrap();

        assert_eq!(openai.ops(), vec!["analyze", "verify"]);
        let result = last(&session).verification_result().unwrap();
        assert_eq!(result.analyst, ProviderKind::OpenAi);
    }

    #[tokio::test]
    async fn test_verifier_falls_back_to_first_provider() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::new(ProviderKind::Gemini);
        let openai = Fake::keyless(ProviderKind::OpenAi);
        let orch = orchestrator(gemini.clone(), openai);
        let mut session = session_with_file(&temp);

        orch.run_turn(&mut session, TurnRequest::new("Analyze"))
            .await
            .unwrap();

        assert_eq!(gemini.ops(), vec!["analyze", "verify"]);
        let result = last(&session).verification_result().unwrap();
        assert_eq!(result.verifier, ProviderRole::Gemini);
    }

    #[tokio::test]
    async fn test_failed_verification_marks_report_unverified() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::failing(ProviderKind::Gemini, vec!["verify"]);
        let openai = Fake::failing(ProviderKind::OpenAi, vec!["verify"]);
        let orch = orchestrator(gemini, openai);
        let mut session = session_with_file(&temp);

        orch.run_turn(&mut session, TurnRequest::new("Analyze"))
            .await
            .unwrap();

        let report = last(&session);
        assert!(report.is_report());
        assert!(report.verification_result().is_none());
    }

    #[tokio::test]
    async fn test_consultation_flow_degrades_without_consultant() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::new(ProviderKind::Gemini);
        let openai = Fake::keyless(ProviderKind::OpenAi);
        let config = OrchestratorConfig {
            consult_before_report: true,
            ..OrchestratorConfig::default()
        };
        let orch = orchestrator_with(gemini.clone(), openai, config);
        let mut session = session_with_file(&temp);

        orch.run_turn(&mut session, TurnRequest::new("Analyze"))
            .await
            .unwrap();

        assert_eq!(gemini.ops(), vec!["analyze", "synthesize", "verify"]);
        assert_eq!(gemini.calls()[0].stage, Some(AnalysisStage::Preliminary));

        let report = last(&session);
        assert!(report.content.contains(CONSULTATION_UNCONFIGURED));
        let result = report.verification_result().unwrap();
        assert_eq!(result.consultant, ProviderRole::None);
        assert_eq!(result.verifier, ProviderRole::Gemini);
    }

    #[tokio::test]
    async fn test_consultation_flow_with_consultant() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::new(ProviderKind::Gemini);
        let openai = Fake::new(ProviderKind::OpenAi);
        let config = OrchestratorConfig {
            consult_before_report: true,
            ..OrchestratorConfig::default()
        };
        let orch = orchestrator_with(gemini, openai.clone(), config);
        let mut session = session_with_file(&temp);

        orch.run_turn(&mut session, TurnRequest::new("Analyze"))
            .await
            .unwrap();

        assert_eq!(openai.ops(), vec!["consult", "verify"]);
        let report = last(&session);
        assert!(report.content.contains("[openai consult]"));
        assert_eq!(
            report.verification_result().unwrap().consultant,
            ProviderRole::OpenAi
        );
    }

    #[tokio::test]
    async fn test_complex_mode_tolerates_one_failure() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::failing(ProviderKind::Gemini, vec!["analyze"]);
        let openai = Fake::new(ProviderKind::OpenAi);
        let orch = orchestrator(gemini.clone(), openai.clone());
        let mut session = session_with_file(&temp);

        let outcome = orch
            .run_turn(&mut session, TurnRequest::new("Two views please").complex(true))
            .await
            .unwrap();

        assert_eq!(outcome.branch, TurnBranch::DualStrategy);
        assert!(gemini.calls()[0].deep);
        assert_eq!(openai.calls()[0].stage, Some(AnalysisStage::Preliminary));

        let message = last(&session);
        assert!(message.is_pending_dual_strategy());
        assert!(message.content.contains("openai analyze"));
        assert!(message.content.contains("Gemini analysis failed"));

        let strategies = message.dual_strategies().unwrap();
        assert_eq!(strategies.openai, "openai analyze");
        assert!(strategies.gemini.contains("analyze exploded"));
    }

    #[tokio::test]
    async fn test_complex_mode_both_fail_leaves_one_error() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::failing(ProviderKind::Gemini, vec!["analyze"]);
        let openai = Fake::failing(ProviderKind::OpenAi, vec!["analyze"]);
        let orch = orchestrator(gemini.clone(), openai.clone());
        let mut session = session_with_file(&temp);
        let before = session.messages.len();

        let err = orch
            .run_turn(&mut session, TurnRequest::new("Two views").complex(true))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::AllProvidersFailed { .. }));
        // Both were attempted
        assert_eq!(gemini.ops(), vec!["analyze"]);
        assert_eq!(openai.ops(), vec!["analyze"]);

        let added = &session.messages[before..];
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].author, Author::User);
        assert_eq!(added[1].kind, MessageKind::PipelineError);
        assert_eq!(orch.loading_state(), LoadingState::Idle);
        assert!(!orch.is_busy());
    }

    #[tokio::test]
    async fn test_synthesis_replaces_pending_dual_strategy() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::new(ProviderKind::Gemini);
        let openai = Fake::new(ProviderKind::OpenAi);
        let orch = orchestrator(gemini.clone(), openai.clone());
        let mut session = session_with_file(&temp);

        let dual = orch
            .run_turn(&mut session, TurnRequest::new("Two views").complex(true))
            .await
            .unwrap();
        let count = session.messages.len();

        let outcome = orch
            .run_turn(
                &mut session,
                TurnRequest::new("Now synthesize the final report"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.branch, TurnBranch::Synthesis);
        assert_eq!(outcome.message_id, dual.message_id);
        // Only the user prompt was appended
        assert_eq!(session.messages.len(), count + 1);

        let report = session.message(&dual.message_id).unwrap();
        assert!(report.is_report());
        assert_eq!(
            report.content,
            "gemini synthesize of [gemini analyze] and [openai analyze]"
        );
        assert_eq!(
            report.dual_strategies().map(|s| s.gemini.as_str()),
            Some("gemini analyze")
        );
        assert_eq!(
            report.verification_result().unwrap().verifier,
            ProviderRole::OpenAi
        );
    }

    #[tokio::test]
    async fn test_dual_strategy_stays_pending_without_trigger() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::new(ProviderKind::Gemini);
        let openai = Fake::new(ProviderKind::OpenAi);
        let orch = orchestrator(gemini.clone(), openai);
        let mut session = session_with_file(&temp);

        let dual = orch
            .run_turn(&mut session, TurnRequest::new("Two views").complex(true))
            .await
            .unwrap();
        orch.run_turn(&mut session, TurnRequest::new("Thanks, summarize it"))
            .await
            .unwrap();

        assert!(!gemini.ops().contains(&"synthesize"));
        assert!(session
            .message(&dual.message_id)
            .unwrap()
            .is_pending_dual_strategy());

        // No longer the immediately preceding AI message
        let outcome = orch
            .run_turn(&mut session, TurnRequest::new("synthesize"))
            .await
            .unwrap();
        assert_eq!(outcome.branch, TurnBranch::Analysis);
        assert!(!gemini.ops().contains(&"synthesize"));
    }

    #[tokio::test]
    async fn test_explicit_intent_wins_over_keywords() {
        let temp = TempDir::new().unwrap();
        let gemini = Fake::new(ProviderKind::Gemini);
        let openai = Fake::new(ProviderKind::OpenAi);
        let orch = orchestrator(gemini.clone(), openai);
        let mut session = session_with_file(&temp);

        orch.run_turn(&mut session, TurnRequest::new("Two views").complex(true))
            .await
            .unwrap();
        let outcome = orch
            .run_turn(
                &mut session,
                TurnRequest::new("synthesize").intent(TurnIntent::Analyze),
            )
            .await
            .unwrap();

        assert_eq!(outcome.branch, TurnBranch::Analysis);
    }

    struct Gate {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl AnalysisProvider for Gate {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Gemini
        }

        async fn chat(&self, _: &str, _: Option<Location>) -> Result<String, ProviderError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("done".to_string())
        }

        async fn analyze(&self, _: &AnalysisRequest) -> Result<String, ProviderError> {
            Ok(String::new())
        }

        async fn verify(&self, _: &AnalysisRequest, _: &str) -> Result<String, ProviderError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_turn_guard_rejects_reentry() {
        let gate = Arc::new(Gate {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let orch = Arc::new(Orchestrator::new(
            ProviderSet::new().with(gate.clone()),
            OrchestratorConfig::default(),
        ));
        let mut states = orch.subscribe();

        let first = {
            let orch = orch.clone();
            tokio::spawn(async move {
                let mut session = CaseSession::new();
                orch.run_turn(&mut session, TurnRequest::new("first")).await
            })
        };

        gate.entered.notified().await;
        assert!(orch.is_busy());
        assert_eq!(*states.borrow_and_update(), LoadingState::Analyzing);

        let mut other = CaseSession::new();
        let err = orch
            .run_turn(&mut other, TurnRequest::new("second"))
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::TurnInFlight);
        // Rejected turns leave no trace
        assert_eq!(other.messages.len(), 1);

        gate.release.notify_one();
        first.await.unwrap().unwrap();
        assert!(!orch.is_busy());
        assert_eq!(orch.loading_state(), LoadingState::Idle);
    }
}
