//! Runtime configuration
//!
//! Read from the process environment (after `.env` is loaded). API keys are
//! not part of this struct: they are resolved per provider through the
//! `CredentialManager` when the provider set is built.

use crate::ai::http_client::{anchor_client, gemini_client, openai_client};
use crate::ai::{
    CredentialManager, GeminiClient, GeminiConfig, OpenAiClient, OpenAiConfig, ProviderKind,
    ProviderSet,
};
use crate::case::OrchestratorConfig;
use crate::seal::{FirebaseAnchor, FirebaseConfig, SealOptions};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_FILE_PREFIX: &str = "Verum_Omnis_Report";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub export_dir: PathBuf,
    pub file_prefix: String,
    /// `None` falls back to the platform data directory
    pub database_path: Option<PathBuf>,
    pub firebase: Option<FirebaseConfig>,
    pub orchestrator: OrchestratorConfig,
    pub gemini: GeminiConfig,
    pub openai: OpenAiConfig,
    pub app_version: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let export_dir = var("CASE_INTAKE_EXPORT_DIR")
            .map(PathBuf::from)
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut orchestrator = OrchestratorConfig::default();
        if let Some(flag) = var("CASE_INTAKE_VERIFY_CHAT") {
            orchestrator.verify_chat_turns = parse_flag(&flag);
        }
        if let Some(flag) = var("CASE_INTAKE_CONSULT") {
            orchestrator.consult_before_report = parse_flag(&flag);
        }

        let mut gemini = GeminiConfig::default();
        if let Some(model) = var("GEMINI_MODEL") {
            gemini.fast_model = model;
        }
        if let Some(model) = var("GEMINI_DEEP_MODEL") {
            gemini.deep_model = model;
        }

        let mut openai = OpenAiConfig::default();
        if let Some(model) = var("OPENAI_MODEL") {
            openai.model = model;
        }

        // The anchor is only wired up when all three values are present
        let firebase = match (
            var("FIREBASE_API_KEY"),
            var("FIREBASE_PROJECT_ID"),
            var("FIREBASE_STORAGE_BUCKET"),
        ) {
            (Some(key), Some(project), Some(bucket)) => {
                Some(FirebaseConfig::new(key, project, bucket))
            }
            (None, None, None) => None,
            _ => {
                tracing::warn!("Incomplete FIREBASE_* configuration, cloud anchoring disabled");
                None
            }
        };

        Self {
            export_dir,
            file_prefix: var("CASE_INTAKE_FILE_PREFIX")
                .unwrap_or_else(|| DEFAULT_FILE_PREFIX.to_string()),
            database_path: var("CASE_INTAKE_DB").map(PathBuf::from),
            firebase,
            orchestrator,
            gemini,
            openai,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn seal_options(&self) -> SealOptions {
        SealOptions {
            export_dir: self.export_dir.clone(),
            file_prefix: self.file_prefix.clone(),
            app_version: self.app_version.clone(),
        }
    }

    /// Both adapters are always registered; a missing key surfaces as a
    /// per-call configuration error that every policy skips.
    pub fn provider_set(&self) -> ProviderSet {
        ProviderSet::new()
            .with(Arc::new(GeminiClient::new(
                gemini_client().clone(),
                CredentialManager::resolve(ProviderKind::Gemini),
                self.gemini.clone(),
            )))
            .with(Arc::new(OpenAiClient::new(
                openai_client().clone(),
                CredentialManager::resolve(ProviderKind::OpenAi),
                self.openai.clone(),
            )))
    }

    pub fn cloud_anchor(&self) -> Option<FirebaseAnchor> {
        self.firebase
            .clone()
            .map(|config| FirebaseAnchor::new(anchor_client().clone(), config))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
