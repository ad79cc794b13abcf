//! Command surface: the operations a front end invokes against the current case.
//!
//! Every command returns `Result<T, String>` so errors can be shown as-is.

pub mod case;
pub mod credentials;

pub use case::*;
pub use credentials::*;

use crate::case::{CaseSession, Orchestrator};
use crate::config::AppConfig;
use crate::seal::{CloudAnchor, SealOptions};
use crate::store::{CaseStore, SqliteCaseStore};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared state behind every case command
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub session: Mutex<CaseSession>,
    pub store: Arc<dyn CaseStore>,
    pub anchor: Option<Arc<dyn CloudAnchor>>,
    pub seal_options: SealOptions,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        store: Arc<dyn CaseStore>,
        anchor: Option<Arc<dyn CloudAnchor>>,
        seal_options: SealOptions,
    ) -> Self {
        Self {
            orchestrator,
            session: Mutex::new(CaseSession::new()),
            store,
            anchor,
            seal_options,
        }
    }

    /// Wire up providers, store and anchor from configuration, then restore
    /// the persisted case if there is one
    pub fn from_config(config: &AppConfig) -> Result<Self, String> {
        let db_path = config
            .database_path
            .clone()
            .or_else(SqliteCaseStore::default_path)
            .ok_or_else(|| "Could not determine a location for the case store".to_string())?;
        let store = SqliteCaseStore::open(&db_path).map_err(|e| e.to_string())?;

        let anchor = config
            .cloud_anchor()
            .map(|a| Arc::new(a) as Arc<dyn CloudAnchor>);

        let state = Self::new(
            Orchestrator::new(config.provider_set(), config.orchestrator.clone()),
            Arc::new(store),
            anchor,
            config.seal_options(),
        );
        state.restore()?;
        Ok(state)
    }

    /// Replace the in-memory case with the stored one, if any
    pub fn restore(&self) -> Result<bool, String> {
        let Some(snapshot) = self.store.load().map_err(|e| e.to_string())? else {
            return Ok(false);
        };
        let mut session = self
            .session
            .try_lock()
            .map_err(|_| "Case is busy".to_string())?;
        tracing::info!(
            messages = snapshot.messages.len(),
            files = snapshot.files.len(),
            "Restored case"
        );
        *session = CaseSession::from_snapshot(snapshot);
        Ok(true)
    }

    /// Persist after every mutation; a failed save is logged, never fatal
    fn persist(&self, session: &CaseSession) {
        if let Err(e) = self.store.save(&session.snapshot()) {
            tracing::error!(error = %e, "Failed to save case");
        }
    }
}
