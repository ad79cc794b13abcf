pub mod intent;
pub mod orchestrator;
pub mod session;
pub mod types;

pub use intent::TurnIntent;
pub use orchestrator::{
    LoadingState, Orchestrator, OrchestratorConfig, TurnBranch, TurnOutcome, TurnRequest,
};
pub use session::{CaseSession, CaseSnapshot};
pub use types::*;
