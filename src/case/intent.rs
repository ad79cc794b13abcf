use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Free-text trigger for a synthesis turn: any mention of
/// "synthesize" or "final report", in any case, counts.
static SYNTHESIS_TRIGGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)synthesize|final report").expect("Invalid regex"));

/// What the user asked for, as set by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnIntent {
    /// Infer synthesis from the prompt text
    #[default]
    Auto,
    /// Never synthesize, even if the prompt mentions it
    Analyze,
    Synthesize,
}

impl TurnIntent {
    /// Whether this turn asks to resolve a pending dual strategy
    pub fn wants_synthesis(&self, prompt: &str) -> bool {
        match self {
            Self::Auto => mentions_synthesis(prompt),
            Self::Analyze => false,
            Self::Synthesize => true,
        }
    }
}

pub fn mentions_synthesis(prompt: &str) -> bool {
    SYNTHESIS_TRIGGER.is_match(prompt)
}
