//! Core types — PartnerKind, Message, GuessRecord, ConfusionMatrix.

use serde::{Deserialize, Serialize};

// ── Partner kind ──

/// Closed tag for the two kinds of conversational counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerKind {
    Human,
    Automated,
}

impl std::fmt::Display for PartnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartnerKind::Human => write!(f, "human"),
            PartnerKind::Automated => write!(f, "automated"),
        }
    }
}

/// Display name the automated counterpart is introduced under.
pub const AUTOMATED_PARTNER_ID: &str = "AI";

// ── Messages ──

/// One transcript entry. Immutable once appended; ordering is append order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub origin: PartnerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub text: String,
}

// ── Guesses ──

/// One recorded challenge guess. Append-only, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessRecord {
    pub timestamp: String,
    pub user_id: String,
    pub guessed_automated: bool,
    pub actual_automated: bool,
    pub correct: bool,
}

impl GuessRecord {
    pub fn new(user_id: &str, guessed_automated: bool, actual_automated: bool) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_id: user_id.to_string(),
            guessed_automated,
            actual_automated,
            correct: guessed_automated == actual_automated,
        }
    }
}

// ── Confusion matrix ──

/// TP/FP/FN/TN counters over (guessed automated?, actually automated?).
/// Monotonically increasing; "positive" means "guessed automated".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: u32,
    pub fp: u32,
    #[serde(rename = "fn")]
    pub fn_: u32,
    pub tn: u32,
}

impl ConfusionMatrix {
    pub fn record(&mut self, guessed_automated: bool, actual_automated: bool) {
        match (guessed_automated, actual_automated) {
            (true, true) => self.tp += 1,
            (true, false) => self.fp += 1,
            (false, true) => self.fn_ += 1,
            (false, false) => self.tn += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.tp + self.fp + self.fn_ + self.tn
    }
}
