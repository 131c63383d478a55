//! Challenge state machine — prompt triggering, guess scoring,
//! continue/end negotiation.

use uuid::Uuid;

use crate::types::{ConfusionMatrix, GuessRecord};

pub const CHALLENGE_PROMPT: &str = "Do you think your chat partner is Human or AI?";
pub const POST_GUESS_PROMPT: &str = "Do you want to continue or end the chat?";
pub const RESUME_TEXT: &str = "Chat resumed.";

/// Guess tokens that mean "I think my partner is automated". Case-insensitive;
/// anything else counts as a human guess.
const AUTOMATED_TOKENS: &[&str] = &["ai", "bot", "automated"];

pub fn guessed_automated(raw: &str) -> bool {
    let token = raw.trim().to_lowercase();
    AUTOMATED_TOKENS.contains(&token.as_str())
}

/// Recognized continue/end choices. Anything else is ignored by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueChoice {
    Continue,
    End,
}

impl ContinueChoice {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "continue" => Some(ContinueChoice::Continue),
            "end" => Some(ContinueChoice::End),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengePhase {
    /// Relay counting is live; the trigger is armed.
    Idle,
    /// Prompt emitted, waiting for a guess. Counting is suspended.
    Prompted,
    /// A guess is pending its continue/end choice.
    AwaitingChoice,
}

/// The guess whose result is withheld until the guesser picks continue/end.
#[derive(Debug, Clone)]
pub struct PendingGuess {
    pub conn_id: Uuid,
    /// Correctness as computed at guess time.
    pub correct: bool,
}

#[derive(Debug)]
pub struct ChallengeState {
    pub phase: ChallengePhase,
    pub pending: Option<PendingGuess>,
    pub matrix: ConfusionMatrix,
    pub history: Vec<GuessRecord>,
}

impl ChallengeState {
    pub fn new() -> Self {
        Self {
            phase: ChallengePhase::Idle,
            pending: None,
            matrix: ConfusionMatrix::default(),
            history: Vec::new(),
        }
    }

    /// Trigger condition, evaluated after every transcript append. Fires only
    /// while Idle — once prompted, counting is suspended until resolution.
    pub fn should_prompt(
        &self,
        human_count: u32,
        total_count: u32,
        human_threshold: u32,
        total_threshold: u32,
        human_roster_len: u32,
    ) -> bool {
        if self.phase != ChallengePhase::Idle {
            return false;
        }
        human_count >= human_threshold * human_roster_len
            || (total_count > 0 && total_count % total_threshold == 0)
    }

    /// Score a guess: classify, record history, and park it pending the
    /// guesser's continue/end choice. Returns the appended record.
    pub fn record_guess(
        &mut self,
        conn_id: Uuid,
        user_id: &str,
        guessed_automated: bool,
        actual_automated: bool,
    ) -> GuessRecord {
        let record = GuessRecord::new(user_id, guessed_automated, actual_automated);
        self.matrix.record(guessed_automated, actual_automated);
        self.history.push(record.clone());
        self.pending = Some(PendingGuess {
            conn_id,
            correct: record.correct,
        });
        self.phase = ChallengePhase::AwaitingChoice;
        record
    }

    /// Resolve a `continue` choice: back to Idle, trigger re-armed.
    pub fn resume(&mut self) {
        self.pending = None;
        self.phase = ChallengePhase::Idle;
    }
}

impl Default for ChallengeState {
    fn default() -> Self {
        Self::new()
    }
}
