//! Reply generation seam — the external text-generation collaborator.

use async_trait::async_trait;

use crate::types::Message;

/// Produces the automated side's next reply from an ordered transcript
/// snapshot. May fail; a failed turn produces no reply.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, transcript: &[Message]) -> anyhow::Result<String>;
}

/// Stock conversational filler used when no real generation backend is wired
/// up. Picks uniformly; ignores the transcript.
pub struct CannedGenerator;

const CANNED_REPLIES: &[&str] = &[
    "Interesting, tell me more.",
    "I hadn't thought of that.",
    "Why do you say that?",
    "That makes sense.",
    "Can you explain further?",
    "Hmm... I agree.",
    "That's a surprising take!",
    "I see where you're coming from.",
    "Let's switch topics — what's your favorite movie?",
    "Do you enjoy traveling?",
];

#[async_trait]
impl ReplyGenerator for CannedGenerator {
    async fn generate(&self, _transcript: &[Message]) -> anyhow::Result<String> {
        use rand::seq::SliceRandom;
        let reply = CANNED_REPLIES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("That makes sense.");
        Ok(reply.to_string())
    }
}
