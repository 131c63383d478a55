//! Conversation record — the per-session ordered message log.

use crate::types::{Message, PartnerKind};

/// Ordered transcript plus the counters the challenge trigger reads.
#[derive(Debug, Default)]
pub struct ConversationRecord {
    messages: Vec<Message>,
    human_count: u32,
}

impl ConversationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        if message.origin == PartnerKind::Human {
            self.human_count += 1;
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Copy of the transcript for the reply generator. Never hand out a live
    /// reference across an await point — appends race it.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn human_count(&self) -> u32 {
        self.human_count
    }

    pub fn total_count(&self) -> u32 {
        self.messages.len() as u32
    }
}
