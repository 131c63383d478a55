//! Session entity — one active two-party conversation.

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::challenge::ChallengeState;
use crate::participant::{HumanHandle, Participant};
use crate::record::ConversationRecord;
use crate::types::PartnerKind;

pub struct Session {
    pub id: Uuid,
    pub partner_is_automated: bool,
    /// One human + the sentinel, or exactly two humans.
    pub roster: Vec<Participant>,
    /// Shared with the reply worker, which snapshots it under the lock.
    pub record: Arc<RwLock<ConversationRecord>>,
    pub challenge: ChallengeState,
    /// Once true the session is irrecoverable; no handler may act on it.
    pub closed: bool,
}

impl Session {
    pub fn new_automated(human: HumanHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            partner_is_automated: true,
            roster: vec![Participant::Human(human), Participant::Automated],
            record: Arc::new(RwLock::new(ConversationRecord::new())),
            challenge: ChallengeState::new(),
            closed: false,
        }
    }

    pub fn new_human(a: HumanHandle, b: HumanHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            partner_is_automated: false,
            roster: vec![Participant::Human(a), Participant::Human(b)],
            record: Arc::new(RwLock::new(ConversationRecord::new())),
            challenge: ChallengeState::new(),
            closed: false,
        }
    }

    pub fn humans(&self) -> impl Iterator<Item = &HumanHandle> {
        self.roster.iter().filter_map(Participant::as_human)
    }

    pub fn human_roster_len(&self) -> u32 {
        self.humans().count() as u32
    }

    pub fn human(&self, conn_id: &Uuid) -> Option<&HumanHandle> {
        self.humans().find(|h| h.conn_id == *conn_id)
    }

    pub fn other_human(&self, conn_id: &Uuid) -> Option<&HumanHandle> {
        self.humans().find(|h| h.conn_id != *conn_id)
    }

    /// What each human's counterpart truly is, revealed at termination.
    pub fn partner_kind(&self) -> PartnerKind {
        if self.partner_is_automated {
            PartnerKind::Automated
        } else {
            PartnerKind::Human
        }
    }
}
