//! Matchmaker — FIFO waiting queue, pairing policy, coin flip.
//!
//! The queue holds at most one entry per participant. Entries whose
//! connection has died are dropped during the scan rather than surfaced, so
//! a request over a stale queue falls through to the coin flip.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use uuid::Uuid;

use crate::participant::{ForcedPartner, HumanHandle};

#[derive(Debug)]
pub struct WaitingEntry {
    pub conn_id: Uuid,
    pub user_id: String,
    pub queued_at: Instant,
}

/// What `pair_or_queue` decided for a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingDecision {
    /// Pair with the automated counterpart immediately.
    Automated,
    /// Pair with the queued human under this connection id.
    PairedWith(Uuid),
    /// No partner available — entry pushed, waiting timeout due.
    Enqueued,
}

pub struct Matchmaker {
    queue: VecDeque<WaitingEntry>,
    automated_bias: f64,
}

impl Matchmaker {
    pub fn new(automated_bias: f64) -> Self {
        Self {
            queue: VecDeque::new(),
            automated_bias,
        }
    }

    /// Pairing policy for a newly connected (or re-submitted) participant.
    /// `participants` is the live handle index used to weed out dead entries.
    pub fn pair_or_queue(
        &mut self,
        requester: &HumanHandle,
        participants: &HashMap<Uuid, HumanHandle>,
    ) -> PairingDecision {
        // A forced directive is honored immediately and never enqueues.
        if requester.forced == Some(ForcedPartner::Automated) {
            return PairingDecision::Automated;
        }

        while let Some(entry) = self.queue.pop_front() {
            if entry.conn_id == requester.conn_id {
                continue;
            }
            let usable = participants
                .get(&entry.conn_id)
                .map(|h| h.is_connected())
                .unwrap_or(false);
            if usable {
                return PairingDecision::PairedWith(entry.conn_id);
            }
        }

        if rand::random::<f64>() < self.automated_bias {
            PairingDecision::Automated
        } else {
            self.remove(&requester.conn_id);
            self.queue.push_back(WaitingEntry {
                conn_id: requester.conn_id,
                user_id: requester.user_id.clone(),
                queued_at: Instant::now(),
            });
            PairingDecision::Enqueued
        }
    }

    /// Drop a participant's waiting entry (dequeue, disconnect, timeout).
    pub fn remove(&mut self, conn_id: &Uuid) -> bool {
        let before = self.queue.len();
        self.queue.retain(|e| e.conn_id != *conn_id);
        self.queue.len() != before
    }

    pub fn contains(&self, conn_id: &Uuid) -> bool {
        self.queue.iter().any(|e| e.conn_id == *conn_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
