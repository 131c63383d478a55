//! Participant references — live human connections and the automated sentinel.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::ServerEvent;

/// Partner type a client may force at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedPartner {
    Automated,
}

impl ForcedPartner {
    /// Parse the `force` connect parameter. Unknown values mean "no directive".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "ai" | "automated" => Some(ForcedPartner::Automated),
            _ => None,
        }
    }
}

/// Reference to a live human connection. The transport owns the socket; the
/// core only holds this handle and observes liveness through the channel.
#[derive(Debug, Clone)]
pub struct HumanHandle {
    pub conn_id: Uuid,
    pub user_id: String,
    pub forced: Option<ForcedPartner>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl HumanHandle {
    pub fn new(
        conn_id: Uuid,
        user_id: Option<String>,
        forced: Option<ForcedPartner>,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        let user_id = match user_id.filter(|u| !u.trim().is_empty()) {
            Some(u) => u,
            None => format!("anon-{}", &conn_id.to_string()[..8]),
        };
        Self {
            conn_id,
            user_id,
            forced,
            tx,
        }
    }

    /// Deliver an outbound event. Silently dropped once the socket is gone;
    /// disconnect cleanup arrives separately from the transport.
    pub fn send(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Roster entry — a connected human or the automated sentinel. The sentinel
/// holds no timers, never queues, never disconnects.
#[derive(Debug, Clone)]
pub enum Participant {
    Human(HumanHandle),
    Automated,
}

impl Participant {
    pub fn as_human(&self) -> Option<&HumanHandle> {
        match self {
            Participant::Human(h) => Some(h),
            Participant::Automated => None,
        }
    }
}
