//! Automated-reply scheduler — one serial worker per automated-paired
//! session.
//!
//! The worker drains its job queue strictly in arrival order, so at most one
//! generation is in flight per session and replies can never interleave.
//! Unrelated sessions' workers run independently. Each completed (or failed)
//! turn re-enters the orchestrator as a command; the worker itself never
//! touches session state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::generator::ReplyGenerator;
use crate::orchestrator::Command;
use crate::record::ConversationRecord;

/// One queued generation turn.
#[derive(Debug)]
pub struct ReplyJob;

/// Artificial composition pacing: `clamp(len × ms_per_char, min, max)`.
/// Models human-plausible typing latency — a product behavior, not an
/// implementation artifact.
#[derive(Debug, Clone, Copy)]
pub struct ReplyPacing {
    pub ms_per_char: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl ReplyPacing {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ms_per_char: config.reply_ms_per_char,
            min_ms: config.reply_min_delay_ms,
            max_ms: config.reply_max_delay_ms,
        }
    }

    pub fn compose_delay(&self, reply_chars: usize) -> Duration {
        let ms = (reply_chars as u64)
            .saturating_mul(self.ms_per_char)
            .clamp(self.min_ms, self.max_ms);
        Duration::from_millis(ms)
    }
}

/// Spawn the serial worker for one session. Dropping the returned sender
/// lets the worker drain and exit; any late completions are liveness-checked
/// by the orchestrator.
pub fn spawn_reply_worker(
    session_id: Uuid,
    record: Arc<RwLock<ConversationRecord>>,
    generator: Arc<dyn ReplyGenerator>,
    pacing: ReplyPacing,
    commands: mpsc::UnboundedSender<Command>,
) -> mpsc::UnboundedSender<ReplyJob> {
    let (job_tx, mut job_rx) = mpsc::unbounded_channel::<ReplyJob>();

    tokio::spawn(async move {
        while let Some(ReplyJob) = job_rx.recv().await {
            let _ = commands.send(Command::ReplyStarted { session_id });

            // Copy under the lock; appends race a live reference.
            let transcript = record.read().await.snapshot();

            match generator.generate(&transcript).await {
                Ok(reply) => {
                    tokio::time::sleep(pacing.compose_delay(reply.chars().count())).await;
                    let _ = commands.send(Command::ReplyFinished {
                        session_id,
                        reply: Some(reply),
                    });
                }
                Err(e) => {
                    warn!("Reply generation failed for session {}: {}", session_id, e);
                    let _ = commands.send(Command::ReplyFinished {
                        session_id,
                        reply: None,
                    });
                }
            }
        }
    });

    job_tx
}
