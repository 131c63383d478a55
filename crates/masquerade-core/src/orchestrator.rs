//! The orchestrator — single actor owning every mutable registry.
//!
//! All inbound transport events, timer expiries, and reply-worker
//! completions arrive as commands on one mpsc channel and are handled to
//! completion one at a time, so the waiting queue, session index, and timer
//! maps need no locks. Anything that references a session or participant by
//! id re-checks liveness here: a stale timer or a late reply against a
//! closed session is a silent no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::challenge::{
    self, ChallengePhase, ContinueChoice, CHALLENGE_PROMPT, POST_GUESS_PROMPT, RESUME_TEXT,
};
use crate::config::Config;
use crate::events::{ClientEvent, MessageSide, PairedKind, ServerEvent};
use crate::generator::ReplyGenerator;
use crate::matchmaker::{Matchmaker, PairingDecision};
use crate::participant::HumanHandle;
use crate::presence::{DebounceKey, PresenceDebouncer};
use crate::scheduler::{spawn_reply_worker, ReplyJob, ReplyPacing};
use crate::session::Session;
use crate::stats::StatsSink;
use crate::timer::TimerRegistry;
use crate::types::{Message, PartnerKind, AUTOMATED_PARTNER_ID};

/// Everything the orchestrator reacts to.
#[derive(Debug)]
pub enum Command {
    /// A new connection, registered by the transport.
    Connect { handle: HumanHandle },
    /// An inbound event from a connected participant.
    Client { conn_id: Uuid, event: ClientEvent },
    /// The transport observed the connection close.
    Disconnect { conn_id: Uuid },
    /// A waiting-queue timeout elapsed.
    WaitTimeout { conn_id: Uuid },
    /// A typing-debounce timer elapsed.
    DebounceFired { session_id: Uuid, conn_id: Uuid },
    /// The reply worker started composing a turn.
    ReplyStarted { session_id: Uuid },
    /// The reply worker finished a turn; None means generation failed.
    ReplyFinished {
        session_id: Uuid,
        reply: Option<String>,
    },
    /// Stop the loop, ending every open session first.
    Shutdown,
}

pub struct Orchestrator {
    config: Config,
    pacing: ReplyPacing,
    generator: Arc<dyn ReplyGenerator>,
    sink: Arc<dyn StatsSink>,

    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Option<mpsc::UnboundedReceiver<Command>>,

    participants: HashMap<Uuid, HumanHandle>,
    sessions: HashMap<Uuid, Session>,
    /// conn id → active session id; at most one entry per connection.
    session_of: HashMap<Uuid, Uuid>,

    matchmaker: Matchmaker,
    wait_timers: TimerRegistry<Uuid>,
    debounce_timers: TimerRegistry<DebounceKey>,
    debouncer: PresenceDebouncer,
    reply_queues: HashMap<Uuid, mpsc::UnboundedSender<ReplyJob>>,
}

impl Orchestrator {
    pub fn new(config: Config, generator: Arc<dyn ReplyGenerator>, sink: Arc<dyn StatsSink>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let pacing = ReplyPacing::from_config(&config);
        let matchmaker = Matchmaker::new(config.automated_bias);

        Self {
            config,
            pacing,
            generator,
            sink,
            command_tx,
            command_rx: Some(command_rx),
            participants: HashMap::new(),
            sessions: HashMap::new(),
            session_of: HashMap::new(),
            matchmaker,
            wait_timers: TimerRegistry::new(),
            debounce_timers: TimerRegistry::new(),
            debouncer: PresenceDebouncer::new(),
            reply_queues: HashMap::new(),
        }
    }

    pub fn command_sender(&self) -> mpsc::UnboundedSender<Command> {
        self.command_tx.clone()
    }

    pub async fn run(&mut self) {
        let mut command_rx = self.command_rx.take().expect("command_rx already taken");
        info!("Orchestrator running");

        while let Some(cmd) = command_rx.recv().await {
            match cmd {
                Command::Connect { handle } => self.handle_connect(handle).await,
                Command::Client { conn_id, event } => self.handle_client(conn_id, event).await,
                Command::Disconnect { conn_id } => self.handle_disconnect(conn_id).await,
                Command::WaitTimeout { conn_id } => self.handle_wait_timeout(conn_id).await,
                Command::DebounceFired {
                    session_id,
                    conn_id,
                } => self.handle_debounce_fired(session_id, conn_id),
                Command::ReplyStarted { session_id } => self.handle_reply_started(session_id),
                Command::ReplyFinished { session_id, reply } => {
                    self.handle_reply_finished(session_id, reply).await
                }
                Command::Shutdown => {
                    let open: Vec<Uuid> = self.sessions.keys().copied().collect();
                    for session_id in open {
                        self.terminate(session_id, "server_shutdown");
                    }
                    break;
                }
            }
        }

        info!("Orchestrator stopped");
    }

    // ── Connection & pairing ──

    async fn handle_connect(&mut self, handle: HumanHandle) {
        info!("{} connected ({})", handle.user_id, handle.conn_id);
        self.participants.insert(handle.conn_id, handle.clone());
        self.pair_participant(handle).await;
    }

    async fn pair_participant(&mut self, handle: HumanHandle) {
        match self.matchmaker.pair_or_queue(&handle, &self.participants) {
            PairingDecision::Automated => self.create_automated_session(handle).await,
            PairingDecision::PairedWith(partner_conn) => {
                self.wait_timers.cancel(&partner_conn);
                match self.participants.get(&partner_conn).cloned() {
                    Some(partner) => self.create_human_session(handle, partner),
                    // The partner vanished between the queue scan and now;
                    // fall through rather than fail the request.
                    None => self.create_automated_session(handle).await,
                }
            }
            PairingDecision::Enqueued => {
                let conn_id = handle.conn_id;
                let command_tx = self.command_tx.clone();
                self.wait_timers.schedule(
                    conn_id,
                    Duration::from_millis(self.config.wait_timeout_ms),
                    move || {
                        let _ = command_tx.send(Command::WaitTimeout { conn_id });
                    },
                );
                handle.send(ServerEvent::Paired {
                    session_id: None,
                    partner_kind: PairedKind::Waiting,
                    partner_id: None,
                });
                handle.send(ServerEvent::ChatHistory {
                    messages: Vec::new(),
                });
                debug!("{} queued for pairing", handle.user_id);
            }
        }
    }

    async fn create_automated_session(&mut self, human: HumanHandle) {
        let conn_id = human.conn_id;
        let session = Session::new_automated(human.clone());
        let session_id = session.id;

        self.reply_queues.insert(
            session_id,
            spawn_reply_worker(
                session_id,
                Arc::clone(&session.record),
                Arc::clone(&self.generator),
                self.pacing,
                self.command_tx.clone(),
            ),
        );
        self.session_of.insert(conn_id, session_id);
        self.sessions.insert(session_id, session);

        human.send(ServerEvent::Paired {
            session_id: Some(session_id),
            partner_kind: PairedKind::Automated,
            partner_id: Some(AUTOMATED_PARTNER_ID.to_string()),
        });
        human.send(ServerEvent::ChatHistory {
            messages: Vec::new(),
        });
        info!("Session {} created: {} + AI", session_id, human.user_id);
    }

    fn create_human_session(&mut self, a: HumanHandle, b: HumanHandle) {
        let session = Session::new_human(a.clone(), b.clone());
        let session_id = session.id;
        self.session_of.insert(a.conn_id, session_id);
        self.session_of.insert(b.conn_id, session_id);
        self.sessions.insert(session_id, session);

        a.send(ServerEvent::Paired {
            session_id: Some(session_id),
            partner_kind: PairedKind::Human,
            partner_id: Some(b.user_id.clone()),
        });
        b.send(ServerEvent::Paired {
            session_id: Some(session_id),
            partner_kind: PairedKind::Human,
            partner_id: Some(a.user_id.clone()),
        });
        info!(
            "Session {} created: {} + {}",
            session_id, a.user_id, b.user_id
        );
    }

    async fn handle_wait_timeout(&mut self, conn_id: Uuid) {
        self.wait_timers.cancel(&conn_id);
        // Only act if the participant is still waiting — a pairing or a
        // disconnect may have raced the timer.
        if !self.matchmaker.remove(&conn_id) {
            return;
        }
        let Some(handle) = self.participants.get(&conn_id).cloned() else {
            return;
        };
        if !handle.is_connected() {
            return;
        }
        info!("{} waited out the queue, pairing with AI", handle.user_id);
        self.create_automated_session(handle).await;
    }

    // ── Client events ──

    async fn handle_client(&mut self, conn_id: Uuid, event: ClientEvent) {
        match event {
            ClientEvent::SendMessage { session_id, text } => {
                self.relay_message(session_id, conn_id, text).await
            }
            ClientEvent::Typing { session_id } => self.handle_typing(session_id, conn_id),
            ClientEvent::StopTyping { session_id } => self.handle_stop_typing(session_id, conn_id),
            ClientEvent::SubmitGuess { session_id, guess } => {
                self.handle_guess(session_id, conn_id, guess).await
            }
            ClientEvent::SubmitContinueChoice { session_id, choice } => {
                self.handle_continue_choice(session_id, conn_id, choice)
            }
            ClientEvent::RequestHistory { session_id } => {
                self.handle_request_history(session_id, conn_id).await
            }
            ClientEvent::SkipPartner => self.handle_skip(conn_id).await,
        }
    }

    /// Look up a live session the connection belongs to. Unknown, closed, or
    /// foreign session ids are dropped without an error — client and server
    /// state race legitimately.
    fn member_session(&self, session_id: &Uuid, conn_id: &Uuid) -> Option<&Session> {
        let session = self.sessions.get(session_id)?;
        if session.closed || session.human(conn_id).is_none() {
            debug!("Dropping event for session {} from {}", session_id, conn_id);
            return None;
        }
        Some(session)
    }

    async fn relay_message(&mut self, session_id: Uuid, conn_id: Uuid, text: String) {
        let Some(session) = self.member_session(&session_id, &conn_id) else {
            return;
        };
        let sender = session
            .human(&conn_id)
            .cloned()
            .expect("member_session checked membership");
        let automated = session.partner_is_automated;
        let other = session.other_human(&conn_id).cloned();
        let record = Arc::clone(&session.record);

        let transcript = {
            let mut record = record.write().await;
            record.append(Message {
                origin: PartnerKind::Human,
                user_id: Some(sender.user_id.clone()),
                text: text.clone(),
            });
            record.snapshot()
        };

        sender.send(ServerEvent::ChatMessage {
            origin: MessageSide::Me,
            text: text.clone(),
        });

        if automated {
            // The automated side has no connection to notify; the sender gets
            // the refreshed transcript instead, and a reply turn is queued.
            sender.send(ServerEvent::ChatHistory {
                messages: transcript,
            });
            if let Some(queue) = self.reply_queues.get(&session_id) {
                let _ = queue.send(ReplyJob);
            }
        } else if let Some(other) = other {
            other.send(ServerEvent::ChatMessage {
                origin: MessageSide::Partner,
                text,
            });
        }

        self.evaluate_prompt(session_id).await;
    }

    async fn evaluate_prompt(&mut self, session_id: Uuid) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        let record = Arc::clone(&session.record);
        let (human_count, total_count) = {
            let record = record.read().await;
            (record.human_count(), record.total_count())
        };

        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        let fire = session.challenge.should_prompt(
            human_count,
            total_count,
            self.config.human_threshold,
            self.config.total_threshold,
            session.human_roster_len(),
        );
        if !fire {
            return;
        }

        session.challenge.phase = ChallengePhase::Prompted;
        for human in session.humans() {
            human.send(ServerEvent::ChallengePrompt {
                text: CHALLENGE_PROMPT.to_string(),
            });
        }
        info!("Challenge prompt fired for session {}", session_id);
    }

    // ── Challenge ──

    async fn handle_guess(&mut self, session_id: Uuid, conn_id: Uuid, guess: String) {
        {
            let Some(session) = self.member_session(&session_id, &conn_id) else {
                return;
            };
            if session.challenge.phase != ChallengePhase::Prompted {
                debug!("Ignoring guess outside prompted phase for {}", session_id);
                return;
            }
        }

        let guessed_automated = challenge::guessed_automated(&guess);
        let session = self
            .sessions
            .get_mut(&session_id)
            .expect("session checked above");
        let guesser = session
            .human(&conn_id)
            .cloned()
            .expect("membership checked above");
        let record = session.challenge.record_guess(
            conn_id,
            &guesser.user_id,
            guessed_automated,
            session.partner_is_automated,
        );
        let matrix = session.challenge.matrix;

        for human in session.humans() {
            human.send(ServerEvent::GuessStats(matrix));
        }
        guesser.send(ServerEvent::PostGuessOptions {
            text: POST_GUESS_PROMPT.to_string(),
        });

        if let Err(e) = self.sink.append(&record).await {
            error!("Failed to persist guess record: {}", e);
        }
    }

    fn handle_continue_choice(&mut self, session_id: Uuid, conn_id: Uuid, choice: String) {
        let Some(session) = self.member_session(&session_id, &conn_id) else {
            return;
        };
        // Only the participant whose guess is pending was offered the choice.
        let Some(pending) = session.challenge.pending.clone() else {
            return;
        };
        if pending.conn_id != conn_id {
            return;
        }

        match ContinueChoice::parse(&choice) {
            Some(ContinueChoice::Continue) => {
                let session = self
                    .sessions
                    .get_mut(&session_id)
                    .expect("session checked above");
                session.challenge.resume();
                for human in session.humans() {
                    human.send(ServerEvent::ResumeChat {
                        text: RESUME_TEXT.to_string(),
                    });
                }
            }
            Some(ContinueChoice::End) => {
                // Correctness as computed at guess time, revealed only now.
                if let Some(guesser) = session.human(&conn_id) {
                    if guesser.is_connected() {
                        guesser.send(ServerEvent::GuessResult {
                            correct: pending.correct,
                        });
                    }
                }
                self.terminate(session_id, "ended_by_user");
            }
            // Unrecognized choice: no state change.
            None => {}
        }
    }

    async fn handle_request_history(&mut self, session_id: Uuid, conn_id: Uuid) {
        let Some(session) = self.member_session(&session_id, &conn_id) else {
            return;
        };
        let requester = session
            .human(&conn_id)
            .cloned()
            .expect("member_session checked membership");
        let messages = session.record.read().await.snapshot();
        requester.send(ServerEvent::ChatHistory { messages });
    }

    // ── Presence ──

    fn handle_typing(&mut self, session_id: Uuid, conn_id: Uuid) {
        let Some(session) = self.member_session(&session_id, &conn_id) else {
            return;
        };
        // The automated side's composing signal is the scheduler's business.
        if session.partner_is_automated {
            return;
        }
        let key = (session_id, conn_id);
        if self.debouncer.on_typing(key) {
            let command_tx = self.command_tx.clone();
            self.debounce_timers.schedule(
                key,
                Duration::from_millis(self.config.typing_debounce_ms),
                move || {
                    let _ = command_tx.send(Command::DebounceFired {
                        session_id,
                        conn_id,
                    });
                },
            );
        }
    }

    fn handle_stop_typing(&mut self, session_id: Uuid, conn_id: Uuid) {
        let key = (session_id, conn_id);
        let (cancel_timer, emit_stop) = self.debouncer.on_stop_typing(key);
        if cancel_timer {
            self.debounce_timers.cancel(&key);
        }
        if emit_stop {
            if let Some(session) = self.member_session(&session_id, &conn_id) {
                if let Some(other) = session.other_human(&conn_id) {
                    other.send(ServerEvent::PartnerStoppedComposing);
                }
            }
        }
    }

    fn handle_debounce_fired(&mut self, session_id: Uuid, conn_id: Uuid) {
        let key = (session_id, conn_id);
        self.debounce_timers.cancel(&key);
        if !self.debouncer.on_timer_fired(key) {
            return;
        }
        // The debounce state outlives the session only until terminate()
        // clears it, but re-check anyway — the timer may race teardown.
        let Some(session) = self.member_session(&session_id, &conn_id) else {
            return;
        };
        if let Some(other) = session.other_human(&conn_id) {
            other.send(ServerEvent::PartnerComposing);
        }
    }

    // ── Automated replies ──

    fn handle_reply_started(&mut self, session_id: Uuid) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        if session.closed {
            return;
        }
        for human in session.humans() {
            human.send(ServerEvent::PartnerComposing);
        }
    }

    async fn handle_reply_finished(&mut self, session_id: Uuid, reply: Option<String>) {
        let Some(session) = self.sessions.get(&session_id) else {
            // Session torn down while the reply was composing.
            return;
        };
        if session.closed {
            return;
        }
        let record = Arc::clone(&session.record);
        let humans: Vec<HumanHandle> = session.humans().cloned().collect();

        for human in &humans {
            human.send(ServerEvent::PartnerStoppedComposing);
        }

        // A failed generation produces no reply for this turn; the session
        // stays usable and the worker moves on to the next queued job.
        let Some(text) = reply else {
            return;
        };

        record.write().await.append(Message {
            origin: PartnerKind::Automated,
            user_id: None,
            text: text.clone(),
        });
        for human in &humans {
            human.send(ServerEvent::ChatMessage {
                origin: MessageSide::Partner,
                text: text.clone(),
            });
        }

        self.evaluate_prompt(session_id).await;
    }

    // ── Teardown ──

    /// Idempotent: a session can be terminated once; later calls find it
    /// already gone and do nothing.
    fn terminate(&mut self, session_id: Uuid, reason: &str) {
        let Some(mut session) = self.sessions.remove(&session_id) else {
            return;
        };
        session.closed = true;
        let partner_kind = session.partner_kind();
        let text = format!("Chat ended. Your partner was {}.", partner_kind);

        for human in session.humans() {
            if self.session_of.get(&human.conn_id) == Some(&session_id) {
                self.session_of.remove(&human.conn_id);
            }
            if human.is_connected() {
                human.send(ServerEvent::ChatEnded {
                    reason: reason.to_string(),
                    partner_kind,
                    text: text.clone(),
                });
            }
        }

        for key in self.debouncer.clear_session(session_id) {
            self.debounce_timers.cancel(&key);
        }
        // Dropping the queue lets the reply worker drain and exit; late
        // completions are dropped by the liveness checks above.
        self.reply_queues.remove(&session_id);

        info!("Session {} terminated ({})", session_id, reason);
    }

    async fn handle_disconnect(&mut self, conn_id: Uuid) {
        let handle = self.participants.remove(&conn_id);
        self.matchmaker.remove(&conn_id);
        self.wait_timers.cancel(&conn_id);

        if let Some(&session_id) = self.session_of.get(&conn_id) {
            if let Some(session) = self.sessions.get(&session_id) {
                if let Some(other) = session.other_human(&conn_id) {
                    other.send(ServerEvent::PartnerDisconnected {
                        text: "Your partner disconnected. Chat ended.".to_string(),
                        partner_kind: PartnerKind::Human,
                    });
                }
            }
            self.terminate(session_id, "partner_disconnected");
        }

        if let Some(handle) = handle {
            info!("{} disconnected", handle.user_id);
        }
    }

    /// Same cleanup as a disconnect, but the skipper's connection stays open
    /// and goes straight back to the matchmaker.
    async fn handle_skip(&mut self, conn_id: Uuid) {
        self.matchmaker.remove(&conn_id);
        self.wait_timers.cancel(&conn_id);

        if let Some(&session_id) = self.session_of.get(&conn_id) {
            if let Some(session) = self.sessions.get(&session_id) {
                if let Some(other) = session.other_human(&conn_id) {
                    other.send(ServerEvent::PartnerDisconnected {
                        text: "Your partner disconnected. Chat ended.".to_string(),
                        partner_kind: PartnerKind::Human,
                    });
                }
            }
            self.terminate(session_id, "skipped");
        }

        let Some(handle) = self.participants.get(&conn_id).cloned() else {
            return;
        };
        if !handle.is_connected() {
            return;
        }
        info!("{} skipped, re-pairing", handle.user_id);
        self.pair_participant(handle).await;
    }
}
