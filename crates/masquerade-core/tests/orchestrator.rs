//! End-to-end orchestrator tests — fake participants on channels, scripted
//! generator, in-memory sink, paused tokio clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use masquerade_core::config::Config;
use masquerade_core::events::{ClientEvent, MessageSide, PairedKind, ServerEvent};
use masquerade_core::generator::ReplyGenerator;
use masquerade_core::orchestrator::{Command, Orchestrator};
use masquerade_core::participant::{ForcedPartner, HumanHandle};
use masquerade_core::stats::{SinkError, StatsSink};
use masquerade_core::types::{GuessRecord, Message, PartnerKind};

// ── Harness ──

/// Generator that pops scripted outcomes; falls back to a fixed reply.
struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedGenerator {
    fn new(script: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
        })
    }

    fn always_failing() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
        })
    }
}

#[async_trait]
impl ReplyGenerator for ScriptedGenerator {
    async fn generate(&self, _transcript: &[Message]) -> anyhow::Result<String> {
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => Err(anyhow::anyhow!("script exhausted")),
        }
    }
}

#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<GuessRecord>>,
}

#[async_trait]
impl StatsSink for MemorySink {
    async fn append(&self, record: &GuessRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<GuessRecord>, SinkError> {
        Ok(self.records.lock().unwrap().clone())
    }
}

struct Client {
    conn_id: Uuid,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Client {
    /// Everything delivered so far, after letting all tasks and paced
    /// timers settle.
    async fn drain(&mut self) -> Vec<ServerEvent> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let mut events = Vec::new();
        while let Ok(ev) = self.rx.try_recv() {
            events.push(ev);
        }
        events
    }
}

fn test_config(automated_bias: f64) -> Config {
    Config {
        automated_bias,
        ..Config::default()
    }
}

fn start(
    config: Config,
    generator: Arc<dyn ReplyGenerator>,
    sink: Arc<dyn StatsSink>,
) -> mpsc::UnboundedSender<Command> {
    let mut orchestrator = Orchestrator::new(config, generator, sink);
    let commands = orchestrator.command_sender();
    tokio::spawn(async move {
        orchestrator.run().await;
    });
    commands
}

fn start_default(automated_bias: f64) -> mpsc::UnboundedSender<Command> {
    start(
        test_config(automated_bias),
        ScriptedGenerator::always_failing(),
        Arc::new(MemorySink::default()),
    )
}

fn connect(
    commands: &mpsc::UnboundedSender<Command>,
    user_id: &str,
    forced: Option<ForcedPartner>,
) -> Client {
    let conn_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = HumanHandle::new(conn_id, Some(user_id.to_string()), forced, tx);
    commands
        .send(Command::Connect { handle })
        .expect("orchestrator gone");
    Client { conn_id, rx }
}

fn send(commands: &mpsc::UnboundedSender<Command>, client: &Client, event: ClientEvent) {
    commands
        .send(Command::Client {
            conn_id: client.conn_id,
            event,
        })
        .expect("orchestrator gone");
}

fn paired_session(events: &[ServerEvent]) -> Option<(Option<Uuid>, PairedKind)> {
    events.iter().find_map(|ev| match ev {
        ServerEvent::Paired {
            session_id,
            partner_kind,
            ..
        } => Some((*session_id, *partner_kind)),
        _ => None,
    })
}

fn count_prompts(events: &[ServerEvent]) -> usize {
    events
        .iter()
        .filter(|ev| matches!(ev, ServerEvent::ChallengePrompt { .. }))
        .count()
}

fn count_ended(events: &[ServerEvent]) -> usize {
    events
        .iter()
        .filter(|ev| matches!(ev, ServerEvent::ChatEnded { .. }))
        .count()
}

/// Drive an automated-paired session up to a fired challenge prompt.
/// Returns (commands, client, session id).
async fn automated_session_at_prompt(
    config: Config,
    generator: Arc<dyn ReplyGenerator>,
    sink: Arc<dyn StatsSink>,
) -> (mpsc::UnboundedSender<Command>, Client, Uuid) {
    let commands = start(config, generator, sink);
    let mut a = connect(&commands, "alice", Some(ForcedPartner::Automated));
    let events = a.drain().await;
    let (sid, kind) = paired_session(&events).expect("no paired event");
    assert_eq!(kind, PairedKind::Automated);
    let sid = sid.expect("automated pairing has a session");

    // human_threshold defaults to 5 and the roster has one human.
    for i in 0..5 {
        send(
            &commands,
            &a,
            ClientEvent::SendMessage {
                session_id: sid,
                text: format!("message {}", i),
            },
        );
    }
    let events = a.drain().await;
    assert_eq!(count_prompts(&events), 1, "expected exactly one prompt");
    (commands, a, sid)
}

// ── Pairing ──

#[tokio::test(start_paused = true)]
async fn forced_directive_pairs_with_automated_immediately() {
    // Bias 0 would enqueue anyone who reached the coin flip.
    let commands = start_default(0.0);
    let mut a = connect(&commands, "alice", Some(ForcedPartner::Automated));

    let events = a.drain().await;
    let (sid, kind) = paired_session(&events).expect("no paired event");
    assert_eq!(kind, PairedKind::Automated);
    assert!(sid.is_some());
    // Empty transcript accompanies the pairing.
    assert!(events
        .iter()
        .any(|ev| matches!(ev, ServerEvent::ChatHistory { messages } if messages.is_empty())));
}

#[tokio::test(start_paused = true)]
async fn coin_flip_heads_pairs_with_automated() {
    let commands = start_default(1.0);
    let mut a = connect(&commands, "alice", None);
    let events = a.drain().await;
    assert_eq!(
        paired_session(&events).map(|(_, k)| k),
        Some(PairedKind::Automated)
    );
}

#[tokio::test(start_paused = true)]
async fn second_connection_pairs_with_the_waiting_first() {
    let commands = start_default(0.0);
    let mut a = connect(&commands, "alice", None);
    let mut b = connect(&commands, "bob", None);

    let a_events = a.drain().await;
    let b_events = b.drain().await;

    // Alice queued first, then got the human pairing.
    assert_eq!(
        paired_session(&a_events).map(|(s, k)| (s.is_none(), k)),
        Some((true, PairedKind::Waiting))
    );
    let human_pairings: Vec<(Option<Uuid>, PairedKind)> = a_events
        .iter()
        .chain(b_events.iter())
        .filter_map(|ev| match ev {
            ServerEvent::Paired {
                session_id,
                partner_kind: PairedKind::Human,
                ..
            } => Some((*session_id, PairedKind::Human)),
            _ => None,
        })
        .collect();
    assert_eq!(human_pairings.len(), 2);
    assert_eq!(human_pairings[0].0, human_pairings[1].0);

    // Neither waiting timeout may fire later — both timers were cancelled.
    tokio::time::sleep(Duration::from_millis(40_000)).await;
    assert!(a.drain().await.is_empty());
    assert!(b.drain().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn waiting_timeout_falls_back_to_automated() {
    let commands = start_default(0.0);
    let mut a = connect(&commands, "alice", None);
    let events = a.drain().await;
    assert_eq!(
        paired_session(&events).map(|(_, k)| k),
        Some(PairedKind::Waiting)
    );

    // Default queue timeout is 30 s.
    tokio::time::sleep(Duration::from_millis(31_000)).await;
    let events = a.drain().await;
    assert_eq!(
        paired_session(&events).map(|(_, k)| k),
        Some(PairedKind::Automated)
    );
}

#[tokio::test(start_paused = true)]
async fn disconnected_waiter_is_not_offered_as_partner() {
    let commands = start_default(0.0);
    let a = connect(&commands, "alice", None);
    commands
        .send(Command::Disconnect { conn_id: a.conn_id })
        .unwrap();

    let mut b = connect(&commands, "bob", None);
    let events = b.drain().await;
    assert_eq!(
        paired_session(&events).map(|(_, k)| k),
        Some(PairedKind::Waiting)
    );
}

// ── Relay ──

async fn human_pair(
    commands: &mpsc::UnboundedSender<Command>,
) -> (Client, Client, Uuid) {
    let mut a = connect(commands, "alice", None);
    let mut b = connect(commands, "bob", None);
    let a_events = a.drain().await;
    let b_events = b.drain().await;
    let sid = a_events
        .iter()
        .chain(b_events.iter())
        .find_map(|ev| match ev {
            ServerEvent::Paired {
                session_id: Some(sid),
                partner_kind: PairedKind::Human,
                ..
            } => Some(*sid),
            _ => None,
        })
        .expect("no human pairing");
    (a, b, sid)
}

#[tokio::test(start_paused = true)]
async fn human_relay_echoes_and_forwards() {
    let commands = start_default(0.0);
    let (mut a, mut b, sid) = human_pair(&commands).await;

    send(
        &commands,
        &a,
        ClientEvent::SendMessage {
            session_id: sid,
            text: "hello there".into(),
        },
    );

    let a_events = a.drain().await;
    let b_events = b.drain().await;
    assert!(a_events.iter().any(|ev| matches!(
        ev,
        ServerEvent::ChatMessage { origin: MessageSide::Me, text } if text == "hello there"
    )));
    assert!(b_events.iter().any(|ev| matches!(
        ev,
        ServerEvent::ChatMessage { origin: MessageSide::Partner, text } if text == "hello there"
    )));
}

#[tokio::test(start_paused = true)]
async fn rapid_messages_get_replies_in_order() {
    let generator = ScriptedGenerator::new(vec![
        Ok("first reply".to_string()),
        Ok("second reply".to_string()),
    ]);
    let commands = start(
        test_config(0.0),
        generator,
        Arc::new(MemorySink::default()),
    );
    let mut a = connect(&commands, "alice", Some(ForcedPartner::Automated));
    let events = a.drain().await;
    let sid = paired_session(&events).unwrap().0.unwrap();

    // Two sends with no await between them — both reply turns queue up.
    send(
        &commands,
        &a,
        ClientEvent::SendMessage {
            session_id: sid,
            text: "one".into(),
        },
    );
    send(
        &commands,
        &a,
        ClientEvent::SendMessage {
            session_id: sid,
            text: "two".into(),
        },
    );
    a.drain().await;

    send(&commands, &a, ClientEvent::RequestHistory { session_id: sid });
    let events = a.drain().await;
    let history = events
        .iter()
        .find_map(|ev| match ev {
            ServerEvent::ChatHistory { messages } => Some(messages.clone()),
            _ => None,
        })
        .expect("no history");

    let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two", "first reply", "second reply"]);
    assert_eq!(history[2].origin, PartnerKind::Automated);
}

#[tokio::test(start_paused = true)]
async fn generation_failure_skips_the_turn() {
    let commands = start(
        test_config(0.0),
        ScriptedGenerator::always_failing(),
        Arc::new(MemorySink::default()),
    );
    let mut a = connect(&commands, "alice", Some(ForcedPartner::Automated));
    let events = a.drain().await;
    let sid = paired_session(&events).unwrap().0.unwrap();

    send(
        &commands,
        &a,
        ClientEvent::SendMessage {
            session_id: sid,
            text: "anyone there?".into(),
        },
    );
    let events = a.drain().await;

    // Composing signal goes up and comes down, but no reply arrives and the
    // session stays usable.
    assert!(events
        .iter()
        .any(|ev| matches!(ev, ServerEvent::PartnerComposing)));
    assert!(events
        .iter()
        .any(|ev| matches!(ev, ServerEvent::PartnerStoppedComposing)));
    assert!(!events.iter().any(|ev| matches!(
        ev,
        ServerEvent::ChatMessage { origin: MessageSide::Partner, .. }
    )));

    send(&commands, &a, ClientEvent::RequestHistory { session_id: sid });
    let events = a.drain().await;
    assert!(events
        .iter()
        .any(|ev| matches!(ev, ServerEvent::ChatHistory { messages } if messages.len() == 1)));
}

// ── Challenge ──

#[tokio::test(start_paused = true)]
async fn prompt_fires_exactly_once_until_resolved() {
    let config = Config {
        human_threshold: 2,
        total_threshold: 10,
        automated_bias: 0.0,
        ..Config::default()
    };
    let commands = start(
        config,
        ScriptedGenerator::always_failing(),
        Arc::new(MemorySink::default()),
    );
    let mut a = connect(&commands, "alice", Some(ForcedPartner::Automated));
    let events = a.drain().await;
    let sid = paired_session(&events).unwrap().0.unwrap();

    // 4 human messages ≥ 2 × 1 human — the prompt must fire on the second
    // and stay quiet afterwards while unresolved.
    for i in 0..4 {
        send(
            &commands,
            &a,
            ClientEvent::SendMessage {
                session_id: sid,
                text: format!("m{}", i),
            },
        );
    }
    let events = a.drain().await;
    assert_eq!(count_prompts(&events), 1);
}

#[tokio::test(start_paused = true)]
async fn guess_is_scored_and_result_withheld() {
    let sink = Arc::new(MemorySink::default());
    let (commands, mut a, sid) = automated_session_at_prompt(
        test_config(0.0),
        ScriptedGenerator::always_failing(),
        sink.clone() as Arc<dyn StatsSink>,
    )
    .await;

    send(
        &commands,
        &a,
        ClientEvent::SubmitGuess {
            session_id: sid,
            guess: "AI".into(),
        },
    );
    let events = a.drain().await;

    // Correct automated-detection: TP, stats broadcast, options offered,
    // but no guess_result yet.
    assert!(events.iter().any(|ev| matches!(
        ev,
        ServerEvent::GuessStats(m) if m.tp == 1 && m.total() == 1
    )));
    assert!(events
        .iter()
        .any(|ev| matches!(ev, ServerEvent::PostGuessOptions { .. })));
    assert!(!events
        .iter()
        .any(|ev| matches!(ev, ServerEvent::GuessResult { .. })));
    assert_eq!(count_ended(&events), 0);

    let records = sink.read_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].guessed_automated);
    assert!(records[0].actual_automated);
    assert!(records[0].correct);
}

#[tokio::test(start_paused = true)]
async fn end_choice_reveals_result_before_termination() {
    let (commands, mut a, sid) = automated_session_at_prompt(
        test_config(0.0),
        ScriptedGenerator::always_failing(),
        Arc::new(MemorySink::default()),
    )
    .await;

    send(
        &commands,
        &a,
        ClientEvent::SubmitGuess {
            session_id: sid,
            guess: "human".into(),
        },
    );
    send(
        &commands,
        &a,
        ClientEvent::SubmitContinueChoice {
            session_id: sid,
            choice: "end".into(),
        },
    );
    let events = a.drain().await;

    let result_pos = events
        .iter()
        .position(|ev| matches!(ev, ServerEvent::GuessResult { correct: false }))
        .expect("no guess_result");
    let ended_pos = events
        .iter()
        .position(|ev| matches!(
            ev,
            ServerEvent::ChatEnded { reason, partner_kind: PartnerKind::Automated, .. }
                if reason == "ended_by_user"
        ))
        .expect("no chat_ended");
    assert!(result_pos < ended_pos);
}

#[tokio::test(start_paused = true)]
async fn continue_choice_resumes_the_chat() {
    let (commands, mut a, sid) = automated_session_at_prompt(
        test_config(0.0),
        ScriptedGenerator::always_failing(),
        Arc::new(MemorySink::default()),
    )
    .await;

    send(
        &commands,
        &a,
        ClientEvent::SubmitGuess {
            session_id: sid,
            guess: "AI".into(),
        },
    );
    // Garbage choice is a no-op; the real one still lands.
    send(
        &commands,
        &a,
        ClientEvent::SubmitContinueChoice {
            session_id: sid,
            choice: "maybe".into(),
        },
    );
    send(
        &commands,
        &a,
        ClientEvent::SubmitContinueChoice {
            session_id: sid,
            choice: "continue".into(),
        },
    );
    let events = a.drain().await;
    assert!(events
        .iter()
        .any(|ev| matches!(ev, ServerEvent::ResumeChat { .. })));
    assert_eq!(count_ended(&events), 0);

    // The session is still usable.
    send(
        &commands,
        &a,
        ClientEvent::SendMessage {
            session_id: sid,
            text: "still here".into(),
        },
    );
    let events = a.drain().await;
    assert!(events.iter().any(|ev| matches!(
        ev,
        ServerEvent::ChatMessage { origin: MessageSide::Me, text } if text == "still here"
    )));
}

// ── Teardown ──

#[tokio::test(start_paused = true)]
async fn disconnect_notifies_partner_and_terminates_once() {
    let commands = start_default(0.0);
    let (a, mut b, _sid) = human_pair(&commands).await;

    commands
        .send(Command::Disconnect { conn_id: a.conn_id })
        .unwrap();
    commands
        .send(Command::Disconnect { conn_id: a.conn_id })
        .unwrap();

    let events = b.drain().await;
    assert!(events.iter().any(|ev| matches!(
        ev,
        ServerEvent::PartnerDisconnected { partner_kind: PartnerKind::Human, .. }
    )));
    assert_eq!(count_ended(&events), 1);
    assert!(events.iter().any(|ev| matches!(
        ev,
        ServerEvent::ChatEnded { reason, .. } if reason == "partner_disconnected"
    )));
}

#[tokio::test(start_paused = true)]
async fn skip_terminates_and_requeues_the_skipper() {
    let commands = start_default(0.0);
    let (mut a, mut b, sid) = human_pair(&commands).await;

    send(&commands, &a, ClientEvent::SkipPartner);

    let a_events = a.drain().await;
    let b_events = b.drain().await;

    assert!(a_events.iter().any(|ev| matches!(
        ev,
        ServerEvent::ChatEnded { reason, .. } if reason == "skipped"
    )));
    // With an empty queue and bias 0, the skipper waits again.
    assert!(a_events.iter().any(|ev| matches!(
        ev,
        ServerEvent::Paired { partner_kind: PairedKind::Waiting, .. }
    )));
    assert!(b_events.iter().any(|ev| matches!(
        ev,
        ServerEvent::ChatEnded { reason, .. } if reason == "skipped"
    )));

    // Events against the dead session are silently dropped.
    send(
        &commands,
        &a,
        ClientEvent::SendMessage {
            session_id: sid,
            text: "ghost".into(),
        },
    );
    assert!(!a.drain().await.iter().any(|ev| matches!(
        ev,
        ServerEvent::ChatMessage { .. }
    )));
    assert!(b.drain().await.is_empty());
}

// ── Presence ──

#[tokio::test(start_paused = true)]
async fn typing_is_debounced_and_retracted() {
    let commands = start_default(0.0);
    let (a, mut b, sid) = human_pair(&commands).await;

    send(&commands, &a, ClientEvent::Typing { session_id: sid });
    send(&commands, &a, ClientEvent::Typing { session_id: sid });
    // Default debounce is 500 ms; drain() sleeps well past it.
    let events = b.drain().await;
    assert_eq!(
        events
            .iter()
            .filter(|ev| matches!(ev, ServerEvent::PartnerComposing))
            .count(),
        1
    );

    // Signal is up — more typing must not re-emit.
    send(&commands, &a, ClientEvent::Typing { session_id: sid });
    assert!(b.drain().await.is_empty());

    send(&commands, &a, ClientEvent::StopTyping { session_id: sid });
    let events = b.drain().await;
    assert!(events
        .iter()
        .any(|ev| matches!(ev, ServerEvent::PartnerStoppedComposing)));
}

#[tokio::test(start_paused = true)]
async fn stop_typing_before_debounce_emits_nothing() {
    let commands = start_default(0.0);
    let (a, mut b, sid) = human_pair(&commands).await;

    send(&commands, &a, ClientEvent::Typing { session_id: sid });
    send(&commands, &a, ClientEvent::StopTyping { session_id: sid });

    let events = b.drain().await;
    assert!(!events
        .iter()
        .any(|ev| matches!(ev, ServerEvent::PartnerComposing)));
    assert!(!events
        .iter()
        .any(|ev| matches!(ev, ServerEvent::PartnerStoppedComposing)));
}
