//! Wire events — inbound ClientEvent, outbound ServerEvent.
//!
//! Both serialize as `{"event": "...", "data": {...}}` so the transport can
//! forward them verbatim.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ConfusionMatrix, Message, PartnerKind};

/// What a `paired` notification says about the counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairedKind {
    Human,
    Automated,
    /// No partner yet — queued, waiting for one.
    Waiting,
}

/// Which side authored a relayed chat line, from the receiver's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSide {
    Me,
    Partner,
}

/// Events consumed by the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "send_message")]
    SendMessage { session_id: Uuid, text: String },

    #[serde(rename = "typing")]
    Typing { session_id: Uuid },

    #[serde(rename = "stop_typing")]
    StopTyping { session_id: Uuid },

    #[serde(rename = "submit_guess")]
    SubmitGuess { session_id: Uuid, guess: String },

    #[serde(rename = "submit_continue_choice")]
    SubmitContinueChoice { session_id: Uuid, choice: String },

    #[serde(rename = "request_history")]
    RequestHistory { session_id: Uuid },

    #[serde(rename = "skip_partner")]
    SkipPartner,
}

/// Events delivered to a single human participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "paired")]
    Paired {
        /// Absent while waiting in the queue — no session exists yet.
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
        partner_kind: PairedKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        partner_id: Option<String>,
    },

    #[serde(rename = "chat_history")]
    ChatHistory { messages: Vec<Message> },

    #[serde(rename = "chat_message")]
    ChatMessage { origin: MessageSide, text: String },

    #[serde(rename = "partner_composing")]
    PartnerComposing,

    #[serde(rename = "partner_stopped_composing")]
    PartnerStoppedComposing,

    #[serde(rename = "challenge_prompt")]
    ChallengePrompt { text: String },

    #[serde(rename = "guess_stats")]
    GuessStats(ConfusionMatrix),

    #[serde(rename = "post_guess_options")]
    PostGuessOptions { text: String },

    #[serde(rename = "guess_result")]
    GuessResult { correct: bool },

    #[serde(rename = "resume_chat")]
    ResumeChat { text: String },

    #[serde(rename = "chat_ended")]
    ChatEnded {
        reason: String,
        partner_kind: PartnerKind,
        text: String,
    },

    #[serde(rename = "partner_disconnected")]
    PartnerDisconnected {
        text: String,
        partner_kind: PartnerKind,
    },
}

impl ServerEvent {
    /// Serialize to the JSON frame the frontend expects:
    /// `{"event": "...", "data": {...}}`
    pub fn to_ws_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_event_frame_shape() {
        let ev = ServerEvent::ChatMessage {
            origin: MessageSide::Partner,
            text: "hello".into(),
        };
        let v = ev.to_ws_json();
        assert_eq!(v["event"], "chat_message");
        assert_eq!(v["data"]["origin"], "partner");
        assert_eq!(v["data"]["text"], "hello");
    }

    #[test]
    fn test_client_event_parses() {
        let raw = r#"{"event":"submit_guess","data":{"session_id":"6f0f3a3c-8f7e-4f36-9f3e-2a5b7f7f1a2b","guess":"AI"}}"#;
        let ev: ClientEvent = serde_json::from_str(raw).unwrap();
        match ev {
            ClientEvent::SubmitGuess { guess, .. } => assert_eq!(guess, "AI"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unit_client_event_parses() {
        let raw = r#"{"event":"skip_partner"}"#;
        let ev: ClientEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(ev, ClientEvent::SkipPartner));
    }
}
