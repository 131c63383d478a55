//! masquerade-core — Session orchestration for anonymous human/AI chat pairing.
//!
//! This crate contains the complete matchmaking, session lifecycle, reply
//! scheduling, presence, and challenge logic for the Masquerade chat game.
//! It is completely transport-agnostic — frontends (the axum WebSocket
//! server) feed it inbound events over an mpsc command channel and receive
//! outbound events on per-participant channels.

pub mod challenge;
pub mod config;
pub mod events;
pub mod generator;
pub mod matchmaker;
pub mod orchestrator;
pub mod participant;
pub mod presence;
pub mod record;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod timer;
pub mod types;
