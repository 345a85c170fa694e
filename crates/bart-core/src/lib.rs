//! # Bart Core - transcript, provider gateways, conversation control
//!
//! The conversation layer of the Bart assistant. Every hard operation is
//! delegated to a remote provider; this crate shapes requests, unwraps
//! responses, and keeps the transcript consistent.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 Conversation Controller                   │
//! │  ┌────────────┐   ┌─────────────┐   ┌────────────────┐  │
//! │  │ Transcript │ ← │ Chat Gateway │   │ Image Gateway  │  │
//! │  │ (append-   │   │  (Mistral)   │   │ (Stability AI) │  │
//! │  │  only)     │   └─────────────┘   └────────────────┘  │
//! │  └────────────┘          ↓ auto-speak channel            │
//! └──────────────────────────┼───────────────────────────────┘
//!                            ↓
//!                  Voice Session Controller (bart-voice)
//! ```
//!
//! Gateways sit behind trait seams (`ChatBackend`, `ImageBackend`) so the
//! controller can be tested with fakes and the binary can defer credential
//! lookup to request time.

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod image;
pub mod transcript;

pub use chat::{ChatBackend, HistoryTurn, MistralChat};
pub use config::ServerConfig;
pub use conversation::{ConversationController, VoiceControl};
pub use error::{GatewayError, GatewayResult};
pub use image::{ImageBackend, StabilityImage};
pub use transcript::{Author, Transcript, Turn, TurnKind};
