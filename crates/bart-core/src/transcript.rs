//! The conversation transcript: immutable turns in creation order.
//!
//! Turns are append-only. Errors become new assistant turns; nothing is
//! edited in place after creation.

use crate::chat::HistoryTurn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

/// What a turn carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    Text,
    Image,
    Status,
}

/// One immutable entry in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub author: Author,
    pub kind: TurnKind,
    /// Display text for text/status turns, caption for image turns.
    pub content: String,
    /// Data-URI image payload; present only when `kind` is `Image`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    fn new(author: Author, kind: TurnKind, content: String, image_ref: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author,
            kind,
            content,
            image_ref,
            created_at: Utc::now(),
        }
    }

    pub fn user_text(content: impl Into<String>) -> Self {
        Self::new(Author::User, TurnKind::Text, content.into(), None)
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::new(Author::Assistant, TurnKind::Text, content.into(), None)
    }

    pub fn assistant_image(caption: impl Into<String>, data_uri: impl Into<String>) -> Self {
        Self::new(
            Author::Assistant,
            TurnKind::Image,
            caption.into(),
            Some(data_uri.into()),
        )
    }

    /// Session feedback line (e.g. "[stopped speaking]").
    pub fn status(content: impl Into<String>) -> Self {
        Self::new(Author::Assistant, TurnKind::Status, content.into(), None)
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }
}

/// Ordered, append-only sequence of turns. Owned exclusively by the
/// conversation controller; lifetime is the session, nothing persists.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Map the transcript into the chat gateway's history shape. Status turns
    /// are session feedback and are not part of the model context.
    pub fn history(&self) -> Vec<HistoryTurn> {
        self.turns
            .iter()
            .filter(|t| t.kind != TurnKind::Status)
            .map(|t| HistoryTurn {
                is_user: t.is_user(),
                content: t.content.clone(),
            })
            .collect()
    }
}
