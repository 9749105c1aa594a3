//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the engine with mock implementations.

use crate::db::Database;
use crate::state_machine::DialogState;
use async_trait::async_trait;
use std::sync::Arc;

/// One inline button: what the user sees and what comes back when pressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Inline keyboard, row by row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, row: Vec<Button>) -> Self {
        self.rows.push(row);
        self
    }

    /// All payloads in display order
    pub fn payloads(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(|b| b.payload.as_str())
    }
}

/// Storage for the dialogue position of each session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `None` when the session has never been stored
    async fn get_state(&self, session_id: &str) -> Result<Option<DialogState>, String>;

    async fn set_state(&self, session_id: &str, state: DialogState) -> Result<(), String>;
}

/// Outbound side of the chat transport
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(
        &self,
        session_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String>;

    async fn send_photo(
        &self,
        session_id: &str,
        photo_url: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String>;

    async fn edit_text(
        &self,
        session_id: &str,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String>;

    async fn delete_message(&self, session_id: &str, message_id: i32) -> Result<(), String>;

    /// Acknowledge a button press, optionally with a short notice
    async fn answer_callback(&self, callback_id: &str, notice: Option<&str>) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get_state(&self, session_id: &str) -> Result<Option<DialogState>, String> {
        (**self).get_state(session_id).await
    }

    async fn set_state(&self, session_id: &str, state: DialogState) -> Result<(), String> {
        (**self).set_state(session_id, state).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_text(
        &self,
        session_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        (**self).send_text(session_id, text, keyboard).await
    }

    async fn send_photo(
        &self,
        session_id: &str,
        photo_url: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        (**self)
            .send_photo(session_id, photo_url, caption, keyboard)
            .await
    }

    async fn edit_text(
        &self,
        session_id: &str,
        message_id: i32,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        (**self)
            .edit_text(session_id, message_id, text, keyboard)
            .await
    }

    async fn delete_message(&self, session_id: &str, message_id: i32) -> Result<(), String> {
        (**self).delete_message(session_id, message_id).await
    }

    async fn answer_callback(&self, callback_id: &str, notice: Option<&str>) -> Result<(), String> {
        (**self).answer_callback(callback_id, notice).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as `SessionStore`
#[derive(Clone)]
pub struct DatabaseSessionStore {
    db: Database,
}

impl DatabaseSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DatabaseSessionStore {
    async fn get_state(&self, session_id: &str) -> Result<Option<DialogState>, String> {
        let Some(label) = self
            .db
            .get_session_state(session_id)
            .map_err(|e| e.to_string())?
        else {
            return Ok(None);
        };

        match label.parse() {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Ignoring unknown stored state");
                Ok(None)
            }
        }
    }

    async fn set_state(&self, session_id: &str, state: DialogState) -> Result<(), String> {
        self.db
            .set_session_state(session_id, state.as_str())
            .map_err(|e| e.to_string())
    }
}
