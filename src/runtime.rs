//! Runtime for executing the shop dialogue
//!
//! Turns transport updates into state machine events, runs the resulting
//! effects against the store backend and the chat, and persists where each
//! session ended up.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::DialogueEngine;
pub use traits::*;

use crate::commerce::{CommerceError, StoreClient};
use crate::state_machine::{EventKind, TransitionError};
use crate::telegram::TelegramTransport;
use thiserror::Error;

/// Type alias for the production engine with concrete implementations
pub type ProductionEngine = DialogueEngine<DatabaseSessionStore, StoreClient, TelegramTransport>;

/// Transport-neutral inbound trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    /// Chat identifier, also used as the cart reference
    pub session_id: String,
    pub kind: EventKind,
    /// Message text, command or button payload
    pub payload: String,
    /// Message carrying the pressed keyboard, or the user's own message
    pub message_id: Option<i32>,
    /// Set for button presses, which must be acknowledged
    pub callback_id: Option<String>,
    pub sender_name: Option<String>,
}

impl InboundUpdate {
    /// A typed message; a leading `/` makes it a command
    pub fn message(
        session_id: impl Into<String>,
        message_id: i32,
        text: impl Into<String>,
        sender_name: Option<String>,
    ) -> Self {
        let text = text.into();
        let kind = if text.starts_with('/') {
            EventKind::Command
        } else {
            EventKind::TextMessage
        };
        Self {
            session_id: session_id.into(),
            kind,
            payload: text,
            message_id: Some(message_id),
            callback_id: None,
            sender_name,
        }
    }

    /// A pressed inline button
    pub fn button(
        session_id: impl Into<String>,
        message_id: Option<i32>,
        callback_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            kind: EventKind::ButtonPress,
            payload: payload.into(),
            message_id,
            callback_id: Some(callback_id.into()),
            sender_name: None,
        }
    }

    /// Message that carries the keyboard the user pressed, if any
    pub fn keyboard_message(&self) -> Option<i32> {
        self.callback_id.as_ref().and(self.message_id)
    }
}

/// Why a single update could not be handled. The stored state is left
/// untouched in every case.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Store backend error: {0}")]
    Commerce(#[from] CommerceError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Session store error: {0}")]
    SessionStore(String),
}

impl DispatchError {
    /// Log level for a dropped update: input the current state has no use
    /// for is a warning, a failing handler is an error.
    pub fn log_level(&self) -> tracing::Level {
        match self {
            Self::Transition(_) => tracing::Level::WARN,
            Self::Commerce(_) | Self::Transport(_) | Self::SessionStore(_) => tracing::Level::ERROR,
        }
    }
}
