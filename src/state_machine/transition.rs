//! Pure state transition function
//!
//! Every (state, event) pair is matched explicitly so that adding a state or
//! an event variant fails to compile until its handling is decided.

use super::event::parse_quantity_selection;
use super::{DialogState, Effect, Event};
use thiserror::Error;

/// Customer name used when the transport does not tell us who is writing
pub const DEFAULT_CUSTOMER_NAME: &str = "Customer";

/// Result of a state transition
#[derive(Debug, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_state: DialogState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: DialogState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// No handler is registered for this event in this state
    #[error("No handler for {event} in state {state}")]
    NoHandler {
        state: DialogState,
        event: &'static str,
    },
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Navigation that works from any state. Checked before the persisted state
/// is consulted.
pub fn global_override(event: &Event) -> Option<TransitionResult> {
    match event {
        Event::Reset => Some(
            TransitionResult::new(DialogState::BrowsingMenu).with_effect(Effect::ShowCatalog),
        ),
        Event::OpenCart => {
            Some(TransitionResult::new(DialogState::CartView).with_effect(Effect::ShowCart))
        }
        Event::Checkout => Some(
            TransitionResult::new(DialogState::AwaitingEmail).with_effect(Effect::PromptEmail),
        ),
        Event::Command { .. }
        | Event::ButtonPress { .. }
        | Event::TextMessage { .. }
        | Event::CustomerRegistered { .. }
        | Event::EmailAlreadyRegistered { .. } => None,
    }
}

/// Pure transition function
///
/// Given the same state and event it always produces the same next state and
/// effects, with no I/O.
pub fn transition(state: DialogState, event: Event) -> Result<TransitionResult, TransitionError> {
    let no_handler = |event: &Event| TransitionError::NoHandler {
        state,
        event: event.name(),
    };

    match (state, event) {
        // Navigation ignores the current state
        (_, event @ (Event::Reset | Event::OpenCart | Event::Checkout)) => {
            global_override(&event).ok_or_else(|| no_handler(&event))
        }

        // ============================================================
        // Start: whatever the user does, show the catalog
        // ============================================================
        (
            DialogState::Start,
            Event::Command { .. } | Event::ButtonPress { .. } | Event::TextMessage { .. },
        ) => Ok(TransitionResult::new(DialogState::BrowsingMenu).with_effect(Effect::ShowCatalog)),

        // ============================================================
        // Catalog -> product card
        // ============================================================
        (DialogState::BrowsingMenu, Event::ButtonPress { payload }) => {
            Ok(TransitionResult::new(DialogState::ViewingProduct)
                .with_effect(Effect::show_product(payload)))
        }

        // ============================================================
        // Product card -> add to cart, stay on the card
        // ============================================================
        (DialogState::ViewingProduct, Event::ButtonPress { payload }) => {
            let (product_id, quantity) = parse_quantity_selection(&payload)
                .ok_or_else(|| TransitionError::MalformedPayload(payload.clone()))?;
            Ok(TransitionResult::new(DialogState::ViewingProduct)
                .with_effect(Effect::add_to_cart(product_id, quantity)))
        }

        // ============================================================
        // Cart -> remove a line and show the cart again
        // ============================================================
        (DialogState::CartView, Event::ButtonPress { payload }) => {
            Ok(TransitionResult::new(DialogState::CartView)
                .with_effect(Effect::remove_cart_line(payload))
                .with_effect(Effect::ShowCart))
        }

        // ============================================================
        // Checkout: e-mail -> customer record
        // ============================================================
        (
            DialogState::AwaitingEmail | DialogState::RegisteringCustomer,
            Event::TextMessage { text, sender_name },
        ) => {
            let email = text.trim();
            if email.is_empty() {
                return Err(TransitionError::MalformedPayload(text));
            }
            let name = sender_name.unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string());
            Ok(TransitionResult::new(DialogState::RegisteringCustomer)
                .with_effect(Effect::register_customer(name, email)))
        }

        (DialogState::RegisteringCustomer, Event::CustomerRegistered { email }) => {
            Ok(TransitionResult::new(DialogState::End)
                .with_effect(Effect::ConfirmRegistration { email }))
        }

        // Address already on file: ask for another one
        (DialogState::RegisteringCustomer, Event::EmailAlreadyRegistered { email }) => {
            Ok(TransitionResult::new(DialogState::AwaitingEmail)
                .with_effect(Effect::ReportDuplicateEmail { email }))
        }

        // ============================================================
        // No handler
        // ============================================================
        (
            DialogState::Start,
            event @ (Event::CustomerRegistered { .. } | Event::EmailAlreadyRegistered { .. }),
        )
        | (
            DialogState::BrowsingMenu | DialogState::ViewingProduct | DialogState::CartView,
            event @ (Event::Command { .. }
            | Event::TextMessage { .. }
            | Event::CustomerRegistered { .. }
            | Event::EmailAlreadyRegistered { .. }),
        )
        | (
            DialogState::AwaitingEmail,
            event @ (Event::Command { .. }
            | Event::ButtonPress { .. }
            | Event::CustomerRegistered { .. }
            | Event::EmailAlreadyRegistered { .. }),
        )
        | (
            DialogState::RegisteringCustomer,
            event @ (Event::Command { .. } | Event::ButtonPress { .. }),
        )
        | (
            DialogState::End,
            event @ (Event::Command { .. }
            | Event::ButtonPress { .. }
            | Event::TextMessage { .. }
            | Event::CustomerRegistered { .. }
            | Event::EmailAlreadyRegistered { .. }),
        ) => Err(no_handler(&event)),
    }
}
