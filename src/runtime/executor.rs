//! Dialogue engine executor

use super::traits::{Keyboard, SessionStore, Transport};
use super::{DispatchError, InboundUpdate};

use crate::commerce::{CommerceApi, CommerceErrorKind};
use crate::render;
use crate::state_machine::{transition, DialogState, Effect, Event};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// What running one effect produced
enum EffectOutcome {
    Done,
    /// Short notice for the button acknowledgement
    Notice(&'static str),
    /// Event to feed back into the machine
    FollowUp(Event),
}

/// Generic engine that can work with any session store, backend and transport
pub struct DialogueEngine<S, C, T>
where
    S: SessionStore,
    C: CommerceApi,
    T: Transport,
{
    store: S,
    commerce: C,
    transport: T,
    /// One lock per session with an update in flight
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S, C, T> DialogueEngine<S, C, T>
where
    S: SessionStore,
    C: CommerceApi,
    T: Transport,
{
    pub fn new(store: S, commerce: C, transport: T) -> Self {
        Self {
            store,
            commerce,
            transport,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one inbound update end to end and return the persisted state.
    ///
    /// Updates for the same session are serialized. On error nothing is
    /// persisted and the session stays where it was.
    pub async fn handle_update(&self, update: InboundUpdate) -> Result<DialogState, DispatchError> {
        let lock = self.session_lock(&update.session_id);
        let mut notice = None;
        let result = {
            let _guard = lock.lock().await;
            self.dispatch(&update, &mut notice).await
        };
        drop(lock);
        self.release_session_lock(&update.session_id);

        if let Some(callback_id) = &update.callback_id {
            if let Err(e) = self.transport.answer_callback(callback_id, notice).await {
                tracing::warn!(
                    session_id = %update.session_id,
                    error = %e,
                    "Failed to answer callback"
                );
            }
        }

        let session_id = update.session_id.as_str();
        match &result {
            Ok(state) => {
                tracing::info!(session_id, state = %state, "Update handled");
            }
            Err(e) if e.log_level() == tracing::Level::WARN => {
                tracing::warn!(session_id, error = %e, "Update rejected, state unchanged");
            }
            Err(e) => {
                tracing::error!(session_id, error = %e, "Update dropped, state unchanged");
            }
        }
        result
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .session_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(session_id.to_string()).or_default().clone()
    }

    fn release_session_lock(&self, session_id: &str) {
        let mut locks = self
            .session_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the map holds it: nobody is waiting
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_sessions(&self) -> usize {
        self.session_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Read, transition, execute, persist
    async fn dispatch(
        &self,
        update: &InboundUpdate,
        notice: &mut Option<&'static str>,
    ) -> Result<DialogState, DispatchError> {
        let session_id = update.session_id.as_str();
        let event = Event::normalize(update.kind, &update.payload, update.sender_name.clone());

        // Navigation never looks at the stored state
        let mut state = if event.is_navigation() {
            DialogState::default()
        } else {
            self.store
                .get_state(session_id)
                .await
                .map_err(DispatchError::SessionStore)?
                .unwrap_or_default()
        };

        tracing::debug!(session_id, state = %state, event = event.name(), "Dispatching");

        let mut events = VecDeque::from([event]);
        while let Some(event) = events.pop_front() {
            let result = transition(state, event)?;
            state = result.new_state;

            for effect in result.effects {
                match self.execute_effect(update, effect).await? {
                    EffectOutcome::Done => {}
                    EffectOutcome::Notice(text) => *notice = Some(text),
                    EffectOutcome::FollowUp(event) => events.push_back(event),
                }
            }
        }

        self.store
            .set_state(session_id, state)
            .await
            .map_err(DispatchError::SessionStore)?;
        Ok(state)
    }

    async fn execute_effect(
        &self,
        update: &InboundUpdate,
        effect: Effect,
    ) -> Result<EffectOutcome, DispatchError> {
        let session_id = update.session_id.as_str();
        tracing::debug!(
            session_id,
            effect = ?effect,
            backend = effect.touches_backend(),
            "Executing effect"
        );

        match effect {
            Effect::ShowCatalog => {
                let products = self.commerce.list_products().await?;
                let (text, keyboard) = render::catalog(&products);
                self.replace_keyboard_message(update, &text, &keyboard).await?;
                tracing::info!(session_id, count = products.len(), "Catalog shown");
                Ok(EffectOutcome::Done)
            }

            Effect::ShowProduct { product_id } => {
                let product = self.commerce.get_product(&product_id).await?;
                let (text, keyboard) = render::product_card(&product);

                let image = match &product.main_image_ref {
                    Some(image_id) => self.image_href(image_id).await,
                    None => None,
                };

                match (image, update.keyboard_message()) {
                    (Some(url), message_id) => {
                        if let Some(message_id) = message_id {
                            self.delete_quietly(session_id, message_id).await;
                        }
                        self.transport
                            .send_photo(session_id, &url, &text, Some(&keyboard))
                            .await
                            .map_err(DispatchError::Transport)?;
                    }
                    (None, Some(message_id)) => {
                        self.transport
                            .edit_text(session_id, message_id, &text, Some(&keyboard))
                            .await
                            .map_err(DispatchError::Transport)?;
                    }
                    (None, None) => self.send(session_id, &text, Some(&keyboard)).await?,
                }
                tracing::info!(session_id, product_id = %product_id, "Product shown");
                Ok(EffectOutcome::Done)
            }

            Effect::AddToCart {
                product_id,
                quantity,
            } => {
                self.commerce
                    .add_to_cart(session_id, &product_id, quantity)
                    .await?;
                tracing::info!(session_id, product_id = %product_id, quantity, "Added to cart");
                Ok(EffectOutcome::Notice(render::ADDED_TO_CART))
            }

            Effect::ShowCart => {
                let cart = self.commerce.get_cart(session_id).await?;
                let (text, keyboard) = render::cart(&cart);
                self.replace_keyboard_message(update, &text, &keyboard).await?;
                tracing::info!(session_id, lines = cart.lines.len(), "Cart shown");
                Ok(EffectOutcome::Done)
            }

            Effect::RemoveCartLine { line_id } => {
                self.commerce.remove_from_cart(session_id, &line_id).await?;
                tracing::info!(session_id, line_id = %line_id, "Removed from cart");
                Ok(EffectOutcome::Done)
            }

            Effect::PromptEmail => {
                self.send(session_id, render::EMAIL_PROMPT, None).await?;
                Ok(EffectOutcome::Done)
            }

            Effect::RegisterCustomer { customer } => {
                self.send(session_id, &render::registration_received(&customer.email), None)
                    .await?;
                match self
                    .commerce
                    .create_customer(&customer.name, &customer.email)
                    .await
                {
                    Ok(()) => {
                        tracing::info!(session_id, email = %customer.email, "Customer registered");
                        Ok(EffectOutcome::FollowUp(Event::CustomerRegistered {
                            email: customer.email,
                        }))
                    }
                    Err(e) if e.kind == CommerceErrorKind::DuplicateEmail => {
                        tracing::warn!(
                            session_id,
                            email = %customer.email,
                            error = %e,
                            "E-mail already registered"
                        );
                        Ok(EffectOutcome::FollowUp(Event::EmailAlreadyRegistered {
                            email: customer.email,
                        }))
                    }
                    Err(e) => Err(e.into()),
                }
            }

            // Best effort: the customer already exists
            Effect::ConfirmRegistration { email } => {
                let text = render::registration_confirmed(&email);
                if let Err(e) = self.send(session_id, &text, None).await {
                    tracing::warn!(
                        session_id,
                        email = %email,
                        error = %e,
                        "Confirmation not delivered"
                    );
                }
                Ok(EffectOutcome::Done)
            }

            Effect::ReportDuplicateEmail { email } => {
                self.send(session_id, &render::duplicate_email(&email), None)
                    .await?;
                Ok(EffectOutcome::Done)
            }
        }
    }

    /// Resolve a product image; any failure degrades to a text-only card
    async fn image_href(&self, image_id: &str) -> Option<String> {
        match self.commerce.get_image_href(image_id).await {
            Ok(href) => href,
            Err(e) => {
                if e.kind.is_recoverable() {
                    tracing::info!(image_id, error = %e, "Product image missing");
                } else {
                    tracing::warn!(image_id, error = %e, "Product image unavailable");
                }
                None
            }
        }
    }

    /// Send a fresh message, removing the keyboard the user pressed first
    async fn replace_keyboard_message(
        &self,
        update: &InboundUpdate,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), DispatchError> {
        if let Some(message_id) = update.keyboard_message() {
            self.delete_quietly(&update.session_id, message_id).await;
        }
        self.send(&update.session_id, text, Some(keyboard)).await
    }

    async fn send(
        &self,
        session_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), DispatchError> {
        self.transport
            .send_text(session_id, text, keyboard)
            .await
            .map_err(DispatchError::Transport)
    }

    // Old keyboards may already be gone; that never blocks the update
    async fn delete_quietly(&self, session_id: &str, message_id: i32) {
        if let Err(e) = self.transport.delete_message(session_id, message_id).await {
            tracing::warn!(session_id, message_id, error = %e, "Failed to delete message");
        }
    }
}
