//! Mock implementations for testing
//!
//! These mocks enable end-to-end dispatch tests without real I/O.

use super::traits::*;
use crate::commerce::{Cart, CommerceApi, CommerceError, Price, Product};
use crate::state_machine::DialogState;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

// ============================================================================
// Mock Commerce Backend
// ============================================================================

/// Backend call as recorded by [`MockCommerce`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommerceCall {
    ListProducts,
    GetProduct(String),
    GetImageHref(String),
    AddToCart {
        cart_ref: String,
        product_id: String,
        quantity: u32,
    },
    RemoveFromCart {
        cart_ref: String,
        line_id: String,
    },
    GetCart(String),
    CreateCustomer {
        name: String,
        email: String,
    },
}

/// Scripted store backend
///
/// Serves a fixed catalog, remembers registered e-mails (a second
/// registration of the same address is a duplicate), and can be told to fail
/// the next calls.
pub struct MockCommerce {
    products: Vec<Product>,
    images: HashMap<String, String>,
    broken_images: HashSet<String>,
    cart: Mutex<Cart>,
    customers: Mutex<HashSet<String>>,
    failures: Mutex<VecDeque<CommerceError>>,
    /// Record of all calls made
    pub calls: Mutex<Vec<CommerceCall>>,
    slow_cart_writes: bool,
    cart_writes: Mutex<Vec<CartWrite>>,
}

/// Start or end of an in-flight cart write, keyed by cart reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartWrite {
    Start(String),
    End(String),
}

/// Most cart writes ever in flight at once among those `counted` selects
pub fn max_in_flight(writes: &[CartWrite], counted: impl Fn(&str) -> bool) -> usize {
    let mut open = 0usize;
    let mut max = 0;
    for write in writes {
        match write {
            CartWrite::Start(cart_ref) if counted(cart_ref) => {
                open += 1;
                max = max.max(open);
            }
            CartWrite::End(cart_ref) if counted(cart_ref) => open -= 1,
            _ => {}
        }
    }
    max
}

impl MockCommerce {
    pub fn new() -> Self {
        Self {
            products: Vec::new(),
            images: HashMap::new(),
            broken_images: HashSet::new(),
            cart: Mutex::new(Cart {
                lines: Vec::new(),
                total: Price::default(),
            }),
            customers: Mutex::new(HashSet::new()),
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            slow_cart_writes: false,
            cart_writes: Mutex::new(Vec::new()),
        }
    }

    /// Cart writes yield to the scheduler mid-call and leave start/end marks
    pub fn with_slow_cart_writes(mut self) -> Self {
        self.slow_cart_writes = true;
        self
    }

    pub fn cart_writes(&self) -> Vec<CartWrite> {
        self.cart_writes.lock().unwrap().clone()
    }

    pub fn with_product(mut self, product: Product) -> Self {
        self.products.push(product);
        self
    }

    pub fn with_image(mut self, image_id: impl Into<String>, href: impl Into<String>) -> Self {
        self.images.insert(image_id.into(), href.into());
        self
    }

    /// Image lookups for this id fail with an upstream error
    pub fn with_broken_image(mut self, image_id: impl Into<String>) -> Self {
        self.broken_images.insert(image_id.into());
        self
    }

    pub fn with_cart(self, cart: Cart) -> Self {
        *self.cart.lock().unwrap() = cart;
        self
    }

    pub fn with_customer(self, email: impl Into<String>) -> Self {
        self.customers.lock().unwrap().insert(email.into());
        self
    }

    /// Fail the next backend call with this error
    pub fn fail_next(&self, error: CommerceError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Get recorded calls
    pub fn recorded_calls(&self) -> Vec<CommerceCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: CommerceCall) -> Result<(), CommerceError> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for MockCommerce {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommerceApi for MockCommerce {
    async fn list_products(&self) -> Result<Vec<Product>, CommerceError> {
        self.record(CommerceCall::ListProducts)?;
        Ok(self.products.clone())
    }

    async fn get_product(&self, product_id: &str) -> Result<Product, CommerceError> {
        self.record(CommerceCall::GetProduct(product_id.to_string()))?;
        self.products
            .iter()
            .find(|p| p.id == product_id)
            .cloned()
            .ok_or_else(|| CommerceError::not_found(format!("product {product_id}")))
    }

    async fn get_image_href(&self, image_id: &str) -> Result<Option<String>, CommerceError> {
        self.record(CommerceCall::GetImageHref(image_id.to_string()))?;
        if self.broken_images.contains(image_id) {
            return Err(CommerceError::upstream(format!("file {image_id} unavailable")));
        }
        Ok(self.images.get(image_id).cloned())
    }

    async fn add_to_cart(
        &self,
        cart_ref: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), CommerceError> {
        self.record(CommerceCall::AddToCart {
            cart_ref: cart_ref.to_string(),
            product_id: product_id.to_string(),
            quantity,
        })?;
        if self.slow_cart_writes {
            let mark = |write: CartWrite| self.cart_writes.lock().unwrap().push(write);
            mark(CartWrite::Start(cart_ref.to_string()));
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            mark(CartWrite::End(cart_ref.to_string()));
        }
        Ok(())
    }

    async fn remove_from_cart(&self, cart_ref: &str, line_id: &str) -> Result<(), CommerceError> {
        self.record(CommerceCall::RemoveFromCart {
            cart_ref: cart_ref.to_string(),
            line_id: line_id.to_string(),
        })?;
        self.cart
            .lock()
            .unwrap()
            .lines
            .retain(|line| line.line_id != line_id);
        Ok(())
    }

    async fn get_cart(&self, cart_ref: &str) -> Result<Cart, CommerceError> {
        self.record(CommerceCall::GetCart(cart_ref.to_string()))?;
        Ok(self.cart.lock().unwrap().clone())
    }

    async fn create_customer(&self, name: &str, email: &str) -> Result<(), CommerceError> {
        self.record(CommerceCall::CreateCustomer {
            name: name.to_string(),
            email: email.to_string(),
        })?;
        if self.customers.lock().unwrap().insert(email.to_string()) {
            Ok(())
        } else {
            Err(CommerceError::duplicate_email(format!("{email} already exists")))
        }
    }
}

// ============================================================================
// Recording Transport
// ============================================================================

/// Outbound action as recorded by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        session_id: String,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Photo {
        session_id: String,
        url: String,
        caption: String,
    },
    Edit {
        session_id: String,
        message_id: i32,
        text: String,
    },
    Delete {
        session_id: String,
        message_id: i32,
    },
    CallbackAnswer {
        callback_id: String,
        notice: Option<String>,
    },
}

/// Transport that records everything and never fails unless told to
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<Sent>>,
    fail_sends: Mutex<bool>,
    fail_text: Mutex<Option<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail from now on
    pub fn fail_sends(&self) {
        *self.fail_sends.lock().unwrap() = true;
    }

    /// Make sending exactly this text fail
    pub fn fail_text(&self, text: impl Into<String>) {
        *self.fail_text.lock().unwrap() = Some(text.into());
    }

    pub fn recorded(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent, in order
    pub fn texts(&self) -> Vec<String> {
        self.recorded()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn callback_answers(&self) -> Vec<Option<String>> {
        self.recorded()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::CallbackAnswer { notice, .. } => Some(notice),
                _ => None,
            })
            .collect()
    }

    fn push(&self, sent: Sent) -> Result<(), String> {
        if *self.fail_sends.lock().unwrap() && !matches!(sent, Sent::CallbackAnswer { .. }) {
            return Err("transport unavailable".to_string());
        }
        if let Sent::Text { text, .. } = &sent {
            if self.fail_text.lock().unwrap().as_ref() == Some(text) {
                return Err("message rejected".to_string());
            }
        }
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(
        &self,
        session_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        self.push(Sent::Text {
            session_id: session_id.to_string(),
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        })
    }

    async fn send_photo(
        &self,
        session_id: &str,
        photo_url: &str,
        caption: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        self.push(Sent::Photo {
            session_id: session_id.to_string(),
            url: photo_url.to_string(),
            caption: caption.to_string(),
        })
    }

    async fn edit_text(
        &self,
        session_id: &str,
        message_id: i32,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        self.push(Sent::Edit {
            session_id: session_id.to_string(),
            message_id,
            text: text.to_string(),
        })
    }

    async fn delete_message(&self, session_id: &str, message_id: i32) -> Result<(), String> {
        self.push(Sent::Delete {
            session_id: session_id.to_string(),
            message_id,
        })
    }

    async fn answer_callback(&self, callback_id: &str, notice: Option<&str>) -> Result<(), String> {
        self.push(Sent::CallbackAnswer {
            callback_id: callback_id.to_string(),
            notice: notice.map(String::from),
        })
    }
}

// ============================================================================
// In-Memory Session Store
// ============================================================================

/// In-memory session store for testing
#[derive(Default)]
pub struct InMemorySessionStore {
    states: Mutex<HashMap<String, DialogState>>,
    /// Number of reads, to check that navigation skips the store
    pub reads: Mutex<usize>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(self, session_id: &str, state: DialogState) -> Self {
        self.states
            .lock()
            .unwrap()
            .insert(session_id.to_string(), state);
        self
    }

    pub fn state(&self, session_id: &str) -> Option<DialogState> {
        self.states.lock().unwrap().get(session_id).copied()
    }

    pub fn read_count(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_state(&self, session_id: &str) -> Result<Option<DialogState>, String> {
        *self.reads.lock().unwrap() += 1;
        Ok(self.state(session_id))
    }

    async fn set_state(&self, session_id: &str, state: DialogState) -> Result<(), String> {
        self.states
            .lock()
            .unwrap()
            .insert(session_id.to_string(), state);
        Ok(())
    }
}

// ============================================================================
// Test Engine
// ============================================================================

use super::executor::DialogueEngine;
use std::sync::Arc;

pub type TestEngine =
    DialogueEngine<Arc<InMemorySessionStore>, Arc<MockCommerce>, Arc<RecordingTransport>>;

/// Engine wired to mocks, with handles kept for assertions
pub struct TestHarness {
    pub engine: TestEngine,
    pub store: Arc<InMemorySessionStore>,
    pub commerce: Arc<MockCommerce>,
    pub transport: Arc<RecordingTransport>,
}

impl TestHarness {
    pub fn new(store: InMemorySessionStore, commerce: MockCommerce) -> Self {
        let store = Arc::new(store);
        let commerce = Arc::new(commerce);
        let transport = Arc::new(RecordingTransport::new());
        let engine = DialogueEngine::new(store.clone(), commerce.clone(), transport.clone());
        Self {
            engine,
            store,
            commerce,
            transport,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::{CartLine, CommerceErrorKind};
    use crate::render;
    use crate::runtime::{DispatchError, InboundUpdate};
    use crate::state_machine::TransitionError;

    const CHAT: &str = "1001";

    fn price(formatted: &str) -> Price {
        Price {
            amount: 100,
            currency: "USD".into(),
            formatted: formatted.into(),
        }
    }

    fn product(id: &str, image: Option<&str>) -> Product {
        Product {
            id: id.into(),
            name: format!("Fish {id}"),
            description: "Fresh".into(),
            unit_price: price("$1.00"),
            main_image_ref: image.map(String::from),
        }
    }

    fn cart_with_line() -> Cart {
        Cart {
            lines: vec![CartLine {
                line_id: "line-1".into(),
                product_id: "p42".into(),
                name: "Fish p42".into(),
                description: "Fresh".into(),
                quantity: 5,
                unit_price: price("$1.00"),
                line_total: price("$5.00"),
            }],
            total: price("$5.00"),
        }
    }

    fn harness_at(state: Option<DialogState>) -> TestHarness {
        let store = match state {
            Some(state) => InMemorySessionStore::new().with_state(CHAT, state),
            None => InMemorySessionStore::new(),
        };
        let commerce = MockCommerce::new()
            .with_product(product("p1", None))
            .with_product(product("p42", Some("img-42")))
            .with_image("img-42", "https://files.example/p42.jpg")
            .with_cart(cart_with_line());
        TestHarness::new(store, commerce)
    }

    fn press(payload: &str) -> InboundUpdate {
        InboundUpdate::button(CHAT, Some(77), "cb-1", payload)
    }

    fn say(text: &str) -> InboundUpdate {
        InboundUpdate::message(CHAT, 78, text, Some("Ann".into()))
    }

    /// Absent session, reset command: catalog fetched once, menu shown
    #[tokio::test]
    async fn test_reset_on_new_session() {
        let h = harness_at(None);

        let state = h.engine.handle_update(say("/start")).await.unwrap();

        assert_eq!(state, DialogState::BrowsingMenu);
        assert_eq!(h.store.state(CHAT), Some(DialogState::BrowsingMenu));
        assert_eq!(h.commerce.recorded_calls(), vec![CommerceCall::ListProducts]);
        assert_eq!(h.transport.texts(), vec![render::CATALOG_GREETING.to_string()]);
        // Navigation does not consult the store
        assert_eq!(h.store.read_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_from_every_state() {
        for state in DialogState::ALL {
            let h = harness_at(Some(state));
            let result = h.engine.handle_update(press("back")).await.unwrap();
            assert_eq!(result, DialogState::BrowsingMenu);
        }
    }

    #[tokio::test]
    async fn test_any_first_message_shows_catalog() {
        let h = harness_at(None);

        let state = h.engine.handle_update(say("hi there")).await.unwrap();

        assert_eq!(state, DialogState::BrowsingMenu);
        assert_eq!(h.commerce.recorded_calls(), vec![CommerceCall::ListProducts]);
    }

    #[tokio::test]
    async fn test_catalog_replaces_pressed_keyboard() {
        let h = harness_at(Some(DialogState::CartView));

        h.engine.handle_update(press("back")).await.unwrap();

        let sent = h.transport.recorded();
        assert_eq!(
            sent[0],
            Sent::Delete {
                session_id: CHAT.into(),
                message_id: 77
            }
        );
        assert!(matches!(&sent[1], Sent::Text { text, .. } if text == render::CATALOG_GREETING));
    }

    #[tokio::test]
    async fn test_product_with_image_sent_as_photo() {
        let h = harness_at(Some(DialogState::BrowsingMenu));

        let state = h.engine.handle_update(press("p42")).await.unwrap();

        assert_eq!(state, DialogState::ViewingProduct);
        assert_eq!(
            h.commerce.recorded_calls(),
            vec![
                CommerceCall::GetProduct("p42".into()),
                CommerceCall::GetImageHref("img-42".into()),
            ]
        );
        assert!(h.transport.recorded().iter().any(
            |s| matches!(s, Sent::Photo { url, .. } if url == "https://files.example/p42.jpg")
        ));
    }

    #[tokio::test]
    async fn test_product_without_image_edits_text() {
        let h = harness_at(Some(DialogState::BrowsingMenu));

        h.engine.handle_update(press("p1")).await.unwrap();

        let sent = h.transport.recorded();
        assert!(matches!(
            &sent[0],
            Sent::Edit { message_id: 77, text, .. } if text.contains("Fish p1")
        ));
        assert!(!sent.iter().any(|s| matches!(s, Sent::Photo { .. })));
    }

    #[tokio::test]
    async fn test_image_failure_degrades_to_text() {
        let h = TestHarness::new(
            InMemorySessionStore::new().with_state(CHAT, DialogState::BrowsingMenu),
            MockCommerce::new()
                .with_product(product("p7", Some("img-7")))
                .with_broken_image("img-7"),
        );

        let state = h.engine.handle_update(press("p7")).await.unwrap();

        assert_eq!(state, DialogState::ViewingProduct);
        let sent = h.transport.recorded();
        assert!(matches!(&sent[0], Sent::Edit { text, .. } if text.contains("Fish p7")));
    }

    #[tokio::test]
    async fn test_unknown_product_leaves_state_unchanged() {
        let h = harness_at(Some(DialogState::BrowsingMenu));

        let err = h.engine.handle_update(press("nope")).await.unwrap_err();

        assert!(matches!(err, DispatchError::Commerce(e) if e.kind == CommerceErrorKind::NotFound));
        assert_eq!(h.store.state(CHAT), Some(DialogState::BrowsingMenu));
        assert_eq!(h.transport.callback_answers(), vec![None]);
    }

    /// Quantity selection adds the line and keeps the card open
    #[tokio::test]
    async fn test_quantity_selection() {
        let h = harness_at(Some(DialogState::ViewingProduct));

        let state = h.engine.handle_update(press("p42,5")).await.unwrap();

        assert_eq!(state, DialogState::ViewingProduct);
        assert_eq!(
            h.commerce.recorded_calls(),
            vec![CommerceCall::AddToCart {
                cart_ref: CHAT.into(),
                product_id: "p42".into(),
                quantity: 5,
            }]
        );
        assert_eq!(
            h.transport.callback_answers(),
            vec![Some(render::ADDED_TO_CART.to_string())]
        );
    }

    #[tokio::test]
    async fn test_open_cart_from_anywhere() {
        let h = harness_at(Some(DialogState::ViewingProduct));

        let state = h.engine.handle_update(press("cart")).await.unwrap();

        assert_eq!(state, DialogState::CartView);
        assert_eq!(h.commerce.recorded_calls(), vec![CommerceCall::GetCart(CHAT.into())]);
        let texts = h.transport.texts();
        assert!(texts[0].contains("Total: $5.00"));
    }

    #[tokio::test]
    async fn test_remove_line_rerenders_cart() {
        let h = harness_at(Some(DialogState::CartView));

        let state = h.engine.handle_update(press("line-1")).await.unwrap();

        assert_eq!(state, DialogState::CartView);
        assert_eq!(
            h.commerce.recorded_calls(),
            vec![
                CommerceCall::RemoveFromCart {
                    cart_ref: CHAT.into(),
                    line_id: "line-1".into()
                },
                CommerceCall::GetCart(CHAT.into()),
            ]
        );
        assert!(h.transport.texts()[0].starts_with("Your cart is empty"));
    }

    /// Checkout prompts for an e-mail without touching the backend
    #[tokio::test]
    async fn test_checkout_from_cart() {
        let h = harness_at(Some(DialogState::CartView));

        let state = h.engine.handle_update(press("payment")).await.unwrap();

        assert_eq!(state, DialogState::AwaitingEmail);
        assert!(h.commerce.recorded_calls().is_empty());
        assert_eq!(h.transport.texts(), vec![render::EMAIL_PROMPT.to_string()]);
        assert_eq!(h.transport.callback_answers(), vec![None]);
    }

    #[tokio::test]
    async fn test_email_registers_customer() {
        let h = harness_at(Some(DialogState::AwaitingEmail));

        let state = h.engine.handle_update(say("a@b.com")).await.unwrap();

        assert_eq!(state, DialogState::End);
        assert_eq!(h.store.state(CHAT), Some(DialogState::End));
        assert_eq!(
            h.commerce.recorded_calls(),
            vec![CommerceCall::CreateCustomer {
                name: "Ann".into(),
                email: "a@b.com".into()
            }]
        );
        assert_eq!(
            h.transport.texts(),
            vec![
                render::registration_received("a@b.com"),
                render::registration_confirmed("a@b.com"),
            ]
        );
    }

    /// Duplicate e-mail: user is asked again, session waits for another address
    #[tokio::test]
    async fn test_duplicate_email_asks_again() {
        let h = TestHarness::new(
            InMemorySessionStore::new().with_state(CHAT, DialogState::AwaitingEmail),
            MockCommerce::new().with_customer("a@b.com"),
        );

        let state = h.engine.handle_update(say("a@b.com")).await.unwrap();

        assert_eq!(state, DialogState::AwaitingEmail);
        assert_eq!(h.store.state(CHAT), Some(DialogState::AwaitingEmail));
        assert_eq!(
            h.transport.texts().last(),
            Some(&render::duplicate_email("a@b.com"))
        );

        // A different address goes through
        let state = h.engine.handle_update(say("c@d.com")).await.unwrap();
        assert_eq!(state, DialogState::End);
    }

    #[tokio::test]
    async fn test_lost_confirmation_still_ends_registration() {
        let h = harness_at(Some(DialogState::AwaitingEmail));
        h.transport.fail_text(render::registration_confirmed("a@b.com"));

        let state = h.engine.handle_update(say("a@b.com")).await.unwrap();

        assert_eq!(state, DialogState::End);
        assert_eq!(h.store.state(CHAT), Some(DialogState::End));
        assert_eq!(
            h.transport.texts(),
            vec![render::registration_received("a@b.com")]
        );
    }

    #[tokio::test]
    async fn test_same_email_twice_is_duplicate_second_time() {
        let commerce = MockCommerce::new();
        assert!(commerce.create_customer("Ann", "a@b.com").await.is_ok());
        let err = commerce.create_customer("Ann", "a@b.com").await.unwrap_err();
        assert_eq!(err.kind, CommerceErrorKind::DuplicateEmail);
    }

    #[tokio::test]
    async fn test_registration_retried_from_registering_state() {
        let h = harness_at(Some(DialogState::RegisteringCustomer));

        let state = h.engine.handle_update(say("a@b.com")).await.unwrap();

        assert_eq!(state, DialogState::End);
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_state_unchanged() {
        let h = harness_at(Some(DialogState::AwaitingEmail));
        h.commerce.fail_next(CommerceError::upstream("HTTP 500"));

        let err = h.engine.handle_update(say("a@b.com")).await.unwrap_err();

        assert!(matches!(err, DispatchError::Commerce(e) if e.kind == CommerceErrorKind::Upstream));
        assert_eq!(h.store.state(CHAT), Some(DialogState::AwaitingEmail));
    }

    #[tokio::test]
    async fn test_no_handler_leaves_state_unchanged() {
        let h = harness_at(Some(DialogState::BrowsingMenu));

        let err = h.engine.handle_update(say("hello")).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Transition(TransitionError::NoHandler {
                state: DialogState::BrowsingMenu,
                ..
            })
        ));
        assert_eq!(h.store.state(CHAT), Some(DialogState::BrowsingMenu));
        assert!(h.commerce.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_quantity_payload() {
        let h = harness_at(Some(DialogState::ViewingProduct));

        let err = h.engine.handle_update(press("p42")).await.unwrap_err();

        assert!(matches!(err, DispatchError::Transition(TransitionError::MalformedPayload(_))));
        // Button still acknowledged
        assert_eq!(h.transport.callback_answers(), vec![None]);
        assert_eq!(h.store.state(CHAT), Some(DialogState::ViewingProduct));
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_state_unchanged() {
        let h = harness_at(Some(DialogState::CartView));
        h.transport.fail_sends();

        let err = h.engine.handle_update(press("payment")).await.unwrap_err();

        assert!(matches!(err, DispatchError::Transport(_)));
        assert_eq!(h.store.state(CHAT), Some(DialogState::CartView));
    }

    const OTHER_CHAT: &str = "2002";

    fn slow_cart_harness() -> Arc<TestHarness> {
        Arc::new(TestHarness::new(
            InMemorySessionStore::new()
                .with_state(CHAT, DialogState::ViewingProduct)
                .with_state(OTHER_CHAT, DialogState::ViewingProduct),
            MockCommerce::new().with_slow_cart_writes(),
        ))
    }

    fn spawn_quantity_presses(
        h: &Arc<TestHarness>,
        sessions: &[&'static str],
    ) -> Vec<tokio::task::JoinHandle<Result<DialogState, DispatchError>>> {
        sessions
            .iter()
            .enumerate()
            .map(|(n, session_id)| {
                let h = h.clone();
                let update =
                    InboundUpdate::button(*session_id, Some(77), format!("cb-{n}"), "p42,1");
                tokio::spawn(async move { h.engine.handle_update(update).await })
            })
            .collect()
    }

    #[tokio::test]
    async fn test_updates_for_one_session_never_overlap() {
        let h = slow_cart_harness();

        for handle in spawn_quantity_presses(&h, &[CHAT; 8]) {
            assert_eq!(handle.await.unwrap().unwrap(), DialogState::ViewingProduct);
        }

        let writes = h.commerce.cart_writes();
        assert_eq!(writes.len(), 16);
        assert_eq!(max_in_flight(&writes, |cart_ref| cart_ref == CHAT), 1);
        assert_eq!(h.engine.tracked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_updates_for_different_sessions_interleave() {
        let h = slow_cart_harness();

        for handle in spawn_quantity_presses(&h, &[CHAT, OTHER_CHAT, CHAT, OTHER_CHAT]) {
            assert_eq!(handle.await.unwrap().unwrap(), DialogState::ViewingProduct);
        }

        let writes = h.commerce.cart_writes();
        assert_eq!(max_in_flight(&writes, |_| true), 2);
        assert_eq!(max_in_flight(&writes, |cart_ref| cart_ref == CHAT), 1);
        assert_eq!(max_in_flight(&writes, |cart_ref| cart_ref == OTHER_CHAT), 1);
        assert_eq!(h.engine.tracked_sessions(), 0);
    }

    #[test]
    fn test_max_in_flight_counts_overlap() {
        let start = |s: &str| CartWrite::Start(s.into());
        let end = |s: &str| CartWrite::End(s.into());
        let writes = [start("a"), start("a"), end("a"), start("b"), end("a"), end("b")];

        assert_eq!(max_in_flight(&writes, |c| c == "a"), 2);
        assert_eq!(max_in_flight(&writes, |c| c == "b"), 1);
        assert_eq!(max_in_flight(&writes, |_| true), 2);
    }

    #[tokio::test]
    async fn test_full_purchase_flow() {
        let h = harness_at(None);

        for (update, expected) in [
            (say("/start"), DialogState::BrowsingMenu),
            (press("p1"), DialogState::ViewingProduct),
            (press("p1,10"), DialogState::ViewingProduct),
            (press("cart"), DialogState::CartView),
            (press("payment"), DialogState::AwaitingEmail),
            (say("ann@example.com"), DialogState::End),
        ] {
            assert_eq!(h.engine.handle_update(update).await.unwrap(), expected);
        }
    }
}
