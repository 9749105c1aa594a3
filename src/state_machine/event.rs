//! Normalized dialogue events

/// Command that restarts the conversation
pub const RESET_COMMAND: &str = "/start";
/// Menu button payload, also a restart
pub const MENU_PAYLOAD: &str = "back";
/// Cart button payload
pub const CART_PAYLOAD: &str = "cart";
/// Checkout button payload
pub const CHECKOUT_PAYLOAD: &str = "payment";

/// Shape of an inbound trigger as delivered by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Command,
    ButtonPress,
    TextMessage,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Navigation, valid from any state
    Reset,
    OpenCart,
    Checkout,

    // User input
    Command {
        command: String,
    },
    ButtonPress {
        payload: String,
    },
    TextMessage {
        text: String,
        sender_name: Option<String>,
    },

    // Registration outcome, fed back by the engine
    CustomerRegistered {
        email: String,
    },
    EmailAlreadyRegistered {
        email: String,
    },
}

impl Event {
    /// Map a raw `(kind, payload)` pair to an event, recognizing the
    /// reserved navigation literals first.
    pub fn normalize(kind: EventKind, payload: &str, sender_name: Option<String>) -> Self {
        match (kind, payload) {
            (EventKind::Command, RESET_COMMAND) | (EventKind::ButtonPress, MENU_PAYLOAD) => {
                Event::Reset
            }
            (EventKind::ButtonPress, CART_PAYLOAD) => Event::OpenCart,
            (EventKind::ButtonPress, CHECKOUT_PAYLOAD) => Event::Checkout,
            (EventKind::Command, command) => Event::Command {
                command: command.to_string(),
            },
            (EventKind::ButtonPress, payload) => Event::ButtonPress {
                payload: payload.to_string(),
            },
            (EventKind::TextMessage, text) => Event::TextMessage {
                text: text.to_string(),
                sender_name,
            },
        }
    }

    /// Navigation events bypass the persisted state
    pub fn is_navigation(&self) -> bool {
        matches!(self, Event::Reset | Event::OpenCart | Event::Checkout)
    }

    /// Short name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Event::Reset => "reset",
            Event::OpenCart => "open_cart",
            Event::Checkout => "checkout",
            Event::Command { .. } => "command",
            Event::ButtonPress { .. } => "button_press",
            Event::TextMessage { .. } => "text_message",
            Event::CustomerRegistered { .. } => "customer_registered",
            Event::EmailAlreadyRegistered { .. } => "email_already_registered",
        }
    }
}

/// Split a quantity button payload `"<product_id>,<quantity>"`.
///
/// The split happens at the last comma, so only the quantity must be
/// comma-free. Quantity must be a positive integer.
pub fn parse_quantity_selection(payload: &str) -> Option<(&str, u32)> {
    let (product_id, quantity) = payload.rsplit_once(',')?;
    let quantity: u32 = quantity.trim().parse().ok()?;
    if product_id.is_empty() || quantity == 0 {
        return None;
    }
    Some((product_id, quantity))
}
