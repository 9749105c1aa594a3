//! Dialogue state types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a user is in the shopping conversation.
///
/// Persisted in the session store as the plain label returned by
/// [`DialogState::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogState {
    /// No conversation yet, or explicitly reset
    #[default]
    Start,
    /// Catalog shown, waiting for a product pick
    BrowsingMenu,
    /// Product card shown, waiting for a quantity pick
    ViewingProduct,
    /// Cart shown, waiting for a line removal
    CartView,
    /// Asked for an e-mail address
    AwaitingEmail,
    /// E-mail received, customer record being created
    RegisteringCustomer,
    /// Checkout finished
    End,
}

impl DialogState {
    pub const ALL: [DialogState; 7] = [
        DialogState::Start,
        DialogState::BrowsingMenu,
        DialogState::ViewingProduct,
        DialogState::CartView,
        DialogState::AwaitingEmail,
        DialogState::RegisteringCustomer,
        DialogState::End,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DialogState::Start => "START",
            DialogState::BrowsingMenu => "BROWSING_MENU",
            DialogState::ViewingProduct => "VIEWING_PRODUCT",
            DialogState::CartView => "CART_VIEW",
            DialogState::AwaitingEmail => "AWAITING_EMAIL",
            DialogState::RegisteringCustomer => "REGISTERING_CUSTOMER",
            DialogState::End => "END",
        }
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label that is not one of the defined states
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown dialog state label: {0}")]
pub struct UnknownState(pub String);

impl FromStr for DialogState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DialogState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// Quantity options offered on a product card
pub const PURCHASE_OPTIONS: [u32; 3] = [1, 5, 10];
