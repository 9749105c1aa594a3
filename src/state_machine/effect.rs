//! Effects produced by state transitions

use crate::commerce::CustomerRecord;

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch the catalog and show it with a cart button
    ShowCatalog,

    /// Fetch a product and show its card with quantity options
    ShowProduct { product_id: String },

    /// Add a cart line and acknowledge it
    AddToCart { product_id: String, quantity: u32 },

    /// Fetch the cart and show it with removal and checkout buttons
    ShowCart,

    /// Remove a cart line
    RemoveCartLine { line_id: String },

    /// Ask the user for an e-mail address
    PromptEmail,

    /// Create the customer record; the outcome comes back as an event
    RegisterCustomer { customer: CustomerRecord },

    /// Tell the user the registration went through
    ConfirmRegistration { email: String },

    /// Tell the user the address is taken and ask for another
    ReportDuplicateEmail { email: String },
}

impl Effect {
    pub fn show_product(product_id: impl Into<String>) -> Self {
        Effect::ShowProduct {
            product_id: product_id.into(),
        }
    }

    pub fn add_to_cart(product_id: impl Into<String>, quantity: u32) -> Self {
        Effect::AddToCart {
            product_id: product_id.into(),
            quantity,
        }
    }

    pub fn remove_cart_line(line_id: impl Into<String>) -> Self {
        Effect::RemoveCartLine {
            line_id: line_id.into(),
        }
    }

    pub fn register_customer(name: impl Into<String>, email: impl Into<String>) -> Self {
        Effect::RegisterCustomer {
            customer: CustomerRecord {
                name: name.into(),
                email: email.into(),
            },
        }
    }

    /// Whether executing this effect calls the store backend
    pub fn touches_backend(&self) -> bool {
        !matches!(
            self,
            Effect::PromptEmail
                | Effect::ConfirmRegistration { .. }
                | Effect::ReportDuplicateEmail { .. }
        )
    }
}
