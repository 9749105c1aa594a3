//! Chat layouts for the catalog, product cards and the cart

use crate::commerce::{Cart, Product};
use crate::runtime::{Button, Keyboard};
use crate::state_machine::event::{CART_PAYLOAD, CHECKOUT_PAYLOAD, MENU_PAYLOAD};
use crate::state_machine::PURCHASE_OPTIONS;

pub const CATALOG_GREETING: &str = "Hello! Pick a product:";
pub const ADDED_TO_CART: &str = "Added to cart";
pub const EMAIL_PROMPT: &str = "Please send your e-mail";

fn cart_button() -> Button {
    Button::new("Cart", CART_PAYLOAD)
}

fn menu_button() -> Button {
    Button::new("Menu", MENU_PAYLOAD)
}

/// One product per row, then the cart button
pub fn catalog(products: &[Product]) -> (String, Keyboard) {
    let keyboard = products
        .iter()
        .fold(Keyboard::new(), |keyboard, product| {
            keyboard.row(vec![Button::new(&product.name, &product.id)])
        })
        .row(vec![cart_button()]);
    (CATALOG_GREETING.to_string(), keyboard)
}

/// Description, price and the purchase options for one product
pub fn product_card(product: &Product) -> (String, Keyboard) {
    let text = format!(
        "{}\n\n{}\n{}",
        product.name, product.description, product.unit_price.formatted
    );

    let options = PURCHASE_OPTIONS
        .iter()
        .map(|quantity| Button::new(format!("{quantity} kg"), format!("{},{quantity}", product.id)))
        .collect();

    let keyboard = Keyboard::new()
        .row(options)
        .row(vec![cart_button(), menu_button()]);
    (text, keyboard)
}

/// Cart contents with a removal button per line. Prices and the total are
/// shown exactly as the backend reported them.
pub fn cart(cart: &Cart) -> (String, Keyboard) {
    let mut text = if cart.is_empty() {
        "Your cart is empty".to_string()
    } else {
        cart.lines
            .iter()
            .map(|line| {
                format!(
                    "{}\n{}\n{} per kg\n{} kg in cart for {}",
                    line.name,
                    line.description,
                    line.unit_price.formatted,
                    line.quantity,
                    line.line_total.formatted
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    text.push_str(&format!("\n\nTotal: {}", cart.total.formatted));

    let keyboard = cart
        .lines
        .iter()
        .fold(Keyboard::new(), |keyboard, line| {
            keyboard.row(vec![Button::new(format!("Remove {}", line.name), &line.line_id)])
        })
        .row(vec![menu_button()])
        .row(vec![Button::new("Checkout", CHECKOUT_PAYLOAD)]);
    (text, keyboard)
}

pub fn registration_received(email: &str) -> String {
    format!("You sent this e-mail: {email}")
}

pub fn registration_confirmed(email: &str) -> String {
    format!("Thank you! We will contact you at {email}")
}

pub fn duplicate_email(email: &str) -> String {
    format!("{email} is already registered. Please send another e-mail")
}
