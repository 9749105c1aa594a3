//! Authenticated store backend access
//!
//! Catalog, cart and customer operations executed under a short-lived
//! bearer credential that is refreshed transparently.

mod client;
pub mod credentials;
mod error;
mod retry;
mod types;

pub use client::StoreClient;
pub use credentials::{Credential, CredentialManager, HttpTokenIssuer, TokenIssuer};
pub use error::{CommerceError, CommerceErrorKind};
pub use types::{Cart, CartLine, CustomerRecord, Price, Product};

use async_trait::async_trait;
use std::sync::Arc;

/// Operations the dialogue needs from the store backend
#[async_trait]
pub trait CommerceApi: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, CommerceError>;

    async fn get_product(&self, product_id: &str) -> Result<Product, CommerceError>;

    /// `Ok(None)` when the file has no reachable link
    async fn get_image_href(&self, image_id: &str) -> Result<Option<String>, CommerceError>;

    async fn add_to_cart(
        &self,
        cart_ref: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), CommerceError>;

    async fn remove_from_cart(&self, cart_ref: &str, line_id: &str) -> Result<(), CommerceError>;

    async fn get_cart(&self, cart_ref: &str) -> Result<Cart, CommerceError>;

    async fn create_customer(&self, name: &str, email: &str) -> Result<(), CommerceError>;
}

#[async_trait]
impl<T: CommerceApi + ?Sized> CommerceApi for Arc<T> {
    async fn list_products(&self) -> Result<Vec<Product>, CommerceError> {
        (**self).list_products().await
    }

    async fn get_product(&self, product_id: &str) -> Result<Product, CommerceError> {
        (**self).get_product(product_id).await
    }

    async fn get_image_href(&self, image_id: &str) -> Result<Option<String>, CommerceError> {
        (**self).get_image_href(image_id).await
    }

    async fn add_to_cart(
        &self,
        cart_ref: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), CommerceError> {
        (**self).add_to_cart(cart_ref, product_id, quantity).await
    }

    async fn remove_from_cart(&self, cart_ref: &str, line_id: &str) -> Result<(), CommerceError> {
        (**self).remove_from_cart(cart_ref, line_id).await
    }

    async fn get_cart(&self, cart_ref: &str) -> Result<Cart, CommerceError> {
        (**self).get_cart(cart_ref).await
    }

    async fn create_customer(&self, name: &str, email: &str) -> Result<(), CommerceError> {
        (**self).create_customer(name, email).await
    }
}
