//! HTTP client for the store backend

use super::retry::with_fresh_credential;
use super::types::{
    Cart, CartItemRequest, CartLine, CustomerRequest, DataEnvelope, Product, RequestEnvelope,
    WireCart, WireCartItem, WireFile, WireProduct,
};
use super::{CommerceApi, CommerceError, CommerceErrorKind, Credential, CredentialManager};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Store backend client. Every call carries a fresh bearer token and is
/// retried once if the backend rejects it.
pub struct StoreClient {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialManager>,
}

impl StoreClient {
    pub fn new(client: Client, base_url: &str, credentials: Arc<CredentialManager>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Build the shared HTTP client with a bounded per-request timeout
    pub fn http_client(timeout: Duration) -> Result<Client, CommerceError> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CommerceError::upstream(format!("Failed to create HTTP client: {e}")))
    }

    /// Resolve `segments` below the base URL, each one escaped as a single
    /// path segment. Ids come from button payloads and are never trusted.
    fn url(&self, segments: &[&str]) -> Result<Url, CommerceError> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| matches!(**segment, "" | "." | ".."))
        {
            return Err(CommerceError::not_found(format!("Invalid resource id {bad:?}")));
        }

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CommerceError::upstream(format!("Invalid store URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| CommerceError::upstream("Store URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send one authorized request and return the body of a 2xx response.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        credential: &Credential,
        body: Option<&B>,
    ) -> Result<String, CommerceError> {
        let url = self.url(segments)?;
        let start = Instant::now();

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(&credential.value);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| CommerceError::from_reqwest(&e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CommerceError::upstream(format!("Failed to read response: {e}")))?;

        tracing::debug!(
            %method,
            path = url.path(),
            status = status.as_u16(),
            duration_ms = %start.elapsed().as_millis(),
            "Store request finished"
        );

        if status.is_success() {
            Ok(text)
        } else {
            Err(CommerceError::from_status(status, &text))
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        credential: &Credential,
    ) -> Result<T, CommerceError> {
        let body = self.send::<()>(Method::GET, segments, credential, None).await?;
        parse(&body)
    }

    async fn fetch_cart_lines(&self, cart_ref: &str) -> Result<Vec<CartLine>, CommerceError> {
        let segments = &["v2", "carts", cart_ref, "items"];
        let items: DataEnvelope<Vec<WireCartItem>> =
            with_fresh_credential(&self.credentials, "get_cart_items", move |credential| {
                async move { self.get_json(segments, &credential).await }
            })
            .await?;
        Ok(items.data.into_iter().map(CartLine::from).collect())
    }
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T, CommerceError> {
    serde_json::from_str(body)
        .map_err(|e| CommerceError::upstream(format!("Failed to parse store response: {e}")))
}

#[async_trait]
impl CommerceApi for StoreClient {
    async fn list_products(&self) -> Result<Vec<Product>, CommerceError> {
        let products: DataEnvelope<Vec<WireProduct>> =
            with_fresh_credential(&self.credentials, "list_products", move |credential| {
                async move { self.get_json(&["v2", "products"], &credential).await }
            })
            .await?;
        Ok(products.data.into_iter().map(Product::from).collect())
    }

    async fn get_product(&self, product_id: &str) -> Result<Product, CommerceError> {
        let segments = &["v2", "products", product_id];
        let product: DataEnvelope<WireProduct> =
            with_fresh_credential(&self.credentials, "get_product", move |credential| {
                async move { self.get_json(segments, &credential).await }
            })
            .await?;
        Ok(product.data.into())
    }

    async fn get_image_href(&self, image_id: &str) -> Result<Option<String>, CommerceError> {
        let segments = &["v2", "files", image_id];
        let result: Result<DataEnvelope<WireFile>, _> =
            with_fresh_credential(&self.credentials, "get_image_href", move |credential| {
                async move { self.get_json(segments, &credential).await }
            })
            .await;

        match result {
            Ok(file) => Ok(file.data.link.and_then(|link| link.href)),
            Err(e) if e.kind == CommerceErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn add_to_cart(
        &self,
        cart_ref: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), CommerceError> {
        if quantity == 0 {
            return Err(CommerceError::upstream("Quantity must be a positive integer"));
        }
        let segments = &["v2", "carts", cart_ref, "items"];
        let body = RequestEnvelope {
            data: CartItemRequest {
                id: product_id,
                kind: "cart_item",
                quantity,
            },
        };
        let body = &body;
        with_fresh_credential(&self.credentials, "add_to_cart", move |credential| async move {
            self.send(Method::POST, segments, &credential, Some(body)).await
        })
        .await?;
        Ok(())
    }

    async fn remove_from_cart(&self, cart_ref: &str, line_id: &str) -> Result<(), CommerceError> {
        let segments = &["v2", "carts", cart_ref, "items", line_id];
        with_fresh_credential(&self.credentials, "remove_from_cart", move |credential| {
            async move {
                self.send::<()>(Method::DELETE, segments, &credential, None)
                    .await
            }
        })
        .await?;
        Ok(())
    }

    async fn get_cart(&self, cart_ref: &str) -> Result<Cart, CommerceError> {
        let lines = self.fetch_cart_lines(cart_ref).await?;

        let segments = &["v2", "carts", cart_ref];
        let cart: DataEnvelope<WireCart> =
            with_fresh_credential(&self.credentials, "get_cart", move |credential| async move {
                self.get_json(segments, &credential).await
            })
            .await?;

        Ok(Cart {
            lines,
            total: cart.data.meta.display_price.with_tax,
        })
    }

    async fn create_customer(&self, name: &str, email: &str) -> Result<(), CommerceError> {
        let body = RequestEnvelope {
            data: CustomerRequest {
                kind: "customer",
                name,
                email,
            },
        };
        let body = &body;
        with_fresh_credential(&self.credentials, "create_customer", move |credential| {
            async move {
                self.send(Method::POST, &["v2", "customers"], &credential, Some(body))
                    .await
            }
        })
        .await?;
        Ok(())
    }
}
