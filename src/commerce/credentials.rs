//! Bearer credential issuance and freshness tracking

use super::CommerceError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Grant type the store's token endpoint expects for client-id-only auth
const GRANT_TYPE: &str = "implicit";

/// Default margin subtracted from the reported token lifetime
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(10);

/// A bearer token with the lifetime the backend reported for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl Credential {
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>, ttl_seconds: u64) -> Self {
        Self {
            value: value.into(),
            issued_at,
            ttl_seconds,
        }
    }

    /// Instant after which the token is no longer trusted.
    ///
    /// Lifetimes past the calendar's range clamp to the latest representable
    /// instant; a margin that swallows the lifetime yields `issued_at`.
    pub fn trusted_until(&self, margin: Duration) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);
        let margin = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
        let lifetime = ttl.saturating_sub(margin);
        if lifetime <= 0 {
            return self.issued_at;
        }
        ChronoDuration::try_seconds(lifetime)
            .and_then(|lifetime| self.issued_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Valid iff `now < issued_at + ttl - margin`
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now < self.trusted_until(margin)
    }
}

/// Raw token endpoint answer
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
}

/// Source of new bearer tokens
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Exchange a client id for a token. Failures are `AuthFailure`.
    async fn issue(&self, client_id: &str) -> Result<IssuedToken, CommerceError>;
}

/// Token issuer backed by the store's OAuth endpoint
pub struct HttpTokenIssuer {
    client: Client,
    token_url: String,
}

impl HttpTokenIssuer {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            token_url: format!("{}/oauth/access_token", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self, client_id: &str) -> Result<IssuedToken, CommerceError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[("client_id", client_id), ("grant_type", GRANT_TYPE)])
            .send()
            .await
            .map_err(|e| CommerceError::auth_failure(format!("Token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                CommerceError::auth_failure(format!("Failed to read token response: {e}"))
            })?;

        if !status.is_success() {
            return Err(CommerceError::auth_failure(format!(
                "Token endpoint rejected client id (HTTP {status}): {body}"
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| CommerceError::auth_failure(format!("Malformed token response: {e}")))
    }
}

/// Owns the single live credential and decides when to reissue it.
///
/// Concurrent callers that observe a stale token queue on the refresh gate,
/// so only the first of them talks to the token endpoint.
pub struct CredentialManager {
    issuer: Arc<dyn TokenIssuer>,
    client_id: String,
    safety_margin: Duration,
    current: Mutex<Option<Credential>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl CredentialManager {
    pub fn new(
        issuer: Arc<dyn TokenIssuer>,
        client_id: impl Into<String>,
        safety_margin: Duration,
    ) -> Self {
        Self {
            issuer,
            client_id: client_id.into(),
            safety_margin,
            current: Mutex::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Seed the manager with an existing credential
    #[cfg(test)]
    pub fn with_credential(self, credential: Credential) -> Self {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential);
        self
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Currently held credential, fresh or not
    pub fn current(&self) -> Option<Credential> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn current_if_fresh(&self) -> Option<Credential> {
        let now = Utc::now();
        self.current()
            .filter(|credential| credential.is_fresh_at(now, self.safety_margin))
    }

    /// Return a credential that passes the freshness check, issuing one if needed.
    pub async fn ensure_fresh(&self) -> Result<Credential, CommerceError> {
        if let Some(credential) = self.current_if_fresh() {
            return Ok(credential);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(credential) = self.current_if_fresh() {
            return Ok(credential);
        }
        self.issue().await
    }

    /// Unconditionally obtain a new token and make it the live credential.
    pub async fn issue(&self) -> Result<Credential, CommerceError> {
        tracing::info!("Issuing new store credential");
        let token = self.issuer.issue(&self.client_id).await.inspect_err(|e| {
            tracing::error!(error = %e, "Credential issuance failed");
        })?;

        let credential = Credential::new(token.access_token, Utc::now(), token.expires_in);
        if !credential.is_fresh_at(credential.issued_at, self.safety_margin) {
            return Err(CommerceError::auth_failure(format!(
                "Token lifetime {}s does not exceed the {}s safety margin",
                token.expires_in,
                self.safety_margin.as_secs()
            )));
        }

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        tracing::info!(ttl_seconds = credential.ttl_seconds, "Store credential issued");
        Ok(credential)
    }

    /// Forget `rejected` if it is still the live credential. A newer token
    /// installed by a concurrent refresh is left alone.
    pub fn invalidate(&self, rejected: &Credential) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|c| c.value == rejected.value) {
            *current = None;
        }
    }
}
