//! Commerce backend error types

use thiserror::Error;

/// Commerce error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommerceError {
    pub kind: CommerceErrorKind,
    pub message: String,
}

impl CommerceError {
    pub fn new(kind: CommerceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::new(CommerceErrorKind::AuthFailure, message)
    }

    pub fn credential_rejected(message: impl Into<String>) -> Self {
        Self::new(CommerceErrorKind::CredentialRejected, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(CommerceErrorKind::Upstream, message)
    }

    pub fn duplicate_email(message: impl Into<String>) -> Self {
        Self::new(CommerceErrorKind::DuplicateEmail, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(CommerceErrorKind::NotFound, message)
    }

    /// Map a non-2xx backend status to an error kind.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => Self::credential_rejected(format!("Credential rejected: {body}")),
            404 => Self::not_found(format!("Not found: {body}")),
            409 => Self::duplicate_email(format!("Conflict: {body}")),
            _ => Self::upstream(format!("HTTP {status}: {body}")),
        }
    }

    /// Map a transport-level failure. Timeouts are plain upstream errors and
    /// never trigger a credential refresh.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::upstream(format!("Request timeout: {err}"))
        } else if err.is_connect() {
            Self::upstream(format!("Connection failed: {err}"))
        } else {
            Self::upstream(format!("Request failed: {err}"))
        }
    }

    pub fn is_credential_rejected(&self) -> bool {
        self.kind == CommerceErrorKind::CredentialRejected
    }
}

/// Error classification for retry and dialogue decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommerceErrorKind {
    /// Credential issuance failed - fatal to the current operation
    AuthFailure,
    /// Backend rejected the bearer token (401) - retried once with a fresh token
    CredentialRejected,
    /// Network, timeout or any other backend failure
    Upstream,
    /// Customer e-mail already exists (409) - recoverable
    DuplicateEmail,
    /// Referenced product, file or cart line does not exist (404)
    NotFound,
}

impl CommerceErrorKind {
    /// Whether the conversation can continue normally after this error
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::DuplicateEmail | Self::NotFound)
    }
}
