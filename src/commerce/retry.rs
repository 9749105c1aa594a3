//! Retry-once-on-rejected-credential policy

use super::{CommerceError, Credential, CredentialManager};
use std::future::Future;

/// Run `call` with a fresh credential. If the backend rejects the token,
/// drop it, obtain a new one and run `call` exactly one more time. Whatever
/// the second attempt returns is final.
pub async fn with_fresh_credential<T, F, Fut>(
    credentials: &CredentialManager,
    operation: &str,
    call: F,
) -> Result<T, CommerceError>
where
    F: Fn(Credential) -> Fut,
    Fut: Future<Output = Result<T, CommerceError>>,
{
    let credential = credentials.ensure_fresh().await?;
    match call(credential.clone()).await {
        Err(e) if e.is_credential_rejected() => {
            tracing::warn!(
                operation,
                error = %e,
                "Credential rejected, reissuing and retrying once"
            );
            credentials.invalidate(&credential);
            let fresh = credentials.ensure_fresh().await?;
            call(fresh).await.inspect_err(|e| {
                tracing::error!(operation, error = %e, "Retry with fresh credential failed");
            })
        }
        other => other,
    }
}
