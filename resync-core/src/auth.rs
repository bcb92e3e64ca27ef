//! Credential freshness.
//!
//! Refreshing is a plain function of the provider and the current
//! credential. The caller decides what to do with the result.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::SyncError;
use crate::provider::{AuthState, RemoteProvider};
use crate::retry::{with_retry, RetryPolicy};

/// Refresh credentials this long before they expire.
pub const AUTH_EXPIRY_GRACE: Duration = Duration::from_secs(60);

/// True when `auth` expires within `grace` of `now`.
pub fn needs_refresh(auth: &AuthState, now: DateTime<Utc>, grace: Duration) -> bool {
    match auth.expires_at {
        // A negative remaining time means already expired.
        Some(expires_at) => (expires_at - now)
            .to_std()
            .map(|remaining| remaining <= grace)
            .unwrap_or(true),
        None => false,
    }
}

/// Obtain a new credential without prompting.
///
/// A refresh that yields no refresh token keeps the old one.
pub async fn refresh(
    provider: &dyn RemoteProvider,
    current: &AuthState,
    policy: &RetryPolicy,
) -> Result<AuthState, SyncError> {
    tracing::debug!("Refreshing credentials for provider {}", provider.id());
    let mut fresh = with_retry(policy, "auth refresh", || provider.sign_in(false)).await?;
    if fresh.refresh_token.is_none() {
        fresh.refresh_token = current.refresh_token.clone();
    }
    Ok(fresh)
}
