//! Per-call deadlines for store, cache and identity provider calls

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AuthError;

/// Await `operation` for at most `timeout`.
///
/// Expiry surfaces as `AuthError::ServiceUnavailable`. The inner error is logged
/// with its detail and then folded into the auth taxonomy, so callers never see
/// backend messages. Dropping the timed-out future cancels the call and
/// releases whatever connection it held.
pub async fn with_timeout<F, T, E>(
    timeout: Duration,
    call: &'static str,
    operation: F,
) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AuthError> + Display,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            let detail = e.to_string();
            let mapped: AuthError = e.into();
            match mapped {
                AuthError::ServiceUnavailable | AuthError::InternalError => {
                    warn!(call = call, error = %detail, "Backend call failed");
                }
                _ => debug!(call = call, error = %detail, "Backend call returned error"),
            }
            Err(mapped)
        }
        Err(_) => {
            warn!(
                call = call,
                timeout_ms = timeout.as_millis() as u64,
                "Backend call timed out"
            );
            Err(AuthError::ServiceUnavailable)
        }
    }
}
