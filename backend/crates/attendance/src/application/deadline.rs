//! Bounded data-store calls

use crate::error::{AttendanceError, AttendanceResult};
use std::future::Future;
use std::time::Duration;

/// Run a store call under `limit`; expiry is a transient `StoreUnavailable`
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> AttendanceResult<T>
where
    F: Future<Output = AttendanceResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Data store call timed out"
            );
            Err(AttendanceError::StoreUnavailable(format!(
                "{operation} timed out"
            )))
        }
    }
}
