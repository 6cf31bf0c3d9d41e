//! Per-call deadlines for outbound I/O

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Run `fut` with a deadline, mapping expiry to [`Error::Timeout`]
pub(crate) async fn with_deadline<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(operation, limit.as_secs())),
    }
}
