// # Notifier Trait
//
// Delivers the human-readable report of a sync run.
//
// ## Implementations
//
// - SMTP: `allowsync-notify-smtp` crate

use async_trait::async_trait;

/// Trait for status report delivery
///
/// A notification failure never fails a sync run; the engine logs it and
/// moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one status message
    ///
    /// # Parameters
    ///
    /// - `subject`: Short summary line (prefixed `ERROR:` or
    ///   `CRITICAL ERROR:` on failed runs)
    /// - `body`: The rendered report
    async fn notify(&self, subject: &str, body: &str) -> Result<(), crate::Error>;

    /// Get the notifier name (for logging/debugging)
    fn notifier_name(&self) -> &'static str;
}
