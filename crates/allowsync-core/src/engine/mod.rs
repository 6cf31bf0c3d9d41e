//! Reconciliation engine
//!
//! The SyncEngine is responsible for:
//! - Allowlisting the dynamic-DNS home address (optional, best-effort)
//! - Walking the SPF tree to find the desired ranges
//! - Diffing them against the provider allowlist
//! - Adding only what is missing
//! - Reporting the run by notification and return value
//!
//! ## Stages
//!
//! ```text
//! Start
//!   │
//!   ▼
//! ResolveHomeIp ──▶ CheckHomeInAllowlist ──▶ [AddHomeIp]      (failures skip ahead)
//!   │
//!   ▼
//! FetchSpfIps ──▶ FetchCurrentAllowlist ──▶ ComputeDiff ──▶ [ApplyDiff]
//!   │                   │                                      │
//!   └── abort ──────────┴── abort ─────────────────────────────┴── abort
//!   ▼
//! Notify ──▶ Done
//! ```
//!
//! Progress is strictly forward and nothing is retried. Home stage failures
//! are annotated in the report and the run continues. An empty SPF result,
//! an unreadable allowlist or a failed write abort the run.

mod outcome;

pub use outcome::{SyncOutcome, SyncResponse, SyncStatus};

use crate::config::SyncConfig;
use crate::deadline::with_deadline;
use crate::diff::missing_ranges;
use crate::error::{Error, Result};
use crate::home::HomeHostResolver;
use crate::report::{ERROR_PREFIX, SyncReport};
use crate::spf::SpfResolver;
use crate::traits::{AddResult, AllowlistProvider, DnsResolver, IpRange, Notifier};
use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Stages of one reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStage {
    Start,
    ResolveHomeIp,
    CheckHomeInAllowlist,
    AddHomeIp,
    FetchSpfIps,
    FetchCurrentAllowlist,
    ComputeDiff,
    ApplyDiff,
    Notify,
    Done,
}

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The run moved to a new stage
    StageEntered(SyncStage),

    /// The provider confirmed new entries
    RangesAdded { count: usize },

    /// The run finished
    Completed { status: SyncStatus },

    /// A trigger was rejected because a run was in progress
    Rejected,
}

/// Result of the part of the run that decides the HTTP status
enum Reconciled {
    UpToDate,
    Applied(AddResult),
}

/// Core reconciliation engine
///
/// One engine serves any number of sequential runs. Runs never overlap:
/// a trigger that arrives while a run is in flight is rejected with
/// [`SyncStatus::Rejected`] without touching DNS or the provider.
///
/// Every outbound call is bounded by `EngineConfig::call_timeout_secs`.
pub struct SyncEngine {
    /// DNS lookups (TXT and A)
    dns: Box<dyn DnsResolver>,

    /// Allowlist read/write
    provider: Box<dyn AllowlistProvider>,

    /// Status report delivery (None = no emails)
    notifier: Option<Box<dyn Notifier>>,

    /// SPF root domain
    spf_root: String,

    /// Dynamic-DNS hostname
    home_hostname: Option<String>,

    /// Deadline for each outbound call
    call_timeout: Duration,

    /// Treat a failed allowlist read as empty instead of aborting
    assume_empty_on_read_failure: bool,

    /// Serializes runs
    run_lock: Mutex<()>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Parameters
    ///
    /// - `dns`: DNS resolver implementation
    /// - `provider`: Allowlist provider implementation
    /// - `notifier`: Optional report delivery
    /// - `config`: Sync configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        dns: Box<dyn DnsResolver>,
        provider: Box<dyn AllowlistProvider>,
        notifier: Option<Box<dyn Notifier>>,
        config: &SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            dns,
            provider,
            notifier,
            spf_root: config.spf_root_domain.clone(),
            home_hostname: config.home_hostname.clone(),
            call_timeout: Duration::from_secs(config.engine.call_timeout_secs),
            assume_empty_on_read_failure: config.engine.assume_empty_on_read_failure,
            run_lock: Mutex::new(()),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run one reconciliation
    ///
    /// Always produces an outcome; errors are folded into it. Exactly one
    /// notification is attempted per completed run. A panic during
    /// reconciliation becomes [`SyncStatus::Crashed`] and keeps every report
    /// line written before it.
    pub async fn run(&self) -> SyncOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("Sync already in progress, rejecting trigger");
            self.emit_event(SyncEvent::Rejected);
            return SyncOutcome::rejected();
        };

        self.enter(SyncStage::Start);
        let mut report = SyncReport::new();
        info!("Starting allowlist sync (provider: {})", self.provider.provider_name());

        let caught = AssertUnwindSafe(self.reconcile(&mut report))
            .catch_unwind()
            .await;
        let result = caught.unwrap_or_else(|payload| Err(contain_panic(payload)));

        let outcome = match result {
            Ok(Reconciled::Applied(added)) => {
                report.set_subject(format!("allowsync: {} IP range(s) added", added.added));
                report.finish();
                self.deliver(&mut report).await;
                SyncOutcome::updated(added.added, report)
            }
            Ok(Reconciled::UpToDate) => {
                report.set_subject("allowsync: already up to date");
                report.finish();
                self.deliver(&mut report).await;
                SyncOutcome::up_to_date(report)
            }
            Err(e @ Error::Unhandled(_)) => {
                error!("Sync crashed: {}", e);
                let mut outcome = SyncOutcome::crashed(&e, report);
                self.deliver(&mut outcome.report).await;
                outcome.response.report = outcome.report.lines().to_vec();
                outcome
            }
            Err(e) => {
                error!("Sync failed: {}", e);
                report.error(e.to_string());
                report.set_subject(format!("{} allowsync run failed", ERROR_PREFIX));
                report.finish();
                self.deliver(&mut report).await;
                SyncOutcome::failed(SyncStatus::Failed, failure_summary(&e), &e, report)
            }
        };

        self.enter(SyncStage::Done);
        self.emit_event(SyncEvent::Completed {
            status: outcome.status,
        });
        info!("Sync finished: {:?}", outcome.status);

        outcome
    }

    /// Run one reconciliation on its own task, containing panics
    ///
    /// Panics during reconciliation are already handled by [`run`](Self::run).
    /// Anything that still takes the task down, such as a panicking notifier,
    /// is reported as [`SyncStatus::Crashed`] with a `CRITICAL ERROR:`
    /// notification instead of tearing down the caller.
    pub async fn run_guarded(self: Arc<Self>) -> SyncOutcome {
        let engine = Arc::clone(&self);
        match tokio::spawn(async move { engine.run().await }).await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                let err = if join_err.is_panic() {
                    contain_panic(join_err.into_panic())
                } else {
                    error!("Sync task aborted: {:?}", join_err);
                    Error::unhandled(join_err.to_string())
                };

                let mut outcome = SyncOutcome::crashed(&err, SyncReport::new());
                self.deliver(&mut outcome.report).await;
                outcome.response.report = outcome.report.lines().to_vec();
                self.emit_event(SyncEvent::Completed {
                    status: outcome.status,
                });
                outcome
            }
        }
    }

    /// Deliver a report through the configured notifier
    ///
    /// Used by the daemon for runs that never reach the engine, such as a
    /// configuration error at startup.
    pub async fn notify_with(
        notifier: Option<&dyn Notifier>,
        call_timeout: Duration,
        report: &mut SyncReport,
    ) {
        let Some(notifier) = notifier else {
            debug!("No notifier configured, skipping status email");
            return;
        };

        let subject = report.subject().to_string();
        let body = report.render();
        let sent = with_deadline(
            "status notification",
            call_timeout,
            notifier.notify(&subject, &body),
        )
        .await;

        match sent {
            Ok(()) => info!("Status report sent via {}", notifier.notifier_name()),
            Err(e) => {
                warn!("Failed to send status report: {}", e);
                report.warn(format!("Status email could not be sent: {}", e));
            }
        }
    }

    async fn reconcile(&self, report: &mut SyncReport) -> Result<Reconciled> {
        self.sync_home_ip(report).await;

        // Desired state
        self.enter(SyncStage::FetchSpfIps);
        report.info(format!("SPF root: {}", self.spf_root));
        let spf = SpfResolver::new(self.dns.as_ref(), self.call_timeout)
            .resolve(&self.spf_root)
            .await;

        report.list("Domains queried", &spf.queried);
        if !spf.failed.is_empty() {
            report.list(
                "Domains that failed to resolve",
                spf.failed.iter().map(|(domain, e)| format!("{}: {}", domain, e)),
            );
        }
        report.list("IP ranges found", &spf.ranges);

        if spf.ranges.is_empty() {
            return Err(Error::resolution(format!(
                "No ip4 ranges found in the SPF tree of {}",
                self.spf_root
            )));
        }

        // Current state
        self.enter(SyncStage::FetchCurrentAllowlist);
        let current = match self.read_allowlist().await {
            Ok(current) => current,
            Err(e) if self.assume_empty_on_read_failure => {
                warn!("Allowlist read failed, assuming empty: {}", e);
                report.error(format!(
                    "{}. Treating the allowlist as empty; existing entries may be submitted again",
                    e
                ));
                BTreeSet::new()
            }
            Err(e) => return Err(e),
        };
        report.info(format!("Allowlist currently has {} entr(ies)", current.len()));

        self.enter(SyncStage::ComputeDiff);
        let missing = missing_ranges(&spf.ranges, &current);
        report.list("IP ranges already present", spf.ranges.intersection(&current));

        if missing.is_empty() {
            info!("Allowlist already contains all {} SPF range(s)", spf.ranges.len());
            report.info("Allowlist is already up to date, nothing to add");
            return Ok(Reconciled::UpToDate);
        }

        self.enter(SyncStage::ApplyDiff);
        info!("Adding {} missing range(s) to the allowlist", missing.len());
        let added = self.write_allowlist(&missing).await?;
        self.emit_event(SyncEvent::RangesAdded { count: added.added });
        report.list("IP ranges added", &added.entries);
        if added.added != missing.len() {
            report.warn(format!(
                "Requested {} range(s), provider confirmed {}",
                missing.len(),
                added.added
            ));
        }

        Ok(Reconciled::Applied(added))
    }

    /// Best-effort home IP allowlisting; never aborts the run
    async fn sync_home_ip(&self, report: &mut SyncReport) {
        self.enter(SyncStage::ResolveHomeIp);

        let Some(hostname) = self.home_hostname.as_deref() else {
            warn!("Home hostname not configured, skipping home IP stage");
            report.warn("Home hostname not configured; home IP allowlisting skipped");
            return;
        };

        let home_ip = match HomeHostResolver::new(self.dns.as_ref(), self.call_timeout)
            .resolve(hostname)
            .await
        {
            Ok(ip) => ip,
            Err(e) => {
                warn!("Could not resolve home host {}: {}", hostname, e);
                report.warn(format!(
                    "Could not resolve home host {}: {}; home IP allowlisting skipped",
                    hostname, e
                ));
                return;
            }
        };
        report.info(format!("Home host {} resolved to {}", hostname, home_ip));

        self.enter(SyncStage::CheckHomeInAllowlist);
        let current = match self.read_allowlist().await {
            Ok(current) => current,
            Err(e) => {
                warn!("Could not check home IP against allowlist: {}", e);
                report.warn(format!("{}; home IP allowlisting skipped", e));
                return;
            }
        };

        let home = IpRange::from(home_ip);
        let host_route = IpRange::new(format!("{}/32", home_ip));
        if current.contains(&home) || current.contains(&host_route) {
            debug!("Home IP {} already allowlisted", home_ip);
            report.info(format!("Home IP {} is already allowlisted", home_ip));
            return;
        }

        self.enter(SyncStage::AddHomeIp);
        match self.write_allowlist(std::slice::from_ref(&home)).await {
            Ok(added) => {
                info!("Added home IP {} to allowlist", home_ip);
                self.emit_event(SyncEvent::RangesAdded { count: added.added });
                report.info(format!("Added home IP {} to the allowlist", home_ip));
            }
            Err(e) => {
                warn!("Failed to add home IP {}: {}", home_ip, e);
                report.error(format!("Failed to add home IP {}: {}", home_ip, e));
                for detail in e.details() {
                    report.error(format!("  provider: {}", detail));
                }
            }
        }
    }

    async fn read_allowlist(&self) -> Result<BTreeSet<IpRange>> {
        with_deadline("allowlist read", self.call_timeout, self.provider.list())
            .await
            .map_err(|e| match e {
                Error::ProviderRead(_) => e,
                other => Error::provider_read(other.to_string()),
            })
    }

    async fn write_allowlist(&self, entries: &[IpRange]) -> Result<AddResult> {
        debug_assert!(!entries.is_empty(), "allowlist writes are never empty");
        with_deadline("allowlist write", self.call_timeout, self.provider.add(entries))
            .await
            .map_err(|e| match e {
                Error::ProviderWrite { .. } | Error::Unhandled(_) => e,
                other => Error::provider_write(other.to_string(), Vec::new()),
            })
    }

    async fn deliver(&self, report: &mut SyncReport) {
        self.enter(SyncStage::Notify);
        Self::notify_with(self.notifier.as_deref(), self.call_timeout, report).await;
    }

    fn enter(&self, stage: SyncStage) {
        debug!("Entering stage {:?}", stage);
        self.emit_event(SyncEvent::StageEntered(stage));
    }

    /// Emit an engine event
    fn emit_event(&self, event: SyncEvent) {
        if self.event_tx.try_send(event).is_err() {
            // Full or closed; monitoring is best-effort
            debug!("Event channel unavailable, dropping event");
        }
    }
}

fn failure_summary(err: &Error) -> &'static str {
    match err {
        Error::Resolution(_) => "Failed to resolve SPF IP ranges",
        Error::ProviderRead(_) => "Failed to read the current allowlist",
        Error::ProviderWrite { .. } => "Failed to add IP ranges to the allowlist",
        Error::Timeout { .. } => "Sync timed out",
        Error::Config(_) => "Configuration error",
        _ => "Sync failed",
    }
}

/// Log a contained panic with a backtrace and turn it into an error
///
/// The backtrace is taken where the panic is caught; the panic hook has
/// already printed the panic location.
fn contain_panic(payload: Box<dyn Any + Send>) -> Error {
    let message = panic_message(payload);
    error!(
        "Sync panicked: {}\nbacktrace:\n{}",
        message,
        Backtrace::force_capture()
    );
    Error::unhandled(message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_summaries() {
        assert_eq!(
            failure_summary(&Error::provider_write("x", vec![])),
            "Failed to add IP ranges to the allowlist"
        );
        assert_eq!(
            failure_summary(&Error::provider_read("x")),
            "Failed to read the current allowlist"
        );
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(Box::new("boom")), "panic: boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "panic: bang");
        assert_eq!(panic_message(Box::new(7u8)), "panic with non-string payload");
    }
}
