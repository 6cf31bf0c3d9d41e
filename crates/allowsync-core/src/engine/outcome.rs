//! Terminal result of a sync run and its HTTP rendering

use crate::error::Error;
use crate::report::{CRITICAL_PREFIX, ERROR_PREFIX, SyncReport};
use serde::Serialize;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Missing ranges were added
    Updated {
        /// Entries the provider confirmed
        added: usize,
    },
    /// Nothing to add
    UpToDate,
    /// A required stage failed
    Failed,
    /// Unexpected error or panic
    Crashed,
    /// Another run was already in progress; nothing was done
    Rejected,
}

impl SyncStatus {
    /// HTTP status code for this outcome
    pub fn http_status(&self) -> u16 {
        match self {
            SyncStatus::Updated { .. } | SyncStatus::UpToDate => 200,
            SyncStatus::Rejected => 409,
            SyncStatus::Failed | SyncStatus::Crashed => 500,
        }
    }

    /// Whether the run reached its goal
    pub fn is_success(&self) -> bool {
        matches!(self, SyncStatus::Updated { .. } | SyncStatus::UpToDate)
    }
}

/// JSON body returned by `GET /sync`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncResponse {
    /// Summary on success or no-op
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Entries added on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<usize>,
    /// Summary on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Provider-reported error list on failure
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    /// Full report lines
    pub report: Vec<String>,
}

/// Everything a caller needs after a run
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// How the run ended
    pub status: SyncStatus,
    /// The final report (as mailed)
    pub report: SyncReport,
    /// The HTTP response body
    pub response: SyncResponse,
}

impl SyncOutcome {
    /// Outcome of a run that added `added` entries
    pub(crate) fn updated(added: usize, report: SyncReport) -> Self {
        Self {
            status: SyncStatus::Updated { added },
            response: SyncResponse {
                message: Some(format!("Added {} IP range(s) to the allowlist", added)),
                added: Some(added),
                error: None,
                details: Vec::new(),
                report: report.lines().to_vec(),
            },
            report,
        }
    }

    /// Outcome of a run that found nothing to add
    pub(crate) fn up_to_date(report: SyncReport) -> Self {
        Self {
            status: SyncStatus::UpToDate,
            response: SyncResponse {
                message: Some("Allowlist is already up to date".to_string()),
                added: Some(0),
                error: None,
                details: Vec::new(),
                report: report.lines().to_vec(),
            },
            report,
        }
    }

    /// Outcome of a failed or crashed run
    pub(crate) fn failed(status: SyncStatus, summary: &str, err: &Error, report: SyncReport) -> Self {
        let mut details = err.details().to_vec();
        if details.is_empty() {
            details.push(err.to_string());
        }

        Self {
            status,
            response: SyncResponse {
                message: None,
                added: None,
                error: Some(summary.to_string()),
                details,
                report: report.lines().to_vec(),
            },
            report,
        }
    }

    /// Outcome of a trigger that overlapped a running sync
    pub(crate) fn rejected() -> Self {
        let mut report = SyncReport::new();
        report.warn("Another sync run is in progress; this trigger was ignored");
        report.set_subject("allowsync: run skipped (already running)");

        Self {
            status: SyncStatus::Rejected,
            response: SyncResponse {
                message: None,
                added: None,
                error: Some(Error::AlreadyRunning.to_string()),
                details: Vec::new(),
                report: report.lines().to_vec(),
            },
            report,
        }
    }

    /// Outcome for a job that cannot run because its configuration is invalid
    ///
    /// No work is attempted. The report carries the configuration error so
    /// it can still be mailed if a notifier is available.
    pub fn configuration_error(err: &Error) -> Self {
        let mut report = SyncReport::new();
        report.error(err.to_string());
        report.set_subject(format!("{} allowsync is misconfigured", ERROR_PREFIX));
        report.finish();

        Self::failed(SyncStatus::Failed, "Configuration error", err, report)
    }

    /// Outcome for a run that panicked or failed unexpectedly
    pub(crate) fn crashed(err: &Error, mut report: SyncReport) -> Self {
        report.error(err.to_string());
        report.set_subject(format!("{} allowsync run crashed", CRITICAL_PREFIX));
        report.finish();

        Self::failed(SyncStatus::Crashed, "Unhandled error during sync", err, report)
    }

    /// HTTP status code for this outcome
    pub fn http_status(&self) -> u16 {
        self.status.http_status()
    }
}
