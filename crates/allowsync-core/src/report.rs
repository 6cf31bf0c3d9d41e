//! Human-readable run report
//!
//! The report is append-only. It is built by the engine while a run
//! progresses, mailed out at the end, and echoed in the HTTP response.

use chrono::{DateTime, SecondsFormat, Utc};

/// Subject prefix for runs that failed
pub const ERROR_PREFIX: &str = "ERROR:";

/// Subject prefix for runs that crashed
pub const CRITICAL_PREFIX: &str = "CRITICAL ERROR:";

/// Accumulated log of one sync run
#[derive(Debug, Clone)]
pub struct SyncReport {
    subject: String,
    lines: Vec<String>,
    started_at: DateTime<Utc>,
}

impl SyncReport {
    /// Start a new report stamped with the current time
    pub fn new() -> Self {
        let started_at = Utc::now();
        Self {
            subject: "allowsync: run in progress".to_string(),
            lines: vec![format!(
                "Sync started at {}",
                started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            )],
            started_at,
        }
    }

    /// Append an informational line
    pub fn info(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Append a warning line
    pub fn warn(&mut self, line: impl AsRef<str>) {
        self.lines.push(format!("WARNING: {}", line.as_ref()));
    }

    /// Append an error line
    pub fn error(&mut self, line: impl AsRef<str>) {
        self.lines.push(format!("ERROR: {}", line.as_ref()));
    }

    /// Append a titled list, one item per line
    pub fn list<I, T>(&mut self, title: &str, items: I)
    where
        I: IntoIterator<Item = T>,
        T: std::fmt::Display,
    {
        let items: Vec<String> = items.into_iter().map(|i| format!("  - {}", i)).collect();
        if items.is_empty() {
            self.lines.push(format!("{}: (none)", title));
        } else {
            self.lines.push(format!("{} ({}):", title, items.len()));
            self.lines.extend(items);
        }
    }

    /// Replace the subject line
    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = subject.into();
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        let finished_at = Utc::now();
        let elapsed = finished_at.signed_duration_since(self.started_at);
        self.lines.push(format!(
            "Sync finished at {} ({} ms)",
            finished_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            elapsed.num_milliseconds()
        ));
    }

    /// Current subject line
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// All lines so far
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The report body as plain text
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

impl Default for SyncReport {
    fn default() -> Self {
        Self::new()
    }
}
