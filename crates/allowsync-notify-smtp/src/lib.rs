// # SMTP Notifier
//
// Sends the sync report as a plain-text email through an authenticated
// SMTP relay.
//
// ## Transport
//
// - Port 465: implicit TLS
// - Any other port: STARTTLS (required, not opportunistic)
//
// The password never appears in logs or `Debug` output.

use allowsync_core::config::SmtpConfig;
use allowsync_core::traits::Notifier;
use allowsync_core::{Error, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// Port that speaks TLS from the first byte
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Notifier that mails each report to a single recipient
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
    port: u16,
    from: Mailbox,
    to: Mailbox,
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpNotifier {
    /// Build a notifier from configuration
    ///
    /// No connection is opened here; the relay is contacted on each send.
    ///
    /// # Errors
    ///
    /// `Error::Config` for an empty host, an unparseable address, or a
    /// TLS setup failure.
    pub fn from_config(config: &SmtpConfig, timeout: Duration) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(Error::config("SMTP host cannot be empty"));
        }

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| Error::config(format!("Invalid SMTP sender '{}': {}", config.from, e)))?;
        let to: Mailbox = config
            .to
            .parse()
            .map_err(|e| Error::config(format!("Invalid SMTP recipient '{}': {}", config.to, e)))?;

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| Error::config(format!("SMTP TLS setup for {} failed: {}", config.host, e)))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(timeout))
            .build();

        tracing::debug!(
            "SMTP notifier configured for {}:{} ({})",
            config.host,
            config.port,
            if config.port == IMPLICIT_TLS_PORT { "implicit TLS" } else { "STARTTLS" }
        );

        Ok(Self {
            transport,
            host: config.host.clone(),
            port: config.port,
            from,
            to,
        })
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| Error::notification(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let message = self.build_message(subject, body)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| Error::notification(format!("SMTP send via {} failed: {}", self.host, e)))?;

        tracing::debug!("Report '{}' delivered to {}", subject, self.to);
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port,
            username: "reports@example.com".to_string(),
            password: "hunter2-smtp".to_string(),
            from: "allowsync <reports@example.com>".to_string(),
            to: "ops@example.com".to_string(),
        }
    }

    #[test]
    fn test_builds_for_both_tls_modes() {
        assert!(SmtpNotifier::from_config(&config(465), Duration::from_secs(5)).is_ok());
        assert!(SmtpNotifier::from_config(&config(587), Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_invalid_recipient_is_config_error() {
        let mut cfg = config(587);
        cfg.to = "not an address".to_string();

        let err = SmtpNotifier::from_config(&cfg, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("recipient"));
    }

    #[test]
    fn test_empty_host_is_config_error() {
        let mut cfg = config(587);
        cfg.host = " ".to_string();

        assert!(SmtpNotifier::from_config(&cfg, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_password_not_exposed_in_debug() {
        let notifier = SmtpNotifier::from_config(&config(465), Duration::from_secs(5)).unwrap();

        let debug_str = format!("{:?}", notifier);
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("smtp.example.com"));
    }

    #[test]
    fn test_message_is_plain_text_with_subject() {
        let notifier = SmtpNotifier::from_config(&config(587), Duration::from_secs(5)).unwrap();

        let message = notifier
            .build_message("allowsync: already up to date", "Sync started at 2026-01-01T00:00:00Z")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: allowsync: already up to date"));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("Sync started at 2026-01-01T00:00:00Z"));
    }
}
