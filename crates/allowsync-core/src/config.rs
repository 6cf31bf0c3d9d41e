//! Configuration types for the allowlist sync system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Default SPF root domain (Google's outbound mail ranges)
pub const DEFAULT_SPF_ROOT: &str = "_spf.google.com";

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root domain whose SPF tree defines the desired allowlist
    #[serde(default = "default_spf_root")]
    pub spf_root_domain: String,

    /// Dynamic-DNS hostname to allowlist as well (optional)
    #[serde(default)]
    pub home_hostname: Option<String>,

    /// Allowlist provider configuration
    pub provider: ProviderConfig,

    /// Status notification configuration
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a new configuration for the given provider with defaults
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            spf_root_domain: default_spf_root(),
            home_hostname: None,
            provider,
            notifier: NotifierConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the SPF root domain
    pub fn with_spf_root(mut self, domain: impl Into<String>) -> Self {
        self.spf_root_domain = domain.into();
        self
    }

    /// Set the dynamic-DNS hostname
    pub fn with_home_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.home_hostname = Some(hostname.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.spf_root_domain.trim().is_empty() {
            return Err(crate::Error::config("SPF root domain cannot be empty"));
        }

        if let Some(host) = &self.home_hostname
            && host.trim().is_empty()
        {
            return Err(crate::Error::config(
                "Home hostname cannot be blank (leave it unset to skip the home stage)",
            ));
        }

        self.provider.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Allowlist provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// SendGrid IP Access Management
    Sendgrid {
        /// SendGrid API key with access settings scope
        api_key: String,
        /// API base URL override (defaults to the public v3 endpoint)
        #[serde(default)]
        base_url: Option<String>,
        /// Log intended writes instead of performing them
        #[serde(default)]
        dry_run: bool,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Sendgrid { api_key, base_url, .. } => {
                if api_key.is_empty() {
                    return Err(crate::Error::config(
                        "SendGrid API key is not configured (set ALLOWSYNC_PROVIDER_API_KEY)",
                    ));
                }
                if let Some(url) = base_url
                    && !url.starts_with("https://")
                    && !url.starts_with("http://")
                {
                    return Err(crate::Error::config(format!(
                        "SendGrid base URL must use HTTP or HTTPS scheme. Got: {}",
                        url
                    )));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Sendgrid { .. } => "sendgrid",
        }
    }
}

/// Status notification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Deliver the report over SMTP
    Smtp(SmtpConfig),

    /// No status emails
    #[default]
    Disabled,
}

/// SMTP transport settings
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP relay host
    pub host: String,
    /// SMTP port (465 = implicit TLS, anything else = STARTTLS)
    pub port: u16,
    /// Auth user
    pub username: String,
    /// Auth password
    pub password: String,
    /// Sender address
    pub from: String,
    /// Recipient for status reports
    pub to: String,
}

// Keep the password out of logs
impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Timeout applied to every outbound call (in seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Treat a failed allowlist read as an empty allowlist instead of
    /// aborting the run
    ///
    /// With this on, a read failure makes every SPF range look missing and
    /// all of them are submitted again.
    #[serde(default)]
    pub assume_empty_on_read_failure: bool,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.call_timeout_secs == 0 {
            return Err(crate::Error::config("Call timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            assume_empty_on_read_failure: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_spf_root() -> String {
    DEFAULT_SPF_ROOT.to_string()
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sendgrid(api_key: &str) -> ProviderConfig {
        ProviderConfig::Sendgrid {
            api_key: api_key.to_string(),
            base_url: None,
            dry_run: false,
        }
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::new(sendgrid("SG.key"));

        assert_eq!(config.spf_root_domain, "_spf.google.com");
        assert!(config.home_hostname.is_none());
        assert_eq!(config.engine.call_timeout_secs, 10);
        assert!(!config.engine.assume_empty_on_read_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let err = SyncConfig::new(sendgrid("")).validate().unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_blank_home_hostname_rejected() {
        let config = SyncConfig::new(sendgrid("SG.key")).with_home_hostname("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = SyncConfig::new(sendgrid("SG.key"));
        config.engine.call_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: SyncConfig = serde_json::from_value(serde_json::json!({
            "provider": { "type": "sendgrid", "api_key": "SG.key" },
            "home_hostname": "home.example.net",
            "notifier": {
                "type": "smtp",
                "host": "smtp.example.com",
                "port": 465,
                "username": "user",
                "password": "secret",
                "from": "ops@example.com",
                "to": "admin@example.com"
            }
        }))
        .unwrap();

        assert_eq!(config.provider.type_name(), "sendgrid");
        assert_eq!(config.spf_root_domain, DEFAULT_SPF_ROOT);
        assert_eq!(config.home_hostname.as_deref(), Some("home.example.net"));
        assert!(matches!(config.notifier, NotifierConfig::Smtp(_)));
    }

    #[test]
    fn test_smtp_password_not_exposed_in_debug() {
        let smtp = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "user".to_string(),
            password: "hunter2".to_string(),
            from: "a@example.com".to_string(),
            to: "b@example.com".to_string(),
        };

        let debug_str = format!("{:?}", smtp);
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("<REDACTED>"));
    }
}
