// # SendGrid Allowlist Provider
//
// Reads and extends the SendGrid IP Access Management allowlist.
//
// ## Behaviour
//
// - One HTTP request per trait call (GET for `list`, POST for `add`)
// - Client-level timeout taken from the engine's call timeout
// - Status codes mapped to actionable messages (401/403, 429, 5xx)
// - Error bodies (`{"errors":[{"field":..,"message":..}]}`) surfaced as
//   write-failure details
// - Dry-run mode: reads go to the API, writes are only logged
// - No retries, no caching, no background tasks
//
// ## Security Requirements
//
// - The API key NEVER appears in logs or `Debug` output
// - The API key is provided through configuration only
// - Construction fails if the key is empty
//
// ## API Reference
//
// - List allowlist: GET `/access_settings/whitelist`
// - Add entries: POST `/access_settings/whitelist` with `{"ips":[{"ip":..}]}`

use allowsync_core::config::ProviderConfig;
use allowsync_core::traits::{
    AddResult, AllowlistEntry, AllowlistProvider, AllowlistProviderFactory, IpRange,
};
use allowsync_core::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// SendGrid v3 API base URL
pub const SENDGRID_API_BASE: &str = "https://api.sendgrid.com/v3";

/// Allowlist resource below the base URL
const WHITELIST_PATH: &str = "/access_settings/whitelist";

/// Body of a successful list or add response
#[derive(Debug, Deserialize)]
struct WhitelistResponse {
    #[serde(default)]
    result: Vec<WhitelistRecord>,
}

/// One allowlist record; SendGrid also sends `id` and timestamps
#[derive(Debug, Deserialize)]
struct WhitelistRecord {
    ip: String,
}

#[derive(Debug, Serialize)]
struct AddRequest {
    ips: Vec<AllowlistEntry>,
}

/// SendGrid error body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

/// A non-success response, before it becomes a read or write error
#[derive(Debug, PartialEq, Eq)]
struct ApiFailure {
    message: String,
    details: Vec<String>,
}

/// SendGrid allowlist provider
///
/// # Trust Level: Untrusted
///
/// Single-shot and stateless. Deciding what to add, timeouts around the
/// whole call and reporting are owned by `SyncEngine`.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true the provider still reads the live allowlist but
/// only logs the POST it would have sent, reporting every entry as added.
pub struct SendgridProvider {
    /// SendGrid API key
    /// ⚠️ NEVER log this value
    api_key: String,

    /// API base URL without trailing slash
    base_url: String,

    client: reqwest::Client,

    dry_run: bool,
}

// Keep the API key out of Debug output
impl std::fmt::Debug for SendgridProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendgridProvider")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl SendgridProvider {
    /// Create a new SendGrid provider
    ///
    /// # Parameters
    ///
    /// - `api_key`: API key with the `access_settings` scopes
    /// - `base_url`: Optional API base URL override
    /// - `timeout`: HTTP client timeout per request
    /// - `dry_run`: If true, read for real but skip writes
    ///
    /// # Errors
    ///
    /// `Error::Config` if the key is empty or the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
        dry_run: bool,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("SendGrid API key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = base_url
            .as_deref()
            .unwrap_or(SENDGRID_API_BASE)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key,
            base_url,
            client,
            dry_run,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, WHITELIST_PATH)
    }

    async fn failure(response: reqwest::Response) -> ApiFailure {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        describe_failure(status, &body)
    }
}

/// Map a non-success status and its body to a message plus detail list
fn describe_failure(status: StatusCode, body: &str) -> ApiFailure {
    let message = match status.as_u16() {
        401 | 403 => format!(
            "Authentication failed: invalid API key or missing access_settings scope. Status: {}",
            status
        ),
        429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
        500..=599 => format!("SendGrid server error (transient). Status: {}", status),
        _ => format!("SendGrid request failed. Status: {}", status),
    };

    let mut details = error_messages(body);
    if details.is_empty() {
        details.push(message.clone());
    }

    ApiFailure { message, details }
}

/// Extract `errors[].message` from a SendGrid error body
fn error_messages(body: &str) -> Vec<String> {
    serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| {
            parsed
                .errors
                .into_iter()
                .filter_map(|e| e.message)
                .filter(|m| !m.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl AllowlistProvider for SendgridProvider {
    /// GET the allowlist
    ///
    /// ```http
    /// GET /access_settings/whitelist
    /// Authorization: Bearer <key>
    /// ```
    async fn list(&self) -> Result<BTreeSet<IpRange>> {
        tracing::debug!("Fetching SendGrid allowlist");

        let response = self
            .client
            .get(self.endpoint())
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::provider_read(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let failure = Self::failure(response).await;
            return Err(Error::provider_read(format!(
                "{} ({})",
                failure.message,
                failure.details.join("; ")
            )));
        }

        let body: WhitelistResponse = response
            .json()
            .await
            .map_err(|e| Error::provider_read(format!("Failed to parse response: {}", e)))?;

        let entries: BTreeSet<IpRange> = body
            .result
            .into_iter()
            .map(|record| IpRange::from(record.ip))
            .collect();

        tracing::debug!("SendGrid allowlist has {} entr(ies)", entries.len());
        Ok(entries)
    }

    /// POST new entries
    ///
    /// ```http
    /// POST /access_settings/whitelist
    /// Authorization: Bearer <key>
    /// {"ips": [{"ip": "1.2.3.4/32"}]}
    /// ```
    async fn add(&self, entries: &[IpRange]) -> Result<AddResult> {
        if entries.is_empty() {
            return Err(Error::invalid_input(
                "refusing to send an empty allowlist write",
            ));
        }

        let payload = AddRequest {
            ips: entries.iter().cloned().map(AllowlistEntry::from).collect(),
        };

        tracing::info!(
            "{} {} allowlist entr(ies) [mode: {}]",
            if self.dry_run { "Would add" } else { "Adding" },
            entries.len(),
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST request to {} with payload: {}",
                self.endpoint(),
                serde_json::to_string(&payload)?
            );
            return Ok(AddResult::from_entries(entries.to_vec()));
        }

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::provider_write(format!("HTTP request failed: {}", e), Vec::new()))?;

        if !response.status().is_success() {
            let failure = Self::failure(response).await;
            return Err(Error::provider_write(failure.message, failure.details));
        }

        let body: WhitelistResponse = response.json().await.map_err(|e| {
            Error::provider_write(format!("Failed to parse response: {}", e), Vec::new())
        })?;

        let added: Vec<IpRange> = body
            .result
            .into_iter()
            .map(|record| IpRange::from(record.ip))
            .collect();

        tracing::info!("SendGrid confirmed {} new entr(ies)", added.len());
        Ok(AddResult::from_entries(added))
    }

    fn provider_name(&self) -> &'static str {
        "sendgrid"
    }
}

/// Factory for creating SendGrid providers
pub struct SendgridFactory;

impl AllowlistProviderFactory for SendgridFactory {
    fn create(
        &self,
        config: &ProviderConfig,
        timeout: Duration,
    ) -> Result<Box<dyn AllowlistProvider>> {
        let ProviderConfig::Sendgrid {
            api_key,
            base_url,
            dry_run,
        } = config;

        if api_key.is_empty() {
            return Err(Error::config("SendGrid API key is required"));
        }

        if *dry_run {
            tracing::warn!(
                "SendGrid provider running in DRY-RUN mode - the allowlist will not be modified"
            );
        }

        Ok(Box::new(SendgridProvider::new(
            api_key.clone(),
            base_url.clone(),
            timeout,
            *dry_run,
        )?))
    }
}

/// Register the SendGrid provider with a registry
///
/// # Example
///
/// ```rust
/// use allowsync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// allowsync_provider_sendgrid::register(&registry);
/// assert!(registry.has_provider("sendgrid"));
/// ```
pub fn register(registry: &allowsync_core::ProviderRegistry) {
    registry.register_provider("sendgrid", Box::new(SendgridFactory));
}
