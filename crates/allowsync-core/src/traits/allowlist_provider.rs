// # Allowlist Provider Trait
//
// Defines the interface for reading and extending a mail provider's IP
// access allowlist.
//
// ## Implementations
//
// - SendGrid: `allowsync-provider-sendgrid` crate
//
// ## Usage
//
// ```rust,ignore
// use allowsync_core::{AllowlistProvider, IpRange};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* AllowlistProvider implementation */;
//
//     let current = provider.list().await?;
//     if !current.contains(&IpRange::from("203.0.113.7")) {
//         provider.add(&[IpRange::from("203.0.113.7")]).await?;
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An allowlisted IP address or range, in CIDR or bare IPv4 notation
///
/// Ranges are opaque: two ranges are equal only if their strings are equal.
/// `"1.2.3.0/24"` and `"1.2.3.4"` are unrelated values even though one
/// contains the other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpRange(String);

impl IpRange {
    /// Create a range from its textual form
    pub fn new(range: impl Into<String>) -> Self {
        Self(range.into())
    }

    /// The textual form of the range
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IpRange {
    fn from(range: &str) -> Self {
        Self(range.to_string())
    }
}

impl From<String> for IpRange {
    fn from(range: String) -> Self {
        Self(range)
    }
}

impl From<std::net::Ipv4Addr> for IpRange {
    fn from(ip: std::net::Ipv4Addr) -> Self {
        Self(ip.to_string())
    }
}

/// One allowlist entry as exchanged with the provider (`{ "ip": ... }`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    /// The allowlisted address or range
    pub ip: IpRange,
}

impl From<IpRange> for AllowlistEntry {
    fn from(ip: IpRange) -> Self {
        Self { ip }
    }
}

/// Result of an allowlist write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddResult {
    /// Number of entries the provider confirmed as added
    pub added: usize,
    /// The confirmed entries
    pub entries: Vec<IpRange>,
}

impl AddResult {
    /// Build a result from the entries the provider echoed back
    pub fn from_entries(entries: Vec<IpRange>) -> Self {
        Self {
            added: entries.len(),
            entries,
        }
    }
}

/// Trait for allowlist provider implementations
///
/// Providers expose exactly one read and one write against one logical
/// allowlist resource. Which HTTP calls or SDKs sit behind them is an
/// implementation detail.
///
/// # Trust Level: Untrusted
///
/// Providers are isolated I/O adapters:
///
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses and error bodies
/// - ❌ Retry (a run makes a single attempt per call)
/// - ❌ Decide what to add (owned by `SyncEngine`)
/// - ❌ Remove entries (the allowlist is only ever extended)
/// - ❌ Cache state beyond a single request
#[async_trait]
pub trait AllowlistProvider: Send + Sync {
    /// Read the current allowlist
    ///
    /// # Returns
    ///
    /// - `Ok(set)`: Every currently allowlisted address/range
    /// - `Err(Error::ProviderRead)`: On network failure or non-success status.
    ///   A failed read never masquerades as an empty allowlist.
    async fn list(&self) -> Result<BTreeSet<IpRange>, crate::Error>;

    /// Add entries to the allowlist
    ///
    /// # Parameters
    ///
    /// - `entries`: Non-empty list of ranges to add. Implementations must
    ///   reject an empty list with `Error::InvalidInput` without calling
    ///   the provider.
    ///
    /// # Returns
    ///
    /// - `Ok(AddResult)`: What the provider confirmed
    /// - `Err(Error::ProviderWrite)`: With the provider's error messages
    ///   in `details` when the response carried any
    async fn add(&self, entries: &[IpRange]) -> Result<AddResult, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing allowlist providers from configuration
pub trait AllowlistProviderFactory: Send + Sync {
    /// Create an AllowlistProvider instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this provider
    /// - `timeout`: Client-level timeout for API requests
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
        timeout: std::time::Duration,
    ) -> Result<Box<dyn AllowlistProvider>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_compare_as_exact_strings() {
        assert_ne!(IpRange::from("1.2.3.0/24"), IpRange::from("1.2.3.4"));
        assert_ne!(IpRange::from("1.2.3.4"), IpRange::from("1.2.3.4/32"));
        assert_eq!(IpRange::from("1.2.3.4"), IpRange::new("1.2.3.4".to_string()));
    }

    #[test]
    fn test_entry_wire_shape() {
        let entry = AllowlistEntry::from(IpRange::from("64.233.160.0/19"));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({ "ip": "64.233.160.0/19" }));

        let back: AllowlistEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_range_from_ipv4() {
        let range = IpRange::from(std::net::Ipv4Addr::new(203, 0, 113, 7));
        assert_eq!(range.as_str(), "203.0.113.7");
    }
}
