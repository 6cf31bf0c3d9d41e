// # DNS Resolver Trait
//
// Defines the interface for the two DNS queries the sync job needs:
// TXT records (SPF walk) and IPv4 addresses (home host).
//
// ## Implementations
//
// - hickory-resolver: `allowsync-dns-hickory` crate
//
// ## Usage
//
// ```rust,ignore
// use allowsync_core::DnsResolver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* DnsResolver implementation */;
//
//     for record in resolver.txt_records("_spf.google.com").await? {
//         println!("{record}");
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for DNS resolver implementations
///
/// # Trust Level: Semi-Trusted
///
/// - ✅ Perform DNS queries through the system or a configured upstream
/// - ❌ Retry beyond what the underlying resolver library does internally
/// - ❌ Interpret SPF semantics (owned by `SpfResolver`)
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Fetch all TXT records for a domain
    ///
    /// Each returned string is one complete record. Records published as
    /// several character-strings are joined without separator.
    ///
    /// # Returns
    ///
    /// - `Ok(records)`: Possibly empty
    /// - `Err(Error::Resolution)`: NXDOMAIN, timeout, malformed response
    async fn txt_records(&self, domain: &str) -> Result<Vec<String>, crate::Error>;

    /// Resolve a hostname to its IPv4 addresses
    ///
    /// # Returns
    ///
    /// - `Ok(addrs)`: In resolver order, possibly empty
    /// - `Err(Error::Resolution)`: If the lookup failed
    async fn ipv4_addrs(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, crate::Error>;

    /// Get the resolver name (for logging/debugging)
    fn resolver_name(&self) -> &'static str;
}
