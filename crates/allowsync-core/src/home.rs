//! Dynamic-DNS home host resolution

use crate::deadline::with_deadline;
use crate::error::{Error, Result};
use crate::traits::DnsResolver;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::debug;

/// Resolves one DDNS hostname to its current IPv4 address
///
/// No retries: a failed lookup is returned to the caller, which skips the
/// home stage for this run.
pub struct HomeHostResolver<'a> {
    dns: &'a dyn DnsResolver,
    timeout: Duration,
}

impl<'a> HomeHostResolver<'a> {
    /// Create a resolver that bounds the lookup by `timeout`
    pub fn new(dns: &'a dyn DnsResolver, timeout: Duration) -> Self {
        Self { dns, timeout }
    }

    /// Resolve `hostname` to the first IPv4 address the resolver returns
    ///
    /// # Returns
    ///
    /// - `Ok(addr)`: First IPv4 address
    /// - `Err(Error::Resolution)`: Lookup failed or returned no IPv4 address
    /// - `Err(Error::Timeout)`: Lookup exceeded the deadline
    pub async fn resolve(&self, hostname: &str) -> Result<Ipv4Addr> {
        let operation = format!("A lookup for {}", hostname);
        let addrs = with_deadline(&operation, self.timeout, self.dns.ipv4_addrs(hostname)).await?;

        debug!("{} resolved to {:?}", hostname, addrs);

        addrs
            .first()
            .copied()
            .ok_or_else(|| Error::resolution(format!("No IPv4 address found for {}", hostname)))
    }
}
