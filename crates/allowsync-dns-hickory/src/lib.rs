// # hickory DNS Resolver
//
// Implements `DnsResolver` on top of hickory-resolver's tokio resolver.
//
// ## Upstream Selection
//
// The system configuration (`/etc/resolv.conf` on Unix) is used when it can
// be read. Otherwise the resolver falls back to Cloudflare's public
// resolvers and logs a warning.
//
// ## Timeouts
//
// hickory's per-query timeout is set from the engine's call timeout and a
// single attempt is made. The engine wraps every lookup in its own deadline
// as well.

use allowsync_core::traits::DnsResolver;
use allowsync_core::{Error, Result};
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// DNS resolver backed by hickory-resolver
pub struct HickoryDnsResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryDnsResolver {
    /// Create a resolver from the system configuration
    ///
    /// Falls back to Cloudflare (1.1.1.1) if the system configuration is
    /// unreadable.
    pub fn from_system_conf(timeout: Duration) -> Self {
        let (config, opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                tracing::warn!(
                    "Could not read system DNS configuration ({}), using Cloudflare resolvers",
                    e
                );
                (ResolverConfig::cloudflare(), ResolverOpts::default())
            }
        };
        Self::with_config(config, opts, timeout)
    }

    /// Create a resolver against an explicit upstream
    pub fn with_config(config: ResolverConfig, mut opts: ResolverOpts, timeout: Duration) -> Self {
        opts.timeout = timeout;
        opts.attempts = 1;

        tracing::info!(
            "DNS resolver initialized - {} upstream(s), timeout: {}s",
            config.name_servers().len(),
            timeout.as_secs()
        );

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

/// Join the character-strings of one TXT record
fn join_segments(segments: &[Box<[u8]>]) -> String {
    segments
        .iter()
        .map(|part| String::from_utf8_lossy(part))
        .collect()
}

/// Keep IPv4 addresses, preserving resolver order
fn only_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Vec<Ipv4Addr> {
    addrs
        .into_iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .collect()
}

#[async_trait]
impl DnsResolver for HickoryDnsResolver {
    async fn txt_records(&self, domain: &str) -> Result<Vec<String>> {
        tracing::debug!("Querying TXT records for {}", domain);

        let lookup = self
            .resolver
            .txt_lookup(domain)
            .await
            .map_err(|e| Error::resolution(format!("TXT lookup for {} failed: {}", domain, e)))?;

        let records: Vec<String> = lookup
            .iter()
            .map(|txt| join_segments(txt.txt_data()))
            .collect();

        tracing::debug!("Found {} TXT record(s) for {}", records.len(), domain);
        Ok(records)
    }

    async fn ipv4_addrs(&self, hostname: &str) -> Result<Vec<Ipv4Addr>> {
        tracing::debug!("Resolving {}", hostname);

        let lookup = self
            .resolver
            .lookup_ip(hostname)
            .await
            .map_err(|e| Error::resolution(format!("lookup of {} failed: {}", hostname, e)))?;

        Ok(only_ipv4(lookup.iter()))
    }

    fn resolver_name(&self) -> &'static str {
        "hickory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_join_without_separator() {
        let segments: Vec<Box<[u8]>> = vec![
            b"v=spf1 ip4:10.0.0.0/8 ".to_vec().into_boxed_slice(),
            b"include:_spf.example.com ~all".to_vec().into_boxed_slice(),
        ];

        assert_eq!(
            join_segments(&segments),
            "v=spf1 ip4:10.0.0.0/8 include:_spf.example.com ~all"
        );
    }

    #[test]
    fn test_single_segment() {
        let segments: Vec<Box<[u8]>> = vec![b"v=spf1 -all".to_vec().into_boxed_slice()];
        assert_eq!(join_segments(&segments), "v=spf1 -all");
    }

    #[test]
    fn test_ipv6_addresses_are_dropped() {
        let addrs = vec![
            "2001:db8::1".parse::<IpAddr>().unwrap(),
            "198.51.100.23".parse().unwrap(),
            "198.51.100.24".parse().unwrap(),
        ];

        assert_eq!(
            only_ipv4(addrs),
            vec![
                Ipv4Addr::new(198, 51, 100, 23),
                Ipv4Addr::new(198, 51, 100, 24)
            ]
        );
    }

    #[tokio::test]
    async fn test_resolver_builds_with_explicit_config() {
        let resolver = HickoryDnsResolver::with_config(
            ResolverConfig::cloudflare(),
            ResolverOpts::default(),
            Duration::from_secs(3),
        );
        assert_eq!(resolver.resolver_name(), "hickory");
    }
}
