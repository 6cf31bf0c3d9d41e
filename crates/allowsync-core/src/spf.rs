//! SPF include-chain walker
//!
//! Collects every `ip4:` range reachable from a root domain by following
//! `include:` directives through TXT records.
//!
//! The walk is best-effort: a domain whose lookup fails contributes nothing
//! and the walk carries on with the rest of the work-list. Each domain is
//! queried at most once, so include cycles terminate.
//!
//! `ip6:` mechanisms are not collected.

use crate::deadline::with_deadline;
use crate::traits::{DnsResolver, IpRange};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

const INCLUDE_PREFIX: &str = "include:";
const IP4_PREFIX: &str = "ip4:";

/// Outcome of one SPF walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpfResolution {
    /// Deduplicated `ip4:` ranges
    pub ranges: BTreeSet<IpRange>,
    /// Domains queried, in query order
    pub queried: Vec<String>,
    /// Domains whose TXT lookup failed, with the error text
    pub failed: Vec<(String, String)>,
}

/// Walks an SPF tree through a [`DnsResolver`]
pub struct SpfResolver<'a> {
    dns: &'a dyn DnsResolver,
    timeout: Duration,
}

impl<'a> SpfResolver<'a> {
    /// Create a walker that bounds each TXT lookup by `timeout`
    pub fn new(dns: &'a dyn DnsResolver, timeout: Duration) -> Self {
        Self { dns, timeout }
    }

    /// Resolve the transitive `ip4:` closure of `root`
    pub async fn resolve(&self, root: &str) -> SpfResolution {
        let mut resolution = SpfResolution::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut pending = vec![normalize_domain(root)];

        while let Some(domain) = pending.pop() {
            if !visited.insert(domain.clone()) {
                continue;
            }
            resolution.queried.push(domain.clone());

            let operation = format!("TXT lookup for {}", domain);
            let records =
                match with_deadline(&operation, self.timeout, self.dns.txt_records(&domain)).await
                {
                    Ok(records) => records,
                    Err(e) => {
                        warn!("Skipping SPF domain {}: {}", domain, e);
                        resolution.failed.push((domain, e.to_string()));
                        continue;
                    }
                };

            debug!("{} TXT record(s) for {}", records.len(), domain);

            for record in &records {
                for token in record.split_whitespace() {
                    if let Some(include) = token.strip_prefix(INCLUDE_PREFIX) {
                        let include = normalize_domain(include);
                        if !include.is_empty() && !visited.contains(&include) {
                            pending.push(include);
                        }
                    } else if let Some(range) = token.strip_prefix(IP4_PREFIX) {
                        if !range.is_empty() {
                            resolution.ranges.insert(IpRange::from(range));
                        }
                    }
                }
            }
        }

        debug!(
            "SPF walk from {} queried {} domain(s), found {} range(s)",
            root,
            resolution.queried.len(),
            resolution.ranges.len()
        );

        resolution
    }
}

/// DNS names compare case-insensitively and without the root dot
fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}
