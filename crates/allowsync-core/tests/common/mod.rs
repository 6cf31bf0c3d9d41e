//! Test doubles and common utilities for contract tests
//!
//! These doubles stand in for DNS, the allowlist provider and the notifier.
//! Each one records how it was called so tests can assert on interaction,
//! not only on results. Clones share their recorded state.

#![allow(dead_code)]

use allowsync_core::config::{ProviderConfig, SyncConfig};
use allowsync_core::error::{Error, Result};
use allowsync_core::traits::{AddResult, AllowlistProvider, DnsResolver, IpRange, Notifier};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A DNS resolver backed by fixed tables
#[derive(Clone, Default)]
pub struct StaticDnsResolver {
    txt: Arc<HashMap<String, Vec<String>>>,
    hosts: Arc<HashMap<String, Vec<Ipv4Addr>>>,
    failing: Arc<HashSet<String>>,
    hanging: Arc<HashSet<String>>,
    /// Domains passed to txt_records(), in call order
    txt_queries: Arc<Mutex<Vec<String>>>,
    /// Number of ipv4_addrs() calls
    a_query_count: Arc<AtomicUsize>,
}

impl StaticDnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish TXT records for a domain
    pub fn with_txt(mut self, domain: &str, records: &[&str]) -> Self {
        Arc::make_mut(&mut self.txt).insert(
            domain.to_string(),
            records.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    /// Publish A records for a host
    pub fn with_host(mut self, host: &str, addrs: &[Ipv4Addr]) -> Self {
        Arc::make_mut(&mut self.hosts).insert(host.to_string(), addrs.to_vec());
        self
    }

    /// Make lookups for a name fail with SERVFAIL
    pub fn with_failing(mut self, name: &str) -> Self {
        Arc::make_mut(&mut self.failing).insert(name.to_string());
        self
    }

    /// Make lookups for a name never complete
    pub fn with_hanging(mut self, name: &str) -> Self {
        Arc::make_mut(&mut self.hanging).insert(name.to_string());
        self
    }

    /// Domains queried for TXT, in order
    pub fn txt_queries(&self) -> Vec<String> {
        self.txt_queries.lock().unwrap().clone()
    }

    /// Number of TXT queries made
    pub fn txt_query_count(&self) -> usize {
        self.txt_queries.lock().unwrap().len()
    }

    /// Number of A queries made
    pub fn a_query_count(&self) -> usize {
        self.a_query_count.load(Ordering::SeqCst)
    }

    async fn gate(&self, name: &str) -> Result<()> {
        if self.hanging.contains(name) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(name) {
            return Err(Error::resolution(format!("SERVFAIL for {}", name)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsResolver for StaticDnsResolver {
    async fn txt_records(&self, domain: &str) -> Result<Vec<String>> {
        self.txt_queries.lock().unwrap().push(domain.to_string());
        self.gate(domain).await?;
        self.txt
            .get(domain)
            .cloned()
            .ok_or_else(|| Error::resolution(format!("NXDOMAIN for {}", domain)))
    }

    async fn ipv4_addrs(&self, hostname: &str) -> Result<Vec<Ipv4Addr>> {
        self.a_query_count.fetch_add(1, Ordering::SeqCst);
        self.gate(hostname).await?;
        self.hosts
            .get(hostname)
            .cloned()
            .ok_or_else(|| Error::resolution(format!("NXDOMAIN for {}", hostname)))
    }

    fn resolver_name(&self) -> &'static str {
        "static"
    }
}

/// An in-memory allowlist that tracks calls
#[derive(Clone, Default)]
pub struct MockAllowlistProvider {
    entries: Arc<Mutex<BTreeSet<IpRange>>>,
    list_call_count: Arc<AtomicUsize>,
    /// Every batch passed to add(), in call order
    add_batches: Arc<Mutex<Vec<Vec<IpRange>>>>,
    /// Reads still to fail; `usize::MAX` fails them all
    reads_to_fail: Arc<AtomicUsize>,
    write_failure: Option<(String, Vec<String>)>,
}

impl MockAllowlistProvider {
    pub fn new(entries: &[&str]) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries.iter().map(|e| IpRange::from(*e)).collect())),
            ..Self::default()
        }
    }

    /// Make every list() call fail
    pub fn failing_reads(self) -> Self {
        self.failing_first_reads(usize::MAX)
    }

    /// Make the next `count` list() calls fail, then answer normally
    pub fn failing_first_reads(self, count: usize) -> Self {
        self.reads_to_fail.store(count, Ordering::SeqCst);
        self
    }

    /// Make every add() call fail with the given provider error list
    pub fn failing_writes(mut self, message: &str, details: &[&str]) -> Self {
        self.write_failure = Some((
            message.to_string(),
            details.iter().map(|d| d.to_string()).collect(),
        ));
        self
    }

    pub fn entries(&self) -> BTreeSet<IpRange> {
        self.entries.lock().unwrap().clone()
    }

    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    pub fn add_call_count(&self) -> usize {
        self.add_batches.lock().unwrap().len()
    }

    pub fn add_batches(&self) -> Vec<Vec<IpRange>> {
        self.add_batches.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AllowlistProvider for MockAllowlistProvider {
    async fn list(&self) -> Result<BTreeSet<IpRange>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        let remaining = self.reads_to_fail.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.reads_to_fail.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(Error::provider_read("status 503"));
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn add(&self, entries: &[IpRange]) -> Result<AddResult> {
        if entries.is_empty() {
            return Err(Error::invalid_input("empty allowlist write"));
        }
        self.add_batches.lock().unwrap().push(entries.to_vec());

        if let Some((message, details)) = &self.write_failure {
            return Err(Error::provider_write(message.clone(), details.clone()));
        }

        self.entries.lock().unwrap().extend(entries.iter().cloned());
        Ok(AddResult::from_entries(entries.to_vec()))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A notifier that records every message
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every notify() call fail after recording it
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// (subject, body) pairs in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        if self.fail {
            return Err(Error::notification("SMTP connection refused"));
        }
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "recording"
    }
}

/// Helper to create a minimal SyncConfig for testing
pub fn minimal_config(spf_root: &str) -> SyncConfig {
    SyncConfig::new(ProviderConfig::Sendgrid {
        api_key: "SG.test-key".to_string(),
        base_url: None,
        dry_run: false,
    })
    .with_spf_root(spf_root)
}

/// The SPF tree used by most reconciliation tests
///
/// `_spf.example.com` includes `_spf-a.example.com`; together they publish
/// `10.0.0.0/8` (twice) and `172.16.0.0/12`.
pub fn example_spf() -> StaticDnsResolver {
    StaticDnsResolver::new()
        .with_txt(
            "_spf.example.com",
            &["v=spf1 include:_spf-a.example.com ip4:10.0.0.0/8 ~all"],
        )
        .with_txt(
            "_spf-a.example.com",
            &["v=spf1 ip4:10.0.0.0/8 ip4:172.16.0.0/12 ~all"],
        )
}

pub fn ranges(items: &[&str]) -> BTreeSet<IpRange> {
    items.iter().map(|s| IpRange::from(*s)).collect()
}
