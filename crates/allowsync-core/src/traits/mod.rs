//! Core traits for the allowlist sync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DnsResolver`]: TXT and IPv4 lookups
//! - [`AllowlistProvider`]: Read and extend the provider allowlist
//! - [`Notifier`]: Deliver the run report

pub mod allowlist_provider;
pub mod dns_resolver;
pub mod notifier;

pub use allowlist_provider::{
    AddResult, AllowlistEntry, AllowlistProvider, AllowlistProviderFactory, IpRange,
};
pub use dns_resolver::DnsResolver;
pub use notifier::Notifier;
