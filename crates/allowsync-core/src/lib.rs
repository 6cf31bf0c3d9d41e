// # allowsync-core
//
// Core library for the provider IP allowlist synchronization job.
//
// ## Architecture Overview
//
// This library provides the core functionality for keeping a mail
// provider's IP access allowlist in step with a domain's SPF record:
// - **DnsResolver**: Trait for TXT and IPv4 lookups
// - **AllowlistProvider**: Trait for reading and extending the allowlist
// - **Notifier**: Trait for delivering the run report
// - **SpfResolver**: Walks `include:` chains and collects `ip4:` ranges
// - **HomeHostResolver**: Resolves the dynamic-DNS home host
// - **SyncEngine**: Orchestrates one reconciliation run end to end
// - **ProviderRegistry**: Plugin-based registry for allowlist providers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from I/O plugins
// 2. **Additive Only**: The allowlist is extended, never pruned
// 3. **Single Attempt**: No retries; every outbound call has a deadline
// 4. **Library-First**: The daemon is a thin HTTP trigger around the engine
// 5. **Injected Collaborators**: No global clients; everything is passed in

pub mod config;
mod deadline;
pub mod diff;
pub mod engine;
pub mod error;
pub mod home;
pub mod registry;
pub mod report;
pub mod spf;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, NotifierConfig, ProviderConfig, SmtpConfig, SyncConfig};
pub use engine::{SyncEngine, SyncEvent, SyncOutcome, SyncResponse, SyncStage, SyncStatus};
pub use error::{Error, Result};
pub use home::HomeHostResolver;
pub use registry::ProviderRegistry;
pub use report::SyncReport;
pub use spf::{SpfResolution, SpfResolver};
pub use traits::{AddResult, AllowlistEntry, AllowlistProvider, DnsResolver, IpRange, Notifier};
