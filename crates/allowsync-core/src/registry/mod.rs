//! Plugin-based provider registry
//!
//! The registry allows allowlist providers to be registered dynamically at
//! runtime, avoiding hardcoded if-else chains in the daemon.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use allowsync_core::registry::ProviderRegistry;
//! use allowsync_core::config::ProviderConfig;
//!
//! let registry = ProviderRegistry::new();
//! allowsync_provider_sendgrid::register(&registry);
//!
//! let config = ProviderConfig::Sendgrid { ... };
//! let provider = registry.create_provider(&config, timeout)?;
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{AllowlistProvider, AllowlistProviderFactory};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Provider registry for plugin-based allowlist provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered allowlist provider factories
    providers: RwLock<HashMap<String, Box<dyn AllowlistProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an allowlist provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "sendgrid")
    /// - `factory`: Factory object for creating provider instances
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_provider(
        &self,
        name: impl Into<String>,
        factory: Box<dyn AllowlistProviderFactory>,
    ) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        providers.insert(name.into(), factory);
    }

    /// Create an allowlist provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn AllowlistProvider>)`: Created provider instance
    /// - `Err(Error::Config)`: If the provider type is not registered or
    ///   the factory rejects the configuration
    pub fn create_provider(
        &self,
        config: &ProviderConfig,
        timeout: Duration,
    ) -> Result<Box<dyn AllowlistProvider>> {
        let provider_type = config.type_name();
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config, timeout)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        providers.contains_key(name)
    }
}
