// # allowsyncd - Allowlist Sync Daemon
//
// A thin HTTP trigger around `allowsync_core::SyncEngine`. An external
// scheduler calls `GET /sync`; the status code tells it whether the run
// succeeded. All reconciliation logic lives in allowsync-core.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering providers and wiring DNS, provider and notifier
// 4. Serving `/sync` and `/health` until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Server
// - `ALLOWSYNC_LISTEN_ADDR`: Listen address (default `0.0.0.0:8080`)
// - `ALLOWSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default `info`)
//
// ### Provider
// - `ALLOWSYNC_PROVIDER_TYPE`: Provider type (default `sendgrid`)
// - `ALLOWSYNC_PROVIDER_API_KEY`: API key
// - `ALLOWSYNC_PROVIDER_BASE_URL`: API base URL override (optional)
// - `ALLOWSYNC_MODE`: `live` or `dry-run` (default `live`)
//
// ### Sync
// - `ALLOWSYNC_SPF_ROOT`: SPF root domain (default `_spf.google.com`)
// - `ALLOWSYNC_HOME_HOSTNAME`: Dynamic-DNS hostname (optional)
// - `ALLOWSYNC_TIMEOUT_SECS`: Per-call timeout, 1-120 (default 10)
// - `ALLOWSYNC_ASSUME_EMPTY_ON_READ_FAILURE`: `true` to proceed when the
//   allowlist cannot be read (default `false`)
//
// ### Status email (all six required, otherwise email is disabled)
// - `ALLOWSYNC_SMTP_HOST`, `ALLOWSYNC_SMTP_PORT`, `ALLOWSYNC_SMTP_USER`,
//   `ALLOWSYNC_SMTP_PASSWORD`, `ALLOWSYNC_SMTP_FROM`, `ALLOWSYNC_SMTP_TO`
//
// A missing API key does not stop the daemon: every `/sync` answers 500
// with a configuration error until it is fixed.
//
// ## Example
//
// ```bash
// export ALLOWSYNC_PROVIDER_API_KEY=SG.xxxxx
// export ALLOWSYNC_HOME_HOSTNAME=home.example.net
// export ALLOWSYNC_SMTP_HOST=smtp.example.com
// export ALLOWSYNC_SMTP_PORT=465
// ...
//
// allowsyncd
// curl -f http://localhost:8080/sync
// ```

mod routes;

use allowsync_core::traits::{AllowlistProvider, Notifier};
use allowsync_core::{
    NotifierConfig, ProviderConfig, ProviderRegistry, SmtpConfig, SyncConfig, SyncEngine,
    SyncEvent,
};
use allowsync_dns_hickory::HickoryDnsResolver;
use allowsync_notify_smtp::SmtpNotifier;
use anyhow::{Context, Result};
use routes::{AppState, SyncTarget};
use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Time allowed for an in-flight sync to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

const SMTP_VARS: [&str; 6] = [
    "ALLOWSYNC_SMTP_HOST",
    "ALLOWSYNC_SMTP_PORT",
    "ALLOWSYNC_SMTP_USER",
    "ALLOWSYNC_SMTP_PASSWORD",
    "ALLOWSYNC_SMTP_FROM",
    "ALLOWSYNC_SMTP_TO",
];

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum AllowsyncExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<AllowsyncExitCode> for ExitCode {
    fn from(code: AllowsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    listen_addr: String,
    log_level: String,
    provider_type: String,
    provider_api_key: String,
    provider_base_url: Option<String>,
    mode: String,
    spf_root: String,
    home_hostname: Option<String>,
    timeout_secs: u64,
    assume_empty_on_read_failure: bool,
    smtp: Option<SmtpConfig>,
    /// SMTP variables that were set while others were missing
    smtp_missing: Vec<&'static str>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source; blank values count as unset
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let timeout_secs = match var("ALLOWSYNC_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("ALLOWSYNC_TIMEOUT_SECS must be a number. Got: {}", raw))?,
            None => allowsync_core::EngineConfig::default().call_timeout_secs,
        };

        let assume_empty_on_read_failure = match var("ALLOWSYNC_ASSUME_EMPTY_ON_READ_FAILURE") {
            Some(raw) => parse_bool(&raw).with_context(|| {
                format!(
                    "ALLOWSYNC_ASSUME_EMPTY_ON_READ_FAILURE must be true or false. Got: {}",
                    raw
                )
            })?,
            None => false,
        };

        let smtp_values: Vec<Option<String>> = SMTP_VARS.iter().map(|name| var(*name)).collect();
        let (smtp, smtp_missing) = if smtp_values.iter().all(Option::is_some) {
            let v: Vec<String> = smtp_values.into_iter().flatten().collect();
            let port = v[1].trim().parse::<u16>().with_context(|| {
                format!("ALLOWSYNC_SMTP_PORT must be a port number. Got: {}", v[1])
            })?;
            let smtp = SmtpConfig {
                host: v[0].clone(),
                port,
                username: v[2].clone(),
                password: v[3].clone(),
                from: v[4].clone(),
                to: v[5].clone(),
            };
            (Some(smtp), Vec::new())
        } else if smtp_values.iter().any(Option::is_some) {
            let missing = SMTP_VARS
                .iter()
                .zip(&smtp_values)
                .filter(|(_, value)| value.is_none())
                .map(|(name, _)| *name)
                .collect();
            (None, missing)
        } else {
            (None, Vec::new())
        };

        Ok(Self {
            listen_addr: var("ALLOWSYNC_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            log_level: var("ALLOWSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            provider_type: var("ALLOWSYNC_PROVIDER_TYPE")
                .unwrap_or_else(|| "sendgrid".to_string()),
            provider_api_key: var("ALLOWSYNC_PROVIDER_API_KEY").unwrap_or_default(),
            provider_base_url: var("ALLOWSYNC_PROVIDER_BASE_URL"),
            mode: var("ALLOWSYNC_MODE").unwrap_or_else(|| "live".to_string()),
            spf_root: var("ALLOWSYNC_SPF_ROOT")
                .unwrap_or_else(|| allowsync_core::config::DEFAULT_SPF_ROOT.to_string()),
            home_hostname: var("ALLOWSYNC_HOME_HOSTNAME"),
            timeout_secs,
            assume_empty_on_read_failure,
            smtp,
            smtp_missing,
        })
    }

    /// Validate settings the process itself cannot run without
    ///
    /// A missing API key is not checked here; it surfaces per trigger.
    fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!(
                "ALLOWSYNC_LISTEN_ADDR '{}' is not a valid socket address. \
                Example: 0.0.0.0:8080",
                self.listen_addr
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ALLOWSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        match self.mode.to_lowercase().as_str() {
            "live" | "dry-run" => {}
            _ => anyhow::bail!(
                "ALLOWSYNC_MODE '{}' is not valid. Valid modes: live, dry-run",
                self.mode
            ),
        }

        let key_lower = self.provider_api_key.to_lowercase();
        if key_lower.contains("your_key") || key_lower.contains("replace_me") {
            anyhow::bail!(
                "ALLOWSYNC_PROVIDER_API_KEY appears to be a placeholder. \
                Use an actual API key from your provider."
            );
        }

        if let Some(url) = &self.provider_base_url
            && !url.starts_with("https://")
            && !url.starts_with("http://")
        {
            anyhow::bail!(
                "ALLOWSYNC_PROVIDER_BASE_URL must use HTTP or HTTPS scheme. Got: {}",
                url
            );
        }

        if !(1..=120).contains(&self.timeout_secs) {
            anyhow::bail!(
                "ALLOWSYNC_TIMEOUT_SECS must be between 1 and 120 seconds. Got: {}",
                self.timeout_secs
            );
        }

        Ok(())
    }

    /// Check the provider type against what this build registered
    fn check_provider(&self, registry: &ProviderRegistry) -> Result<()> {
        if registry.has_provider(&self.provider_type) {
            return Ok(());
        }

        let supported = registry.list_providers();
        anyhow::bail!(
            "ALLOWSYNC_PROVIDER_TYPE '{}' is not supported. Supported providers: {}",
            self.provider_type,
            if supported.is_empty() {
                "(none compiled in)".to_string()
            } else {
                supported.join(", ")
            }
        )
    }

    fn is_dry_run(&self) -> bool {
        self.mode.eq_ignore_ascii_case("dry-run")
    }

    /// Translate into the engine's configuration
    fn sync_config(&self) -> SyncConfig {
        let provider = ProviderConfig::Sendgrid {
            api_key: self.provider_api_key.clone(),
            base_url: self.provider_base_url.clone(),
            dry_run: self.is_dry_run(),
        };

        let mut config = SyncConfig::new(provider).with_spf_root(self.spf_root.clone());
        config.home_hostname = self.home_hostname.clone();
        config.notifier = match &self.smtp {
            Some(smtp) => NotifierConfig::Smtp(smtp.clone()),
            None => NotifierConfig::Disabled,
        };
        config.engine.call_timeout_secs = self.timeout_secs;
        config.engine.assume_empty_on_read_failure = self.assume_empty_on_read_failure;
        config
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => anyhow::bail!("not a boolean"),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return AllowsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return AllowsyncExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AllowsyncExitCode::ConfigError.into();
    }

    info!("Starting allowsyncd v{}", env!("CARGO_PKG_VERSION"));

    let registry = build_registry();
    if let Err(e) = config.check_provider(&registry) {
        error!("Configuration validation error: {}", e);
        return AllowsyncExitCode::ConfigError.into();
    }
    info!("Provider type: {}", config.provider_type);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AllowsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config, registry).await {
            Ok(()) => AllowsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                AllowsyncExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Run the daemon
async fn run_daemon(config: Config, registry: ProviderRegistry) -> Result<()> {
    let sync_config = config.sync_config();
    let call_timeout = Duration::from_secs(config.timeout_secs);

    if !config.smtp_missing.is_empty() {
        warn!(
            "Status email disabled; missing {}",
            config.smtp_missing.join(", ")
        );
    }
    let notifier = build_notifier(&sync_config.notifier, call_timeout)?;

    info!("SPF root: {}", sync_config.spf_root_domain);
    match &sync_config.home_hostname {
        Some(host) => info!("Home hostname: {}", host),
        None => warn!("ALLOWSYNC_HOME_HOSTNAME not set; home IP allowlisting disabled"),
    }
    if config.is_dry_run() {
        warn!("Running in DRY-RUN mode; the allowlist will not be modified");
    }

    let target = match build_provider(&registry, &sync_config, call_timeout) {
        Ok(provider) => {
            let dns = HickoryDnsResolver::from_system_conf(call_timeout);
            let (engine, events) =
                SyncEngine::new(Box::new(dns), provider, notifier, &sync_config)
                    .context("Failed to create sync engine")?;
            tokio::spawn(log_events(events));
            SyncTarget::Ready(Arc::new(engine))
        }
        Err(e) => {
            error!("Sync is misconfigured, every trigger will fail: {}", e);
            SyncTarget::Misconfigured {
                error: e,
                notifier,
                call_timeout,
            }
        }
    };

    let router = routes::build_router(Arc::new(AppState { target }));

    let listener = tokio::net::TcpListener::bind(config.listen_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);

    let shutdown = Arc::new(Notify::new());
    let mut server = tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await
        }
    });

    tokio::select! {
        signal = wait_for_shutdown_signal() => {
            let signal = signal?;
            info!("Received shutdown signal: {}", signal);
        }
        result = &mut server => {
            result.context("HTTP server task failed")??;
            anyhow::bail!("HTTP server stopped unexpectedly");
        }
    }

    shutdown.notify_one();
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(result) => {
            result.context("HTTP server task failed")??;
            info!("Shut down cleanly");
            Ok(())
        }
        Err(_) => Err(anyhow::anyhow!(
            "Shutdown timeout after {:?}; in-flight sync abandoned",
            SHUTDOWN_GRACE
        )),
    }
}

/// Register the providers compiled into this build
fn build_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "sendgrid")]
    {
        info!("Registering SendGrid provider");
        allowsync_provider_sendgrid::register(&registry);
    }

    registry
}

/// Validate the sync configuration and create the provider
///
/// Any error here is a configuration error reported per trigger.
fn build_provider(
    registry: &ProviderRegistry,
    config: &SyncConfig,
    call_timeout: Duration,
) -> allowsync_core::Result<Box<dyn AllowlistProvider>> {
    config.validate()?;
    registry.create_provider(&config.provider, call_timeout)
}

fn build_notifier(
    config: &NotifierConfig,
    call_timeout: Duration,
) -> Result<Option<Box<dyn Notifier>>> {
    match config {
        NotifierConfig::Smtp(smtp) => {
            let notifier = SmtpNotifier::from_config(smtp, call_timeout)
                .context("Invalid status email settings")?;
            info!("Status email enabled: {} via {}:{}", smtp.to, smtp.host, smtp.port);
            Ok(Some(Box::new(notifier)))
        }
        NotifierConfig::Disabled => {
            info!("Status email disabled");
            Ok(None)
        }
    }
}

async fn log_events(mut events: mpsc::Receiver<SyncEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SyncEvent::RangesAdded { count } => info!("Allowlist grew by {} entr(ies)", count),
            SyncEvent::Rejected => warn!("Overlapping sync trigger rejected"),
            other => debug!("Engine event: {:?}", other),
        }
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
