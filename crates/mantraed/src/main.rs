// # mantraed - mantrae reconciliation daemon
//
// Thin integration layer: all DNS and instance logic lives in mantrae-core.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering DNS vendors
// 4. Running the DNS sync and instance refresh loops until SIGTERM/SIGINT
//
// ## Configuration
//
// - `MANTRAE_STATE_PATH`: Path to the state file (default: `mantrae.json`)
// - `MANTRAE_SECRET`: Secret used to decrypt stored provider credentials
// - `MANTRAE_DNS_SYNC_INTERVAL`: Seconds between DNS sync passes (default: 300)
// - `MANTRAE_INSTANCE_POLL_INTERVAL`: Seconds between instance refreshes (default: 60)
// - `MANTRAE_LOG_LEVEL`: Log filter directive (default: `info`)
// - `MANTRAE_DRY_RUN`: `1`/`true` to read vendor state without mutating it
//
// ## Example
//
// ```bash
// export MANTRAE_STATE_PATH=/var/lib/mantrae/state.json
// export MANTRAE_SECRET=$(openssl rand -base64 32)
// export MANTRAE_LOG_LEVEL=info,mantrae_core=debug
//
// mantraed
// ```

use anyhow::{Context, Result};
use mantrae_core::{
    DnsSync, EngineConfig, FileStore, InstancePoller, ProviderRegistry, SecretCipher,
    UpdateCoordinator,
};
use mantrae_ip_http::HttpIpSource;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound on draining the loops after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum MantraeExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<MantraeExitCode> for ExitCode {
    fn from(code: MantraeExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    state_path: PathBuf,
    /// ⚠️ NEVER log this value
    secret: String,
    dns_sync_interval: Option<u64>,
    instance_poll_interval: Option<u64>,
    log_level: String,
    dry_run: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("state_path", &self.state_path)
            .field("secret", &"<REDACTED>")
            .field("dns_sync_interval", &self.dns_sync_interval)
            .field("instance_poll_interval", &self.instance_poll_interval)
            .field("log_level", &self.log_level)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let interval = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .map(|s| {
                    s.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{key} must be a number of seconds. Got: {s}"))
                })
                .transpose()
        };

        let dry_run = match lookup("MANTRAE_DRY_RUN")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .as_str()
        {
            "" | "0" | "false" | "no" => false,
            "1" | "true" | "yes" => true,
            other => anyhow::bail!("MANTRAE_DRY_RUN must be a boolean. Got: {other}"),
        };

        Ok(Self {
            state_path: lookup("MANTRAE_STATE_PATH")
                .unwrap_or_else(|| "mantrae.json".to_string())
                .into(),
            secret: lookup("MANTRAE_SECRET").unwrap_or_default(),
            dns_sync_interval: interval("MANTRAE_DNS_SYNC_INTERVAL")?,
            instance_poll_interval: interval("MANTRAE_INSTANCE_POLL_INTERVAL")?,
            log_level: lookup("MANTRAE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            dry_run,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            anyhow::bail!(
                "MANTRAE_SECRET is required to decrypt provider credentials. \
                Set it via: export MANTRAE_SECRET=$(openssl rand -base64 32)"
            );
        }

        if self.state_path.as_os_str().is_empty() {
            anyhow::bail!("MANTRAE_STATE_PATH cannot be empty");
        }

        if let Some(parent) = self.state_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "MANTRAE_STATE_PATH parent directory does not exist: {}. \
                Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        if let Some(interval) = self.dns_sync_interval
            && !(10..=86400).contains(&interval)
        {
            anyhow::bail!(
                "MANTRAE_DNS_SYNC_INTERVAL must be between 10 and 86400 seconds. Got: {}",
                interval
            );
        }

        if let Some(interval) = self.instance_poll_interval
            && !(5..=3600).contains(&interval)
        {
            anyhow::bail!(
                "MANTRAE_INSTANCE_POLL_INTERVAL must be between 5 and 3600 seconds. Got: {}",
                interval
            );
        }

        EnvFilter::try_new(&self.log_level).with_context(|| {
            format!("MANTRAE_LOG_LEVEL '{}' is not a valid filter", self.log_level)
        })?;

        self.engine_config()
            .validate()
            .context("Invalid engine configuration")?;

        Ok(())
    }

    /// Engine settings with the environment overrides applied
    fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::default();
        if let Some(interval) = self.dns_sync_interval {
            engine.dns_sync_interval_secs = interval;
        }
        if let Some(interval) = self.instance_poll_interval {
            engine.instance_poll_interval_secs = interval;
        }
        engine
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return MantraeExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {e:#}");
        return MantraeExitCode::ConfigError.into();
    }

    let cipher = match SecretCipher::from_secret(&config.secret) {
        Ok(cipher) => cipher,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return MantraeExitCode::ConfigError.into();
        }
    };

    // Initialize tracing; RUST_LOG wins over MANTRAE_LOG_LEVEL when set
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return MantraeExitCode::ConfigError.into();
    }

    info!("Starting mantraed daemon");
    info!("State file: {}", config.state_path.display());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return MantraeExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, cipher).await {
            error!("Daemon error: {:#}", e);
            MantraeExitCode::RuntimeError
        } else {
            MantraeExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Build the vendor registry
fn build_registry(dry_run: bool) -> ProviderRegistry {
    let registry = if dry_run {
        warn!("DRY-RUN mode: vendor records are read but never changed");
        ProviderRegistry::dry_run()
    } else {
        ProviderRegistry::new()
    };

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare provider");
        mantrae_provider_cloudflare::register(&registry);
    }

    #[cfg(feature = "powerdns")]
    {
        info!("Registering PowerDNS provider");
        mantrae_provider_powerdns::register(&registry);
    }

    #[cfg(feature = "technitium")]
    {
        info!("Registering Technitium provider");
        mantrae_provider_technitium::register(&registry);
    }

    registry
}

/// Run the daemon
async fn run_daemon(config: Config, cipher: SecretCipher) -> Result<()> {
    let engine = config.engine_config();
    let registry = Arc::new(build_registry(config.dry_run));

    let store = Arc::new(
        FileStore::new(&config.state_path)
            .await
            .with_context(|| format!("Failed to open {}", config.state_path.display()))?,
    );
    let ip_source = Arc::new(HttpIpSource::from_config(&engine)?);

    let sync = Arc::new(
        DnsSync::new(store.clone(), registry, cipher, &engine).with_ip_source(ip_source),
    );
    let poller = InstancePoller::new(store.clone(), &engine);
    let coordinator = UpdateCoordinator::new(Arc::new(poller), &engine);

    let shutdown = CancellationToken::new();

    let dns_task = {
        let sync = Arc::clone(&sync);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { sync.run(shutdown).await })
    };
    let instance_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { coordinator.run(store, shutdown).await })
    };

    info!(
        "Daemon initialized (DNS sync every {:?}, instance refresh every {:?})",
        engine.dns_sync_interval(),
        engine.instance_poll_interval()
    );

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    shutdown.cancel();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        tokio::join!(dns_task, instance_task)
    })
    .await
    {
        Ok((dns, instances)) => {
            dns.context("DNS sync task failed")?;
            instances.context("Instance refresh task failed")?;
        }
        Err(_) => anyhow::bail!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
