// # meteod - Weather Notification Daemon
//
// Thin integration layer: everything with behavior lives in the library
// crates. The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring stores, provider, notifier and scheduler together
// 4. Serving the HTTP API until a shutdown signal arrives
//
// ## Configuration
//
// - `PORT`: HTTP listen port (default 8321, binds 0.0.0.0)
// - `TELEGRAM_BOT_TOKEN`: bot token; empty disables sending and registration
// - `NOTIFICATION_INTERVAL_MINUTES`: initial delivery interval (default 5)
// - `NOTIFICATION_START_HOUR`: initial window start (default 7)
// - `NOTIFICATION_END_HOUR`: initial window end, exclusive (default 18)
// - `NOTIFICATIONS_AUTOSTART`: activate the scheduler at boot (default true)
// - `METEO_STORE_PATH`: JSON account store file (unset: in-memory)
// - `METEO_LOG_LEVEL`: trace, debug, info, warn or error (default info)
//
// ## Example
//
// ```bash
// export TELEGRAM_BOT_TOKEN=123456:ABC...
// export NOTIFICATION_INTERVAL_MINUTES=30
// export METEO_STORE_PATH=/var/lib/meteo/accounts.json
//
// meteod
// ```

mod page;
mod routes;
mod server;

use anyhow::{Context, Result};
use meteo_core::accounts::{FileAccountStore, MemoryAccountStore};
use meteo_core::api::ConfigApi;
use meteo_core::config::{ConfigStore, NotificationConfig};
use meteo_core::location::LocationStore;
use meteo_core::scheduler::{NotificationScheduler, SystemClock};
use meteo_core::traits::{AccountStore, RecipientSource};
use meteo_notify_telegram::TelegramNotifier;
use meteo_notify_telegram::poller::LinkPoller;
use meteo_provider_openmeteo::OpenMeteoProvider;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::server::AppState;

const DEFAULT_PORT: u16 = 8321;

/// Upper bound on draining in-flight requests after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum MeteoExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<MeteoExitCode> for ExitCode {
    fn from(code: MeteoExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    port: u16,
    telegram_bot_token: String,
    notifications: NotificationConfig,
    autostart: bool,
    store_path: Option<PathBuf>,
    log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("telegram_bot_token", &"<REDACTED>")
            .field("notifications", &self.notifications)
            .field("autostart", &self.autostart)
            .field("store_path", &self.store_path)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Notification numbers that do not parse fall back to their defaults,
    /// the same way out-of-range values do.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let number = |key: &str| var(key).and_then(|v| v.parse::<i64>().ok()).unwrap_or(-1);

        let port = match var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT '{}' is not a valid port number", raw))?,
            None => DEFAULT_PORT,
        };

        let autostart = match var("NOTIFICATIONS_AUTOSTART") {
            Some(raw) => parse_bool(&raw).with_context(|| {
                format!(
                    "NOTIFICATIONS_AUTOSTART '{}' is not a boolean. Use true or false",
                    raw
                )
            })?,
            None => true,
        };

        Ok(Self {
            port,
            telegram_bot_token: var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            notifications: NotificationConfig::from_raw(
                number("NOTIFICATION_INTERVAL_MINUTES"),
                number("NOTIFICATION_START_HOUR"),
                number("NOTIFICATION_END_HOUR"),
            ),
            autostart,
            store_path: var("METEO_STORE_PATH").map(PathBuf::from),
            log_level: var("METEO_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "METEO_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        if let Some(ref path) = self.store_path {
            if path.file_name().is_none() {
                anyhow::bail!(
                    "METEO_STORE_PATH must name a file. Got: {}",
                    path.display()
                );
            }

            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                anyhow::bail!(
                    "METEO_STORE_PATH parent directory does not exist: {}. \
                    Create it first: mkdir -p {}",
                    parent.display(),
                    parent.display()
                );
            }
        }

        Ok(())
    }

    fn tracing_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return MeteoExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return MeteoExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.tracing_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return MeteoExitCode::ConfigError.into();
    }

    info!("Starting meteod {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Notifications every {} min, window {:02}:00-{:02}:00",
        config.notifications.interval_minutes(),
        config.notifications.start_hour,
        config.notifications.end_hour
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return MeteoExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            MeteoExitCode::RuntimeError
        } else {
            MeteoExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon with the configured account store
async fn run_daemon(config: Config) -> Result<()> {
    match config.store_path.clone() {
        Some(path) => {
            info!("Account store: {}", path.display());
            let store = FileAccountStore::new(&path)
                .await
                .with_context(|| format!("failed to open account store {}", path.display()))?;
            serve_with(config, Arc::new(store)).await
        }
        None => {
            warn!("METEO_STORE_PATH not set, accounts are kept in memory only");
            serve_with(config, Arc::new(MemoryAccountStore::new())).await
        }
    }
}

async fn serve_with<S>(config: Config, store: Arc<S>) -> Result<()>
where
    S: AccountStore + RecipientSource + 'static,
{
    let accounts: Arc<dyn AccountStore> = store.clone();
    let recipients: Arc<dyn RecipientSource> = store;

    let location = LocationStore::new();
    match accounts.default_location().await {
        Ok(Some(default)) => match location.set_custom(default.lat, default.lon) {
            Ok(_) => info!(
                "Using stored default location {} ({:.4}, {:.4})",
                default.place, default.lat, default.lon
            ),
            Err(e) => warn!("Ignoring stored default location: {}", e),
        },
        Ok(None) => info!("No default location stored, using IP geolocation"),
        Err(e) => warn!("Failed to read default location: {}", e),
    }

    let provider = Arc::new(OpenMeteoProvider::new(location.clone())?);
    let telegram = Arc::new(TelegramNotifier::new(
        config.telegram_bot_token.clone(),
        recipients,
    )?);
    if !telegram.is_configured() {
        warn!("TELEGRAM_BOT_TOKEN not set, notifications cannot be delivered");
    }

    let config_store = ConfigStore::new(config.notifications);
    let scheduler = Arc::new(NotificationScheduler::new(
        config_store.clone(),
        provider.clone(),
        telegram.clone(),
        Arc::new(SystemClock),
    ));
    let config_api = ConfigApi::new(config_store, scheduler.clone());

    if config.autostart {
        scheduler.activate();
    } else {
        info!("Notifications start disabled (NOTIFICATIONS_AUTOSTART=false)");
    }

    let cancel = CancellationToken::new();

    let poller = tokio::spawn(
        LinkPoller::new(telegram.clone(), accounts.clone()).run(cancel.child_token()),
    );

    let state = Arc::new(AppState {
        config_api,
        location,
        accounts: accounts.clone(),
        provider: provider.clone(),
        geocoder: provider,
        telegram,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    let server_cancel = cancel.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, server::router(state))
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    let server_exited = tokio::select! {
        signal = wait_for_shutdown() => {
            let signal = signal?;
            info!("Received shutdown signal: {}", signal);
            None
        }
        result = &mut server => Some(result),
    };

    info!("Shutting down daemon");
    cancel.cancel();
    scheduler.deactivate();

    let server_result = match server_exited {
        Some(result) => result,
        None => match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server).await {
            Ok(result) => result,
            Err(_) => {
                warn!("HTTP server did not drain within {:?}", SHUTDOWN_TIMEOUT);
                server.abort();
                Ok(Ok(()))
            }
        },
    };

    if let Err(e) = poller.await {
        warn!("Registration poller ended abnormally: {}", e);
    }

    if let Err(e) = accounts.flush().await {
        error!("Failed to flush account store: {}", e);
    }

    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => anyhow::bail!("HTTP server failed: {}", e),
        Err(e) => anyhow::bail!("HTTP server task failed: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT
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

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
