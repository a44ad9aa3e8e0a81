//! Module orchestration -- storage, rule import, lifecycle and status snapshot.
//!
//! The [`Orchestrator`] is the central coordinator of `ironwatch-daemon`.
//! It opens the storage, imports the startup rule directory, builds the
//! enabled modules, manages startup/shutdown ordering and runs the main loop.
//!
//! # Startup Order
//!
//! 1. ingestion (UDP datagrams into storage)
//! 2. extraction (detail records for stored entries)
//! 3. detection (rules over unprocessed entries, alerts out)
//!
//! # Shutdown Order (reverse)
//!
//! Detection and extraction finish their current cycle. Ingestion stops
//! its listener, drains the intake queue and performs a final flush.
//!
//! Modules share nothing but the storage handle; each one coordinates
//! through the entry flags in the store.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use ironwatch_core::config::IronwatchConfig;
use ironwatch_core::status::DaemonStatus;
use ironwatch_log_pipeline::RuleLoader;
use ironwatch_storage::Storage;

use crate::health::{DaemonHealth, ModuleHealth, aggregate_status};
use crate::metrics_server;
use crate::modules::{ModuleRegistry, detection, extraction, ingestion};
use crate::pid_file::{remove_pid_file, write_pid_file};

/// Default interval between status snapshot writes.
pub const STATUS_WRITE_INTERVAL: Duration = Duration::from_secs(5);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: IronwatchConfig,
    /// Shared storage handle (single writer connection).
    storage: Storage,
    /// Registered modules in start order.
    modules: ModuleRegistry,
    /// Root cancellation token; every module loop runs on a child of it.
    cancel: CancellationToken,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
    status_interval: Duration,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read, parsed or validated
    /// - Storage cannot be opened
    /// - The startup rule directory cannot be read
    /// - Any enabled module fails to build
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = IronwatchConfig::load(config_path)
            .await
            .with_context(|| format!("failed to load config {}", config_path.display()))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: IronwatchConfig) -> Result<Self> {
        config.validate().context("config validation failed")?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let storage = open_storage(&config).await?;
        import_startup_rules(&config, &storage).await?;

        let cancel = CancellationToken::new();
        let mut modules = ModuleRegistry::new();
        if let Some(handle) = ingestion::init(&config, &storage, &cancel)? {
            modules.register(handle)?;
        }
        if let Some(handle) = extraction::init(&config, &storage, &cancel) {
            modules.register(handle)?;
        }
        if let Some(handle) = detection::init(&config, &storage, &cancel) {
            modules.register(handle)?;
        }

        tracing::info!(modules = ?modules.names(), "orchestrator initialized");

        Ok(Self {
            config,
            storage,
            modules,
            cancel,
            start_time: Instant::now(),
            status_interval: STATUS_WRITE_INTERVAL,
        })
    }

    /// Override the status snapshot interval.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Start all modules and run until SIGINT, SIGTERM or root-token
    /// cancellation, then stop everything and remove the PID file.
    pub async fn run(&mut self) -> Result<()> {
        let pid_path = self.pid_path();
        if let Some(path) = &pid_path {
            write_pid_file(path)?;
        }

        let result = self.run_until_shutdown().await;

        if let Some(path) = &pid_path {
            remove_pid_file(path);
        }
        result
    }

    async fn run_until_shutdown(&mut self) -> Result<()> {
        if let Err(e) = self.modules.start_all().await {
            tracing::warn!("startup failed, rolling back already-started modules");
            if let Err(stop_err) = self.modules.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            return Err(e);
        }

        tracing::info!("entering main loop");
        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.status_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                signal = &mut shutdown => break signal?,
                () = self.cancel.cancelled() => break "cancelled",
                _ = ticker.tick() => self.publish_status().await,
            }
        };
        tracing::info!(reason = reason, "shutdown requested");

        let result = self.shutdown().await;
        self.publish_status().await;
        result
    }

    /// Stop all modules in reverse start order, then cancel the root token.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        let result = self.modules.stop_all().await;
        self.cancel.cancel();
        result
    }

    /// Start one module (`ingestion`, `extraction` or `detection`).
    pub async fn start_module(&mut self, name: &str) -> Result<()> {
        self.modules.start_module(name).await
    }

    /// Stop one module (`ingestion`, `extraction` or `detection`).
    pub async fn stop_module(&mut self, name: &str) -> Result<()> {
        self.modules.stop_module(name).await
    }

    /// Current status snapshot of the daemon and its modules.
    pub async fn status(&self) -> DaemonStatus {
        let modules = self.modules.statuses().await;
        let health = aggregate_status(
            &modules
                .iter()
                .map(|m| ModuleHealth {
                    name: m.name.clone(),
                    status: m.health.clone(),
                })
                .collect::<Vec<_>>(),
        );
        let written_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        DaemonStatus {
            pid: std::process::id(),
            uptime_secs: self.uptime_secs(),
            written_at,
            health,
            modules,
        }
    }

    /// Aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let modules = self.modules.health_statuses().await;
        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.uptime_secs(),
            modules,
        }
    }

    /// Write the status snapshot to `<data_dir>/status.json`.
    ///
    /// Write failures are logged; the daemon keeps running.
    pub async fn publish_status(&self) {
        let status = self.status().await;

        if self.config.metrics.enabled {
            use ironwatch_core::metrics as m;
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(status.uptime_secs as f64);
        }

        let path = self.config.status_path();
        match status.write_atomic(&path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "status snapshot written"),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to write status snapshot"
            ),
        }
    }

    /// Token that cancels every module loop and ends `run`.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &IronwatchConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Registered module names, in start order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.names()
    }

    fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn pid_path(&self) -> Option<PathBuf> {
        if self.config.general.pid_file.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.config.general.pid_file))
        }
    }
}

async fn open_storage(config: &IronwatchConfig) -> Result<Storage> {
    let path = config.storage_path();
    let busy_timeout = Duration::from_millis(config.storage.busy_timeout_ms);
    tracing::info!(path = %path.display(), "opening storage");

    let display = path.display().to_string();
    let storage = tokio::task::spawn_blocking(move || Storage::open(&path, busy_timeout))
        .await
        .context("storage open task failed")?
        .with_context(|| format!("failed to open storage {display}"))?;
    Ok(storage)
}

async fn import_startup_rules(config: &IronwatchConfig, storage: &Storage) -> Result<()> {
    if config.detection.rule_dir.is_empty() {
        return Ok(());
    }

    let dir = PathBuf::from(&config.detection.rule_dir);
    let summary = RuleLoader::import_directory(storage, &dir)
        .await
        .with_context(|| format!("failed to import rules from {}", dir.display()))?;
    tracing::info!(
        dir = %dir.display(),
        imported = summary.imported,
        failed = summary.failed,
        "startup rules imported"
    );
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
