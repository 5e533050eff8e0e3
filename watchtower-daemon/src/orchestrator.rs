//! Module orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `watchtower-daemon`.
//! It validates configuration, installs the metrics recorder, builds the
//! pipeline modules and drives them from startup to graceful shutdown.
//!
//! # Shutdown
//!
//! On `SIGTERM` or `SIGINT` every started module is stopped in reverse
//! registration order. The log pipeline stops receiving first and then
//! drains whatever is still queued.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;

use watchtower_core::config::WatchtowerConfig;

use crate::health::{self, DaemonHealth, ModuleHealth, aggregate_status};
use crate::metrics_server;
use crate::modules::{ModuleRegistry, log_pipeline};

/// Interval between periodic health reports while running.
const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: WatchtowerConfig,
    /// Registered modules (ordered for start/stop).
    modules: ModuleRegistry,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - Any module fails to initialize
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = WatchtowerConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: WatchtowerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;

        // Install metrics recorder before module initialization
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            record_daemon_metrics();
        }

        let mut modules = ModuleRegistry::new();
        modules.register(log_pipeline::init(&config)?);

        tracing::info!(
            total_modules = modules.count(),
            enabled_modules = modules.enabled_count(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            modules,
            start_time: Instant::now(),
        })
    }

    /// Start all modules and block until `SIGTERM` or `SIGINT`.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal, "shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
            }
        })
        .await
    }

    /// Start all modules and run until `shutdown` resolves.
    ///
    /// A health report is logged every 30 seconds while running.
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tracing::info!("starting all modules");
        self.modules.start_all().await?;

        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(HEALTH_REPORT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick fires immediately
        interval.tick().await;

        tracing::info!("entering main event loop");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = interval.tick() => {
                    let report = self.health().await;
                    health::log_report(&report);
                }
            }
        }

        self.shutdown().await
    }

    /// Stop all started modules.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        self.modules.stop_all().await?;
        tracing::info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "watchtower-daemon shut down"
        );
        Ok(())
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let modules: Vec<ModuleHealth> = self
            .modules
            .health_statuses()
            .await
            .into_iter()
            .map(|(name, enabled, status)| ModuleHealth {
                name,
                enabled,
                status,
            })
            .collect();

        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &WatchtowerConfig {
        &self.config
    }

    /// Number of registered modules.
    pub fn module_count(&self) -> usize {
        self.modules.count()
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {e}"))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {e}"))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl+C handler: {e}"))?;
    Ok("CTRL_C")
}

/// Record daemon-level metrics. Called once after the recorder is installed.
fn record_daemon_metrics() {
    use watchtower_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}
