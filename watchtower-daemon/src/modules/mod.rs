//! Module registry and initialization.
//!
//! Each watchtower pipeline is wrapped as a [`ModuleHandle`] that provides
//! uniform lifecycle management via the [`DynPipeline`] trait.
//!
//! The [`ModuleRegistry`] tracks all registered modules and supports
//! ordered start/stop operations.

pub mod log_pipeline;

use watchtower_core::pipeline::{DynPipeline, HealthStatus};

/// A handle to a registered module.
pub struct ModuleHandle {
    /// Module name for logging and health reporting.
    pub name: String,
    /// Whether this module is enabled in configuration.
    pub enabled: bool,
    /// The module's pipeline implementation (start/stop/health_check).
    pub pipeline: Box<dyn DynPipeline>,
}

impl ModuleHandle {
    /// Create a new module handle.
    pub fn new(name: impl Into<String>, enabled: bool, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            enabled,
            pipeline,
        }
    }

    /// Check the module's health status.
    ///
    /// Disabled modules always report `Healthy` (they are not expected to run).
    pub async fn health_check(&self) -> HealthStatus {
        if !self.enabled {
            return HealthStatus::Healthy;
        }
        self.pipeline.health_check().await
    }
}

/// Registry of all daemon modules.
///
/// Provides ordered start/stop and health check aggregation.
#[derive(Default)]
pub struct ModuleRegistry {
    /// Modules in registration order.
    modules: Vec<ModuleHandle>,
    /// Number of leading modules started by the last `start_all`.
    started: usize,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module.
    pub fn register(&mut self, handle: ModuleHandle) {
        self.modules.push(handle);
    }

    /// Start all enabled modules in registration order.
    ///
    /// On the first failure, modules started so far are stopped again in
    /// reverse order before the error is returned.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        self.started = 0;

        for idx in 0..self.modules.len() {
            let handle = &mut self.modules[idx];
            if !handle.enabled {
                tracing::debug!(module = %handle.name, "skipping disabled module");
                self.started = idx + 1;
                continue;
            }

            tracing::info!(module = %handle.name, "starting module");
            if let Err(e) = handle.pipeline.start().await {
                let name = handle.name.clone();
                tracing::warn!(module = %name, error = %e, "startup failed, rolling back");
                if let Err(rollback) = self.stop_all().await {
                    tracing::error!(
                        startup_error = %e,
                        rollback_error = %rollback,
                        "rollback also failed during startup failure cleanup"
                    );
                }
                return Err(anyhow::anyhow!("failed to start module '{name}': {e}"));
            }
            self.started = idx + 1;
            tracing::info!(module = %handle.name, "module started successfully");
        }
        Ok(())
    }

    /// Stop started modules in reverse registration order.
    ///
    /// Logs errors but continues stopping remaining modules.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        for handle in self.modules[..self.started].iter_mut().rev() {
            if !handle.enabled {
                continue;
            }

            tracing::info!(module = %handle.name, "stopping module");
            if let Err(e) = handle.pipeline.stop().await {
                tracing::error!(module = %handle.name, error = %e, "failed to stop module");
                errors.push(format!("{}: {}", handle.name, e));
            } else {
                tracing::info!(module = %handle.name, "module stopped successfully");
            }
        }
        self.started = 0;

        if !errors.is_empty() {
            return Err(anyhow::anyhow!(
                "errors stopping modules: {}",
                errors.join("; ")
            ));
        }

        Ok(())
    }

    /// Get health status for all modules.
    pub async fn health_statuses(&self) -> Vec<(String, bool, HealthStatus)> {
        let mut statuses = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            let status = handle.health_check().await;
            statuses.push((handle.name.clone(), handle.enabled, status));
        }
        statuses
    }

    /// Number of registered modules.
    pub fn count(&self) -> usize {
        self.modules.len()
    }

    /// Number of enabled modules.
    pub fn enabled_count(&self) -> usize {
        self.modules.iter().filter(|m| m.enabled).count()
    }
}
