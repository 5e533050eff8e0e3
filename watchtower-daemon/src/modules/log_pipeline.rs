//! Log pipeline module initialization.
//!
//! Converts the receiver, routing, alerting and archive sections of
//! `WatchtowerConfig` into a `PipelineConfig`, builds the `LogPipeline`
//! and wraps it in a `ModuleHandle`.
//!
//! Route table, job catalog, dedup ledger and sinks are opened lazily on
//! `start()`, so `init` itself never touches the filesystem.

use anyhow::Result;

use watchtower_core::config::WatchtowerConfig;
use watchtower_log_pipeline::{LogPipelineBuilder, PipelineConfig};

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const MODULE_NAME: &str = "log-pipeline";

/// Initialize the log pipeline module.
///
/// # Errors
///
/// Returns an error if the derived pipeline configuration is invalid.
pub fn init(config: &WatchtowerConfig) -> Result<ModuleHandle> {
    let pipeline_config = PipelineConfig::from_core(config);

    tracing::info!(
        bind_addr = %pipeline_config.bind_addr,
        routes_path = %pipeline_config.routes_path,
        alert_channels = ?pipeline_config.alert_channels,
        "initializing log pipeline"
    );

    let pipeline = LogPipelineBuilder::new()
        .config(pipeline_config)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build log pipeline: {e}"))?;

    Ok(ModuleHandle::new(MODULE_NAME, true, Box::new(pipeline)))
}
