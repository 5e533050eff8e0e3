use anyhow::Result;
use clap::Parser;

use watchtower_core::config::WatchtowerConfig;
use watchtower_daemon::cli::DaemonCli;
use watchtower_daemon::logging;
use watchtower_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = WatchtowerConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", cli.config.display()))?;
    cli.apply_overrides(&mut config.general);

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("configuration invalid: {e}"))?;
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "watchtower-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await
}
