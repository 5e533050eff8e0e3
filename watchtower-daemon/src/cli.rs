//! CLI argument definitions for watchtower-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Watchtower job-scheduler log ingestion daemon.
///
/// Receives syslog datagrams over UDP, routes them to channels, archives
/// every event and extracts job-failure alerts from alert-bearing channels.
#[derive(Parser, Debug)]
#[command(name = "watchtower-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to watchtower.toml configuration file.
    #[arg(short, long, default_value = "/etc/watchtower/watchtower.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply CLI overrides to the loaded general configuration.
    pub fn apply_overrides(&self, general: &mut watchtower_core::config::GeneralConfig) {
        if let Some(level) = &self.log_level {
            general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            general.log_format = format.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = DaemonCli::parse_from(["watchtower-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/watchtower/watchtower.toml"));
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn overrides_take_precedence() {
        let cli = DaemonCli::parse_from([
            "watchtower-daemon",
            "-c",
            "/tmp/w.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--validate",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/w.toml"));
        assert!(cli.validate);

        let mut general = watchtower_core::config::GeneralConfig::default();
        cli.apply_overrides(&mut general);
        assert_eq!(general.log_level, "debug");
        assert_eq!(general.log_format, "pretty");
    }
}
