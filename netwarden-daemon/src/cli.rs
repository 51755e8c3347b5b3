//! CLI argument definitions for netwarden-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// netwarden packet-interception daemon.
///
/// Binds an NFQUEUE queue, records per-device access history, and
/// forwards every packet back into the kernel forwarding path.
#[derive(Parser, Debug)]
#[command(name = "netwarden-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to netwarden.toml configuration file.
    #[arg(short, long, default_value = "/etc/netwarden/netwarden.toml")]
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

    /// Override the NFQUEUE queue id to bind.
    #[arg(short, long)]
    pub queue: Option<u16>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply CLI overrides on top of a loaded configuration.
    pub fn apply_to(&self, config: &mut netwarden_core::NetwardenConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(queue) = self.queue {
            config.capture.queue_id = queue;
        }
    }
}
