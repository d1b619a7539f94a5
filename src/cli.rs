// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::FleetScope;

/// Command-line arguments for `fleetctl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fleetctl",
    version,
    about = "Drive the lifecycle of a containerized aggregator/worker fleet over SSH.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the fleet config file (TOML).
    ///
    /// Default: `FLEETCTL_CONFIG`, or `fleet.toml` in the current directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLEETCTL_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Which part of the fleet the verb applies to.
    #[arg(long, global = true, value_enum, default_value_t = FleetScope::All)]
    pub scope: FleetScope,

    #[command(subcommand)]
    pub verb: Verb,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Verb {
    /// Copy and load the image archive; leaves no container running.
    Deploy,
    /// Start containers, aggregator first.
    Start,
    /// Gracefully stop and remove containers.
    Stop {
        /// Save container logs before stopping.
        #[arg(long)]
        save_logs: bool,
    },
    /// Kill and remove containers, verifying they are gone.
    ForceKill,
    /// Stop, wait, start.
    Restart {
        #[arg(long)]
        save_logs: bool,
    },
    /// Recover with a smaller tunable value. Always applies to the whole
    /// fleet.
    Retry {
        /// Value to write; defaults to `[tunable].retry_value`.
        #[arg(long)]
        value: Option<String>,
        /// Force-converge attempts; defaults to `[retry].cleanup_retries`.
        #[arg(long)]
        attempts: Option<u32>,
    },
    /// Write the tunable's normal value back.
    ResetTunable {
        /// Value to write; defaults to `[tunable].normal_value`.
        #[arg(long)]
        value: Option<String>,
    },
    /// Show the state of every node.
    Status,
    /// Save container logs.
    Logs {
        /// Tag included in the log file names.
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// Force kill without log capture.
    Cleanup,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
