//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// OEF weather demo - negotiate a weather measurement between local agents.
#[derive(Parser, Debug, Clone)]
#[command(name = "oef-weather")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Demo configuration file. Without one, a demo is generated.
    #[arg(short, long, env = "OEF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the weather negotiation.
    ///
    /// The client searches for weather stations, collects one offer from
    /// each, accepts the cheapest and receives a measurement.
    Run(RunArgs),

    /// Validate a demo configuration file.
    CheckConfig {
        /// Path to the TOML file.
        path: PathBuf,
    },

    /// Generate a base58 agent key.
    Keygen,
}

/// Arguments for the run command.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Number of stations to generate when no config file is given.
    #[arg(short, long, default_value_t = 3)]
    pub stations: usize,

    /// Seconds to wait for a measurement, overriding the config file.
    #[arg(short, long)]
    pub timeout_secs: Option<u64>,
}
