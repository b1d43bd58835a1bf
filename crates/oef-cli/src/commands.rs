//! Command implementations.

use std::io::Write;
use std::path::Path;

use crate::cli::RunArgs;
use crate::config::{generate_key, DemoConfig};
use crate::demo::run_demo;
use crate::error::CliError;
use crate::output::{ConfigSummary, GeneratedKey, OutputFormat};

/// Runs the demo and writes its outcome.
///
/// Loads `config` when given, otherwise generates `args.stations` stations.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the demo fails or
/// output fails.
pub async fn run<W: Write>(
    writer: &mut W,
    format: &OutputFormat,
    config: Option<&Path>,
    args: &RunArgs,
) -> Result<(), CliError> {
    let mut demo = match config {
        Some(path) => DemoConfig::from_file(path)?,
        None => DemoConfig::generated(args.stations),
    };
    if let Some(timeout_secs) = args.timeout_secs {
        demo.timeout_secs = timeout_secs;
    }
    demo.validate()?;

    let outcome = run_demo(&demo).await?;
    format.write(writer, &outcome)
}

/// Validates a configuration file and writes a summary.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or is invalid.
pub fn check_config<W: Write>(
    writer: &mut W,
    format: &OutputFormat,
    path: &Path,
) -> Result<(), CliError> {
    let config = DemoConfig::from_file(path)?;
    format.write(writer, &ConfigSummary::from(&config))
}

/// Writes a new random agent key.
///
/// # Errors
///
/// Returns an error if output fails.
pub fn keygen<W: Write>(writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
    let key = GeneratedKey {
        public_key: generate_key(),
    };
    format.write(writer, &key)
}
