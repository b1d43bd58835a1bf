//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use serde::Serialize;

use crate::cli::Format;
use crate::config::DemoConfig;
use crate::error::CliError;
use crate::weather::Outcome;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone, Default)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }
}

/// Human-readable rendering of a command result.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

impl TableDisplay for Outcome {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Negotiation Outcome")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Station:          {}", self.station)?;
        writeln!(writer, "Price:            {}", self.price)?;
        writeln!(writer, "Offers:           {}", self.proposals)?;
        writeln!(writer)?;
        writeln!(writer, "Measurement")?;
        writeln!(writer, "  Temperature:    {:.1} °C", self.measurement.temperature)?;
        writeln!(writer, "  Humidity:       {:.2}", self.measurement.humidity)?;
        writeln!(writer, "  Air pressure:   {:.1} hPa", self.measurement.air_pressure)?;
        Ok(())
    }
}

/// Summary of a validated configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    /// Client key.
    pub client: String,
    /// Station keys with their prices.
    pub stations: Vec<(String, i64)>,
    /// Client timeout in seconds.
    pub timeout_secs: u64,
    /// Dialogue table capacity.
    pub max_dialogues: usize,
    /// Inactivity timeout in seconds.
    pub inactivity_timeout_secs: u64,
}

impl From<&DemoConfig> for ConfigSummary {
    fn from(config: &DemoConfig) -> Self {
        Self {
            client: config.client.public_key.clone(),
            stations: config
                .stations
                .iter()
                .map(|s| (s.agent.public_key.clone(), s.price))
                .collect(),
            timeout_secs: config.timeout_secs,
            max_dialogues: config.engine.max_dialogues,
            inactivity_timeout_secs: config.engine.inactivity_timeout_secs,
        }
    }
}

impl TableDisplay for ConfigSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Configuration OK")?;
        writeln!(writer, "Client:           {}", self.client)?;
        writeln!(writer, "Timeout:          {}s", self.timeout_secs)?;
        writeln!(writer, "Max dialogues:    {}", self.max_dialogues)?;
        writeln!(writer, "Inactivity:       {}s", self.inactivity_timeout_secs)?;
        writeln!(writer)?;
        writeln!(writer, "{:<48} {:>8}", "STATION", "PRICE")?;
        for (key, price) in &self.stations {
            writeln!(writer, "{key:<48} {price:>8}")?;
        }
        Ok(())
    }
}

/// A freshly generated key.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedKey {
    /// Base58 public key.
    pub public_key: String,
}

impl TableDisplay for GeneratedKey {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{}", self.public_key)?;
        Ok(())
    }
}
