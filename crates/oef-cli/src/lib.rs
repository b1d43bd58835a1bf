//! # oef-cli
//!
//! Weather-station negotiation demo for the OEF negotiation core.
//!
//! Provides commands for:
//! - Running a demo where a client buys one measurement from the cheapest station
//! - Validating demo configuration files
//! - Generating agent keys
//!
//! # Architecture
//!
//! Every agent runs its own [`NegotiationEngine`](oef_dialogue::NegotiationEngine)
//! on a shared in-process [`LocalBroker`](oef_local::LocalBroker).
//!
//! ```text
//! ┌────────────┐   CFP / Propose    ┌──────────────┐
//! │   client   │◄──────────────────►│  station(s)  │
//! └─────┬──────┘  Accept / Message  └──────┬───────┘
//!       │ search                  register │
//!       └───────────►  LocalBroker  ◄──────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod demo;
pub mod error;
pub mod output;
pub mod weather;

pub use cli::{Cli, Commands, Format, RunArgs};
pub use config::{AgentConfig, DemoConfig, StationConfig};
pub use demo::run_demo;
pub use error::CliError;
pub use output::OutputFormat;
pub use weather::{Measurement, Outcome, WeatherClient, WeatherStation};
