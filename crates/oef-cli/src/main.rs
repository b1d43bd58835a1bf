//! OEF weather demo binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use oef_cli::cli::{Cli, Commands};
use oef_cli::commands;
use oef_cli::output::OutputFormat;

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), oef_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Run(args) => {
            commands::run(&mut stdout, &format, cli.config.as_deref(), &args).await?;
        }
        Commands::CheckConfig { path } => {
            commands::check_config(&mut stdout, &format, &path)?;
        }
        Commands::Keygen => {
            commands::keygen(&mut stdout, &format)?;
        }
    }

    Ok(())
}
