//! # `agentek-signer`
//!
//! ```bash
//! # Create the encrypted keyfile
//! agentek-signer init
//!
//! # Run the daemon in the foreground
//! agentek-signer start
//!
//! # From another terminal
//! agentek-signer status
//! agentek-signer address
//! agentek-signer policy show
//! agentek-signer stop
//! ```
//!
//! Exit codes: 0 on success, 1 when the policy or the operator refused a
//! request, 2 for any other error.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use agentek_core::config::Config;
use agentek_core::config_loader::ConfigLoader;
use agentek_signer::cli::commands::{
    AddressCommand, CommandError, InitCommand, PolicyCommand, StartCommand, StatusCommand,
    StopCommand, EXIT_ERROR,
};
use agentek_signer::cli::{Cli, Commands};
use agentek_signer::logging::{init_logging, verbosity_to_level, LogConfig, LogError, LogGuard};
use clap::Parser;

/// Build the log configuration from the config file, then apply the
/// command-line overrides.
fn setup_logging(cli: &Cli, config: &Config) -> Result<LogGuard, LogError> {
    let mut log_config = LogConfig::from_config(&config.logging)?;
    if cli.verbose > 0 {
        log_config.level = verbosity_to_level(cli.verbose);
    }
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    init_logging(&log_config)
}

fn run(command: Commands, loader: &ConfigLoader, config: &Config) -> Result<(), CommandError> {
    match command {
        Commands::Init { import, force } => {
            InitCommand { import, force }.run(loader)?;
        }
        Commands::Start => StartCommand.run(loader, config)?,
        Commands::Status => {
            StatusCommand.run(loader)?;
        }
        Commands::Stop => {
            StopCommand::default().run(loader)?;
        }
        Commands::Address => {
            AddressCommand.run(loader, config)?;
        }
        Commands::Policy { action } => {
            PolicyCommand { action }.run(loader)?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let (loader, config) = match cli
        .loader()
        .and_then(|loader| loader.load().map(|config| (loader, config)))
    {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(EXIT_ERROR);
        }
    };

    let guard = match setup_logging(&cli, &config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(EXIT_ERROR);
        }
    };

    let result = run(cli.command, &loader, &config);
    // Flush the file appender before exiting.
    drop(guard);

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
