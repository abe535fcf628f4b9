//! X-HMAC signing CLI.
//!
//! This tool provides commands for:
//! - Computing the X-HMAC tag for an outbound API request
//! - Verifying a tag against a request
//! - Validating signing configuration
//!
//! On success `sign` prints `{"hmac":"<base64>"}` to stdout and exits 0. On
//! failure every command prints `{"error":"<message>","kind":"<kind>"}` to
//! stderr and exits 1. Messages never contain token values.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod config;
mod error;
mod logging;
mod sign;

use error::CliError;
use sign::RequestArgs;

#[derive(Debug, Parser)]
#[command(name = "xhmac")]
#[command(about = "Sign outbound API requests with X-HMAC tags")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file
    #[arg(long, short, global = true, env = "XHMAC_CONFIG")]
    config: Option<PathBuf>,

    /// Trust origin whose default token signs the request
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compute the X-HMAC tag for a request
    Sign {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Check an X-HMAC tag against a request
    Verify {
        /// The base64 tag to check
        #[arg(long)]
        hmac: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Validate configuration and list configured origins
    Validate,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version are not failures
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            eprintln!("{}", CliError::from(e).to_json());
            return ExitCode::FAILURE;
        }
    };
    logging::init_logger(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.to_json());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let file = cli.config.as_deref();

    match cli.command {
        Commands::Sign { request } => {
            let output = sign::sign(file, cli.origin, request).await?;
            println!("{}", serde_json::to_string(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify { hmac, request } => {
            let output = sign::verify(file, cli.origin, &hmac, request).await?;
            println!("{}", serde_json::to_string(&output)?);
            Ok(if output.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate => {
                config::validate(file, cli.verbose)?;
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}
