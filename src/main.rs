use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use price_inference::{
    compare, BatchRequest, EstimateError, PriceRequest, PriceService, Settings,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Estimate listing prices with the trained price model.
///
/// Configuration comes from `PRICE_*` environment variables (a `.env` file in
/// the working directory is honoured). JSON goes to stdout, logs to stderr.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Price one listing
    Predict {
        /// JSON request file (reads stdin if not specified)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Price many listings, `{"rows": [...]}` or a bare array
    Batch {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Price one listing, filling a missing floor and building age
    Estimate {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Price one listing and compare it with its asking price
    Compare {
        /// Asking price of the listing
        #[arg(long)]
        listed_price: f64,

        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Print the active configuration
    Meta,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    class: String,
    status: u16,
}

fn read_input<T: serde::de::DeserializeOwned>(input: Option<PathBuf>) -> Result<T, EstimateError> {
    let raw = match &input {
        Some(path) => fs::read_to_string(path).map_err(|e| {
            EstimateError::invalid("input", format!("reading {}: {e}", path.display()))
        })?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| EstimateError::invalid("input", format!("reading stdin: {e}")))?;
            buf
        }
    };
    serde_json::from_str(&raw).map_err(|e| EstimateError::invalid("input", e.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), EstimateError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| EstimateError::Computation(e.into()))?;
    println!("{out}");
    Ok(())
}

fn run(command: Commands) -> Result<(), EstimateError> {
    let service = PriceService::from_settings(Settings::from_env()?)?;
    match command {
        Commands::Predict { input } => {
            let request: PriceRequest = read_input(input)?;
            print_json(&service.predict(&request)?)
        }
        Commands::Batch { input } => {
            let batch: BatchRequest = read_input(input)?;
            print_json(&service.predict_batch(batch)?)
        }
        Commands::Estimate { input } => {
            let request: PriceRequest = read_input(input)?;
            print_json(&service.estimate(request)?)
        }
        Commands::Compare {
            listed_price,
            input,
        } => {
            let request: PriceRequest = read_input(input)?;
            let estimate = service.predict(&request)?;
            print_json(&compare(listed_price, estimate.price)?)
        }
        Commands::Meta => print_json(&service.meta()),
    }
}

fn main() -> ExitCode {
    // Best effort; a missing .env is the normal case.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let body = ErrorBody {
                error: err.to_string(),
                class: format!("{:?}", err.class()),
                status: err.status_code(),
            };
            match serde_json::to_string(&body) {
                Ok(json) => println!("{json}"),
                Err(_) => eprintln!("{err}"),
            }
            ExitCode::FAILURE
        }
    }
}
