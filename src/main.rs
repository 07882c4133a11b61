use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ml_tutorials::config::{self, DensityConfig, TrainConfig};
use ml_tutorials::examples::{density, handwriting};

#[derive(Parser)]
#[command(version, about = "Bivariate normal surfaces and an MNIST multilayer perceptron")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plot bivariate normal densities for several correlations
    Density {
        /// RON config file, defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Train the MLP on MNIST
    Train {
        /// RON config file, defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Density { config } => {
            let config: DensityConfig = config::load_or_default(config.as_deref())?;
            density::run_sample(&config)
        }
        Command::Train { config } => {
            let config: TrainConfig = config::load_or_default(config.as_deref())?;
            handwriting::run_sample(&config)
        }
    }
}
