//! Inphest CLI - simulate symbiont diversification over host histories.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Overrides};

#[derive(Parser)]
#[command(name = "inphest")]
#[command(author, version, about = "Inphest - Symbiont diversification over host phylogenies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (debug logging, per-replicate lines)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log filter (e.g. "info", "inphest_runtime=debug")
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run replicates of a model over a set of host histories
    Simulate {
        /// Host history samples (compiled JSON)
        histories: String,

        /// Model definition (JSON; default model when omitted)
        #[arg(short, long)]
        model: Option<String>,

        /// Number of replicates
        #[arg(short = 'n', long)]
        nreps: Option<usize>,

        /// Random seed
        #[arg(short = 'z', long)]
        seed: Option<u64>,

        /// Prefix for output files
        #[arg(short, long)]
        output_prefix: Option<String>,

        /// Focal area indexes (e.g. "0,2")
        #[arg(long, value_delimiter = ',')]
        focal_areas: Option<Vec<usize>>,

        /// Check every data structure after every event
        #[arg(long)]
        debug_mode: bool,

        /// Report host-extancy check failures instead of aborting
        #[arg(long)]
        ignore_nonextant_host_check_fail: bool,

        /// Keep host histories that fail validation
        #[arg(long)]
        ignore_validation_errors: bool,
    },

    /// Write a model definition with every parameter at its default
    ExampleModel {
        /// Output file path (default: stdout)
        output: Option<String>,
    },

    /// Write a default inphest.toml
    Init {
        /// Directory to write into (default: current directory)
        #[arg(short, long)]
        path: Option<String>,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let level = match (&cli.log_level, cli.verbose) {
        (Some(level), _) => level.clone(),
        (None, true) => "debug".to_string(),
        (None, false) => config.logging.level.clone(),
    };
    init_logging(&level);

    match cli.command {
        Commands::Simulate {
            histories,
            model,
            nreps,
            seed,
            output_prefix,
            focal_areas,
            debug_mode,
            ignore_nonextant_host_check_fail,
            ignore_validation_errors,
        } => {
            let mut config = config;
            config.apply_overrides(Overrides {
                nreps,
                seed,
                output_prefix,
                focal_areas,
                debug_mode,
                ignore_nonextant_host_check_fail,
                ignore_validation_errors,
            });
            commands::simulate::run(&histories, model.as_deref(), &config, cli.verbose)
        }
        Commands::ExampleModel { output } => commands::example_model::run(output.as_deref()),
        Commands::Init { path } => commands::init::run(path.as_deref()),
    }
}
