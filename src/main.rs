// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

mod cli;

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    cli::logging::set_verbose(cli.verbose);

    let result = match &cli.command {
        Commands::Decode(args) => cli::decode::run_decode(args),
        Commands::Geometry(args) => cli::geometry::run_geometry(args),
        #[cfg(feature = "onnx")]
        Commands::Predict(args) => cli::predict::run_prediction(args),
    };

    if let Err(e) = result {
        crate::error!("{e}");
        process::exit(1);
    }
}
