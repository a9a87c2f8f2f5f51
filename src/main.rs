//! treetune - Main Entry Point
//!
//! Grid-tuned random forest regression with a load/tune/report CLI.

use clap::Parser;
use treetune::cli::{cmd_info, cmd_tune, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "treetune=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tune(args) => {
            cmd_tune(&args)?;
        }
        Commands::Info {
            data,
            outcome,
            id_columns,
        } => {
            cmd_info(&data, &outcome, &id_columns)?;
        }
    }

    Ok(())
}
