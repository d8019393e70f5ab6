//! Tally CLI - AI-assisted bank statement analyzer
//!
//! Usage:
//!   tally parse statement.csv        Show parsed transactions
//!   tally summary statement.csv      Debit/credit totals
//!   tally categorize statement.csv   Spending by category
//!   tally analyze statement.csv      Categories, advice and savings matrix
//!   tally serve --port 3000          Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Serve {
            port,
            host,
            cors_origin,
        } => commands::cmd_serve(config, &host, port, cors_origin).await,
        Commands::Models => {
            let analyzer = commands::build_analyzer(config)?;
            commands::cmd_models(&analyzer).await
        }
        Commands::Parse { file, format } => commands::cmd_parse(&file, format.as_deref()),
        Commands::Summary { file, format } => commands::cmd_summary(&file, format.as_deref()),
        Commands::Categorize {
            file,
            format,
            model,
        } => {
            let analyzer = commands::build_analyzer(config)?;
            commands::cmd_categorize(&analyzer, &file, format.as_deref(), model.as_deref()).await
        }
        Commands::Analyze {
            file,
            format,
            model,
            json,
        } => {
            let analyzer = commands::build_analyzer(config)?;
            commands::cmd_analyze(&analyzer, &file, format.as_deref(), model.as_deref(), json)
                .await
        }
    }
}
