//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Understand where your money goes
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "AI-assisted bank statement analyzer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Model/provider config file (defaults to the data dir override, then built-in)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Allowed CORS origin (repeatable; same-origin only when omitted)
        #[arg(long)]
        cors_origin: Vec<String>,
    },

    /// List registry models and what each provider offers
    Models,

    /// Parse a statement and print its transactions
    Parse {
        /// Statement file (CSV export or extracted text)
        file: PathBuf,

        /// Input format: csv or text (guessed from the extension if omitted)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Show debit and credit totals for a statement
    Summary {
        /// Statement file (CSV export or extracted text)
        file: PathBuf,

        /// Input format: csv or text (guessed from the extension if omitted)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Group spending into categories
    Categorize {
        /// Statement file (CSV export or extracted text)
        file: PathBuf,

        /// Input format: csv or text (guessed from the extension if omitted)
        #[arg(short, long)]
        format: Option<String>,

        /// Model to use (selected from the registry if omitted)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Full analysis: summary, categories, advice and savings matrix
    Analyze {
        /// Statement file (CSV export or extracted text)
        file: PathBuf,

        /// Input format: csv or text (guessed from the extension if omitted)
        #[arg(short, long)]
        format: Option<String>,

        /// Model to use (selected from the registry if omitted)
        #[arg(short, long)]
        model: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}
