mod batch;
mod browser;
mod cli;
mod commands;
mod extract;
mod ingest;
mod ledger;
mod model;
mod pipeline;
mod portal;
mod query;
mod reconcile;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::query::QueryError;

/// Exit status when the portal never accepted a batch submission.
const EXIT_SUBMISSION_FAILED: i32 = 3;

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(exit_code(&err));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Recheck(args) => commands::recheck::run(args),
        Commands::Status(args) => commands::status::run(args),
        Commands::Export(args) => commands::export::run(args),
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<QueryError>() {
        Some(QueryError::SubmissionFailed { .. }) => EXIT_SUBMISSION_FAILED,
        _ => 1,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
