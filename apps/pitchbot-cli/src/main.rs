//! PitchBot CLI binary entry point.
//!
//! Cleans up old logs, initializes tracing for the selected command, parses
//! command-line arguments with clap, and dispatches via [`Cli::run`].

mod cli;
mod logging;
mod output;
mod tui;
mod worker;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (workdir, target) = cli.log_context();

    // Best-effort, before tracing is initialized.
    logging::cleanup_old_logs(&workdir);

    let _guard = logging::init_tracing(&workdir, target)?;

    cli.run().await
}
