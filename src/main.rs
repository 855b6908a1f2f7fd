//! farmhand binary entry point

use clap::Parser;
use farmhand::cli::{self, Cli};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    match cli::execute(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "farmhand failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
