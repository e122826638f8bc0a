use std::process::ExitCode;

use clap::Parser;

use bulk_importer::cli::Cli;
use bulk_importer::commands;
use bulk_importer::logging::init_logging;

/// Exit status when the pass finished but rows were rejected or batches failed.
const EXIT_ROW_ERRORS: u8 = 1;
/// Exit status when the command could not run at all.
const EXIT_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match commands::execute(cli).await {
        Ok(outcome) => {
            for line in &outcome.summary {
                println!("{}", line);
            }
            if outcome.has_errors {
                ExitCode::from(EXIT_ROW_ERRORS)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            let presentation = e.to_presentation();
            eprintln!("{}: {}", presentation.title, presentation.message);
            if let Some(action) = presentation.action {
                eprintln!("{}", action);
            }
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
