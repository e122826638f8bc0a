//! Command dispatch for the `bulk-importer` binary.

pub mod bulk;

pub use bulk::{run_dedupe, run_pass, CommandOutcome};

use tracing::debug;

use crate::cli::{Cli, Command};
use crate::config::UploaderConfig;
use crate::error::AppError;
use crate::upload::UploadMode;

/// Loads configuration for the chosen subcommand and runs it.
///
/// # Errors
///
/// Returns the first configuration, file or transport setup error.
pub async fn execute(cli: Cli) -> Result<CommandOutcome, AppError> {
    let config_path = cli.config.as_deref();
    match &cli.command {
        Command::Dedupe(args) => {
            let config = UploaderConfig::load(config_path, &args.overrides())?;
            debug!("Loaded {:?}", config);
            run_dedupe(args, &config).await
        }
        Command::Validate(args) => {
            let config = UploaderConfig::load(config_path, &args.overrides())?;
            debug!("Loaded {:?}", config);
            run_pass(args, &config, UploadMode::Validate).await
        }
        Command::Upload(args) => {
            let config = UploaderConfig::load(config_path, &args.overrides())?;
            debug!("Loaded {:?}", config);
            run_pass(args, &config, UploadMode::Commit).await
        }
    }
}
