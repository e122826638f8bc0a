//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigOverrides;

#[derive(Debug, Parser)]
#[command(name = "bulk-importer", version)]
#[command(about = "Check, validate and upload spreadsheet rows in batches", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./bulk-importer.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report rows that share values on the key columns, without contacting the server
    Dedupe(SourceArgs),
    /// Submit every row for validation without storing anything
    Validate(PassArgs),
    /// Submit every row for storage
    Upload(PassArgs),
}

/// Input file and local checks shared by every subcommand.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// CSV file with a header row
    pub csv: PathBuf,

    /// Write the annotated rows to this CSV file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Column forming the duplicate key (repeatable or comma separated)
    #[arg(long = "key-column", value_name = "COLUMN", value_delimiter = ',')]
    pub key_columns: Vec<String>,
}

#[derive(Debug, Args)]
pub struct PassArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Bulk endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Rows per request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seconds to wait for each request
    #[arg(long = "timeout", value_name = "SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Column receiving links to stored objects
    #[arg(long)]
    pub link_column: Option<String>,

    /// API user name (the key is read from the config file or BULK_API_KEY)
    #[arg(long)]
    pub username: Option<String>,

    /// Remove all but the first row of each local duplicate group before submitting
    #[arg(long)]
    pub drop_duplicates: bool,
}

impl SourceArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            key_columns: (!self.key_columns.is_empty()).then(|| self.key_columns.clone()),
            ..Default::default()
        }
    }
}

impl PassArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            endpoint: self.endpoint.clone(),
            batch_size: self.batch_size,
            request_timeout_secs: self.request_timeout_secs,
            link_column: self.link_column.clone(),
            username: self.username.clone(),
            ..self.source.overrides()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_validate_with_flags() {
        let cli = Cli::try_parse_from([
            "bulk-importer",
            "validate",
            "rows.csv",
            "--endpoint",
            "https://crits.example.org/bulk/",
            "--batch-size",
            "20",
            "--key-column",
            "Indicator,Type",
            "--drop-duplicates",
            "--report",
            "out.csv",
        ])
        .unwrap();

        let Command::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert!(args.drop_duplicates);
        assert_eq!(args.source.report, Some(PathBuf::from("out.csv")));

        let overrides = args.overrides();
        assert_eq!(overrides.batch_size, Some(20));
        assert_eq!(
            overrides.key_columns,
            Some(vec!["Indicator".to_string(), "Type".to_string()])
        );
        assert_eq!(overrides.endpoint.as_deref(), Some("https://crits.example.org/bulk/"));
    }

    #[test]
    fn global_config_flag_follows_subcommand() {
        let cli =
            Cli::try_parse_from(["bulk-importer", "dedupe", "rows.csv", "--config", "alt.toml"])
                .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        let Command::Dedupe(args) = cli.command else {
            panic!("expected dedupe");
        };
        assert!(args.overrides().key_columns.is_none());
    }

    #[test]
    fn csv_path_is_required() {
        assert!(Cli::try_parse_from(["bulk-importer", "upload"]).is_err());
    }
}
