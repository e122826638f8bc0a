//! Command handlers for the local duplicate check and server passes.
//!
//! Each handler loads the CSV into a grid, runs the requested work, optionally
//! writes the annotated report and returns the lines to print.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cli::{PassArgs, SourceArgs};
use crate::config::UploaderConfig;
use crate::error::AppError;
use crate::grid::{CellTag, Grid};
use crate::streaming::{load_csv, write_report};
use crate::upload::{
    BatchTransport, EventSink, HttpTransport, RemoveKind, UploadEvent, UploadMode,
    UploadOrchestrator, UploadSession,
};
use crate::validation::{annotate_duplicates, duplicate_message, find_duplicates};

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// What a command reports back to the terminal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutcome {
    pub summary: Vec<String>,
    /// Rejected rows or failed batches remain.
    pub has_errors: bool,
}

impl CommandOutcome {
    fn from_session(session: &UploadSession) -> Self {
        let mut summary: Vec<String> = session
            .errors
            .iter()
            .map(|(row, error)| match &error.column {
                Some(column) => format!("Row {} [{}]: {}", row + 1, column, error.message),
                None => format!("Row {}: {}", row + 1, error.message),
            })
            .collect();
        summary.extend(session.log.iter().cloned());
        if session.controls.commit_enabled {
            summary.push("No errors found; the rows can be uploaded.".to_string());
        }
        if session.controls.offer_remove_duplicates {
            summary.push("Duplicates found; rerun with --drop-duplicates to skip local ones.".to_string());
        }
        Self {
            summary,
            has_errors: session.has_errors(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Progress
// ─────────────────────────────────────────────────────────────────────────────

/// Logs batch progress as it happens.
struct ProgressLogger;

impl EventSink for ProgressLogger {
    fn emit(&self, event: &UploadEvent) {
        match event {
            UploadEvent::BatchDispatched {
                offset,
                rows,
                remaining,
                ..
            } => info!(
                "[UPLOAD] Sending rows {}-{} ({} batch(es) queued)",
                offset + 1,
                offset + rows,
                remaining
            ),
            UploadEvent::BatchFailed {
                offset, message, ..
            } => warn!("[UPLOAD] Rows from {} not processed: {}", offset + 1, message),
            UploadEvent::PhaseChanged { .. }
            | UploadEvent::BatchCompleted { .. }
            | UploadEvent::Finished { .. } => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Reports local duplicates on the key columns. Never contacts the server.
///
/// # Errors
///
/// Returns `AppError::Config` when no key columns are configured, plus any
/// CSV or report error.
pub async fn run_dedupe(
    args: &SourceArgs,
    config: &UploaderConfig,
) -> Result<CommandOutcome, AppError> {
    if config.key_columns.is_empty() {
        return Err(AppError::Config(
            "no key columns configured (use --key-column or key_columns)".to_string(),
        ));
    }

    let mut grid = load_csv(&args.csv).await?;
    let matches = find_duplicates(&grid, &config.key_columns);
    annotate_duplicates(&mut grid, &matches, &config.key_columns);

    let mut summary: Vec<String> = matches.iter().map(duplicate_message).collect();
    let rows = grid.rows_with_tag(CellTag::DuplicateLocal).len();
    summary.push(format!(
        "{} row(s) share key values on {}",
        rows,
        config.key_columns.join(", ")
    ));

    if let Some(report) = &args.report {
        write_report(&grid, report).await?;
        summary.push(format!("Report written to {}", report.display()));
    }

    Ok(CommandOutcome {
        summary,
        has_errors: false,
    })
}

/// Runs a validate or commit pass against the configured endpoint.
///
/// # Errors
///
/// Returns an error for configuration, CSV or report failures. Rejected
/// rows and failed batches are reported in the outcome instead.
pub async fn run_pass(
    args: &PassArgs,
    config: &UploaderConfig,
    mode: UploadMode,
) -> Result<CommandOutcome, AppError> {
    let transport = HttpTransport::new(config.endpoint_url()?, config.credentials())?
        .with_logging_mode(config.logging_mode);
    let grid = load_csv(&args.source.csv).await?;
    run_pass_with(grid, transport, args, config, mode).await
}

async fn run_pass_with<T: BatchTransport>(
    grid: Grid,
    transport: T,
    args: &PassArgs,
    config: &UploaderConfig,
    mode: UploadMode,
) -> Result<CommandOutcome, AppError> {
    let mut orchestrator = UploadOrchestrator::new(grid, transport, config.orchestrator_settings()?)
        .with_event_sink(Arc::new(ProgressLogger));

    let mut dropped = 0;
    if args.drop_duplicates {
        dropped = orchestrator.remove_rows_by_status(RemoveKind::LocalDuplicates);
    }

    let mut outcome = CommandOutcome::from_session(orchestrator.run(mode).await);
    if dropped > 0 {
        outcome
            .summary
            .insert(0, format!("Dropped {} locally duplicated row(s)", dropped));
    }

    if let Some(report) = &args.source.report {
        write_report(orchestrator.grid(), report).await?;
        outcome
            .summary
            .push(format!("Report written to {}", report.display()));
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::future::Future;
    use std::path::PathBuf;
    use std::pin::Pin;

    use tempfile::TempDir;

    use super::*;
    use crate::grid::CellValue;
    use crate::upload::{BatchForm, BatchResponse, FailedRow, RowStatus, SuccessfulRow};

    /// Rejects the `Type` cell of rows whose type is `bogus`, accepts the rest.
    struct TypeChecker;

    impl BatchTransport for TypeChecker {
        fn submit<'a>(
            &'a self,
            form: &'a BatchForm,
        ) -> Pin<Box<dyn Future<Output = Result<BatchResponse, AppError>> + Send + 'a>> {
            Box::pin(async move {
                let rows: Vec<serde_json::Value> =
                    serde_json::from_str(&form.data).unwrap_or_default();
                let mut response = BatchResponse {
                    processed: rows.len(),
                    ..Default::default()
                };
                for (i, row) in rows.iter().enumerate() {
                    let number = i as i64 + 1;
                    if row["Type"] == "bogus" {
                        response.failed_rows.push(FailedRow {
                            row: number,
                            col: 1,
                            label: "Type".into(),
                            message: "Unknown indicator type".into(),
                        });
                    } else {
                        response.successful_rows.push(SuccessfulRow {
                            row: number,
                            status: RowStatus::Success,
                            message: None,
                        });
                    }
                }
                Ok(response)
            })
        }
    }

    fn grid(types: &[&str]) -> Grid {
        Grid::from_rows(
            vec!["Indicator".into(), "Type".into()],
            types
                .iter()
                .enumerate()
                .map(|(i, t)| vec![CellValue::from(format!("host{}.example.com", i)), (*t).into()])
                .collect(),
        )
    }

    fn pass_args(csv: PathBuf, report: Option<PathBuf>, drop_duplicates: bool) -> PassArgs {
        PassArgs {
            source: SourceArgs {
                csv,
                report,
                key_columns: Vec::new(),
            },
            endpoint: None,
            batch_size: None,
            request_timeout_secs: None,
            link_column: None,
            username: None,
            drop_duplicates,
        }
    }

    #[tokio::test]
    async fn clean_pass_has_no_errors() {
        let args = pass_args(PathBuf::from("unused.csv"), None, false);
        let outcome = run_pass_with(
            grid(&["Domain", "Domain"]),
            TypeChecker,
            &args,
            &UploaderConfig::default(),
            UploadMode::Validate,
        )
        .await
        .unwrap();

        assert!(!outcome.has_errors);
        assert!(outcome
            .summary
            .iter()
            .any(|l| l.starts_with("Validation complete: 2 of 2")));
    }

    #[tokio::test]
    async fn rejected_rows_are_listed_and_reported() {
        let dir = TempDir::new().unwrap();
        let report = dir.path().join("report.csv");
        let args = pass_args(PathBuf::from("unused.csv"), Some(report.clone()), false);

        let outcome = run_pass_with(
            grid(&["Domain", "bogus"]),
            TypeChecker,
            &args,
            &UploaderConfig::default(),
            UploadMode::Validate,
        )
        .await
        .unwrap();

        assert!(outcome.has_errors);
        assert_eq!(outcome.summary[0], "Row 2 [Type]: Unknown indicator type");
        let content = fs::read_to_string(&report).unwrap();
        assert!(content.contains("host1.example.com,bogus,invalid,Unknown indicator type"));
    }

    #[tokio::test]
    async fn drop_duplicates_removes_later_rows() {
        let mut rows = grid(&["Domain", "Domain", "Domain"]);
        rows.set_cell(2, 0, "HOST0.example.com".into());
        let config = UploaderConfig {
            key_columns: vec!["Indicator".into()],
            ..Default::default()
        };
        let args = pass_args(PathBuf::from("unused.csv"), None, true);

        let outcome = run_pass_with(rows, TypeChecker, &args, &config, UploadMode::Commit)
            .await
            .unwrap();

        assert_eq!(outcome.summary[0], "Dropped 1 locally duplicated row(s)");
        assert!(outcome
            .summary
            .iter()
            .any(|l| l.starts_with("Upload complete: 2 of 2")));
    }

    #[tokio::test]
    async fn dedupe_requires_key_columns() {
        let args = SourceArgs {
            csv: PathBuf::from("unused.csv"),
            report: None,
            key_columns: Vec::new(),
        };

        let result = run_dedupe(&args, &UploaderConfig::default()).await;

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn dedupe_reports_matching_rows() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("rows.csv");
        fs::write(
            &csv,
            "Indicator,Type\nevil.com,Domain\n1.2.3.4,IPv4\nEVIL.com,Domain\n",
        )
        .unwrap();
        let args = SourceArgs {
            csv,
            report: None,
            key_columns: Vec::new(),
        };
        let config = UploaderConfig {
            key_columns: vec!["Indicator".into()],
            ..Default::default()
        };

        let outcome = run_dedupe(&args, &config).await.unwrap();

        assert!(!outcome.has_errors);
        assert_eq!(outcome.summary.len(), 3);
        assert_eq!(
            outcome.summary.last().map(String::as_str),
            Some("2 row(s) share key values on Indicator")
        );
    }
}
