//! Annotated CSV report of a grid, written atomically.
//!
//! The report holds every grid column plus `status` (the row's outcome tag)
//! and `message` (the distinct cell tooltips of the row). An existing report
//! at the destination is only replaced once the new one is complete.

use std::fmt;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::Writer;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::AppError;
use crate::grid::{strip_markup, CellTag, Grid};

/// Status column precedence, strongest first.
const STATUS_ORDER: [CellTag; 4] = [
    CellTag::Invalid,
    CellTag::DuplicateServer,
    CellTag::Success,
    CellTag::DuplicateLocal,
];

// ─────────────────────────────────────────────────────────────────────────────
// AtomicCsvWriter
// ─────────────────────────────────────────────────────────────────────────────

/// Report writer that stages rows in a temp file beside the destination.
///
/// The destination is only touched by [`finish`](Self::finish). A writer
/// dropped before that takes its temp file with it.
pub struct AtomicCsvWriter {
    writer: Writer<BufWriter<NamedTempFile>>,
    destination: PathBuf,
}

impl AtomicCsvWriter {
    /// # Errors
    ///
    /// Returns `AppError::ReportFailed` when `destination` names no file
    /// (such as `/`) or its directory is not writable.
    pub fn new(destination: impl AsRef<Path>) -> Result<Self, AppError> {
        let destination = destination.as_ref().to_path_buf();
        let staged = NamedTempFile::new_in(staging_dir(&destination)?)
            .map_err(|e| report_error(&destination, e))?;
        Ok(Self {
            writer: Writer::from_writer(BufWriter::new(staged)),
            destination,
        })
    }

    pub fn write_record<I, T>(&mut self, record: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(record)
            .map_err(|e| report_error(&self.destination, e))
    }

    /// Flushes the staged rows and renames them over the destination.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ReportFailed` if flushing or the rename fails. The
    /// temp file is removed and the destination is left as it was.
    pub fn finish(self) -> Result<PathBuf, AppError> {
        let Self {
            writer,
            destination,
        } = self;
        let staged = writer
            .into_inner()
            .map_err(|e| report_error(&destination, e.error()))?
            .into_inner()
            .map_err(|e| report_error(&destination, e.error()))?;
        staged
            .persist(&destination)
            .map_err(|e| report_error(&destination, e.error))?;
        Ok(destination)
    }
}

/// Directory holding `destination`, `.` for a bare file name.
fn staging_dir(destination: &Path) -> Result<&Path, AppError> {
    match destination.parent() {
        Some(dir) if dir.as_os_str().is_empty() => Ok(Path::new(".")),
        Some(dir) => Ok(dir),
        None => Err(AppError::ReportFailed(format!(
            "{} is not a file path",
            destination.display()
        ))),
    }
}

fn report_error(destination: &Path, error: impl fmt::Display) -> AppError {
    AppError::ReportFailed(format!("{}: {}", destination.display(), error))
}

// ─────────────────────────────────────────────────────────────────────────────
// Report
// ─────────────────────────────────────────────────────────────────────────────

/// Writes `grid` with its `status` and `message` columns to `path`.
///
/// # Errors
///
/// Returns `AppError::ReportFailed` on any I/O failure.
pub async fn write_report(grid: &Grid, path: &Path) -> Result<PathBuf, AppError> {
    let records = report_records(grid);
    let path = path.to_owned();
    tokio::task::spawn_blocking(move || -> Result<PathBuf, AppError> {
        let mut writer = AtomicCsvWriter::new(&path)?;
        for record in &records {
            writer.write_record(record)?;
        }
        let written = writer.finish()?;
        info!(
            "[GRID] Report with {} row(s) written to {}",
            records.len().saturating_sub(1),
            written.display()
        );
        Ok(written)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))?
}

/// Header record followed by one record per grid row.
fn report_records(grid: &Grid) -> Vec<Vec<String>> {
    let mut header: Vec<String> = grid.headers().iter().map(|h| strip_markup(h)).collect();
    header.push("status".to_string());
    header.push("message".to_string());

    let mut records = Vec::with_capacity(grid.row_count() + 1);
    records.push(header);
    for row in 0..grid.row_count() {
        let mut record: Vec<String> = (0..grid.column_count())
            .map(|col| grid.cell(row, col).map(ToString::to_string).unwrap_or_default())
            .collect();
        record.push(row_status(grid, row).to_string());
        record.push(row_messages(grid, row));
        records.push(record);
    }
    records
}

/// Strongest tag carried by any cell of the row, or `""`.
pub fn row_status(grid: &Grid, row: usize) -> &'static str {
    STATUS_ORDER
        .iter()
        .find(|tag| (0..grid.column_count()).any(|col| grid.tags(row, col).has(**tag)))
        .map(|tag| tag.as_str())
        .unwrap_or("")
}

/// Distinct cell tooltips of the row, in column order, joined with `"; "`.
fn row_messages(grid: &Grid, row: usize) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for col in 0..grid.column_count() {
        if let Some(message) = grid.message(row, col) {
            if !message.is_empty() && !seen.contains(&message) {
                seen.push(message);
            }
        }
    }
    seen.join("; ")
}
