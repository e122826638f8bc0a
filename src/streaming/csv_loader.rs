//! Loading a CSV file into a [`Grid`].
//!
//! Uses the `csv` crate so quoted fields with embedded commas and newlines
//! survive intact. The first record is the header row.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{info, warn};

use crate::error::AppError;
use crate::grid::{CellValue, Grid};

/// UTF-8 byte order mark some spreadsheet exports prepend.
const UTF8_BOM: char = '\u{feff}';

/// Reads `source` into a grid on a blocking thread.
///
/// Rows shorter than the header are padded with blank cells. Cells beyond the
/// last header are dropped with a warning.
///
/// # Errors
///
/// Returns `AppError::CsvInvalid` if the file cannot be opened or parsed or
/// has no header row, and `AppError::NotUtf8` for non UTF-8 content.
pub async fn load_csv(source: &Path) -> Result<Grid, AppError> {
    let source = source.to_owned();
    tokio::task::spawn_blocking(move || load_csv_blocking(&source))
        .await
        .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))?
}

fn load_csv_blocking(source: &Path) -> Result<Grid, AppError> {
    let file = File::open(source).map_err(|e| {
        AppError::CsvInvalid(format!("Failed to open {}: {}", source.display(), e))
    })?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(BufReader::new(file));

    let headers = header_labels(reader.headers()?);
    if headers.iter().all(|h| h.is_empty()) {
        return Err(AppError::CsvInvalid("CSV file has no header row".to_string()));
    }

    let width = headers.len();
    let mut rows = Vec::new();
    let mut truncated = 0usize;
    for result in reader.records() {
        let record = result?;
        if record.len() > width && record.iter().skip(width).any(|f| !f.is_empty()) {
            truncated += 1;
        }
        rows.push(record.iter().take(width).map(cell_from_field).collect());
    }

    if truncated > 0 {
        warn!(
            "[GRID] {} row(s) in {} had cells beyond the last header; they were dropped",
            truncated,
            source.display()
        );
    }
    info!("[GRID] Loaded {} row(s) x {} column(s)", rows.len(), width);

    Ok(Grid::from_rows(headers, rows))
}

fn header_labels(record: &StringRecord) -> Vec<String> {
    record
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches(UTF8_BOM).to_string()
            } else {
                h.to_string()
            }
        })
        .collect()
}

fn cell_from_field(field: &str) -> CellValue {
    if field.is_empty() {
        CellValue::Null
    } else {
        CellValue::Text(field.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).expect("Failed to write fixture");
        path
    }

    #[tokio::test]
    async fn loads_headers_and_rows() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = write(
            &dir,
            "indicators.csv",
            "Indicator,Type,Description\nevil.com,Domain,\"seen in, phishing\"\n1.2.3.4,IPv4,\"multi\nline\"\n",
        );

        let grid = load_csv(&path).await.unwrap();

        assert_eq!(grid.headers(), ["Indicator", "Type", "Description"]);
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.cell(0, 2), Some(&CellValue::Text("seen in, phishing".into())));
        assert_eq!(grid.cell(1, 2), Some(&CellValue::Text("multi\nline".into())));
    }

    #[tokio::test]
    async fn strips_bom_and_pads_short_rows() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = write(&dir, "bom.csv", "\u{feff}Indicator,Type\nevil.com\n,\n");

        let grid = load_csv(&path).await.unwrap();

        assert_eq!(grid.headers()[0], "Indicator");
        assert_eq!(grid.cell(0, 1), Some(&CellValue::Null));
        assert!(grid.is_row_empty(1));
    }

    #[tokio::test]
    async fn drops_cells_beyond_header() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = write(&dir, "wide.csv", "A,B\n1,2,3\n");

        let grid = load_csv(&path).await.unwrap();

        assert_eq!(grid.column_count(), 2);
        assert_eq!(grid.row(0).map(|r| r.len()), Some(2));
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = write(&dir, "empty.csv", "");

        let result = load_csv(&path).await;

        assert!(matches!(result, Err(AppError::CsvInvalid(_))));
    }

    #[tokio::test]
    async fn invalid_utf8_is_reported() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("latin1.csv");
        fs::write(&path, b"Name\ncaf\xe9\n").expect("Failed to write fixture");

        let result = load_csv(&path).await;

        assert!(matches!(result, Err(AppError::NotUtf8)));
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = TempDir::new().expect("Failed to create temp dir");

        let result = load_csv(&dir.path().join("nope.csv")).await;

        assert!(matches!(result, Err(AppError::CsvInvalid(_))));
    }
}
