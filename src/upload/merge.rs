//! Merging per-batch server verdicts back into grid cell state.
//!
//! Row numbers in a response are 1-based and relative to the batch. They are
//! mapped through the grid rows frozen into the [`Batch`] when it was built,
//! so the merge never consults the grid's current numbering.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::grid::{strip_markup, CellRenderer, CellTag, CellValue, Grid};
use crate::upload::batch::Batch;
use crate::upload::session::{BatchError, RowError, UploadSession};
use crate::upload::wire::{BatchResponse, FailedRow, RowStatus, SuccessfulRow};

static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="([^"]*)""#).expect("static regex"));

/// Fallback text for rejections that came without a message.
const DEFAULT_REJECTION: &str = "Rejected by server";

/// Returns the first `href="..."` target in an HTML message.
pub fn extract_link(message: &str) -> Option<String> {
    HREF.captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|href| !href.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Applies one batch response to the grid and the session.
pub fn merge_response(
    grid: &mut Grid,
    session: &mut UploadSession,
    batch: &Batch,
    response: BatchResponse,
) {
    for failed in &response.failed_rows {
        merge_failed_row(grid, session, batch, failed);
    }
    for ok in &response.successful_rows {
        merge_successful_row(grid, session, batch, ok);
    }

    session.processed += response.processed;
    session.log.push(format!(
        "Processed {} row(s) starting at row {}",
        response.processed,
        batch.offset + 1
    ));
    session.log.extend(response.messages);
}

/// Records a batch that produced no verdicts. Its rows are left untouched.
pub fn record_batch_failure(session: &mut UploadSession, batch: &Batch, error: &AppError) {
    let message = error.to_presentation().message;
    session.log.push(format!(
        "Batch starting at row {} failed: {}",
        batch.offset + 1,
        message
    ));
    session.batch_errors.push(BatchError {
        offset: batch.offset,
        rows: batch.len(),
        message,
    });
}

/// Writes collected result links into `link_column`, appending the column
/// if needed. Returns the number of links written.
pub fn write_back_links(grid: &mut Grid, session: &UploadSession, link_column: &str) -> usize {
    if session.links.is_empty() {
        return 0;
    }
    let col = grid.ensure_column(link_column);
    let mut written = 0;
    for (row, href) in session.links.iter() {
        if row >= grid.row_count() {
            continue;
        }
        grid.write_value(row, col, CellValue::Text(href.clone()));
        grid.set_renderer(row, col, CellRenderer::Link);
        written += 1;
    }
    debug!("[UPLOAD] Wrote {} result link(s) to {:?}", written, link_column);
    written
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn merge_failed_row(grid: &mut Grid, session: &mut UploadSession, batch: &Batch, failed: &FailedRow) {
    let Some(row) = batch.grid_row(failed.row) else {
        unknown_row(session, batch, failed.row);
        return;
    };
    let message = if failed.message.is_empty() {
        DEFAULT_REJECTION.to_string()
    } else {
        failed.message.clone()
    };

    let col = if failed.is_whole_row() {
        None
    } else {
        resolve_column(grid, failed)
    };

    match col {
        Some(col) => {
            grid.clear_tag(row, col, CellTag::Pending);
            grid.annotate_cell(row, col, CellTag::Invalid, &message);
        }
        None => {
            grid.clear_row_tag(row, CellTag::Pending);
            grid.annotate_row(row, CellTag::Invalid, &message);
        }
    }

    let column = col.and_then(|c| grid.header_label(c));
    session.errors.push(row, RowError { column, message });
}

/// Resolves the rejected column by label, then by the reported index.
fn resolve_column(grid: &Grid, failed: &FailedRow) -> Option<usize> {
    let by_label = (!failed.label.is_empty())
        .then(|| grid.column_index(&failed.label))
        .flatten();
    by_label.or_else(|| {
        usize::try_from(failed.col)
            .ok()
            .filter(|c| *c < grid.column_count())
    })
}

fn merge_successful_row(
    grid: &mut Grid,
    session: &mut UploadSession,
    batch: &Batch,
    ok: &SuccessfulRow,
) {
    let Some(row) = batch.grid_row(ok.row) else {
        unknown_row(session, batch, ok.row);
        return;
    };
    let raw = ok.message.clone().unwrap_or_default();
    let tooltip = strip_markup(&raw);

    let tag = match ok.status {
        RowStatus::Success => CellTag::Success,
        RowStatus::Duplicate => CellTag::DuplicateServer,
        RowStatus::Failure => {
            warn!(
                "[UPLOAD] Failure status in successfulRows for row {} of batch at {}",
                ok.row, batch.offset
            );
            let message = if tooltip.is_empty() {
                DEFAULT_REJECTION.to_string()
            } else {
                tooltip
            };
            grid.annotate_row(row, CellTag::Invalid, &message);
            session.errors.push(row, RowError { column: None, message });
            return;
        }
    };

    grid.clear_row_tag(row, CellTag::Pending);
    grid.clear_row_tag(row, CellTag::Invalid);
    grid.annotate_row(row, tag, &tooltip);

    if let Some(href) = extract_link(&raw) {
        session.links.push(row, href);
    }
    match tag {
        CellTag::DuplicateServer => session.duplicates.push(row, raw),
        _ => session.successes.push(row, raw),
    }
}

fn unknown_row(session: &mut UploadSession, batch: &Batch, reported: i64) {
    warn!(
        "[UPLOAD] Server reported row {} outside batch at offset {} ({} rows)",
        reported,
        batch.offset,
        batch.len()
    );
    session.batch_errors.push(BatchError {
        offset: batch.offset,
        rows: batch.len(),
        message: format!("Server reported unknown row {}", reported),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CleanedRow;
    use crate::upload::batch::{partition, BatchSize};

    fn grid() -> Grid {
        Grid::from_rows(
            vec!["Indicator".into(), "Type".into(), "Value".into()],
            vec![
                vec!["evil.com".into(), "Domain".into(), "x".into()],
                vec![CellValue::Null, CellValue::Null, CellValue::Null],
                vec!["1.2.3.4".into(), "IPv4".into(), "y".into()],
            ],
        )
    }

    fn single_batch(grid: &Grid) -> Batch {
        let cleaned = grid.cleaned_rows(&CleanedRow::new());
        partition(&cleaned, BatchSize::default()).remove(0)
    }

    #[test]
    fn failed_cell_resolved_by_label() {
        let mut grid = grid();
        let batch = single_batch(&grid);
        let mut session = UploadSession::new(true);
        let response = BatchResponse {
            failed_rows: vec![FailedRow {
                row: 1,
                col: 2,
                label: "Value".into(),
                message: "bad".into(),
            }],
            ..Default::default()
        };

        merge_response(&mut grid, &mut session, &batch, response);

        assert!(grid.tags(0, 2).has(CellTag::Invalid));
        assert_eq!(grid.message(0, 2), Some("bad"));
        assert!(grid.tags(0, 0).is_empty());
        let errors: Vec<_> = session.errors.iter().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 0);
        assert_eq!(errors[0].1.column.as_deref(), Some("Value"));
    }

    #[test]
    fn failed_row_maps_through_skipped_empty_rows() {
        let mut grid = grid();
        let batch = single_batch(&grid);
        let mut session = UploadSession::new(true);
        let response = BatchResponse {
            failed_rows: vec![FailedRow {
                row: 2,
                col: -1,
                label: String::new(),
                message: "unknown type".into(),
            }],
            ..Default::default()
        };

        merge_response(&mut grid, &mut session, &batch, response);

        // Second cleaned row is grid row 2 (row 1 is empty).
        for col in 0..3 {
            assert!(grid.tags(2, col).has(CellTag::Invalid));
        }
        assert!(grid.tags(1, 0).is_empty());
    }

    #[test]
    fn unresolvable_label_falls_back_to_index() {
        let mut grid = grid();
        let batch = single_batch(&grid);
        let mut session = UploadSession::new(true);
        let response = BatchResponse {
            failed_rows: vec![FailedRow {
                row: 1,
                col: 1,
                label: "Kind".into(),
                message: "bad".into(),
            }],
            ..Default::default()
        };

        merge_response(&mut grid, &mut session, &batch, response);

        assert!(grid.tags(0, 1).has(CellTag::Invalid));
    }

    #[test]
    fn success_and_duplicate_rows_are_tagged_and_listed() {
        let mut grid = grid();
        grid.annotate_cell(0, 1, CellTag::Pending, "edited");
        let batch = single_batch(&grid);
        let mut session = UploadSession::new(false);
        let response = BatchResponse {
            processed: 2,
            messages: vec!["2 rows processed".into()],
            successful_rows: vec![
                SuccessfulRow {
                    row: 1,
                    status: RowStatus::Success,
                    message: Some(r#"Added <a href="/domains/details/evil.com/">evil.com</a>"#.into()),
                },
                SuccessfulRow {
                    row: 2,
                    status: RowStatus::Duplicate,
                    message: Some("Already exists".into()),
                },
            ],
            ..Default::default()
        };

        merge_response(&mut grid, &mut session, &batch, response);

        assert!(grid.tags(0, 0).has(CellTag::Success));
        assert!(!grid.tags(0, 1).has(CellTag::Pending));
        assert_eq!(grid.message(0, 0), Some("Added evil.com"));
        assert!(grid.tags(2, 2).has(CellTag::DuplicateServer));
        assert_eq!(session.successes.len(), 1);
        assert_eq!(session.duplicates.rows(), vec![2]);
        assert_eq!(session.processed, 2);
        assert_eq!(
            session.log,
            vec![
                "Processed 2 row(s) starting at row 1".to_string(),
                "2 rows processed".to_string()
            ]
        );

        let written = write_back_links(&mut grid, &session, "Result");
        assert_eq!(written, 1);
        let col = grid.column_index("Result").unwrap();
        assert_eq!(
            grid.cell(0, col),
            Some(&CellValue::Text("/domains/details/evil.com/".into()))
        );
        assert_eq!(grid.meta(0, col).unwrap().renderer, Some(CellRenderer::Link));
    }

    #[test]
    fn out_of_range_rows_become_batch_errors() {
        let mut grid = grid();
        let batch = single_batch(&grid);
        let mut session = UploadSession::new(true);
        let response = BatchResponse {
            successful_rows: vec![SuccessfulRow {
                row: 9,
                status: RowStatus::Success,
                message: None,
            }],
            ..Default::default()
        };

        merge_response(&mut grid, &mut session, &batch, response);

        assert_eq!(session.batch_errors.len(), 1);
        assert!(session.successes.is_empty());
    }

    #[test]
    fn batch_failure_references_offset() {
        let grid = grid();
        let batch = single_batch(&grid);
        let mut session = UploadSession::new(true);

        record_batch_failure(&mut session, &batch, &AppError::Timeout { offset: 0, secs: 90 });

        assert_eq!(session.batch_errors[0].offset, 0);
        assert_eq!(session.batch_errors[0].rows, 2);
        assert!(session.log[0].starts_with("Batch starting at row 1 failed"));
    }

    #[test]
    fn extract_link_finds_first_href() {
        assert_eq!(
            extract_link(r#"<a href="/a/">a</a> <a href="/b/">b</a>"#),
            Some("/a/".to_string())
        );
        assert_eq!(extract_link("no link here"), None);
        assert_eq!(extract_link(r#"<a href="">x</a>"#), None);
    }
}
