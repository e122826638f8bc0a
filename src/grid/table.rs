//! The grid: row data plus a sparse side-table of per-cell status.
//!
//! The grid is the only owner of cell metadata. Anything rendering it is a
//! projection of `rows` + `meta`; nothing is stored on the rendering side.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::grid::cell::{CellMeta, CellRenderer, CellTag, CellTags, CellValue};
use crate::grid::row_refs::RowShift;

/// A non-empty row keyed by header name, in column order.
pub type CleanedRow = serde_json::Map<String, serde_json::Value>;

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

/// Strips HTML tags from a header label and trims the result.
pub fn strip_markup(label: &str) -> String {
    MARKUP.replace_all(label, "").trim().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Output of [`Grid::cleaned_rows`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedRows {
    /// Cleaned rows in grid order.
    pub rows: Vec<CleanedRow>,
    /// Grid row index each cleaned row came from (parallel to `rows`).
    pub source_rows: Vec<usize>,
}

impl CleanedRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A problem the user must acknowledge, raised by direct grid interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAlert {
    pub row: usize,
    pub col: usize,
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Grid
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Grid {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    meta: HashMap<(usize, usize), CellMeta>,
    alerts: Vec<GridAlert>,
}

impl Grid {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            ..Default::default()
        }
    }

    /// Builds a grid from rows; short rows are padded, long rows truncated.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Null);
                row
            })
            .collect();
        Self {
            headers,
            rows,
            ..Default::default()
        }
    }

    // ── Shape / access ───────────────────────────────────────────────────────

    /// Raw header labels, markup included.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Header label of a column with markup stripped.
    pub fn header_label(&self, col: usize) -> Option<String> {
        self.headers.get(col).map(|h| strip_markup(h))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn row(&self, row: usize) -> Option<&[CellValue]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// True when every cell in the row is blank (or the row does not exist).
    pub fn is_row_empty(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .map_or(true, |cells| cells.iter().all(CellValue::is_blank))
    }

    /// Resolves a column by header text.
    ///
    /// An exact (markup-stripped) match wins; otherwise the first header
    /// containing `needle` is returned. `None` means not found.
    pub fn column_index(&self, needle: &str) -> Option<usize> {
        let labels: Vec<String> = self.headers.iter().map(|h| strip_markup(h)).collect();
        labels
            .iter()
            .position(|l| l == needle)
            .or_else(|| labels.iter().position(|l| l.contains(needle)))
    }

    /// Returns the index of the column named `header`, appending it if absent.
    pub fn ensure_column(&mut self, header: &str) -> usize {
        if let Some(col) = self
            .headers
            .iter()
            .position(|h| strip_markup(h) == header)
        {
            return col;
        }
        self.headers.push(header.to_string());
        for row in &mut self.rows {
            row.push(CellValue::Null);
        }
        debug!("[GRID] Appended column {:?}", header);
        self.headers.len() - 1
    }

    // ── Editing ──────────────────────────────────────────────────────────────

    /// Applies a user edit.
    ///
    /// Editing past the last row creates the missing rows. The cell is tagged
    /// `Modified`; a server rejection on it becomes `Pending` and loses its
    /// rejection message.
    pub fn set_cell(&mut self, row: usize, col: usize, value: CellValue) {
        if col >= self.column_count() {
            warn!("[GRID] Ignoring edit outside the grid at column {}", col);
            return;
        }
        if row >= self.rows.len() {
            let Some(len) = row.checked_add(1) else {
                warn!("[GRID] Ignoring edit outside the grid at row {}", row);
                return;
            };
            let width = self.column_count();
            self.rows.resize_with(len, || vec![CellValue::Null; width]);
        }
        self.rows[row][col] = value;

        let meta = self.meta.entry((row, col)).or_default();
        meta.tags.add(CellTag::Modified);
        if meta.tags.has(CellTag::Invalid) {
            meta.tags.discard(CellTag::Invalid);
            meta.tags.add(CellTag::Pending);
            meta.message = None;
        }
    }

    /// Writes a value without marking the cell as a user edit.
    pub(crate) fn write_value(&mut self, row: usize, col: usize, value: CellValue) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }

    // ── Cleaning ─────────────────────────────────────────────────────────────

    /// Returns every non-empty row as a header-keyed map, in grid order.
    ///
    /// Blank cells are omitted. `extra_fields` are merged into every row and
    /// take precedence over grid values with the same name.
    pub fn cleaned_rows(&self, extra_fields: &CleanedRow) -> CleanedRows {
        let labels: Vec<String> = self.headers.iter().map(|h| strip_markup(h)).collect();
        let mut cleaned = CleanedRows::default();

        for (index, cells) in self.rows.iter().enumerate() {
            if cells.iter().all(CellValue::is_blank) {
                continue;
            }
            let mut row = CleanedRow::new();
            for (label, value) in labels.iter().zip(cells) {
                if !value.is_blank() {
                    row.insert(label.clone(), value.to_json());
                }
            }
            for (key, value) in extra_fields {
                row.insert(key.clone(), value.clone());
            }
            cleaned.rows.push(row);
            cleaned.source_rows.push(index);
        }

        cleaned
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn meta(&self, row: usize, col: usize) -> Option<&CellMeta> {
        self.meta.get(&(row, col))
    }

    pub fn tags(&self, row: usize, col: usize) -> CellTags {
        self.meta(row, col).map(|m| m.tags).unwrap_or_default()
    }

    pub fn message(&self, row: usize, col: usize) -> Option<&str> {
        self.meta(row, col).and_then(|m| m.message.as_deref())
    }

    /// Sets a tag and tooltip on a cell. Idempotent.
    ///
    /// An empty `message` keeps whatever tooltip is already there.
    pub fn annotate_cell(&mut self, row: usize, col: usize, tag: CellTag, message: &str) {
        if row >= self.row_count() || col >= self.column_count() {
            return;
        }
        let meta = self.meta.entry((row, col)).or_default();
        meta.tags.add(tag);
        if !message.is_empty() {
            meta.message = Some(message.to_string());
        }
    }

    /// Sets a tag and tooltip on every cell of a row.
    pub fn annotate_row(&mut self, row: usize, tag: CellTag, message: &str) {
        for col in 0..self.column_count() {
            self.annotate_cell(row, col, tag, message);
        }
    }

    /// Removes one tag from a cell. The tooltip goes with the last tag.
    pub fn clear_tag(&mut self, row: usize, col: usize, tag: CellTag) {
        let Some(meta) = self.meta.get_mut(&(row, col)) else {
            return;
        };
        meta.tags.discard(tag);
        if meta.tags.is_empty() {
            meta.message = None;
        }
        if meta.is_vacant() {
            self.meta.remove(&(row, col));
        }
    }

    pub fn clear_row_tag(&mut self, row: usize, tag: CellTag) {
        for col in 0..self.column_count() {
            self.clear_tag(row, col, tag);
        }
    }

    pub fn set_renderer(&mut self, row: usize, col: usize, renderer: CellRenderer) {
        self.meta.entry((row, col)).or_default().renderer = Some(renderer);
    }

    /// Clears every tag and tooltip. Renderer overrides are kept.
    pub fn reset_formatting(&mut self) {
        for meta in self.meta.values_mut() {
            meta.tags = CellTags::empty();
            meta.message = None;
        }
        self.meta.retain(|_, meta| !meta.is_vacant());
    }

    /// Rows where any cell carries `tag`, ascending.
    pub fn rows_with_tag(&self, tag: CellTag) -> Vec<usize> {
        let mut rows: Vec<usize> = self
            .meta
            .iter()
            .filter(|(_, meta)| meta.tags.has(tag))
            .map(|((row, _), _)| *row)
            .collect();
        rows.sort_unstable();
        rows.dedup();
        rows
    }

    // ── Structure ────────────────────────────────────────────────────────────

    /// Inserts `amount` blank rows before `index` (clamped to the row count).
    pub fn insert_rows(&mut self, index: usize, amount: usize) -> RowShift {
        let index = index.min(self.rows.len());
        let width = self.column_count();
        self.rows.splice(
            index..index,
            std::iter::repeat_with(|| vec![CellValue::Null; width]).take(amount),
        );
        let shift = RowShift::Inserted { index, amount };
        self.rekey(&shift);
        shift
    }

    /// Removes rows `[index, index + amount)`, clamped to the grid.
    pub fn remove_rows(&mut self, index: usize, amount: usize) -> RowShift {
        let index = index.min(self.rows.len());
        let amount = amount.min(self.rows.len() - index);
        self.rows.drain(index..index + amount);
        let shift = RowShift::Removed { index, amount };
        self.rekey(&shift);
        shift
    }

    /// Removes every row carrying `tag`, bottom-up.
    ///
    /// The returned shifts are in application order; applying them in turn
    /// to a [`RowRefs`](crate::grid::RowRefs) keeps it consistent.
    pub fn remove_rows_with_tag(&mut self, tag: CellTag) -> Vec<RowShift> {
        let rows = self.rows_with_tag(tag);
        let mut shifts = Vec::new();

        // Coalesce contiguous runs, walking from the bottom.
        let mut iter = rows.iter().rev().peekable();
        while let Some(&end) = iter.next() {
            let mut start = end;
            while let Some(&&prev) = iter.peek() {
                if prev + 1 == start {
                    start = prev;
                    iter.next();
                } else {
                    break;
                }
            }
            shifts.push(self.remove_rows(start, end - start + 1));
        }

        if !shifts.is_empty() {
            debug!(
                "[GRID] Removed {} {} row(s)",
                rows.len(),
                tag.as_str()
            );
        }
        shifts
    }

    fn rekey(&mut self, shift: &RowShift) {
        let meta = std::mem::take(&mut self.meta);
        self.meta = meta
            .into_iter()
            .filter_map(|((row, col), m)| shift.remap(row).map(|r| ((r, col), m)))
            .collect();
        self.alerts.retain_mut(|alert| match shift.remap(alert.row) {
            Some(row) => {
                alert.row = row;
                true
            }
            None => false,
        });
    }

    // ── Stored payloads ──────────────────────────────────────────────────────

    /// Hydrates a JSON object-array payload stored in a cell.
    ///
    /// A blank cell yields an empty list. A corrupt payload raises a
    /// [`GridAlert`] and yields `None`; it does not abort anything else.
    pub fn parse_object_array(&mut self, row: usize, col: usize) -> Option<Vec<CleanedRow>> {
        let value = self.cell(row, col)?;
        if value.is_blank() {
            return Some(Vec::new());
        }
        let parsed = match value {
            CellValue::Text(raw) => serde_json::from_str::<Vec<CleanedRow>>(raw)
                .map_err(|e| AppError::MalformedPayload {
                    row,
                    message: e.to_string(),
                }),
            other => Err(AppError::MalformedPayload {
                row,
                message: format!("expected a JSON array, found {:?}", other),
            }),
        };

        match parsed {
            Ok(objects) => Some(objects),
            Err(e) => {
                warn!("[GRID] {}", e);
                self.alerts.push(GridAlert {
                    row,
                    col,
                    message: e.to_presentation().message,
                });
                None
            }
        }
    }

    /// Drains alerts raised since the last call.
    pub fn take_alerts(&mut self) -> Vec<GridAlert> {
        std::mem::take(&mut self.alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::RowRefs;

    fn text(s: &str) -> CellValue {
        CellValue::from(s)
    }

    fn sample() -> Grid {
        Grid::from_rows(
            vec![
                "<span class=\"req\">Indicator</span>".into(),
                "Type".into(),
                "Value".into(),
            ],
            vec![
                vec![text("evil.com"), text("Domain"), CellValue::Null],
                vec![CellValue::Null, text(""), CellValue::Null],
                vec![text("1.2.3.4"), text("IPv4"), CellValue::Number(7.0)],
            ],
        )
    }

    #[test]
    fn cleaned_rows_skip_empty_rows_and_keep_order() {
        let grid = sample();

        let cleaned = grid.cleaned_rows(&CleanedRow::new());

        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.source_rows, vec![0, 2]);
        assert_eq!(cleaned.rows[0]["Indicator"], "evil.com");
        assert!(!cleaned.rows[0].contains_key("Value"));
        assert_eq!(cleaned.rows[1]["Value"], 7);
    }

    #[test]
    fn cleaned_rows_merge_extra_fields() {
        let grid = sample();
        let mut extra = CleanedRow::new();
        extra.insert("campaign_id".into(), serde_json::json!("c-1"));

        let cleaned = grid.cleaned_rows(&extra);

        assert!(cleaned.rows.iter().all(|r| r["campaign_id"] == "c-1"));
        let keys: Vec<_> = cleaned.rows[1].keys().cloned().collect();
        assert_eq!(keys, vec!["Indicator", "Type", "Value", "campaign_id"]);
    }

    #[test]
    fn column_index_strips_markup_and_distinguishes_not_found() {
        let grid = sample();
        assert_eq!(grid.column_index("Indicator"), Some(0));
        assert_eq!(grid.column_index("Val"), Some(2));
        assert_eq!(grid.column_index("Missing"), None);
    }

    #[test]
    fn column_index_prefers_exact_match() {
        let grid = Grid::new(vec!["Value Type".into(), "Value".into()]);
        assert_eq!(grid.column_index("Value"), Some(1));
    }

    #[test]
    fn ensure_column_appends_once() {
        let mut grid = sample();
        let col = grid.ensure_column("Result");
        assert_eq!(col, 3);
        assert_eq!(grid.ensure_column("Result"), 3);
        assert_eq!(grid.row(0).unwrap().len(), 4);
    }

    #[test]
    fn annotate_does_not_clobber_other_tags() {
        let mut grid = sample();
        grid.annotate_cell(0, 0, CellTag::DuplicateLocal, "dup");
        grid.annotate_cell(0, 0, CellTag::Invalid, "bad");
        grid.annotate_cell(0, 0, CellTag::Invalid, "bad");

        let tags = grid.tags(0, 0);
        assert!(tags.has(CellTag::DuplicateLocal));
        assert!(tags.has(CellTag::Invalid));
        assert_eq!(grid.message(0, 0), Some("bad"));

        grid.clear_tag(0, 0, CellTag::Invalid);
        assert!(grid.tags(0, 0).has(CellTag::DuplicateLocal));
        grid.clear_tag(0, 0, CellTag::DuplicateLocal);
        assert!(grid.meta(0, 0).is_none());
    }

    #[test]
    fn editing_an_invalid_cell_makes_it_pending() {
        let mut grid = sample();
        grid.annotate_cell(2, 1, CellTag::Invalid, "unknown type");

        grid.set_cell(2, 1, text("IPv6"));

        let tags = grid.tags(2, 1);
        assert!(tags.has(CellTag::Pending));
        assert!(tags.has(CellTag::Modified));
        assert!(!tags.has(CellTag::Invalid));
        assert_eq!(grid.message(2, 1), None);
    }

    #[test]
    fn editing_past_the_end_creates_rows() {
        let mut grid = sample();
        grid.set_cell(5, 0, text("new"));
        assert_eq!(grid.row_count(), 6);
        assert!(grid.is_row_empty(4));
        assert!(!grid.is_row_empty(5));
    }

    #[test]
    fn edit_at_largest_row_index_is_ignored() {
        let mut grid = sample();
        let rows = grid.row_count();

        grid.set_cell(usize::MAX, 0, text("new"));

        assert_eq!(grid.row_count(), rows);
        assert!(grid.meta(usize::MAX, 0).is_none());
    }

    #[test]
    fn reset_formatting_keeps_renderers() {
        let mut grid = sample();
        grid.annotate_row(0, CellTag::Success, "ok");
        grid.set_renderer(0, 2, CellRenderer::Link);

        grid.reset_formatting();

        assert!(grid.tags(0, 0).is_empty());
        assert_eq!(grid.message(0, 0), None);
        assert_eq!(grid.meta(0, 2).unwrap().renderer, Some(CellRenderer::Link));
    }

    #[test]
    fn structural_changes_rekey_metadata() {
        let mut grid = sample();
        grid.annotate_cell(2, 0, CellTag::Invalid, "bad");

        let shift = grid.insert_rows(1, 2);
        assert_eq!(shift, RowShift::Inserted { index: 1, amount: 2 });
        assert!(grid.tags(4, 0).has(CellTag::Invalid));

        grid.remove_rows(0, 2);
        assert!(grid.tags(2, 0).has(CellTag::Invalid));
        assert_eq!(grid.row_count(), 3);
    }

    #[test]
    fn remove_rows_with_tag_keeps_refs_consistent() {
        let mut grid = Grid::from_rows(
            vec!["id".into()],
            (0..6).map(|i| vec![CellValue::Number(i as f64)]).collect(),
        );
        for row in [1, 2, 4] {
            grid.annotate_cell(row, 0, CellTag::Invalid, "bad");
        }
        let mut refs = RowRefs::new();
        refs.push(3, "keep-3");
        refs.push(5, "keep-5");
        refs.push(2, "drop-2");

        for shift in grid.remove_rows_with_tag(CellTag::Invalid) {
            refs.apply(&shift);
        }

        assert_eq!(grid.row_count(), 3);
        assert_eq!(grid.cell(1, 0), Some(&CellValue::Number(3.0)));
        assert_eq!(refs.rows(), vec![1, 2]);
        assert!(grid.rows_with_tag(CellTag::Invalid).is_empty());
    }

    #[test]
    fn corrupt_payload_raises_alert_instead_of_error() {
        let mut grid = Grid::from_rows(
            vec!["objects".into()],
            vec![
                vec![text(r#"[{"type":"Email"}]"#)],
                vec![text("[{\"type\":")],
            ],
        );

        let ok = grid.parse_object_array(0, 0).expect("valid payload");
        assert_eq!(ok[0]["type"], "Email");
        assert!(grid.take_alerts().is_empty());

        assert!(grid.parse_object_array(1, 0).is_none());
        let alerts = grid.take_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].row, 1);
        assert!(grid.take_alerts().is_empty());
    }
}
