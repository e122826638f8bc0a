//! Spreadsheet grid model.
//!
//! Row data, a sparse per-cell status side-table, and the row renumbering
//! that keeps outside references valid across insertions and removals.

pub mod cell;
pub mod row_refs;
pub mod table;

pub use cell::{CellMeta, CellRenderer, CellTag, CellTags, CellValue};
pub use row_refs::{RowRefs, RowShift};
pub use table::{strip_markup, CleanedRow, CleanedRows, Grid, GridAlert};
