//! File I/O for grids.
//!
//! Record-aware CSV loading that keeps quoted commas and newlines intact, and
//! atomic report writing with automatic cleanup on failure.

mod csv_loader;
mod report;

pub use csv_loader::load_csv;
pub use report::{row_status, write_report, AtomicCsvWriter};
