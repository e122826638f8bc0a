//! Batched validation and upload of spreadsheet rows to a bulk-import endpoint.
//!
//! Rows live in a [`grid::Grid`] with per-cell status tags. A pass checks for
//! local duplicates, slices the non-empty rows into fixed-size batches, sends
//! them one at a time and merges each verdict back onto the grid.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod grid;
pub mod logging;
pub mod streaming;
pub mod upload;
pub mod validation;
