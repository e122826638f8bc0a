//! Partitioning of cleaned rows into fixed-size upload batches.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::grid::{CleanedRow, CleanedRows};

/// Rows per request unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Maximum rows per batch. Always greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct BatchSize(usize);

impl BatchSize {
    /// # Errors
    ///
    /// Returns `AppError::Config` when `rows` is zero.
    pub fn new(rows: usize) -> Result<Self, AppError> {
        if rows == 0 {
            return Err(AppError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(Self(rows))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self(DEFAULT_BATCH_SIZE)
    }
}

impl TryFrom<usize> for BatchSize {
    type Error = AppError;

    fn try_from(rows: usize) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<BatchSize> for usize {
    fn from(size: BatchSize) -> Self {
        size.0
    }
}

impl fmt::Display for BatchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One slice of the cleaned row set, submitted as one request.
///
/// `source_rows` is captured when the batch is built and never adjusted
/// afterwards, so later grid edits cannot move a response onto the wrong row.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Index of the first row within the cleaned row set (0-based).
    pub offset: usize,
    pub rows: Vec<CleanedRow>,
    /// Grid row index of each row in `rows`.
    pub source_rows: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Maps a server row number (1-based, batch-relative) to its position
    /// in the cleaned row set: `offset + row - 1`.
    pub fn absolute_index(&self, row: i64) -> Option<usize> {
        let relative = self.relative_index(row)?;
        Some(self.offset + relative)
    }

    /// Maps a server row number (1-based, batch-relative) to a grid row.
    pub fn grid_row(&self, row: i64) -> Option<usize> {
        let relative = self.relative_index(row)?;
        self.source_rows.get(relative).copied()
    }

    fn relative_index(&self, row: i64) -> Option<usize> {
        let relative = usize::try_from(row.checked_sub(1)?).ok()?;
        (relative < self.rows.len()).then_some(relative)
    }
}

/// Splits cleaned rows into batches of at most `size` rows.
pub fn partition(cleaned: &CleanedRows, size: BatchSize) -> Vec<Batch> {
    cleaned
        .rows
        .chunks(size.get())
        .zip(cleaned.source_rows.chunks(size.get()))
        .enumerate()
        .map(|(i, (rows, source_rows))| Batch {
            offset: i * size.get(),
            rows: rows.to_vec(),
            source_rows: source_rows.to_vec(),
        })
        .collect()
}
