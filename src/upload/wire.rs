//! Wire types for the bulk validation/commit endpoint.
//!
//! Request: form fields `data` (JSON array of row objects), `offset` and
//! `isValidateOnly`. Response: per-row verdicts keyed by batch-relative,
//! 1-based row numbers.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::upload::batch::Batch;

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// Form body posted for one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchForm {
    /// JSON-serialized array of row objects.
    pub data: String,
    /// 0-based position of the batch's first row in the full upload.
    pub offset: usize,
    /// When true the server validates without persisting.
    #[serde(rename = "isValidateOnly")]
    pub is_validate_only: bool,
}

impl BatchForm {
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the rows cannot be serialized.
    pub fn from_batch(batch: &Batch, validate_only: bool) -> Result<Self, AppError> {
        let data = serde_json::to_string(&batch.rows)
            .map_err(|e| AppError::Internal(format!("Failed to serialize batch rows: {}", e)))?;
        Ok(Self {
            data,
            offset: batch.offset,
            is_validate_only: validate_only,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// Per-row status code (`s`) in `successfulRows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RowStatus {
    /// Not expected in `successfulRows`.
    Failure,
    Success,
    Duplicate,
}

impl TryFrom<u8> for RowStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(RowStatus::Failure),
            1 => Ok(RowStatus::Success),
            2 => Ok(RowStatus::Duplicate),
            other => Err(format!("unknown row status code {}", other)),
        }
    }
}

impl From<RowStatus> for u8 {
    fn from(status: RowStatus) -> Self {
        match status {
            RowStatus::Failure => 0,
            RowStatus::Success => 1,
            RowStatus::Duplicate => 2,
        }
    }
}

/// A row rejected by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FailedRow {
    /// 1-based, batch-relative row number.
    pub row: i64,
    /// Column index, or negative when the whole row is rejected.
    #[serde(default = "whole_row")]
    pub col: i64,
    /// Header label of the offending column.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub message: String,
}

fn whole_row() -> i64 {
    -1
}

impl FailedRow {
    pub fn is_whole_row(&self) -> bool {
        self.col < 0
    }
}

/// A row accepted (or recognized as existing) by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SuccessfulRow {
    /// 1-based, batch-relative row number.
    pub row: i64,
    #[serde(rename = "s")]
    pub status: RowStatus,
    /// Optional HTML message, may contain a link to the stored object.
    #[serde(default)]
    pub message: Option<String>,
}

/// Server response for one batch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    #[serde(default)]
    pub processed: usize,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub failed_rows: Vec<FailedRow>,
    #[serde(default)]
    pub successful_rows: Vec<SuccessfulRow>,
    #[serde(default)]
    pub html: Option<String>,
}

impl BatchResponse {
    /// # Errors
    ///
    /// Returns `AppError::InvalidResponse` when the body does not decode.
    pub fn from_slice(body: &[u8]) -> Result<Self, AppError> {
        serde_json::from_slice(body).map_err(|e| AppError::InvalidResponse(e.to_string()))
    }
}
