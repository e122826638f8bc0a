//! Per-invocation upload state and its end-of-session controls.

use uuid::Uuid;

use crate::grid::{RowRefs, RowShift};
use crate::validation::DuplicateMatch;

// ─────────────────────────────────────────────────────────────────────────────
// Phase
// ─────────────────────────────────────────────────────────────────────────────

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Resetting formatting, detecting local duplicates, cleaning rows.
    Preparing,
    /// Slicing rows into batches and queueing them.
    Batching,
    /// Issuing queued requests one at a time.
    Draining,
    /// Writing back links and computing controls.
    Finalizing,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Preparing => "preparing",
            Phase::Batching => "batching",
            Phase::Draining => "draining",
            Phase::Finalizing => "finalizing",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entries
// ─────────────────────────────────────────────────────────────────────────────

/// A server rejection of one row (or one cell of it).
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// Column label, `None` when the whole row was rejected.
    pub column: Option<String>,
    pub message: String,
}

/// A batch that produced no per-row verdicts (timeout, transport or server error).
#[derive(Debug, Clone, PartialEq)]
pub struct BatchError {
    /// Offset of the batch's first row within the upload.
    pub offset: usize,
    /// Rows in the batch.
    pub rows: usize,
    pub message: String,
}

/// Which actions the user should be offered once a pass has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionControls {
    /// The commit action may be used.
    pub commit_enabled: bool,
    /// Offer "remove error rows".
    pub offer_remove_errors: bool,
    /// Offer "remove duplicate rows".
    pub offer_remove_duplicates: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// UploadSession
// ─────────────────────────────────────────────────────────────────────────────

/// State of one validate or commit pass.
///
/// Everything keyed by grid row lives in a [`RowRefs`] so that rows removed
/// or inserted after the pass keep the lists pointing at the right rows.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: String,
    pub validate_only: bool,
    /// Cleaned (non-empty) rows in this pass.
    pub total_rows: usize,
    /// Sum of the server's `processed` counts.
    pub processed: usize,
    /// Batches not yet issued.
    pub outstanding: usize,
    /// Accepted rows and their server message.
    pub successes: RowRefs<String>,
    /// Rows the server already holds.
    pub duplicates: RowRefs<String>,
    pub errors: RowRefs<RowError>,
    pub batch_errors: Vec<BatchError>,
    /// Links to stored objects, written into the link column at the end.
    pub links: RowRefs<String>,
    pub local_duplicates: Vec<DuplicateMatch>,
    /// Running summary, one line per event.
    pub log: Vec<String>,
    pub controls: SessionControls,
}

impl UploadSession {
    pub fn new(validate_only: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            validate_only,
            total_rows: 0,
            processed: 0,
            outstanding: 0,
            successes: RowRefs::new(),
            duplicates: RowRefs::new(),
            errors: RowRefs::new(),
            batch_errors: Vec::new(),
            links: RowRefs::new(),
            local_duplicates: Vec::new(),
            log: Vec::new(),
            controls: SessionControls::default(),
        }
    }

    /// Short id for log lines.
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || !self.batch_errors.is_empty()
    }

    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty() || !self.local_duplicates.is_empty()
    }

    /// Derives the end-of-pass controls from the accumulated results.
    pub fn compute_controls(&self) -> SessionControls {
        let has_errors = self.has_errors();
        SessionControls {
            commit_enabled: self.validate_only && !has_errors && self.total_rows > 0,
            offer_remove_errors: has_errors,
            offer_remove_duplicates: self.has_duplicates(),
        }
    }

    /// Renumbers every row-keyed list after a structural grid change.
    pub fn apply_shift(&mut self, shift: &RowShift) {
        self.successes.apply(shift);
        self.duplicates.apply(shift);
        self.errors.apply(shift);
        self.links.apply(shift);

        self.local_duplicates.retain_mut(|m| {
            let Some(row) = shift.remap(m.row) else {
                return false;
            };
            m.row = row;
            m.others = m.others.iter().filter_map(|o| shift.remap(*o)).collect();
            !m.others.is_empty()
        });
    }

    /// One-line outcome appended when the pass finishes.
    pub fn completion_line(&self) -> String {
        let verb = if self.validate_only {
            "Validation"
        } else {
            "Upload"
        };
        format!(
            "{} complete: {} of {} row(s) processed, {} error(s), {} failed batch(es), {} duplicate(s)",
            verb,
            self.processed,
            self.total_rows,
            self.errors.len(),
            self.batch_errors.len(),
            self.duplicates.len() + self.local_duplicates.len()
        )
    }
}
