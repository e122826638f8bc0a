//! Upload orchestration: one validate or commit pass over the grid.
//!
//! A pass walks `Preparing → Batching → Draining → Finalizing` and returns to
//! `Idle`. Batches are drained strictly one at a time: the next request is
//! only taken from the queue after the previous response has been merged.
//! Batch-level failures become session entries; the pass itself never fails.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::AppError;
use crate::grid::{CellTag, CellValue, CleanedRow, Grid, RowShift};
use crate::upload::batch::{partition, Batch, BatchSize};
use crate::upload::merge::{merge_response, record_batch_failure, write_back_links};
use crate::upload::queue::RequestQueue;
use crate::upload::session::{Phase, SessionControls, UploadSession};
use crate::upload::transport::BatchTransport;
use crate::upload::wire::{BatchForm, BatchResponse};
use crate::validation::{annotate_duplicates, duplicate_message, find_duplicates, DuplicateMatch};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Per-request deadline unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Column receiving links to stored objects unless configured otherwise.
pub const DEFAULT_LINK_COLUMN: &str = "Result";

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Progress notification emitted during a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    PhaseChanged {
        session_id: String,
        phase: Phase,
    },
    BatchDispatched {
        session_id: String,
        offset: usize,
        rows: usize,
        /// Batches still queued after this one.
        remaining: usize,
    },
    BatchCompleted {
        session_id: String,
        offset: usize,
        processed: usize,
    },
    BatchFailed {
        session_id: String,
        offset: usize,
        message: String,
    },
    Finished {
        session_id: String,
        controls: SessionControls,
        summary: String,
    },
}

/// Receiver for [`UploadEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &UploadEvent);
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Which pass to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Server checks rows without persisting them.
    Validate,
    /// Server persists accepted rows.
    Commit,
}

impl UploadMode {
    pub fn is_validate_only(self) -> bool {
        matches!(self, UploadMode::Validate)
    }
}

/// Rows targeted by [`UploadOrchestrator::remove_rows_by_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveKind {
    /// Rows with a cell the server rejected.
    Errors,
    /// Rows the server already holds.
    ServerDuplicates,
    /// Every row of a local duplicate group except the first.
    LocalDuplicates,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub batch_size: BatchSize,
    pub request_timeout: Duration,
    /// Columns forming the local duplicate key. Empty disables the check.
    pub key_columns: Vec<String>,
    pub link_column: String,
    /// Fields merged into every cleaned row, overriding grid values.
    pub extra_fields: CleanedRow,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            batch_size: BatchSize::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            key_columns: Vec::new(),
            link_column: DEFAULT_LINK_COLUMN.to_string(),
            extra_fields: CleanedRow::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// UploadOrchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct UploadOrchestrator<T: BatchTransport> {
    grid: Grid,
    transport: T,
    settings: OrchestratorSettings,
    sink: Option<Arc<dyn EventSink>>,
    phase: Phase,
    /// Most recent pass, kept so row edits can renumber its lists.
    session: Option<UploadSession>,
}

impl<T: BatchTransport> UploadOrchestrator<T> {
    pub fn new(grid: Grid, transport: T, settings: OrchestratorSettings) -> Self {
        Self {
            grid,
            transport,
            settings,
            sink: None,
            phase: Phase::Idle,
            session: None,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn into_grid(self) -> Grid {
        self.grid
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The last completed pass, if any.
    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    // ── Grid edits ───────────────────────────────────────────────────────────

    /// Edits one cell. The cell is marked modified, and pending if it was invalid.
    pub fn edit_cell(&mut self, row: usize, col: usize, value: CellValue) {
        self.grid.set_cell(row, col, value);
    }

    /// Inserts blank rows and renumbers the last session's row lists.
    pub fn insert_rows(&mut self, index: usize, amount: usize) {
        let shift = self.grid.insert_rows(index, amount);
        self.apply_shift(&shift);
    }

    /// Removes rows and renumbers the last session's row lists.
    pub fn remove_rows(&mut self, index: usize, amount: usize) {
        let shift = self.grid.remove_rows(index, amount);
        self.apply_shift(&shift);
    }

    /// Re-runs local duplicate detection and refreshes the advisory tags.
    pub fn check_duplicates(&mut self) -> Vec<DuplicateMatch> {
        for row in self.grid.rows_with_tag(CellTag::DuplicateLocal) {
            self.grid.clear_row_tag(row, CellTag::DuplicateLocal);
        }
        let matches = find_duplicates(&self.grid, &self.settings.key_columns);
        annotate_duplicates(&mut self.grid, &matches, &self.settings.key_columns);
        matches
    }

    /// Removes rows by outcome. Returns the number of rows removed.
    pub fn remove_rows_by_status(&mut self, kind: RemoveKind) -> usize {
        let before = self.grid.row_count();
        let shifts = match kind {
            RemoveKind::Errors => self.grid.remove_rows_with_tag(CellTag::Invalid),
            RemoveKind::ServerDuplicates => {
                self.grid.remove_rows_with_tag(CellTag::DuplicateServer)
            }
            RemoveKind::LocalDuplicates => self.remove_local_duplicates(),
        };
        for shift in &shifts {
            self.apply_shift(shift);
        }

        if let Some(session) = self.session.as_mut() {
            session.controls = session.compute_controls();
        }
        let removed = before - self.grid.row_count();
        info!("[UPLOAD] Removed {} row(s) ({:?})", removed, kind);
        removed
    }

    /// Keeps the first row of each duplicate group, removing the rest bottom-up.
    fn remove_local_duplicates(&mut self) -> Vec<RowShift> {
        let matches = self.check_duplicates();
        let mut doomed: Vec<usize> = matches
            .iter()
            .filter(|m| m.others.iter().any(|other| *other < m.row))
            .map(|m| m.row)
            .collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        doomed.dedup();

        let shifts = doomed
            .into_iter()
            .map(|row| self.grid.remove_rows(row, 1))
            .collect();

        // Survivors no longer share a key with anything.
        for row in self.grid.rows_with_tag(CellTag::DuplicateLocal) {
            self.grid.clear_row_tag(row, CellTag::DuplicateLocal);
        }
        shifts
    }

    fn apply_shift(&mut self, shift: &RowShift) {
        if let Some(session) = self.session.as_mut() {
            session.apply_shift(shift);
        }
    }

    // ── Passes ───────────────────────────────────────────────────────────────

    /// Runs a validate-only pass.
    pub async fn validate(&mut self) -> &UploadSession {
        self.run(UploadMode::Validate).await
    }

    /// Runs a commit pass.
    pub async fn commit(&mut self) -> &UploadSession {
        self.run(UploadMode::Commit).await
    }

    /// Runs one pass over the current grid.
    pub async fn run(&mut self, mode: UploadMode) -> &UploadSession {
        let validate_only = mode.is_validate_only();
        let mut session = UploadSession::new(validate_only);
        info!(
            "[UPLOAD] Session {} starting (validate_only={})",
            session.short_id(),
            validate_only
        );

        // Preparing
        self.enter_phase(Phase::Preparing, &session);
        self.grid.reset_formatting();
        let matches = find_duplicates(&self.grid, &self.settings.key_columns);
        annotate_duplicates(&mut self.grid, &matches, &self.settings.key_columns);
        session.log.extend(matches.iter().map(duplicate_message));
        session.local_duplicates = matches;
        let cleaned = self.grid.cleaned_rows(&self.settings.extra_fields);
        session.total_rows = cleaned.len();

        // Batching
        self.enter_phase(Phase::Batching, &session);
        let mut queue = RequestQueue::new();
        for batch in partition(&cleaned, self.settings.batch_size) {
            queue.enqueue(batch);
        }
        session.outstanding = queue.len();
        info!(
            "[UPLOAD] {} row(s) in {} batch(es) of up to {}",
            session.total_rows,
            queue.len(),
            self.settings.batch_size
        );

        // Draining
        self.enter_phase(Phase::Draining, &session);
        while let Some(batch) = queue.next() {
            session.outstanding = queue.len();
            self.emit(UploadEvent::BatchDispatched {
                session_id: session.id.clone(),
                offset: batch.offset,
                rows: batch.len(),
                remaining: queue.len(),
            });

            match self.dispatch(&batch, validate_only).await {
                Ok(response) => {
                    let processed = response.processed;
                    merge_response(&mut self.grid, &mut session, &batch, response);
                    self.emit(UploadEvent::BatchCompleted {
                        session_id: session.id.clone(),
                        offset: batch.offset,
                        processed,
                    });
                }
                Err(error) => {
                    warn!(
                        "[UPLOAD] Batch at offset {} failed: {}",
                        batch.offset, error
                    );
                    record_batch_failure(&mut session, &batch, &error);
                    self.emit(UploadEvent::BatchFailed {
                        session_id: session.id.clone(),
                        offset: batch.offset,
                        message: error.to_presentation().message,
                    });
                    if matches!(error, AppError::Unauthorized) {
                        let dropped = queue.stop();
                        if dropped > 0 {
                            session
                                .log
                                .push(format!("{} batch(es) not sent", dropped));
                        }
                    }
                }
            }
        }
        session.outstanding = 0;

        // Finalizing
        self.enter_phase(Phase::Finalizing, &session);
        write_back_links(&mut self.grid, &session, &self.settings.link_column);
        for alert in self.grid.take_alerts() {
            session.log.push(format!("Row {}: {}", alert.row + 1, alert.message));
        }
        session.controls = session.compute_controls();
        let summary = session.completion_line();
        session.log.push(summary.clone());
        info!("[UPLOAD] Session {}: {}", session.short_id(), summary);
        self.emit(UploadEvent::Finished {
            session_id: session.id.clone(),
            controls: session.controls,
            summary,
        });

        self.enter_phase(Phase::Idle, &session);
        self.session.insert(session)
    }

    /// Submits one batch under the request deadline.
    async fn dispatch(&self, batch: &Batch, validate_only: bool) -> Result<BatchResponse, AppError> {
        let form = BatchForm::from_batch(batch, validate_only)?;
        let deadline = self.settings.request_timeout;
        match tokio::time::timeout(deadline, self.transport.submit(&form)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout {
                offset: batch.offset,
                secs: deadline.as_secs(),
            }),
        }
    }

    fn enter_phase(&mut self, phase: Phase, session: &UploadSession) {
        self.phase = phase;
        self.emit(UploadEvent::PhaseChanged {
            session_id: session.id.clone(),
            phase,
        });
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(&event);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
