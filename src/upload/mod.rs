//! Chunked submission of cleaned rows to the bulk endpoint.
//!
//! Rows are partitioned into fixed-size batches, drained through a per-session
//! FIFO queue one request at a time, and each response is merged back into the
//! grid before the next request is issued.

pub mod batch;
pub mod merge;
pub mod orchestrator;
pub mod queue;
pub mod session;
pub mod transport;
pub mod wire;

pub use batch::{partition, Batch, BatchSize, DEFAULT_BATCH_SIZE};
pub use merge::{extract_link, merge_response, record_batch_failure, write_back_links};
pub use orchestrator::{
    EventSink, OrchestratorSettings, RemoveKind, UploadEvent, UploadMode, UploadOrchestrator,
    DEFAULT_LINK_COLUMN, DEFAULT_REQUEST_TIMEOUT,
};
pub use queue::RequestQueue;
pub use session::{BatchError, Phase, RowError, SessionControls, UploadSession};
pub use transport::{sanitize_url_for_logs, ApiCredentials, BatchTransport, HttpTransport, LoggingMode};
pub use wire::{BatchForm, BatchResponse, FailedRow, RowStatus, SuccessfulRow};
