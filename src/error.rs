use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "api_key",
    "apikey",
    "csrfmiddlewaretoken",
    "sessionid",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for the terminal.
#[derive(Debug, Clone)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Configuration ─────────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    // ── File / CSV ────────────────────────────────────────────────────────────
    #[error("File is not valid UTF-8")]
    NotUtf8,

    #[error("Invalid CSV: {0}")]
    CsvInvalid(String),

    #[error("Report error: {0}")]
    ReportFailed(String),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Batch at offset {offset} timed out after {secs}s")]
    Timeout { offset: usize, secs: u64 },

    #[error("Not authorized")]
    Unauthorized,

    // ── Server ────────────────────────────────────────────────────────────────
    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    // ── Grid ──────────────────────────────────────────────────────────────────
    #[error("Malformed payload in row {row}: {message}")]
    MalformedPayload { row: usize, message: String },

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Converts the error into a presentation suitable for display.
    /// Never leaks API keys, session cookies or CSRF tokens.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Configuration ─────────────────────────────────────────────────
            AppError::Config(msg) => ErrorPresentation {
                title: "Configuration Error".into(),
                message: sanitize_message(msg, "The configuration could not be loaded."),
                action: Some("Check the config file and BULK_* environment variables".into()),
            },

            AppError::InvalidEndpoint(_) => ErrorPresentation {
                title: "Invalid Endpoint".into(),
                message: "The upload endpoint is not a valid URL.".into(),
                action: Some("Set a full http(s) endpoint URL".into()),
            },

            // ── File / CSV ────────────────────────────────────────────────────
            AppError::NotUtf8 => ErrorPresentation {
                title: "Invalid File Encoding".into(),
                message: "The file must be UTF-8 encoded. Please re-save your file with UTF-8 encoding.".into(),
                action: Some("Convert file to UTF-8".into()),
            },

            AppError::CsvInvalid(msg) => ErrorPresentation {
                title: "Invalid CSV".into(),
                message: format!("The CSV file has a formatting problem: {}", msg),
                action: Some("Fix the CSV file and try again".into()),
            },

            AppError::ReportFailed(msg) => ErrorPresentation {
                title: "Report Not Written".into(),
                message: format!("The result report could not be written: {}", msg),
                action: Some("Check the report path and permissions".into()),
            },

            // ── Network ───────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not connect to the server. Please check your network connection.".into(),
                action: Some("Check network and retry".into()),
            },

            AppError::Timeout { offset, secs } => ErrorPresentation {
                title: "Request Timed Out".into(),
                message: format!(
                    "The batch starting at row {} did not complete within {} seconds.",
                    offset + 1,
                    secs
                ),
                action: Some("Retry the affected rows".into()),
            },

            AppError::Unauthorized => ErrorPresentation {
                title: "Not Authorized".into(),
                message: "The server rejected the supplied credentials.".into(),
                action: Some("Check the username and API key".into()),
            },

            // ── Server ────────────────────────────────────────────────────────
            AppError::Server { status, message } => ErrorPresentation {
                title: "Server Error".into(),
                message: format!(
                    "The server returned status {}: {}",
                    status,
                    sanitize_message(message, "no details available")
                ),
                action: None,
            },

            AppError::InvalidResponse(_) => ErrorPresentation {
                title: "Unexpected Response".into(),
                message: "The server response could not be understood.".into(),
                action: Some("Check that the endpoint is a bulk upload endpoint".into()),
            },

            // ── Grid ──────────────────────────────────────────────────────────
            AppError::MalformedPayload { row, .. } => ErrorPresentation {
                title: "Corrupt Row Data".into(),
                message: format!("Stored data for row {} could not be read.", row + 1),
                action: Some("Re-enter the row".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        match e.kind() {
            csv::ErrorKind::Utf8 { .. } => AppError::NotUtf8,
            _ => AppError::CsvInvalid(e.to_string()),
        }
    }
}
