//! HTTP transport for batch submission with credential handling and safe logging.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::error::AppError;
use crate::upload::wire::{BatchForm, BatchResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all requests.
const CLIENT_USER_AGENT: &str = concat!("bulk-importer/", env!("CARGO_PKG_VERSION"));

/// Time allowed to establish a connection. The per-batch deadline is applied
/// by the orchestrator.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Longest slice of an error body kept in `AppError::Server`.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Query keys masked in logged URLs, compared case-insensitively.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "api_key",
    "apikey",
    "token",
    "csrfmiddlewaretoken",
    "sessionid",
    "authorization",
];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// How much of the endpoint URL goes into `[HTTP]` log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingMode {
    /// `/indicators/bulkadd/`
    #[default]
    PathOnly,
    /// `/indicators/bulkadd/?username=analyst&api_key=***`
    PathAndQueryRedacted,
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiCredentials
// ─────────────────────────────────────────────────────────────────────────────

/// API credentials sent as `username` / `api_key` query parameters.
#[derive(Clone)]
pub struct ApiCredentials {
    pub username: String,
    pub api_key: SecretString,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("username", &self.username)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// URL Sanitization
// ─────────────────────────────────────────────────────────────────────────────

fn is_sensitive_param(key: &str) -> bool {
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|name| key.eq_ignore_ascii_case(name))
}

/// Endpoint as it appears in logs: the path, followed by the query when
/// `mode` allows it with credential values masked. Scheme, host and fragment
/// are never included.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();
    let has_query = url.query().is_some_and(|q| !q.is_empty());
    if mode == LoggingMode::PathOnly || !has_query {
        return path.to_string();
    }

    let query = url
        .query_pairs()
        .map(|(key, value)| {
            let shown: &str = if is_sensitive_param(&key) {
                "***"
            } else {
                &value
            };
            format!("{}={}", key, shown)
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, query)
}

// ─────────────────────────────────────────────────────────────────────────────
// BatchTransport
// ─────────────────────────────────────────────────────────────────────────────

/// Submits one batch and returns the server's verdicts.
///
/// The orchestrator is written against this trait so tests can provide a
/// scripted transport instead of a live server.
pub trait BatchTransport: Send + Sync {
    fn submit<'a>(
        &'a self,
        form: &'a BatchForm,
    ) -> Pin<Box<dyn Future<Output = Result<BatchResponse, AppError>> + Send + 'a>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpTransport
// ─────────────────────────────────────────────────────────────────────────────

/// Form-POST transport to the bulk endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Option<ApiCredentials>,
    logging_mode: LoggingMode,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns `AppError::InvalidEndpoint` for non-HTTP endpoints and
    /// `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(endpoint: Url, credentials: Option<ApiCredentials>) -> Result<Self, AppError> {
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(AppError::InvalidEndpoint(format!(
                "unsupported scheme {:?}",
                endpoint.scheme()
            )));
        }
        Ok(Self {
            http: build_http_client()?,
            endpoint,
            credentials,
            logging_mode: LoggingMode::default(),
        })
    }

    /// Updates the logging mode for URL sanitization.
    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    /// Endpoint URL with credentials appended as query parameters.
    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(creds) = &self.credentials {
            url.query_pairs_mut()
                .append_pair("username", &creds.username)
                .append_pair("api_key", creds.api_key.expose_secret());
        }
        url
    }

    /// Posts one batch. Never logs the body or credentials.
    async fn post_batch(&self, form: &BatchForm) -> Result<BatchResponse, AppError> {
        let url = self.request_url();
        let sanitized_url = sanitize_url_for_logs(&url, self.logging_mode);
        let start = Instant::now();

        let result = self.http.post(url).form(form).send().await;
        let duration_ms = start.elapsed().as_millis();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                info!(
                    "[HTTP] POST {} offset={} FAILED {}ms",
                    sanitized_url, form.offset, duration_ms
                );
                // The raw error may carry the full URL including the API key.
                let reason = if e.is_connect() {
                    "could not reach the server"
                } else {
                    "request failed"
                };
                return Err(AppError::ConnectionFailed(reason.to_string()));
            }
        };

        let status = response.status();
        info!(
            "[HTTP] POST {} offset={} {} {}ms",
            sanitized_url,
            form.offset,
            status.as_u16(),
            duration_ms
        );

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::Unauthorized);
        }

        let body = response
            .bytes()
            .await
            .map_err(|_| AppError::ConnectionFailed("response body was cut off".to_string()))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let message: String = text.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!("[HTTP] Batch at offset {} rejected with {}", form.offset, status);
            return Err(AppError::Server {
                status: status.as_u16(),
                message,
            });
        }

        BatchResponse::from_slice(&body)
    }
}

impl BatchTransport for HttpTransport {
    fn submit<'a>(
        &'a self,
        form: &'a BatchForm,
    ) -> Pin<Box<dyn Future<Output = Result<BatchResponse, AppError>> + Send + 'a>> {
        Box::pin(self.post_batch(form))
    }
}

/// Builds the configured HTTP client.
fn build_http_client() -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
