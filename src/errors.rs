//! Typed failure taxonomy for the resolution pipeline.
//!
//! Every controlled failure carries a stable machine-readable code so callers
//! (HTTP layer, CLI) can map outcomes without string matching. Lower-level
//! errors are wrapped here and never leak raw to the caller.

use thiserror::Error;

/// Controlled pipeline failures.
#[derive(Debug, Error)]
pub enum MetaError {
    /// No DOI-shaped text anywhere in the scanned pages, or every candidate
    /// was exhausted without a resolution.
    #[error("DOI not found: {0}")]
    DoiNotFound(String),

    /// Authoritative "no such DOI" answer from Crossref (HTTP 404).
    #[error("Crossref could not find DOI {0}")]
    CrossrefNotFound(String),

    /// Rate limit still in effect after the retry budget was spent.
    #[error("Crossref rate limit reached: {0}")]
    CrossrefRateLimit(String),

    /// Persistent 5xx from Crossref after the retry budget was spent.
    #[error("Crossref server error: {0}")]
    CrossrefServerError(String),

    /// Transport failure, unexpected status, or undecodable body.
    #[error("Crossref request failed: {0}")]
    CrossrefRequestFailed(String),

    /// The document could not be opened or decoded as a PDF.
    #[error("failed to parse PDF: {0}")]
    PdfParseFailed(String),

    /// Caller-supplied input rejected before any mutation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// An id-addressed operation named a record that does not exist.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// File I/O or serialization failure in the record store.
    #[error("storage error: {0}")]
    Storage(String),

    /// Anything uncategorized, so the caller-facing contract never leaks a
    /// raw lower-level error type.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl MetaError {
    /// Stable code string for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            MetaError::DoiNotFound(_) => "DOI_NOT_FOUND",
            MetaError::CrossrefNotFound(_) => "CROSSREF_NOT_FOUND",
            MetaError::CrossrefRateLimit(_) => "CROSSREF_RATE_LIMIT",
            MetaError::CrossrefServerError(_) => "CROSSREF_SERVER_ERROR",
            MetaError::CrossrefRequestFailed(_) => "CROSSREF_REQUEST_FAILED",
            MetaError::PdfParseFailed(_) => "PDF_PARSE_FAILED",
            MetaError::Validation(_) => "VALIDATION_ERROR",
            MetaError::RecordNotFound(_) => "RECORD_NOT_FOUND",
            MetaError::Storage(_) => "STORAGE_ERROR",
            MetaError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }
}

impl From<std::io::Error> for MetaError {
    fn from(err: std::io::Error) -> Self {
        MetaError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for MetaError {
    fn from(err: serde_json::Error) -> Self {
        MetaError::Storage(err.to_string())
    }
}

impl From<csv::Error> for MetaError {
    fn from(err: csv::Error) -> Self {
        MetaError::Storage(err.to_string())
    }
}
