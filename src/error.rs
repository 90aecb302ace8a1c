// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Max characters of a response body carried inside [`IngestError::Remote`].
pub const EXCERPT_CHARS: usize = 500;

/// Everything that can abort an ingestion run. Nothing in the core retries
/// or swallows these; they travel unchanged up to the caller.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Network-level failure (timeout, connection reset, TLS, ...).
    #[error("transport error talking to indicator API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status} from indicator API:\n{excerpt}")]
    Remote { status: u16, excerpt: String },

    /// Response arrived but is not an object with a `value` array of records.
    #[error("unexpected indicator API payload: {0}")]
    Decode(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("warehouse error during {context}: {message}")]
    Warehouse {
        context: &'static str,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn remote(status: u16, body: &str) -> Self {
        IngestError::Remote {
            status,
            excerpt: excerpt(body),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn warehouse(context: &'static str, err: impl std::fmt::Display) -> Self {
        IngestError::Warehouse {
            context,
            message: err.to_string(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, IngestError::Config(_))
    }
}

/// First [`EXCERPT_CHARS`] characters of `body` (char boundary safe).
pub fn excerpt(body: &str) -> String {
    match body.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}
