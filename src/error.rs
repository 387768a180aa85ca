use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of error body characters surfaced to callers.
pub const MAX_ERROR_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("request error: {0}")]
    Serialization(String),
    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A backend response that does not have the shape the client relies on.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json in {context}: {reason}")]
    InvalidJson {
        context: &'static str,
        reason: String,
    },
    #[error("empty field `{field}` in {context}")]
    EmptyField {
        context: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage file {path} is not a json object: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout("Request timed out. Please try again.".to_string())
        } else if err.is_builder() {
            Self::Config(format!("Failed to build request: {err}"))
        } else {
            Self::Network(format!("Unable to reach the server: {err}"))
        }
    }
}

impl Error {
    /// True for failures where the server was never reached.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// Sanitizes an error body for user-facing messages by trimming and truncating.
#[must_use]
pub fn sanitize_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(MAX_ERROR_CHARS).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_message_trims_and_truncates() {
        assert_eq!(sanitize_message("   "), None);
        assert_eq!(sanitize_message(" bad password "), Some("bad password".to_string()));

        let long = "x".repeat(MAX_ERROR_CHARS + 50);
        assert_eq!(
            sanitize_message(&long).map(|m| m.chars().count()),
            Some(MAX_ERROR_CHARS)
        );
    }

    #[test]
    fn transport_classification() {
        assert!(Error::Network("down".into()).is_transport());
        assert!(Error::Timeout("slow".into()).is_transport());
        assert!(!Error::Http {
            status: 401,
            message: "nope".into()
        }
        .is_transport());
    }
}
