//! Error types for Scoutr
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Scoutr
#[derive(Debug, Error)]
pub enum ScoutrError {
    /// Non-2xx response from an external platform, body already truncated
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection, TLS or decoding failure inside reqwest
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration is missing or invalid
    #[error("Config error: {0}")]
    Config(String),

    /// Scoring or drafting service returned something outside its contract
    #[error("Contract violation: {0}")]
    Contract(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScoutrError {
    /// HTTP status carried by this error, if it came from a platform response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ScoutrError::Http { status, .. } => Some(*status),
            ScoutrError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for Scoutr operations
pub type Result<T> = std::result::Result<T, ScoutrError>;

/// Truncate `text` to at most `max` characters, on a char boundary.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = ScoutrError::Http {
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 429: slow down");
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn test_storage_error() {
        let err = ScoutrError::Storage("database is locked".to_string());
        assert_eq!(err.to_string(), "Storage error: database is locked");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_contract_error() {
        let err = ScoutrError::Contract("tier must be A, B or C".to_string());
        assert_eq!(err.to_string(), "Contract violation: tier must be A, B or C");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ScoutrError = io_err.into();
        assert!(matches!(err, ScoutrError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ScoutrError = json_err.into();
        assert!(matches!(err, ScoutrError::Json(_)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("", 5), "");
    }
}
