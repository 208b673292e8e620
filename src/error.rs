//! Unified error handling for the route sync pipeline.
//!
//! Only run-level failures are represented here. Per-activity problems
//! (download failures, undecodable tracks) are reported as
//! [`SkipReason`](crate::transcode::SkipReason) and never abort a run.

use thiserror::Error;

/// Unified error type for routesync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No usable credentials, or the remote service rejected them
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// HTTP/API error
    #[error("HTTP error{}: {message}", status_suffix(.status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Remote listing failed; the run cannot continue
    #[error("Listing activities failed at offset {offset}: {source}")]
    Listing {
        offset: usize,
        #[source]
        source: Box<SyncError>,
    },

    /// Raw track download failed for one activity
    #[error("Download of activity {activity_id} failed: {message}")]
    Download { activity_id: String, message: String },

    /// Track encoding or archive container could not be decoded
    #[error("Track decode failed: {message}")]
    Decode { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SyncError {
    pub fn auth(message: impl Into<String>) -> Self {
        SyncError::Auth {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        SyncError::Decode {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config {
            message: message.into(),
        }
    }

    /// True if this error (or the error it wraps) is an authentication failure.
    pub fn is_auth(&self) -> bool {
        match self {
            SyncError::Auth { .. } => true,
            SyncError::Http {
                status_code: Some(401 | 403),
                ..
            } => true,
            SyncError::Listing { source, .. } => source.is_auth(),
            _ => false,
        }
    }
}

fn status_suffix(status_code: &Option<u16>) -> String {
    status_code.map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Result type alias for routesync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
