// Run-level error taxonomy
//
// Distinguishes "discovery failed" from "no patterns discovered": backend
// failures are hard stops, never silent skips.

use std::path::PathBuf;
use thiserror::Error;

/// Maximum raw-response bytes carried in a MalformedResponse for diagnosis.
const SNIPPET_MAX: usize = 200;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("discovery backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("malformed backend response: {reason}\nresponse snippet: {snippet}")]
    MalformedResponse { reason: String, snippet: String },

    #[error("another run holds the lock on {}", path.display())]
    LockHeld { path: PathBuf },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunError {
    /// Build a MalformedResponse, truncating the raw response to a short
    /// snippet on a char boundary.
    pub fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        let snippet = if raw.chars().count() > SNIPPET_MAX {
            let truncated: String = raw.chars().take(SNIPPET_MAX).collect();
            format!("{}…", truncated)
        } else {
            raw.to_string()
        };
        RunError::MalformedResponse {
            reason: reason.into(),
            snippet,
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) => 2,
            RunError::LockHeld { .. } => 3,
            RunError::BackendUnavailable(_) | RunError::MalformedResponse { .. } => 4,
            RunError::Publish(_) => 5,
            RunError::Other(_) => 1,
        }
    }
}
