//! Error types for lessonforge.
//!
//! Library crates use [`LessonForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all lessonforge operations.
#[derive(Debug, thiserror::Error)]
pub enum LessonForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A catalog, batch or document line could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (schema mismatch, invalid input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Two topic records derive the same output filename.
    #[error("filename collision on {filename}: '{first}' and '{second}'")]
    Collision {
        filename: String,
        first: String,
        second: String,
    },

    /// The content renderer refused a record.
    #[error("render error: {0}")]
    Render(String),

    /// Network/HTTP error while talking to the viewer.
    #[error("network error: {0}")]
    Network(String),

    /// A bounded wait expired.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A spawned worker panicked or was cancelled.
    #[error("worker failed: {0}")]
    Join(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LessonForgeError>;

impl LessonForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
