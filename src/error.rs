//! Domain-specific error types for c2-hunt.
//!
//! Uses `thiserror` for the typed taxonomy the analysis core reports, and
//! `anyhow` for application-level propagation with context.

use thiserror::Error;

/// Errors raised by the analysis core.
///
/// Statistical edge cases (too few samples, zero variance) are recovered
/// locally by callers. Structural problems with the input tables are hard
/// failures and carry enough detail to locate the offending record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Insufficient data points for analysis (need at least {required}, got {actual})")]
    InsufficientData { required: usize, actual: usize },

    #[error("Malformed input at line {line}: {reason}")]
    MalformedInput { line: usize, reason: String },

    /// A record handed to the core directly, located by 1-based position.
    #[error("Invalid record #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Required column '{column}' is missing")]
    MissingColumn { column: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AnalyzerError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            line,
            reason: reason.into(),
        }
    }

    pub fn invalid_record(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            index,
            reason: reason.into(),
        }
    }
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
