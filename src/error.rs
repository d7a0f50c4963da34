//! Error types for the fetch, normalize and export stages

use thiserror::Error;

/// Failure of one of the upstream sources
#[derive(Error, Debug)]
pub enum SourceError {
    /// Transport failure or non-success HTTP status
    #[error("{source_name} unavailable: {message}")]
    Unavailable {
        source_name: &'static str,
        message: String,
    },

    /// Payload arrived but does not match the expected schema
    #[error("{source_name} returned malformed data: {message}")]
    Malformed {
        source_name: &'static str,
        message: String,
    },
}

impl SourceError {
    pub fn unavailable(source_name: &'static str, err: impl ToString) -> Self {
        Self::Unavailable {
            source_name,
            message: err.to_string(),
        }
    }

    pub fn malformed(source_name: &'static str, err: impl ToString) -> Self {
        Self::Malformed {
            source_name,
            message: err.to_string(),
        }
    }

    pub fn source_name(&self) -> &'static str {
        match self {
            Self::Unavailable { source_name, .. } | Self::Malformed { source_name, .. } => {
                source_name
            }
        }
    }
}

/// A single declaration that could not be normalized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("disaster {disaster_number}: invalid declaration date {value:?}")]
    InvalidDate { disaster_number: u64, value: String },
}

/// CSV export/import failure
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer flush failed: {0}")]
    Io(#[from] std::io::Error),
}
