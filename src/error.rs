//! Error types for the txt-campaign library.
//!
//! This module provides custom error types using `thiserror` so callers can tell
//! validation problems, missing records and storage failures apart. Skipped CSV
//! rows are not errors; they are reported as data by the ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting contacts or running campaigns.
#[derive(Error, Debug)]
pub enum CampaignError {
    /// Invalid input: missing campaign fields, bad row range, bad cross references
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown campaign, batch, contact or message
    #[error("Not found: {0}")]
    NotFound(String),

    /// A batch cannot be deleted while campaigns still target it
    #[error(
        "Cannot delete batch {batch_id}: {} campaign(s) are using this batch: {}",
        campaigns.len(),
        campaigns.join(", ")
    )]
    BatchInUse {
        /// The batch that was asked to be deleted
        batch_id: String,
        /// Names of the campaigns that reference it
        campaigns: Vec<String>,
    },

    /// Message delivery failed
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// CSV parsing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

impl CampaignError {
    /// Shorthand for a [`CampaignError::Validation`] error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a [`CampaignError::NotFound`] error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Short label used for error metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::BatchInUse { .. } => "batch_in_use",
            Self::Delivery(_) => "delivery",
            Self::Database(_) | Self::Pool(_) => "database",
            Self::Csv(_) => "csv",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }
}

/// Failures of the external "deliver text to an address" operation.
///
/// These are recorded against the individual message and never abort the
/// remaining deliveries.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The delivery command could not be started
    #[error("Failed to start delivery command: {0}")]
    Spawn(#[from] std::io::Error),

    /// The delivery script ran and reported a failure
    #[error("Delivery script failed ({status}): {stderr}")]
    ScriptFailed {
        /// Exit status of the script
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// The delivery command did not finish in time
    #[error("Delivery timed out after {0} seconds")]
    Timeout(u64),
}

/// Convenience type alias for Result with [`CampaignError`]
pub type Result<T> = std::result::Result<T, CampaignError>;

impl From<anyhow::Error> for CampaignError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
