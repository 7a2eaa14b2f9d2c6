//! Error types for capacity and rules evaluation.

use kubecap_meta::MetaError;
use thiserror::Error;

/// Errors produced while building capacity or configuration reports.
#[derive(Debug, Error)]
pub enum CapacityError {
    /// Reading the snapshot store failed.
    #[error("store error: {0}")]
    Store(#[from] MetaError),

    /// A rule id did not match any registered rule.
    #[error("unknown rule: {0}")]
    UnknownRule(String),
}

/// Result alias for the capacity subsystem.
pub type CapacityResult<T> = Result<T, CapacityError>;
