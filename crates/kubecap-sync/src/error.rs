//! Error types for the synchronization subsystem.

use kubecap_meta::{MetaError, ResourceKind};
use thiserror::Error;

/// Failure to list objects from a cluster source. Fails only the affected kind.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The source rejected or failed the list call.
    #[error("listing {kind} failed: {message}")]
    Fetch {
        /// Kind being listed
        kind: ResourceKind,
        /// Source-provided detail
        message: String,
    },

    /// The list call did not complete in time.
    #[error("listing {0} timed out")]
    Timeout(ResourceKind),

    /// The source returned something that is not a list of objects.
    #[error("invalid payload for {kind}: {message}")]
    InvalidPayload {
        /// Kind being listed
        kind: ResourceKind,
        /// Parser detail
        message: String,
    },

    /// I/O error reading a local source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An object whose identity fields cannot be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    /// The object is not a JSON map.
    #[error("object is not a map")]
    NotAnObject,

    /// `metadata.name` is missing, empty or not a string.
    #[error("metadata.name is missing")]
    MissingName,

    /// `metadata.namespace` is present but not a string.
    #[error("metadata.namespace of '{0}' is not a string")]
    InvalidNamespace(String),

    /// Name or namespace is `.`, `..` or contains a path separator.
    #[error("identity '{0}' is not a valid path component")]
    InvalidIdentity(String),
}

/// Errors surfaced by a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The run was misconfigured and aborted before any fetch.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Snapshot store failure.
    #[error("store error: {0}")]
    Store(#[from] MetaError),

    /// Connector failure.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Malformed object under the strict policy.
    #[error("malformed object: {0}")]
    Normalization(#[from] NormalizationError),

    /// The run was cancelled before the kind committed.
    #[error("sync cancelled")]
    Cancelled,
}

/// Result alias for the synchronization subsystem.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
