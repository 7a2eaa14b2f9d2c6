#![warn(missing_docs)]

//! kubecap synchronization subsystem: fetches manifests through a
//! [`ClusterConnector`], normalizes them and replaces the stored snapshot one
//! kind at a time.

pub mod connector;
pub mod engine;
pub mod error;
pub mod filter;
pub mod normalize;

pub use connector::{ClusterConnector, NamespaceScope, StaticConnector};
pub use engine::{ClusterSyncConfig, MalformedPolicy, SyncOrchestrator, SyncReport, SyncResult};
pub use error::{ConnectorError, NormalizationError, SyncError};
pub use filter::NamespaceFilter;
pub use normalize::{fingerprint, normalize, normalize_manifest, NormalizedObject};
