#![warn(missing_docs)]

//! kubecap management surface: the `kcap` command line, its configuration
//! file, a connector over `kubectl` JSON dumps, manifest export and report
//! rendering.

pub mod cli;
pub mod config;
pub mod dump_connector;
pub mod export;
pub mod output;

pub use config::{AppConfig, ClusterConfig, ClusterPaths, LogFormat, LoggingConfig, StorageConfig};
pub use dump_connector::DirectoryConnector;
pub use export::ManifestExporter;
pub use output::{render_report, OutputFormat, ReportType};
