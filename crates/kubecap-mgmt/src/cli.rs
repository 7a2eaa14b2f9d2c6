//! `kcap` command line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use kubecap_capacity::{node_rows, RuleSet};
use kubecap_meta::{KvStore, PersistentKvStore, ResourceKind, SnapshotStore};
use kubecap_sync::{ClusterConnector, SyncOrchestrator};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{parse_kinds, AppConfig, ClusterConfig};
use crate::dump_connector::DirectoryConnector;
use crate::export::ManifestExporter;
use crate::output::{render_report, OutputFormat, ReportType};

/// Top-level arguments.
#[derive(Parser)]
#[command(name = "kcap")]
#[command(about = "Kubernetes workload snapshot and capacity reporting", long_about = None)]
pub struct Cli {
    /// Configuration file (`.toml` or `.json`)
    #[arg(short, long, global = true, env = "KCAP_CONFIG", default_value = "config/kcap.toml")]
    pub config: PathBuf,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Which configured clusters a command applies to.
#[derive(Args, Clone, Debug, Default)]
pub struct ClusterSelection {
    /// Cluster name; repeat for several
    #[arg(long = "cluster")]
    pub clusters: Vec<String>,

    /// Every configured cluster
    #[arg(long)]
    pub all_clusters: bool,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Create the storage layout of the selected clusters
    Init {
        #[command(flatten)]
        target: ClusterSelection,
    },
    /// Print stored object counts
    Status {
        #[command(flatten)]
        target: ClusterSelection,
    },
    /// Synchronize the snapshot from each cluster's source
    Sync {
        #[command(flatten)]
        target: ClusterSelection,
        /// Only these kinds; other stored kinds are left alone
        #[arg(long = "kind")]
        kinds: Vec<String>,
    },
    /// Render a report
    Report {
        #[command(flatten)]
        target: ClusterSelection,
        /// Report type
        #[arg(long = "type", value_enum, default_value_t = ReportType::Summary)]
        report_type: ReportType,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Output file, `-` for stdout (single cluster only)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Rule ids to skip when grading configuration
        #[arg(long = "disable-rule")]
        disabled_rules: Vec<String>,
    },
    /// List supported resource kinds
    Kinds,
    /// Print the stored node table
    Nodes {
        #[command(flatten)]
        target: ClusterSelection,
    },
    /// Delete stored kinds no longer in `include_kinds`
    Prune {
        #[command(flatten)]
        target: ClusterSelection,
    },
}

impl Cli {
    /// True for commands that need the configuration file.
    pub fn needs_config(&self) -> bool {
        !matches!(self.command, Command::Kinds)
    }

    /// Runs the parsed command.
    pub async fn run(self, config: Option<AppConfig>) -> Result<()> {
        if let Command::Kinds = self.command {
            print_kinds();
            return Ok(());
        }
        let config = match config {
            Some(c) => c,
            None => AppConfig::from_file(&self.config)?,
        };
        match self.command {
            Command::Init { ref target } => init(&config, target),
            Command::Status { ref target } => status(&config, target),
            Command::Sync { ref target, ref kinds } => sync(&config, target, kinds).await,
            Command::Report {
                ref target,
                report_type,
                format,
                ref out,
                ref disabled_rules,
            } => report(&config, target, report_type, format, out.as_deref(), disabled_rules),
            Command::Nodes { ref target } => nodes(&config, target),
            Command::Prune { ref target } => prune(&config, target),
            Command::Kinds => Ok(()),
        }
    }
}

/// Opens the snapshot store of `cluster`, which must have been initialized
/// unless `create` is set.
pub fn open_store(config: &AppConfig, cluster: &str, create: bool) -> Result<Arc<SnapshotStore>> {
    let paths = config.paths(cluster);
    if !create && !paths.db_dir.exists() {
        bail!("cluster '{}' not initialized; run `kcap init --cluster {}` first", cluster, cluster);
    }
    let kv: Arc<dyn KvStore> = Arc::new(
        PersistentKvStore::open(&paths.db_dir)
            .with_context(|| format!("opening store at {}", paths.db_dir.display()))?,
    );
    Ok(Arc::new(SnapshotStore::new(kv, cluster)?))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Single object for one cluster, a map keyed by cluster otherwise.
fn collapse(mut out: BTreeMap<String, serde_json::Value>) -> serde_json::Value {
    if out.len() == 1 {
        if let Some((_, v)) = out.pop_first() {
            return v;
        }
    }
    json!(out)
}

fn init(config: &AppConfig, target: &ClusterSelection) -> Result<()> {
    for cluster in config.select(&target.clusters, target.all_clusters)? {
        let paths = config.paths(&cluster.name);
        std::fs::create_dir_all(&paths.manifests_dir)?;
        std::fs::create_dir_all(&paths.reports_dir)?;
        open_store(config, &cluster.name, true)?;
        info!(cluster = %cluster.name, db = %paths.db_dir.display(), "initialized storage");
        println!("Initialized storage for {} at {}", cluster.name, paths.db_dir.display());
    }
    Ok(())
}

fn status(config: &AppConfig, target: &ClusterSelection) -> Result<()> {
    let mut out = BTreeMap::new();
    for cluster in config.select(&target.clusters, target.all_clusters)? {
        let value = match open_store(config, &cluster.name, false) {
            Ok(store) => serde_json::to_value(store.summary()?)?,
            Err(_) => json!({"error": "not initialized"}),
        };
        out.insert(cluster.name.clone(), value);
    }
    print_json(&collapse(out))
}

fn connector_for(cluster: &ClusterConfig) -> Result<Arc<dyn ClusterConnector>> {
    match &cluster.source_dir {
        Some(dir) => Ok(Arc::new(DirectoryConnector::new(dir))),
        None => bail!("cluster '{}' has no source_dir configured", cluster.name),
    }
}

async fn sync(config: &AppConfig, target: &ClusterSelection, kinds: &[String]) -> Result<()> {
    let selected = config.select(&target.clusters, target.all_clusters)?;
    let override_kinds = if kinds.is_empty() {
        None
    } else {
        Some(parse_kinds(kinds)?)
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling sync");
            on_signal.cancel();
        }
    });

    let mut out = BTreeMap::new();
    for cluster in selected {
        let store = open_store(config, &cluster.name, false)?;
        let orchestrator = SyncOrchestrator::new(
            connector_for(cluster)?,
            Arc::clone(&store),
            cluster.sync_config(&config.system_namespaces)?,
        );
        let report = orchestrator
            .sync_with_cancel(override_kinds.as_deref(), cancel.clone())
            .await?;

        let exporter = ManifestExporter::new(
            config.paths(&cluster.name).manifests_dir,
            config.storage.write_manifest_files,
        );
        for kind in report.succeeded_kinds() {
            let records = store.list(kind)?;
            if let Err(e) = exporter.export_kind(kind, &records) {
                warn!(cluster = %cluster.name, %kind, error = %e, "manifest export failed");
            }
        }

        let failed = report.failed_kinds();
        if !failed.is_empty() {
            warn!(cluster = %cluster.name, failed = ?failed, "some kinds failed to sync");
        }
        out.insert(
            cluster.name.clone(),
            json!({
                "summary": store.summary()?,
                "mutations": report.total_mutations(),
                "results": report.results,
            }),
        );
    }
    print_json(&collapse(out))
}

fn report(
    config: &AppConfig,
    target: &ClusterSelection,
    report_type: ReportType,
    format: OutputFormat,
    out: Option<&Path>,
    disabled_rules: &[String],
) -> Result<()> {
    let selected = config.select(&target.clusters, target.all_clusters)?;
    if out.is_some() && selected.len() > 1 {
        bail!("--out can only be used with a single cluster");
    }
    let mut rules = RuleSet::official();
    for id in disabled_rules {
        rules.disable(id)?;
    }

    for cluster in selected {
        let store = open_store(config, &cluster.name, false)?;
        let body = render_report(&store, report_type, format, &rules)?;
        match out {
            Some(path) if path == Path::new("-") => println!("{}", body),
            Some(path) => {
                std::fs::write(path, &body)?;
                println!("Wrote {} report to {}", report_type, path.display());
            }
            None => {
                let dir = config.paths(&cluster.name).reports_dir;
                std::fs::create_dir_all(&dir)?;
                let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
                let path = dir.join(format!("{}-{}.{}", report_type, stamp, format.extension()));
                std::fs::write(&path, &body)?;
                println!("Wrote {} report to {}", report_type, path.display());
            }
        }
    }
    Ok(())
}

fn print_kinds() {
    println!(
        "{:<18} {:<24} {:<20} {:<11} {:<8}",
        "KIND", "API VERSION", "PLURAL", "NAMESPACED", "DEFAULT"
    );
    println!("{}", "-".repeat(85));
    for kind in ResourceKind::ALL {
        println!(
            "{:<18} {:<24} {:<20} {:<11} {:<8}",
            kind.as_str(),
            kind.api_version(),
            kind.plural(),
            kind.is_namespaced(),
            ResourceKind::DEFAULT_INCLUDE.contains(&kind)
        );
    }
}

fn nodes(config: &AppConfig, target: &ClusterSelection) -> Result<()> {
    for cluster in config.select(&target.clusters, target.all_clusters)? {
        let store = open_store(config, &cluster.name, false)?;
        let rows = node_rows(&store.nodes()?);
        println!("Cluster: {}", cluster.name);
        println!(
            "{:<30} {:<16} {:<14} {:>10} {:>12}",
            "NAME", "ROLES", "ZONE", "CPU (m)", "MEMORY (Mi)"
        );
        println!("{}", "-".repeat(86));
        for row in rows {
            println!(
                "{:<30} {:<16} {:<14} {:>10} {:>12}",
                row.name, row.roles, row.zone, row.allocatable.cpu_milli, row.allocatable.memory_mib
            );
        }
    }
    Ok(())
}

fn prune(config: &AppConfig, target: &ClusterSelection) -> Result<()> {
    let mut out = BTreeMap::new();
    for cluster in config.select(&target.clusters, target.all_clusters)? {
        let store = open_store(config, &cluster.name, false)?;
        let configured = cluster.kinds()?;
        let obsolete: Vec<ResourceKind> = store
            .stored_kinds()?
            .into_iter()
            .filter(|k| !configured.contains(k))
            .collect();
        let removed = store.purge_kinds(&obsolete)?;
        info!(cluster = %cluster.name, kinds = ?obsolete, removed, "pruned kinds");
        out.insert(
            cluster.name.clone(),
            json!({"pruned_kinds": obsolete, "removed": removed}),
        );
    }
    print_json(&collapse(out))
}
