//! `kcap` configuration file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use kubecap_meta::{validate_cluster_name, ResourceKind};
use kubecap_sync::{ClusterSyncConfig, MalformedPolicy, NamespaceFilter, NamespaceScope};
use serde::{Deserialize, Serialize};

fn default_include_kinds() -> Vec<String> {
    ResourceKind::DEFAULT_INCLUDE
        .iter()
        .map(|k| k.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_parallelism() -> usize {
    kubecap_sync::engine::DEFAULT_PARALLELISM
}

/// One cluster to snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name, also its directory under the storage base
    pub name: String,
    /// Kinds synchronized by default
    #[serde(default = "default_include_kinds")]
    pub include_kinds: Vec<String>,
    /// Excluded namespaces; entries with `*`, `?` or `[` are patterns
    #[serde(default)]
    pub exclude_namespaces: Vec<String>,
    /// Also exclude the global `system_namespaces`
    #[serde(default = "default_true")]
    pub ignore_system_namespaces: bool,
    /// Restrict namespaced kinds to these namespaces
    #[serde(default)]
    pub namespaces: Option<Vec<String>>,
    /// Concurrent kind fetches
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Directory of `kubectl get <kind> -o json` dumps
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
    /// Handling of objects without a readable identity
    #[serde(default)]
    pub malformed: MalformedPolicy,
}

impl ClusterConfig {
    /// Minimal entry with defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            include_kinds: default_include_kinds(),
            exclude_namespaces: Vec::new(),
            ignore_system_namespaces: true,
            namespaces: None,
            parallelism: default_parallelism(),
            source_dir: None,
            malformed: MalformedPolicy::default(),
        }
    }

    /// Parsed `include_kinds`.
    pub fn kinds(&self) -> anyhow::Result<Vec<ResourceKind>> {
        parse_kinds(&self.include_kinds)
    }

    /// Exclusion filter, merged with `system` when enabled.
    pub fn namespace_filter(&self, system: &[String]) -> NamespaceFilter {
        let mut filter = NamespaceFilter::new(&self.exclude_namespaces);
        if self.ignore_system_namespaces {
            filter.extend(system);
        }
        filter
    }

    /// Orchestrator settings for this cluster.
    pub fn sync_config(&self, system: &[String]) -> anyhow::Result<ClusterSyncConfig> {
        Ok(ClusterSyncConfig {
            cluster: self.name.clone(),
            include_kinds: self.kinds()?,
            namespace_filter: self.namespace_filter(system),
            scope: match &self.namespaces {
                Some(list) => NamespaceScope::Only(list.clone()),
                None => NamespaceScope::All,
            },
            parallelism: self.parallelism,
            malformed: self.malformed,
        })
    }
}

/// Parses kind names, case-insensitively.
pub fn parse_kinds<S: AsRef<str>>(names: &[S]) -> anyhow::Result<Vec<ResourceKind>> {
    names
        .iter()
        .map(|n| n.as_ref().parse::<ResourceKind>().map_err(anyhow::Error::from))
        .collect()
}

/// On-disk layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root holding one directory per cluster
    #[serde(default = "StorageConfig::default_base_dir")]
    pub base_dir: PathBuf,
    /// Write normalized manifests after each successful kind sync
    #[serde(default = "default_true")]
    pub write_manifest_files: bool,
}

impl StorageConfig {
    fn default_base_dir() -> PathBuf {
        PathBuf::from("clusters")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: Self::default_base_dir(),
            write_manifest_files: true,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable
    Plain,
}

/// Logging settings; `RUST_LOG` overrides `level`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Per-cluster directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPaths {
    /// `<base_dir>/<cluster>`
    pub base_dir: PathBuf,
    /// Snapshot store directory
    pub db_dir: PathBuf,
    /// Exported manifests
    pub manifests_dir: PathBuf,
    /// Generated reports
    pub reports_dir: PathBuf,
}

/// Whole configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Clusters, at least one
    pub clusters: Vec<ClusterConfig>,
    /// Namespaces excluded from clusters with `ignore_system_namespaces`
    #[serde(default)]
    pub system_namespaces: Vec<String>,
    /// Storage layout
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads a `.toml` or `.json` file and validates it.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: AppConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks cluster names, kinds and parallelism.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.clusters.is_empty() {
            bail!("no clusters defined in configuration");
        }
        let mut seen = BTreeSet::new();
        for cluster in &self.clusters {
            validate_cluster_name(&cluster.name)?;
            if !seen.insert(cluster.name.as_str()) {
                bail!("cluster '{}' is defined more than once", cluster.name);
            }
            let kinds = cluster
                .kinds()
                .with_context(|| format!("cluster '{}'", cluster.name))?;
            if kinds.is_empty() {
                bail!("cluster '{}' includes no kinds", cluster.name);
            }
            if cluster.parallelism == 0 {
                bail!("cluster '{}': parallelism must be greater than 0", cluster.name);
            }
        }
        Ok(())
    }

    /// Looks up a cluster by name.
    pub fn cluster(&self, name: &str) -> anyhow::Result<&ClusterConfig> {
        match self.clusters.iter().find(|c| c.name == name) {
            Some(c) => Ok(c),
            None => bail!("cluster '{}' not found in config", name),
        }
    }

    /// Resolves `--cluster` / `--all-clusters` to configured entries.
    pub fn select(&self, names: &[String], all: bool) -> anyhow::Result<Vec<&ClusterConfig>> {
        if all {
            return Ok(self.clusters.iter().collect());
        }
        if names.is_empty() {
            bail!("specify at least one --cluster or use --all-clusters");
        }
        names.iter().map(|n| self.cluster(n)).collect()
    }

    /// Directories of `cluster`.
    pub fn paths(&self, cluster: &str) -> ClusterPaths {
        let base_dir = self.storage.base_dir.join(cluster);
        ClusterPaths {
            db_dir: base_dir.join("db"),
            manifests_dir: base_dir.join("manifests"),
            reports_dir: base_dir.join("reports"),
            base_dir,
        }
    }
}
