//! Writes stored manifests to `manifests/<Kind>/<namespace>/<name>.json`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kubecap_meta::{ManifestRecord, ResourceKind};
use tracing::debug;

/// File exporter for one cluster.
#[derive(Debug, Clone)]
pub struct ManifestExporter {
    root: PathBuf,
    enabled: bool,
}

impl ManifestExporter {
    /// Exporter writing under `root`; a disabled exporter writes nothing.
    pub fn new(root: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            root: root.into(),
            enabled,
        }
    }

    /// Export root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a record is written to.
    pub fn path_for(&self, record: &ManifestRecord) -> PathBuf {
        let mut path = self.root.join(record.kind().as_str());
        if record.kind().is_namespaced() {
            path.push(record.namespace());
        }
        path.push(format!("{}.json", record.name()));
        path
    }

    /// Replaces the exported tree of `kind` with `records`. Returns the
    /// number of files written.
    pub fn export_kind(&self, kind: ResourceKind, records: &[ManifestRecord]) -> io::Result<usize> {
        if !self.enabled {
            return Ok(0);
        }
        let kind_dir = self.root.join(kind.as_str());
        if kind_dir.exists() {
            fs::remove_dir_all(&kind_dir)?;
        }
        fs::create_dir_all(&kind_dir)?;

        let mut written = 0;
        for record in records.iter().filter(|r| r.kind() == kind) {
            let path = self.path_for(record);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            // serde_json maps are ordered, so keys come out sorted.
            let body = serde_json::to_vec_pretty(&record.manifest)?;
            fs::write(&path, body)?;
            written += 1;
        }
        debug!(%kind, written, root = %self.root.display(), "exported manifests");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kubecap_meta::ManifestKey;
    use serde_json::json;

    fn record(kind: ResourceKind, ns: &str, name: &str) -> ManifestRecord {
        ManifestRecord {
            cluster: "c".into(),
            key: ManifestKey::new(kind, ns, name),
            api_version: kind.api_version().into(),
            manifest: json!({"metadata": {"name": name}, "kind": kind.as_str()}),
            fingerprint: String::new(),
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn test_layout_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ManifestExporter::new(dir.path(), true);
        let written = exporter
            .export_kind(
                ResourceKind::Deployment,
                &[record(ResourceKind::Deployment, "shop", "web"), record(ResourceKind::Deployment, "shop", "api")],
            )
            .unwrap();
        assert_eq!(written, 2);
        let web = dir.path().join("Deployment/shop/web.json");
        let body = std::fs::read_to_string(&web).unwrap();
        assert!(body.find("\"kind\"").unwrap() < body.find("\"metadata\"").unwrap());

        exporter
            .export_kind(ResourceKind::Deployment, &[record(ResourceKind::Deployment, "shop", "api")])
            .unwrap();
        assert!(!web.exists());
        assert!(dir.path().join("Deployment/shop/api.json").exists());

        exporter
            .export_kind(ResourceKind::Node, &[record(ResourceKind::Node, "", "n1")])
            .unwrap();
        assert!(dir.path().join("Node/n1.json").exists());
    }

    #[test]
    fn test_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ManifestExporter::new(dir.path().join("m"), false);
        assert_eq!(
            exporter
                .export_kind(ResourceKind::Job, &[record(ResourceKind::Job, "a", "b")])
                .unwrap(),
            0
        );
        assert!(!dir.path().join("m").exists());
    }
}
