//! Connector over `kubectl get <kind> -o json` output saved on disk.
//!
//! For each kind the directory may hold `<Kind>.json` (or `<plural>.json`)
//! with a `List` document, a bare JSON array, or a single object; or a
//! `<Kind>/` directory whose `*.json` files follow the same rules. A kind with
//! no dump lists as empty.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use kubecap_meta::ResourceKind;
use kubecap_sync::connector::raw_namespace;
use kubecap_sync::{ClusterConnector, ConnectorError, NamespaceScope};
use serde_json::Value;
use tracing::debug;

/// Reads dumps from one directory per cluster.
#[derive(Debug, Clone)]
pub struct DirectoryConnector {
    root: PathBuf,
}

fn items_of(kind: ResourceKind, doc: Value) -> Result<Vec<Value>, ConnectorError> {
    match doc {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(ConnectorError::InvalidPayload {
                kind,
                message: format!("'items' is not an array: {}", type_name(&other)),
            }),
            None => Ok(vec![Value::Object(map)]),
        },
        other => Err(ConnectorError::InvalidPayload {
            kind,
            message: format!("expected an object or array, found {}", type_name(&other)),
        }),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

async fn read_doc(kind: ResourceKind, path: &Path) -> Result<Vec<Value>, ConnectorError> {
    let bytes = tokio::fs::read(path).await?;
    let doc: Value = serde_json::from_slice(&bytes).map_err(|e| ConnectorError::InvalidPayload {
        kind,
        message: format!("{}: {}", path.display(), e),
    })?;
    items_of(kind, doc)
}

impl DirectoryConnector {
    /// Connector rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_kind(&self, kind: ResourceKind) -> Result<Vec<Value>, ConnectorError> {
        for file in [format!("{}.json", kind.as_str()), format!("{}.json", kind.plural())] {
            let path = self.root.join(&file);
            if tokio::fs::try_exists(&path).await? {
                return read_doc(kind, &path).await;
            }
        }

        let dir = self.root.join(kind.as_str());
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();

        let mut items = Vec::new();
        for path in files {
            items.extend(read_doc(kind, &path).await?);
        }
        Ok(items)
    }
}

#[async_trait]
impl ClusterConnector for DirectoryConnector {
    async fn list(&self, kind: ResourceKind, scope: &NamespaceScope) -> Result<Vec<Value>, ConnectorError> {
        let items = self.read_kind(kind).await?;
        let total = items.len();
        let items: Vec<Value> = items
            .into_iter()
            .filter(|o| scope.admits(kind, raw_namespace(o)))
            .collect();
        debug!(
            root = %self.root.display(),
            %kind,
            total,
            in_scope = items.len(),
            "read dump"
        );
        Ok(items)
    }
}
