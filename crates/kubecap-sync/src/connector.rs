//! Cluster connector abstraction.
//!
//! A connector lists the raw objects of one resource kind. The live API client
//! lives outside this workspace; the shipped implementations read from memory
//! ([`StaticConnector`]) or from `kubectl` JSON dumps (in `kubecap-mgmt`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use kubecap_meta::ResourceKind;
use serde_json::Value;

use crate::error::ConnectorError;

/// Which namespaces a list call should cover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NamespaceScope {
    /// Every namespace the credentials can see.
    #[default]
    All,
    /// Only the listed namespaces. Ignored for cluster-scoped kinds.
    Only(Vec<String>),
}

impl NamespaceScope {
    /// Whether an object of `kind` in `namespace` falls inside this scope.
    pub fn admits(&self, kind: ResourceKind, namespace: &str) -> bool {
        match self {
            NamespaceScope::All => true,
            NamespaceScope::Only(_) if !kind.is_namespaced() => true,
            NamespaceScope::Only(list) => list.iter().any(|ns| ns == namespace),
        }
    }

    /// Scope to use for `kind`; cluster-scoped kinds are always listed whole.
    pub fn for_kind(&self, kind: ResourceKind) -> NamespaceScope {
        if kind.is_namespaced() {
            self.clone()
        } else {
            NamespaceScope::All
        }
    }
}

/// Namespace of a raw object, empty when absent or not a string.
pub fn raw_namespace(obj: &Value) -> &str {
    obj.get("metadata")
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// Source of raw cluster objects.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// List every object of `kind` within `scope`.
    ///
    /// Timeouts are reported as [`ConnectorError::Timeout`] and treated like
    /// any other fetch failure by the orchestrator.
    async fn list(&self, kind: ResourceKind, scope: &NamespaceScope) -> Result<Vec<Value>, ConnectorError>;
}

enum Canned {
    Objects(Vec<Value>),
    Failure(String),
}

/// In-memory connector serving canned objects per kind.
///
/// Kinds never registered list as empty. Contents can be swapped between
/// runs to simulate cluster changes.
#[derive(Default)]
pub struct StaticConnector {
    canned: RwLock<HashMap<ResourceKind, Canned>>,
    delays: RwLock<HashMap<ResourceKind, Duration>>,
    calls: AtomicUsize,
}

impl StaticConnector {
    /// Creates an empty connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StaticConnector::set_objects`].
    pub fn with_objects(self, kind: ResourceKind, objects: Vec<Value>) -> Self {
        self.set_objects(kind, objects);
        self
    }

    /// Builder form of [`StaticConnector::set_failure`].
    pub fn with_failure(self, kind: ResourceKind, message: &str) -> Self {
        self.set_failure(kind, message);
        self
    }

    /// Delays every list of `kind` by `delay`.
    pub fn with_delay(self, kind: ResourceKind, delay: Duration) -> Self {
        if let Ok(mut delays) = self.delays.write() {
            delays.insert(kind, delay);
        }
        self
    }

    /// Replaces the objects served for `kind`.
    pub fn set_objects(&self, kind: ResourceKind, objects: Vec<Value>) {
        if let Ok(mut canned) = self.canned.write() {
            canned.insert(kind, Canned::Objects(objects));
        }
    }

    /// Makes every list of `kind` fail with `message`.
    pub fn set_failure(&self, kind: ResourceKind, message: &str) {
        if let Ok(mut canned) = self.canned.write() {
            canned.insert(kind, Canned::Failure(message.to_string()));
        }
    }

    /// Number of list calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterConnector for StaticConnector {
    async fn list(&self, kind: ResourceKind, scope: &NamespaceScope) -> Result<Vec<Value>, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .delays
            .read()
            .ok()
            .and_then(|d| d.get(&kind).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let canned = self.canned.read().map_err(|e| ConnectorError::Fetch {
            kind,
            message: e.to_string(),
        })?;
        match canned.get(&kind) {
            None => Ok(Vec::new()),
            Some(Canned::Failure(message)) => Err(ConnectorError::Fetch {
                kind,
                message: message.clone(),
            }),
            Some(Canned::Objects(objects)) => Ok(objects
                .iter()
                .filter(|o| scope.admits(kind, raw_namespace(o)))
                .cloned()
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(ns: &str, name: &str) -> Value {
        json!({"metadata": {"name": name, "namespace": ns}})
    }

    #[test]
    fn test_scope_admits() {
        let scope = NamespaceScope::Only(vec!["team-a".into()]);
        assert!(scope.admits(ResourceKind::Deployment, "team-a"));
        assert!(!scope.admits(ResourceKind::Deployment, "team-b"));
        assert!(scope.admits(ResourceKind::Node, ""));
        assert_eq!(scope.for_kind(ResourceKind::Node), NamespaceScope::All);
    }

    #[tokio::test]
    async fn test_static_connector_filters_scope() {
        let connector = StaticConnector::new().with_objects(
            ResourceKind::Deployment,
            vec![obj("team-a", "web"), obj("team-b", "api")],
        );
        let all = connector
            .list(ResourceKind::Deployment, &NamespaceScope::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let scoped = connector
            .list(
                ResourceKind::Deployment,
                &NamespaceScope::Only(vec!["team-b".into()]),
            )
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(connector.calls(), 2);
    }

    #[tokio::test]
    async fn test_static_connector_failure_and_unknown_kind() {
        let connector = StaticConnector::new().with_failure(ResourceKind::Job, "boom");
        assert!(connector.list(ResourceKind::Job, &NamespaceScope::All).await.is_err());
        assert!(connector
            .list(ResourceKind::ConfigMap, &NamespaceScope::All)
            .await
            .unwrap()
            .is_empty());
    }
}
