//! Closed set of resource kinds the gatherer knows how to snapshot.
//!
//! Every kind carries a static strategy row: the API version used to list it,
//! the REST plural, whether it is namespaced, where its pod template lives and
//! how its effective replica count is derived.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::MetaError;

/// How the effective replica count of a workload is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaRule {
    /// `spec.replicas`, defaulting to 1. Zero is a legitimate value.
    Declared,
    /// `parallelism`, then `completions`, then 1, read from the job spec.
    JobParallelism,
    /// Number of eligible worker nodes matching the pod node selector.
    DaemonSetNodes,
    /// Kind does not run containers.
    NotApplicable,
}

/// A Kubernetes (or OpenShift) resource kind supported by the gatherer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// apps/v1 Deployment
    Deployment,
    /// apps/v1 StatefulSet
    StatefulSet,
    /// apps/v1 DaemonSet
    DaemonSet,
    /// batch/v1 Job
    Job,
    /// batch/v1 CronJob
    CronJob,
    /// apps.openshift.io/v1 DeploymentConfig
    DeploymentConfig,
    /// build.openshift.io/v1 BuildConfig
    BuildConfig,
    /// v1 ConfigMap
    ConfigMap,
    /// v1 Node (cluster-scoped)
    Node,
}

struct KindStrategy {
    api_version: &'static str,
    plural: &'static str,
    namespaced: bool,
    pod_spec_path: &'static [&'static str],
    replicas: ReplicaRule,
    job_spec_path: &'static [&'static str],
}

const TEMPLATE_SPEC: &[&str] = &["spec", "template", "spec"];
const CRONJOB_TEMPLATE_SPEC: &[&str] = &["spec", "jobTemplate", "spec", "template", "spec"];

impl ResourceKind {
    /// Every supported kind, in declaration order.
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Deployment,
        ResourceKind::StatefulSet,
        ResourceKind::DaemonSet,
        ResourceKind::Job,
        ResourceKind::CronJob,
        ResourceKind::DeploymentConfig,
        ResourceKind::BuildConfig,
        ResourceKind::ConfigMap,
        ResourceKind::Node,
    ];

    /// Kinds synchronized when a cluster does not list its own.
    pub const DEFAULT_INCLUDE: [ResourceKind; 6] = [
        ResourceKind::Deployment,
        ResourceKind::StatefulSet,
        ResourceKind::DaemonSet,
        ResourceKind::CronJob,
        ResourceKind::DeploymentConfig,
        ResourceKind::Node,
    ];

    fn strategy(self) -> KindStrategy {
        match self {
            ResourceKind::Deployment => KindStrategy {
                api_version: "apps/v1",
                plural: "deployments",
                namespaced: true,
                pod_spec_path: TEMPLATE_SPEC,
                replicas: ReplicaRule::Declared,
                job_spec_path: &[],
            },
            ResourceKind::StatefulSet => KindStrategy {
                api_version: "apps/v1",
                plural: "statefulsets",
                namespaced: true,
                pod_spec_path: TEMPLATE_SPEC,
                replicas: ReplicaRule::Declared,
                job_spec_path: &[],
            },
            ResourceKind::DaemonSet => KindStrategy {
                api_version: "apps/v1",
                plural: "daemonsets",
                namespaced: true,
                pod_spec_path: TEMPLATE_SPEC,
                replicas: ReplicaRule::DaemonSetNodes,
                job_spec_path: &[],
            },
            ResourceKind::Job => KindStrategy {
                api_version: "batch/v1",
                plural: "jobs",
                namespaced: true,
                pod_spec_path: TEMPLATE_SPEC,
                replicas: ReplicaRule::JobParallelism,
                job_spec_path: &["spec"],
            },
            ResourceKind::CronJob => KindStrategy {
                api_version: "batch/v1",
                plural: "cronjobs",
                namespaced: true,
                pod_spec_path: CRONJOB_TEMPLATE_SPEC,
                replicas: ReplicaRule::JobParallelism,
                job_spec_path: &["spec", "jobTemplate", "spec"],
            },
            ResourceKind::DeploymentConfig => KindStrategy {
                api_version: "apps.openshift.io/v1",
                plural: "deploymentconfigs",
                namespaced: true,
                pod_spec_path: TEMPLATE_SPEC,
                replicas: ReplicaRule::Declared,
                job_spec_path: &[],
            },
            ResourceKind::BuildConfig => KindStrategy {
                api_version: "build.openshift.io/v1",
                plural: "buildconfigs",
                namespaced: true,
                pod_spec_path: &[],
                replicas: ReplicaRule::NotApplicable,
                job_spec_path: &[],
            },
            ResourceKind::ConfigMap => KindStrategy {
                api_version: "v1",
                plural: "configmaps",
                namespaced: true,
                pod_spec_path: &[],
                replicas: ReplicaRule::NotApplicable,
                job_spec_path: &[],
            },
            ResourceKind::Node => KindStrategy {
                api_version: "v1",
                plural: "nodes",
                namespaced: false,
                pod_spec_path: &[],
                replicas: ReplicaRule::NotApplicable,
                job_spec_path: &[],
            },
        }
    }

    /// Canonical kind name, as it appears in manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::Job => "Job",
            ResourceKind::CronJob => "CronJob",
            ResourceKind::DeploymentConfig => "DeploymentConfig",
            ResourceKind::BuildConfig => "BuildConfig",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Node => "Node",
        }
    }

    /// API version the kind is listed under.
    pub fn api_version(self) -> &'static str {
        self.strategy().api_version
    }

    /// REST resource plural.
    pub fn plural(self) -> &'static str {
        self.strategy().plural
    }

    /// Whether objects of this kind live inside a namespace.
    pub fn is_namespaced(self) -> bool {
        self.strategy().namespaced
    }

    /// Path from the manifest root to the pod spec, empty for non-workloads.
    pub fn pod_spec_path(self) -> &'static [&'static str] {
        self.strategy().pod_spec_path
    }

    /// Path from the manifest root to the job spec carrying parallelism.
    pub fn job_spec_path(self) -> &'static [&'static str] {
        self.strategy().job_spec_path
    }

    /// Replica derivation rule.
    pub fn replica_rule(self) -> ReplicaRule {
        self.strategy().replicas
    }

    /// True for kinds whose manifests carry a pod template.
    pub fn has_containers(self) -> bool {
        !self.strategy().pod_spec_path.is_empty()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = MetaError;

    /// Parses a kind name. Matching is case-insensitive so `deployment` and
    /// `Deployment` both resolve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MetaError::UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("deployment".parse::<ResourceKind>().unwrap(), ResourceKind::Deployment);
        assert_eq!("CronJob".parse::<ResourceKind>().unwrap(), ResourceKind::CronJob);
        assert_eq!(" node ".parse::<ResourceKind>().unwrap(), ResourceKind::Node);
    }

    #[test]
    fn test_parse_unknown_kind() {
        let err = "Pod".parse::<ResourceKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown resource kind: Pod");
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.to_string().parse::<ResourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_node_is_cluster_scoped() {
        assert!(!ResourceKind::Node.is_namespaced());
        assert!(ResourceKind::ConfigMap.is_namespaced());
        assert_eq!(ResourceKind::Node.plural(), "nodes");
    }

    #[test]
    fn test_pod_spec_paths() {
        assert_eq!(
            ResourceKind::CronJob.pod_spec_path(),
            &["spec", "jobTemplate", "spec", "template", "spec"]
        );
        assert_eq!(ResourceKind::Deployment.pod_spec_path(), &["spec", "template", "spec"]);
        assert!(!ResourceKind::ConfigMap.has_containers());
        assert!(!ResourceKind::BuildConfig.has_containers());
    }

    #[test]
    fn test_replica_rules() {
        assert_eq!(ResourceKind::DaemonSet.replica_rule(), ReplicaRule::DaemonSetNodes);
        assert_eq!(ResourceKind::Job.replica_rule(), ReplicaRule::JobParallelism);
        assert_eq!(ResourceKind::StatefulSet.replica_rule(), ReplicaRule::Declared);
        assert_eq!(ResourceKind::Node.replica_rule(), ReplicaRule::NotApplicable);
    }

    #[test]
    fn test_default_include_excludes_configmap() {
        assert!(!ResourceKind::DEFAULT_INCLUDE.contains(&ResourceKind::ConfigMap));
        assert!(ResourceKind::DEFAULT_INCLUDE.contains(&ResourceKind::Node));
    }
}
