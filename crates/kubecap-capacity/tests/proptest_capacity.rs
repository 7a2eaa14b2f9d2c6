//! Property tests for aggregation arithmetic.

mod common;

use common::{deployment, node, pod_spec, CLUSTER};
use kubecap_capacity::aggregate;
use kubecap_meta::NodeRole;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_namespace_total_is_request_times_replicas(
        cpu in 1u64..8000,
        mem in 1u64..16384,
        replicas in 0u64..20,
    ) {
        let cpu_q = format!("{}m", cpu);
        let mem_q = format!("{}Mi", mem);
        let spec = pod_spec((cpu_q.as_str(), mem_q.as_str()), ("16", "32Gi"));
        let manifests = vec![deployment("ns", "app", replicas, spec)];
        let nodes = vec![node("w1", NodeRole::Worker, 64000, 262144)];
        let report = aggregate(CLUSTER, &manifests, &nodes);
        let totals = report.namespace("ns").unwrap();
        prop_assert_eq!(totals.cpu_requests_milli, cpu * replicas);
        prop_assert_eq!(totals.memory_requests_mib, mem * replicas);
        prop_assert_eq!(
            report.summary.free_cpu_milli,
            64000u64.saturating_sub(cpu * replicas)
        );
    }

    #[test]
    fn prop_namespaces_sorted_by_combined_percent(
        sizes in proptest::collection::vec(1u64..4000, 1..8),
    ) {
        let manifests: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, cpu)| {
                let cpu_q = format!("{}m", cpu);
                deployment(&format!("ns{}", i), "app", 1, pod_spec((cpu_q.as_str(), "64Mi"), ("4", "1Gi")))
            })
            .collect();
        let nodes = vec![node("w1", NodeRole::Worker, 16000, 65536)];
        let report = aggregate(CLUSTER, &manifests, &nodes);
        for pair in report.namespaces.windows(2) {
            prop_assert!(pair[0].combined_percent() >= pair[1].combined_percent());
        }
    }
}
