use super::{CellValue, Column, Rule, RuleContext, Severity};

const REQUEST_LIMIT_RATIO: f64 = 0.2;

fn missing(_: Column, value: &CellValue, _: &RuleContext) -> bool {
    value.is_missing()
}

fn probe_missing(_: Column, value: &CellValue, _: &RuleContext) -> bool {
    value.is_missing() || value.as_text() == Some("Not configured")
}

fn exceeds_allocatable(column: Column, value: &CellValue, ctx: &RuleContext) -> bool {
    let (Some(limit), Some(smallest)) = (value.as_number(), ctx.smallest_allocatable) else {
        return false;
    };
    match column {
        Column::CpuLimit => limit > smallest.cpu_milli as f64,
        Column::MemoryLimit => limit > smallest.memory_mib as f64,
        _ => false,
    }
}

fn request_far_below_limit(column: Column, value: &CellValue, ctx: &RuleContext) -> bool {
    let limit = match column {
        Column::CpuRequest => ctx.cpu_limit_milli,
        Column::MemoryRequest => ctx.memory_limit_mib,
        _ => None,
    };
    match (value.as_number(), limit) {
        (Some(request), Some(limit)) if limit > 0 => request <= limit as f64 * REQUEST_LIMIT_RATIO,
        _ => false,
    }
}

fn pulls_always(_: Column, value: &CellValue, _: &RuleContext) -> bool {
    value.as_text().is_some_and(|p| p.trim() == "Always")
}

/// Shipped rules, in evaluation order.
pub fn official_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "missing_cpu_request",
            severity: Severity::ErrorMiss,
            message: "CPU request is not set",
            columns: &[Column::CpuRequest],
            predicate: missing,
        },
        Rule {
            id: "missing_memory_request",
            severity: Severity::ErrorMiss,
            message: "memory request is not set",
            columns: &[Column::MemoryRequest],
            predicate: missing,
        },
        Rule {
            id: "missing_readiness_probe",
            severity: Severity::ErrorMiss,
            message: "readiness probe is not configured",
            columns: &[Column::ReadinessProbe],
            predicate: probe_missing,
        },
        Rule {
            id: "limit_exceeds_node_allocatable",
            severity: Severity::ErrorMisconf,
            message: "limit exceeds the allocatable of the smallest eligible worker",
            columns: &[Column::CpuLimit, Column::MemoryLimit],
            predicate: exceeds_allocatable,
        },
        Rule {
            id: "request_below_limit_ratio",
            severity: Severity::WarningMisconf,
            message: "request is at most 20% of the limit",
            columns: &[Column::CpuRequest, Column::MemoryRequest],
            predicate: request_far_below_limit,
        },
        Rule {
            id: "image_pull_policy_always",
            severity: Severity::WarningMisconf,
            message: "imagePullPolicy Always pulls on every start",
            columns: &[Column::ImagePullPolicy],
            predicate: pulls_always,
        },
        Rule {
            id: "missing_cpu_limit",
            severity: Severity::WarningMiss,
            message: "CPU limit is not set",
            columns: &[Column::CpuLimit],
            predicate: missing,
        },
        Rule {
            id: "missing_memory_limit",
            severity: Severity::WarningMiss,
            message: "memory limit is not set",
            columns: &[Column::MemoryLimit],
            predicate: missing,
        },
    ]
}
