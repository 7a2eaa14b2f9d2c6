//! Severity-ranked configuration rules.
//!
//! A rule set is an ordered list of predicates. Evaluating a cell folds over
//! the enabled rules watching that column: a matching rule replaces the
//! current verdict only when its severity is strictly higher, so ties resolve
//! to the first-declared rule.

mod official;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::allocatable::Allocatable;
use crate::error::{CapacityError, CapacityResult};

pub use official::official_rules;

/// Verdict severity, lowest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// No rule matched
    #[default]
    None,
    /// Informational
    Info,
    /// Optional value missing
    WarningMiss,
    /// Questionable value
    WarningMisconf,
    /// Required value missing
    ErrorMiss,
    /// Value that cannot work as configured
    ErrorMisconf,
}

impl Severity {
    /// Wire name, e.g. `ERROR_MISS`.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "NONE",
            Severity::Info => "INFO",
            Severity::WarningMiss => "WARNING_MISS",
            Severity::WarningMisconf => "WARNING_MISCONF",
            Severity::ErrorMiss => "ERROR_MISS",
            Severity::ErrorMisconf => "ERROR_MISCONF",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graded columns of the container configuration report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    /// CPU request, millicores
    CpuRequest,
    /// CPU limit, millicores
    CpuLimit,
    /// Memory request, MiB
    MemoryRequest,
    /// Memory limit, MiB
    MemoryLimit,
    /// Readiness probe summary
    ReadinessProbe,
    /// Image pull policy
    ImagePullPolicy,
    /// Effective replicas
    Replicas,
    /// Node selector summary
    NodeSelectors,
    /// Pod label summary
    PodLabels,
    /// JVM options
    JavaOpts,
}

impl Column {
    /// Column header.
    pub fn as_str(self) -> &'static str {
        match self {
            Column::CpuRequest => "cpu_request",
            Column::CpuLimit => "cpu_limit",
            Column::MemoryRequest => "memory_request",
            Column::MemoryLimit => "memory_limit",
            Column::ReadinessProbe => "readiness_probe",
            Column::ImagePullPolicy => "image_pull_policy",
            Column::Replicas => "replicas",
            Column::NodeSelectors => "node_selectors",
            Column::PodLabels => "pod_labels",
            Column::JavaOpts => "java_opts",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cell as seen by the rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// No value at all
    Absent,
    /// Text cell
    Text(String),
    /// Numeric cell
    Number(f64),
}

impl CellValue {
    /// Absent, `""`, `"-"` and `"N/A"` are missing. Numeric 0 is a value.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Absent => true,
            CellValue::Text(s) => matches!(s.trim(), "" | "-" | "N/A"),
            CellValue::Number(_) => false,
        }
    }

    /// Numeric view; text cells are parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Absent => None,
        }
    }

    /// Text view; `None` for non-text cells.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Option<u64>> for CellValue {
    fn from(v: Option<u64>) -> Self {
        v.map_or(CellValue::Absent, |n| CellValue::Number(n as f64))
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

/// Row facts a rule may consult besides the cell itself.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuleContext {
    /// CPU limit of the same container, millicores
    pub cpu_limit_milli: Option<u64>,
    /// Memory limit of the same container, MiB
    pub memory_limit_mib: Option<u64>,
    /// Smallest allocatable among eligible workers
    pub smallest_allocatable: Option<Allocatable>,
}

/// Predicate deciding whether a rule fires on a cell.
pub type Predicate = fn(Column, &CellValue, &RuleContext) -> bool;

/// One configuration rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Stable identifier used to enable and disable the rule
    pub id: &'static str,
    /// Severity reported when it fires
    pub severity: Severity,
    /// Human-readable finding
    pub message: &'static str,
    /// Columns the rule watches
    pub columns: &'static [Column],
    /// Firing condition
    pub predicate: Predicate,
}

impl Rule {
    fn applies(&self, column: Column, value: &CellValue, ctx: &RuleContext) -> bool {
        self.columns.contains(&column) && (self.predicate)(column, value, ctx)
    }
}

/// Outcome of evaluating one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Winning severity, `NONE` when nothing fired
    pub severity: Severity,
    /// Winning rule
    pub rule_id: Option<String>,
    /// Winning rule's message
    pub message: Option<String>,
}

impl Verdict {
    fn from_rule(rule: &Rule) -> Self {
        Self {
            severity: rule.severity,
            rule_id: Some(rule.id.to_string()),
            message: Some(rule.message.to_string()),
        }
    }
}

/// Ordered rules plus the set of disabled ids.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    disabled: BTreeSet<&'static str>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::official()
    }
}

impl RuleSet {
    /// Rules in the given order, all enabled.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            disabled: BTreeSet::new(),
        }
    }

    /// The shipped rule list.
    pub fn official() -> Self {
        Self::new(official_rules())
    }

    fn find(&self, id: &str) -> CapacityResult<&'static str> {
        self.rules
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.id)
            .ok_or_else(|| CapacityError::UnknownRule(id.to_string()))
    }

    /// Stops `id` from firing.
    pub fn disable(&mut self, id: &str) -> CapacityResult<()> {
        let id = self.find(id)?;
        self.disabled.insert(id);
        debug!(rule = id, "rule disabled");
        Ok(())
    }

    /// Re-enables `id`.
    pub fn enable(&mut self, id: &str) -> CapacityResult<()> {
        let id = self.find(id)?;
        self.disabled.remove(id);
        Ok(())
    }

    /// Whether `id` is known and enabled.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.rules.iter().any(|r| r.id == id) && !self.disabled.contains(id)
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Grades one cell.
    pub fn evaluate(&self, column: Column, value: &CellValue, ctx: &RuleContext) -> Verdict {
        self.rules
            .iter()
            .filter(|r| !self.disabled.contains(r.id))
            .filter(|r| r.applies(column, value, ctx))
            .fold(Verdict::default(), |best, rule| {
                if rule.severity > best.severity {
                    Verdict::from_rule(rule)
                } else {
                    best
                }
            })
    }
}
