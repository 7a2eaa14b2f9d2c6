//! Kubernetes resource quantity parsing.
//!
//! CPU is normalized to millicores and memory to whole MiB (floored). Both
//! parsers return `None` for absent, empty, negative or unparseable input so
//! callers can tell "not configured" apart from an explicit zero.

use serde_json::Value;

const MIB: f64 = 1024.0 * 1024.0;

const BINARY_SUFFIXES: [(&str, f64); 6] = [
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
];

const DECIMAL_SUFFIXES: [(&str, f64); 7] = [
    ("k", 1e3),
    ("K", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

fn parse_number(s: &str) -> Option<f64> {
    let n: f64 = s.trim().parse().ok()?;
    if n.is_finite() && n >= 0.0 {
        Some(n)
    } else {
        None
    }
}

/// Parses a CPU quantity (`"500m"`, `"1"`, `"0.25"`) into millicores.
pub fn cpu_to_milli(raw: &str) -> Option<u64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let milli = match s.strip_suffix('m') {
        Some(num) => parse_number(num)?,
        None => parse_number(s)? * 1000.0,
    };
    Some(milli.round() as u64)
}

/// Parses a memory quantity (`"256Mi"`, `"1Gi"`, `"500M"`, `"1048576"`) into MiB.
pub fn mem_to_mib(raw: &str) -> Option<u64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for (suffix, factor) in BINARY_SUFFIXES {
        if let Some(num) = s.strip_suffix(suffix) {
            return Some((parse_number(num)? * factor / MIB).floor() as u64);
        }
    }
    for (suffix, factor) in DECIMAL_SUFFIXES {
        if let Some(num) = s.strip_suffix(suffix) {
            return Some((parse_number(num)? * factor / MIB).floor() as u64);
        }
    }
    Some((parse_number(s)? / MIB).floor() as u64)
}

fn quantity_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// CPU millicores from a JSON quantity, which may be a string or a bare number.
pub fn cpu_value_to_milli(value: Option<&Value>) -> Option<u64> {
    value.and_then(quantity_str).and_then(|s| cpu_to_milli(&s))
}

/// Memory MiB from a JSON quantity, which may be a string or a bare number.
pub fn mem_value_to_mib(value: Option<&Value>) -> Option<u64> {
    value.and_then(quantity_str).and_then(|s| mem_to_mib(&s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cpu_millicores() {
        assert_eq!(cpu_to_milli("500m"), Some(500));
        assert_eq!(cpu_to_milli("1"), Some(1000));
        assert_eq!(cpu_to_milli("0.5"), Some(500));
        assert_eq!(cpu_to_milli("2.25"), Some(2250));
        assert_eq!(cpu_to_milli("0"), Some(0));
    }

    #[test]
    fn test_cpu_invalid() {
        assert_eq!(cpu_to_milli(""), None);
        assert_eq!(cpu_to_milli("abc"), None);
        assert_eq!(cpu_to_milli("-1"), None);
        assert_eq!(cpu_to_milli("m"), None);
    }

    #[test]
    fn test_memory_binary_suffixes() {
        assert_eq!(mem_to_mib("256Mi"), Some(256));
        assert_eq!(mem_to_mib("1Gi"), Some(1024));
        assert_eq!(mem_to_mib("8388608Ki"), Some(8192));
        assert_eq!(mem_to_mib("1Ti"), Some(1024 * 1024));
        assert_eq!(mem_to_mib("1536Ki"), Some(1));
    }

    #[test]
    fn test_memory_decimal_and_bytes() {
        assert_eq!(mem_to_mib("1048576"), Some(1));
        assert_eq!(mem_to_mib("1G"), Some(953));
        assert_eq!(mem_to_mib("500M"), Some(476));
        assert_eq!(mem_to_mib("0"), Some(0));
    }

    #[test]
    fn test_memory_invalid() {
        assert_eq!(mem_to_mib(""), None);
        assert_eq!(mem_to_mib("lots"), None);
        assert_eq!(mem_to_mib("Mi"), None);
    }

    #[test]
    fn test_json_quantities() {
        assert_eq!(cpu_value_to_milli(Some(&json!(2))), Some(2000));
        assert_eq!(cpu_value_to_milli(Some(&json!("250m"))), Some(250));
        assert_eq!(mem_value_to_mib(Some(&json!("512Mi"))), Some(512));
        assert_eq!(mem_value_to_mib(Some(&json!(null))), None);
        assert_eq!(cpu_value_to_milli(None), None);
    }
}
