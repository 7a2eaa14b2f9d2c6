//! Namespace exclusion: exact names plus shell-style wildcard patterns.

use std::collections::BTreeSet;

const WILDCARD_CHARS: [char; 3] = ['*', '?', '['];

/// Set of excluded namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceFilter {
    exact: BTreeSet<String>,
    patterns: Vec<String>,
}

impl NamespaceFilter {
    /// Builds a filter; entries containing `*`, `?` or `[` are patterns.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        filter.extend(entries);
        filter
    }

    /// Adds more entries.
    pub fn extend<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            if entry.contains(WILDCARD_CHARS) {
                if !self.patterns.iter().any(|p| p == entry) {
                    self.patterns.push(entry.to_string());
                }
            } else {
                self.exact.insert(entry.to_string());
            }
        }
    }

    /// True when `namespace` is excluded. Cluster-scoped objects (empty
    /// namespace) are never excluded.
    pub fn is_excluded(&self, namespace: &str) -> bool {
        if namespace.is_empty() {
            return false;
        }
        self.exact.contains(namespace)
            || self
                .patterns
                .iter()
                .any(|p| glob_match::glob_match(p, namespace))
    }

    /// True when nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }

    /// Exact entries, sorted.
    pub fn exact(&self) -> impl Iterator<Item = &str> {
        self.exact.iter().map(String::as_str)
    }

    /// Pattern entries, in insertion order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }
}
