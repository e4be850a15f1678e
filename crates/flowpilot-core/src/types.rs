//! Data model shared by the page driver and the polling engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one generated artifact (the source URL behind a video element)
pub type ResultIdentifier = String;

/// Ordered result identifiers read from the top row of the result list at one instant
///
/// Two snapshots are equal iff they have the same length and identical
/// elements in the same order. Duplicates are kept as observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Vec<ResultIdentifier>);

impl Snapshot {
    /// Create a snapshot from identifiers in DOM order
    pub fn new(ids: Vec<ResultIdentifier>) -> Self {
        Self(ids)
    }

    /// Snapshot with no identifiers
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResultIdentifier> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ResultIdentifier] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<ResultIdentifier> {
        self.0
    }
}

impl From<Vec<ResultIdentifier>> for Snapshot {
    fn from(ids: Vec<ResultIdentifier>) -> Self {
        Self(ids)
    }
}

impl From<Vec<&str>> for Snapshot {
    fn from(ids: Vec<&str>) -> Self {
        Self(ids.into_iter().map(str::to_string).collect())
    }
}

impl IntoIterator for Snapshot {
    type Item = ResultIdentifier;
    type IntoIter = std::vec::IntoIter<ResultIdentifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Why a polling loop finished with a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Enough new results were read identically for the stability threshold
    Stable,
    /// The wall-clock budget ran out; the snapshot holds the last non-baseline read
    TimedOut,
    /// The in-place retry budget for failed generations ran out
    RetriesExhausted,
}

impl CompletionReason {
    /// True when the snapshot may be partial
    pub fn is_partial(&self) -> bool {
        !matches!(self, CompletionReason::Stable)
    }
}

/// Terminal output of one polling loop invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    /// Final snapshot (complete, or best-effort after a soft failure)
    Finished {
        urls: Snapshot,
        reason: CompletionReason,
    },
    /// Backend looks broken; the whole submission must be restarted
    Retry { error: String },
}

impl GenerationResult {
    pub fn needs_retry(&self) -> bool {
        matches!(self, GenerationResult::Retry { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_equality_is_ordered() {
        let a = Snapshot::from(vec!["a", "b"]);
        let b = Snapshot::from(vec!["a", "b"]);
        let reversed = Snapshot::from(vec!["b", "a"]);
        let shorter = Snapshot::from(vec!["a"]);

        assert_eq!(a, b);
        assert_ne!(a, reversed);
        assert_ne!(a, shorter);
    }

    #[test]
    fn test_snapshot_keeps_duplicates() {
        let snap = Snapshot::from(vec!["a", "a"]);
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn test_snapshot_serializes_as_list() {
        let snap = Snapshot::from(vec!["blob:1", "blob:2"]);
        let json = serde_json::to_string(&snap).unwrap();
        assert_eq!(json, r#"["blob:1","blob:2"]"#);
    }

    #[test]
    fn test_completion_reason_partial() {
        assert!(!CompletionReason::Stable.is_partial());
        assert!(CompletionReason::TimedOut.is_partial());
        assert!(CompletionReason::RetriesExhausted.is_partial());
    }

    #[test]
    fn test_generation_result_needs_retry() {
        let retry = GenerationResult::Retry {
            error: "Something went wrong".to_string(),
        };
        assert!(retry.needs_retry());

        let done = GenerationResult::Finished {
            urls: Snapshot::empty(),
            reason: CompletionReason::TimedOut,
        };
        assert!(!done.needs_retry());
    }
}
