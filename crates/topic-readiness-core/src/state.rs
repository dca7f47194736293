//! Cumulative readiness state.
//!
//! The state is what makes readiness scores non-decreasing for a topic:
//! every field is either a set that only grows by union or a flag that only
//! flips from `false` to `true`. Scoring reads the *merged* state, never the
//! fresh discovery alone, so a later lookup that happens to rank fewer
//! chunks cannot lower the score.
//!
//! The state is versioned. A prior state whose `schemaVersion` differs from
//! [`SCHEMA_VERSION`] is discarded and scoring starts from empty. That is the
//! one accepted discontinuity: bumping the version when the scoring rules
//! change re-validates all history instead of grandfathering it.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::signals::{CoverageFlags, DiversityFlags};

/// Current state layout/scoring version.
pub const SCHEMA_VERSION: u32 = 3;

/// Persisted per-topic evidence accumulator.
///
/// Serialized with camelCase keys, e.g. `{"schemaVersion":3,"seenChunkIds":[..],..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeState {
    pub schema_version: u32,
    #[serde(default)]
    pub seen_chunk_ids: BTreeSet<String>,
    #[serde(default)]
    pub seen_doc_ids: BTreeSet<String>,
    #[serde(default)]
    pub seen_diversity_flags: DiversityFlags,
    #[serde(default)]
    pub seen_coverage_flags: CoverageFlags,
    #[serde(default)]
    pub seen_recency_chunk_ids: BTreeSet<String>,
}

impl Default for CumulativeState {
    fn default() -> Self {
        Self::empty()
    }
}

/// What one readiness computation found, before merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreshDiscovery {
    pub chunk_ids: BTreeSet<String>,
    pub doc_ids: BTreeSet<String>,
    pub diversity: DiversityFlags,
    pub coverage: CoverageFlags,
    pub recency_chunk_ids: BTreeSet<String>,
}

impl CumulativeState {
    /// An empty state at the current schema version.
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            seen_chunk_ids: BTreeSet::new(),
            seen_doc_ids: BTreeSet::new(),
            seen_diversity_flags: DiversityFlags::default(),
            seen_coverage_flags: CoverageFlags::default(),
            seen_recency_chunk_ids: BTreeSet::new(),
        }
    }

    pub fn is_current(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }

    /// The prior to merge into: the given state if its version is current,
    /// otherwise empty.
    pub fn upgrade(prior: Option<&CumulativeState>) -> CumulativeState {
        match prior {
            Some(p) if p.is_current() => p.clone(),
            _ => CumulativeState::empty(),
        }
    }

    /// Parse a persisted JSON document.
    ///
    /// Anything unreadable (malformed JSON, a layout from a different
    /// version) comes back as `None`, which callers treat as "no prior".
    pub fn from_json(raw: &str) -> Option<CumulativeState> {
        serde_json::from_str::<CumulativeState>(raw).ok()
    }

    /// Fold a fresh discovery into this state. Union for sets, OR for flags.
    pub fn merge(&self, fresh: &FreshDiscovery) -> CumulativeState {
        CumulativeState {
            schema_version: SCHEMA_VERSION,
            seen_chunk_ids: self.seen_chunk_ids.union(&fresh.chunk_ids).cloned().collect(),
            seen_doc_ids: self.seen_doc_ids.union(&fresh.doc_ids).cloned().collect(),
            seen_diversity_flags: self.seen_diversity_flags.union(fresh.diversity),
            seen_coverage_flags: self.seen_coverage_flags.union(fresh.coverage),
            seen_recency_chunk_ids: self
                .seen_recency_chunk_ids
                .union(&fresh.recency_chunk_ids)
                .cloned()
                .collect(),
        }
    }

    /// Merge two states of the current version.
    pub fn merge_state(&self, other: &CumulativeState) -> CumulativeState {
        self.merge(&FreshDiscovery {
            chunk_ids: other.seen_chunk_ids.clone(),
            doc_ids: other.seen_doc_ids.clone(),
            diversity: other.seen_diversity_flags,
            coverage: other.seen_coverage_flags,
            recency_chunk_ids: other.seen_recency_chunk_ids.clone(),
        })
    }

    /// Drop references to chunks and documents that no longer exist.
    ///
    /// Flags are kept: they record that evidence of a kind was once seen and
    /// carry no identifier to check.
    pub fn retain_existing(
        &self,
        live_chunk_ids: &HashSet<String>,
        live_doc_ids: &HashSet<String>,
    ) -> CumulativeState {
        let mut pruned = self.clone();
        pruned.seen_chunk_ids.retain(|id| live_chunk_ids.contains(id));
        pruned.seen_recency_chunk_ids.retain(|id| live_chunk_ids.contains(id));
        pruned.seen_doc_ids.retain(|id| live_doc_ids.contains(id));
        pruned
    }

    pub fn chunk_count(&self) -> usize {
        self.seen_chunk_ids.len()
    }

    pub fn doc_count(&self) -> usize {
        self.seen_doc_ids.len()
    }

    pub fn recent_count(&self) -> usize {
        self.seen_recency_chunk_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> BTreeSet<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn fresh(chunks: &[&str], docs: &[&str]) -> FreshDiscovery {
        FreshDiscovery {
            chunk_ids: ids(chunks),
            doc_ids: ids(docs),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_is_union() {
        let s1 = CumulativeState::empty().merge(&fresh(&["c1", "c2"], &["d1"]));
        let s2 = s1.merge(&fresh(&["c2", "c3"], &["d2"]));
        assert_eq!(s2.seen_chunk_ids, ids(&["c1", "c2", "c3"]));
        assert_eq!(s2.seen_doc_ids, ids(&["d1", "d2"]));
    }

    #[test]
    fn test_merge_never_clears_flags() {
        let mut f = fresh(&[], &[]);
        f.coverage.safety = true;
        let s1 = CumulativeState::empty().merge(&f);
        let s2 = s1.merge(&FreshDiscovery::default());
        assert!(s2.seen_coverage_flags.safety);
    }

    #[test]
    fn test_merge_with_self_is_identity() {
        let mut f = fresh(&["c1"], &["d1"]);
        f.diversity.has_rct = true;
        f.recency_chunk_ids = ids(&["c1"]);
        let s = CumulativeState::empty().merge(&f);
        assert_eq!(s.merge_state(&s), s);
    }

    #[test]
    fn test_upgrade_discards_other_versions() {
        let mut old = CumulativeState::empty().merge(&fresh(&["c1"], &["d1"]));
        old.schema_version = SCHEMA_VERSION - 1;
        assert_eq!(CumulativeState::upgrade(Some(&old)), CumulativeState::empty());
        assert_eq!(CumulativeState::upgrade(None), CumulativeState::empty());
    }

    #[test]
    fn test_upgrade_keeps_current() {
        let s = CumulativeState::empty().merge(&fresh(&["c1"], &["d1"]));
        assert_eq!(CumulativeState::upgrade(Some(&s)), s);
    }

    #[test]
    fn test_json_layout_is_camel_case() {
        let s = CumulativeState::empty().merge(&fresh(&["c1"], &["d1"]));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(json["seenChunkIds"][0], "c1");
        assert_eq!(json["seenCoverageFlags"]["efficacy"], false);
        assert_eq!(json["seenDiversityFlags"]["hasRct"], false);
    }

    #[test]
    fn test_from_json_tolerates_garbage() {
        assert!(CumulativeState::from_json("not json").is_none());
        let legacy = CumulativeState::from_json(r#"{"schemaVersion":1}"#).unwrap();
        assert!(!legacy.is_current());
    }

    #[test]
    fn test_retain_existing() {
        let mut f = fresh(&["c1", "c2"], &["d1", "d2"]);
        f.recency_chunk_ids = ids(&["c2"]);
        f.coverage.efficacy = true;
        let s = CumulativeState::empty().merge(&f);
        let live_chunks: HashSet<String> = ["c1".to_string()].into_iter().collect();
        let live_docs: HashSet<String> = ["d1".to_string()].into_iter().collect();
        let pruned = s.retain_existing(&live_chunks, &live_docs);
        assert_eq!(pruned.seen_chunk_ids, ids(&["c1"]));
        assert!(pruned.seen_recency_chunk_ids.is_empty());
        assert_eq!(pruned.seen_doc_ids, ids(&["d1"]));
        assert!(pruned.seen_coverage_flags.efficacy);
    }
}
