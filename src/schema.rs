//! The typed record shape and status-transition invariants (`spec.md` §3).

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable content-addressed identifier. Wrapped rather than a bare `String`
/// so a caller cannot pass an arbitrary, un-fingerprinted string where an
/// `id` is expected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryId(String);

impl MemoryId {
    pub fn from_hex(hex: &str) -> Self {
        Self(hex.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `spec.md` §3: one of the seven memory categories, each with its own
/// default confidence and TTL (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Architecture,
    Problem,
    Solution,
    Status,
    Decision,
    Milestone,
    #[default]
    Generic,
}

impl Category {
    pub fn slug(self) -> &'static str {
        match self {
            Category::Architecture => "architecture",
            Category::Problem => "problem",
            Category::Solution => "solution",
            Category::Status => "status",
            Category::Decision => "decision",
            Category::Milestone => "milestone",
            Category::Generic => "generic",
        }
    }
}

/// `spec.md` §3 lifecycle: `active | deprecated | conflicted | expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Deprecated,
    Conflicted,
    Expired,
}

/// `milestone_type` for records with `category = milestone` (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneType {
    ArchitectureDecision,
    ProblemIdentified,
    SolutionImplemented,
    StatusChange,
}

/// The atomic unit of memory (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub scope: crate::scope::Scope,
    pub content: String,
    pub embedding_ref: Option<String>,
    pub entities: Vec<String>,
    pub relations: Vec<Relation>,
    pub category: Category,
    pub confidence: u8,
    pub source: String,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: u32,
    pub status: Status,
    pub superseded_by: Option<MemoryId>,
    pub conflict_with: BTreeSet<MemoryId>,
    /// Open-ended, genuinely free-form fields — the typed replacement for
    /// the source's untyped dynamic metadata dictionary (`spec.md` §9).
    pub extra_metadata: BTreeMap<String, String>,
    /// Set by the dual-write coordinator when one leg of a write failed and
    /// a compensation task owns reconciling it (`spec.md` §4.7).
    pub degraded: bool,
    /// `milestone_type` / `impact_level`, present only when
    /// `category = milestone` (`spec.md` §3's "Milestone" specialization).
    pub milestone: Option<MilestoneMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    pub src_entity: String,
    pub relation_type: String,
    pub dst_entity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneMetadata {
    pub milestone_type: MilestoneType,
    pub impact_level: u8,
}

impl MemoryRecord {
    /// Invariant 1: `status = deprecated ⇒ superseded_by ≠ ∅`.
    pub fn deprecation_is_valid(&self) -> bool {
        self.status != Status::Deprecated || self.superseded_by.is_some()
    }

    /// Invariant 2: `status = expired ⇒ expires_at ≤ now`.
    pub fn expiry_is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status != Status::Expired || self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Invariant 5: confidence is clamped to 1..10 on ingestion.
    pub fn confidence_in_range(confidence: u8) -> bool {
        (1..=10).contains(&confidence)
    }

    pub fn is_quality_filtered_visible(&self, min_confidence: u8, include_conflicted: bool) -> bool {
        if matches!(self.status, Status::Deprecated | Status::Expired) {
            return false;
        }
        if self.status == Status::Conflicted && !include_conflicted {
            return false;
        }
        self.confidence >= min_confidence
    }
}

/// Per-category defaults for confidence and TTL (`spec.md` §4.4).
#[derive(Debug, Clone, Copy)]
pub struct CategoryDefault {
    pub confidence: u8,
    pub ttl_days: Option<u32>,
}

pub fn category_default(category: Category) -> CategoryDefault {
    match category {
        Category::Architecture => CategoryDefault { confidence: 8, ttl_days: Some(180) },
        Category::Decision => CategoryDefault { confidence: 8, ttl_days: Some(365) },
        Category::Solution => CategoryDefault { confidence: 7, ttl_days: Some(120) },
        Category::Problem => CategoryDefault { confidence: 6, ttl_days: Some(90) },
        Category::Status => CategoryDefault { confidence: 6, ttl_days: Some(30) },
        Category::Milestone => CategoryDefault { confidence: 9, ttl_days: None },
        Category::Generic => CategoryDefault { confidence: 5, ttl_days: None },
    }
}

/// Invariant 6: supersession chains must be acyclic. Walks the chain formed
/// by `superseded_by` pointers starting at `start`, using `lookup` to
/// resolve each successor; returns `false` the moment appending
/// `candidate_next` would introduce a cycle (including a record citing
/// itself).
pub fn supersession_chain_is_acyclic(
    start: &MemoryId,
    candidate_next: &MemoryId,
    lookup: impl Fn(&MemoryId) -> Option<MemoryId>,
) -> bool {
    if start == candidate_next {
        return false;
    }
    let mut seen: BTreeSet<MemoryId> = BTreeSet::new();
    seen.insert(start.clone());
    let mut current = candidate_next.clone();
    loop {
        if !seen.insert(current.clone()) {
            return false;
        }
        match lookup(&current) {
            Some(next) => current = next,
            None => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use std::collections::BTreeMap;

    fn sample(id: &str, status: Status) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId::from_hex(id),
            scope: Scope::new("t1", "u1"),
            content: "x".to_string(),
            embedding_ref: None,
            entities: vec![],
            relations: vec![],
            category: Category::Generic,
            confidence: 5,
            source: "test".to_string(),
            tags: BTreeSet::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            expires_at: None,
            version: 1,
            status,
            superseded_by: None,
            conflict_with: BTreeSet::new(),
            extra_metadata: BTreeMap::new(),
            degraded: false,
            milestone: None,
        }
    }

    #[test]
    fn deprecated_without_successor_is_invalid() {
        let r = sample("a", Status::Deprecated);
        assert!(!r.deprecation_is_valid());
    }

    #[test]
    fn confidence_range_boundaries() {
        assert!(!MemoryRecord::confidence_in_range(0));
        assert!(MemoryRecord::confidence_in_range(1));
        assert!(MemoryRecord::confidence_in_range(10));
        assert!(!MemoryRecord::confidence_in_range(11));
    }

    #[test]
    fn quality_filter_hides_deprecated_and_expired() {
        let dep = sample("a", Status::Deprecated);
        let exp = sample("b", Status::Expired);
        let active = sample("c", Status::Active);
        assert!(!dep.is_quality_filtered_visible(1, false));
        assert!(!exp.is_quality_filtered_visible(1, false));
        assert!(active.is_quality_filtered_visible(1, false));
    }

    #[test]
    fn quality_filter_hides_conflicted_unless_opted_in() {
        let conflicted = sample("a", Status::Conflicted);
        assert!(!conflicted.is_quality_filtered_visible(1, false));
        assert!(conflicted.is_quality_filtered_visible(1, true));
    }

    #[test]
    fn self_supersession_is_rejected() {
        let id = MemoryId::from_hex("a");
        assert!(!supersession_chain_is_acyclic(&id, &id, |_| None));
    }

    #[test]
    fn cyclic_chain_is_rejected() {
        let a = MemoryId::from_hex("a");
        let b = MemoryId::from_hex("b");
        let c = MemoryId::from_hex("c");
        // a -> b -> c -> a would be a cycle once a is asked to supersede b.
        let lookup = move |id: &MemoryId| -> Option<MemoryId> {
            if *id == b {
                Some(c.clone())
            } else if *id == c {
                Some(a.clone())
            } else {
                None
            }
        };
        assert!(!supersession_chain_is_acyclic(&a, &b, lookup));
    }

    #[test]
    fn acyclic_chain_is_accepted() {
        let a = MemoryId::from_hex("a");
        let b = MemoryId::from_hex("b");
        assert!(supersession_chain_is_acyclic(&a, &b, |_| None));
    }
}
