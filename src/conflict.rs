//! Conflict detection heuristics run by the dual-write coordinator's step 6
//! (`spec.md` §4.5) once two records in the same scope/category exceed
//! `τ_conflict` vector similarity.

use crate::config::ConflictConfig;
use crate::fingerprint::Normalizer;
use crate::schema::MemoryRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    Negation,
    KeyValueMismatch,
    RelationValueMismatch,
    MutuallyExclusiveTags,
}

/// Runs every configured heuristic against a candidate/incumbent pair and
/// returns the first one that fires, if any. Heuristics are intentionally
/// independent and order-insensitive: a caller swapping `a`/`b` gets the
/// same verdict.
pub fn detect(
    a: &MemoryRecord,
    b: &MemoryRecord,
    config: &ConflictConfig,
    normalizer: &dyn Normalizer,
) -> Option<ConflictReason> {
    if let Some(tags) = mutually_exclusive_tags(a, b, config) {
        return Some(tags);
    }
    if negation_mismatch(a, b, config, normalizer) {
        return Some(ConflictReason::Negation);
    }
    if key_value_mismatch(a, b) {
        return Some(ConflictReason::KeyValueMismatch);
    }
    if relation_value_mismatch(a, b) {
        return Some(ConflictReason::RelationValueMismatch);
    }
    None
}

/// One side asserts a statement and the other asserts its negation, e.g.
/// "the service uses PostgreSQL" vs. "the service does not use PostgreSQL".
/// Detected by stripping configured negation tokens from both sides and
/// checking whether the remainder overlaps heavily while one side carried a
/// negation token and the other did not.
fn negation_mismatch(a: &MemoryRecord, b: &MemoryRecord, config: &ConflictConfig, normalizer: &dyn Normalizer) -> bool {
    let norm_a = normalizer.normalize(&a.content);
    let norm_b = normalizer.normalize(&b.content);

    let a_negated = config.negation_tokens.iter().any(|token| norm_a.contains(token.as_str()));
    let b_negated = config.negation_tokens.iter().any(|token| norm_b.contains(token.as_str()));
    if a_negated == b_negated {
        return false;
    }

    let strip = |text: &str| -> Vec<String> {
        let mut words: Vec<String> = text
            .split_whitespace()
            .filter(|word| !config.negation_tokens.iter().any(|token| token == word))
            .map(|w| w.to_string())
            .collect();
        words.sort();
        words
    };
    let stripped_a = strip(&norm_a);
    let stripped_b = strip(&norm_b);
    let overlap = stripped_a.iter().filter(|w| stripped_b.contains(w)).count();
    let denom = stripped_a.len().max(stripped_b.len()).max(1);
    (overlap as f32 / denom as f32) >= 0.6
}

/// `"key: value"` style assertions where the key matches but the value
/// differs, e.g. "port: 5432" vs. "port: 5433".
fn key_value_mismatch(a: &MemoryRecord, b: &MemoryRecord) -> bool {
    let parse = |text: &str| -> Option<(String, String)> {
        let (key, value) = text.split_once(':')?;
        Some((key.trim().to_lowercase(), value.trim().to_lowercase()))
    };
    match (parse(&a.content), parse(&b.content)) {
        (Some((ka, va)), Some((kb, vb))) => ka == kb && va != vb,
        _ => false,
    }
}

/// Both records carry a `(subject, relation)` assertion extracted by the
/// graph leg that points at a different object, e.g. "Service uses
/// PostgreSQL" vs. "Service uses MongoDB" — the natural-language analogue of
/// `key_value_mismatch` for relations the extractor already pulled out, so
/// this needs no extra tokenization beyond what `entities`/`relations`
/// already store on the record.
fn relation_value_mismatch(a: &MemoryRecord, b: &MemoryRecord) -> bool {
    a.relations.iter().any(|ra| {
        b.relations
            .iter()
            .any(|rb| ra.src_entity.eq_ignore_ascii_case(&rb.src_entity) && ra.relation_type == rb.relation_type && !ra.dst_entity.eq_ignore_ascii_case(&rb.dst_entity))
    })
}

fn mutually_exclusive_tags(a: &MemoryRecord, b: &MemoryRecord, config: &ConflictConfig) -> Option<ConflictReason> {
    for (left, right) in &config.mutually_exclusive_tags {
        let a_left = a.tags.contains(left);
        let a_right = a.tags.contains(right);
        let b_left = b.tags.contains(left);
        let b_right = b.tags.contains(right);
        if (a_left && b_right) || (a_right && b_left) {
            return Some(ConflictReason::MutuallyExclusiveTags);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::DefaultNormalizer;
    use crate::schema::{Category, MemoryId, Status};
    use crate::scope::Scope;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    fn record(content: &str, tags: &[&str]) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId::from_hex("11111111111111111111111111111111"),
            scope: Scope::new("t1", "u1"),
            content: content.to_string(),
            embedding_ref: None,
            entities: vec![],
            relations: vec![],
            category: Category::Generic,
            confidence: 5,
            source: "test".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            expires_at: None,
            version: 1,
            status: Status::Active,
            superseded_by: None,
            conflict_with: BTreeSet::new(),
            extra_metadata: BTreeMap::new(),
            degraded: false,
            milestone: None,
        }
    }

    #[test]
    fn detects_negation_conflict() {
        let a = record("the service uses postgresql for storage", &[]);
        let b = record("the service does not use postgresql for storage", &[]);
        let config = ConflictConfig::default();
        assert_eq!(detect(&a, &b, &config, &DefaultNormalizer), Some(ConflictReason::Negation));
    }

    #[test]
    fn detects_key_value_mismatch() {
        let a = record("port: 5432", &[]);
        let b = record("port: 5433", &[]);
        let config = ConflictConfig::default();
        assert_eq!(detect(&a, &b, &config, &DefaultNormalizer), Some(ConflictReason::KeyValueMismatch));
    }

    #[test]
    fn detects_relation_value_mismatch() {
        use crate::schema::Relation;
        let mut a = record("the service uses postgresql", &[]);
        a.relations = vec![Relation { src_entity: "service".to_string(), relation_type: "uses".to_string(), dst_entity: "PostgreSQL".to_string() }];
        let mut b = record("the service uses mongodb", &[]);
        b.relations = vec![Relation { src_entity: "service".to_string(), relation_type: "uses".to_string(), dst_entity: "MongoDB".to_string() }];
        let config = ConflictConfig::default();
        assert_eq!(detect(&a, &b, &config, &DefaultNormalizer), Some(ConflictReason::RelationValueMismatch));
    }

    #[test]
    fn detects_mutually_exclusive_tags() {
        let a = record("cache is a temporary workaround", &["temporary"]);
        let b = record("cache is the permanent solution", &["permanent"]);
        let config = ConflictConfig::default();
        assert_eq!(detect(&a, &b, &config, &DefaultNormalizer), Some(ConflictReason::MutuallyExclusiveTags));
    }

    #[test]
    fn unrelated_statements_do_not_conflict() {
        let a = record("the team uses rust", &[]);
        let b = record("the deploy runs on kubernetes", &[]);
        let config = ConflictConfig::default();
        assert_eq!(detect(&a, &b, &config, &DefaultNormalizer), None);
    }
}
