//! Content-addressed ID service and scoped cache/lock key derivation
//! (`spec.md` §4.2).

use sha2::{Digest, Sha256};

use crate::schema::MemoryId;
use crate::scope::{Scope, ScopeHash};

/// Normalizes free text before it is hashed for fingerprinting or compared
/// for conflict detection.
///
/// `spec.md` §9 flags the source's hardcoded Russian-substring negation
/// check as a design smell and asks for a pluggable tokenizer instead; this
/// trait is the seam. The default implementation trims and lowercases via
/// `str::to_lowercase`, which NFKC-normalizes case for the common Latin and
/// Cyrillic alphabets this crate targets.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNormalizer;

impl Normalizer for DefaultNormalizer {
    fn normalize(&self, text: &str) -> String {
        text.trim().to_lowercase()
    }
}

/// `id = H(canonical(scope) ‖ 0x1F ‖ normalize(content))`, truncated to a
/// 128-bit (32 hex char) identifier.
pub fn fingerprint(scope: &Scope, content: &str, normalizer: &dyn Normalizer) -> MemoryId {
    let normalized = normalizer.normalize(content);
    let mut hasher = Sha256::new();
    hasher.update(scope.canonical().as_bytes());
    hasher.update([0x1F]);
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    MemoryId::from_hex(&format!("{digest:x}")[..32])
}

/// `mem:v1:{scope_hash}:search:{H(query_filter)}`
pub fn search_cache_key(scope_hash: &ScopeHash, query_filter_hash: &str) -> String {
    format!("mem:v1:{scope_hash}:search:{query_filter_hash}")
}

/// `mem:v1:{scope_hash}:context:{H(query)}`
pub fn context_cache_key(scope_hash: &ScopeHash, query_hash: &str) -> String {
    format!("mem:v1:{scope_hash}:context:{query_hash}")
}

/// `mem:v1:{scope_hash}:id:{id}`
pub fn id_cache_key(scope_hash: &ScopeHash, id: &MemoryId) -> String {
    format!("mem:v1:{scope_hash}:id:{id}")
}

/// Cache-key prefix invalidated on every write within a scope.
pub fn scope_cache_prefix(scope_hash: &ScopeHash) -> String {
    format!("mem:v1:{scope_hash}:")
}

/// `lock:mem:{scope_hash}:{id}`
pub fn write_lock_key(scope_hash: &ScopeHash, id: &MemoryId) -> String {
    format!("lock:mem:{scope_hash}:{id}")
}

/// `lock:resolve:{scope_hash}:{H(id_set)}`
pub fn resolve_lock_key(scope_hash: &ScopeHash, ids: &[MemoryId]) -> String {
    let mut sorted: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    hasher.update(sorted.join(",").as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("lock:resolve:{scope_hash}:{}", &digest[..16])
}

/// Stable hash of an arbitrary query/filter payload, used to key the
/// search/context result cache.
pub fn hash_payload(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_identical_input() {
        let scope = Scope::new("t1", "u1");
        let a = fingerprint(&scope, "The service uses PostgreSQL", &DefaultNormalizer);
        let b = fingerprint(&scope, "  The Service Uses PostgreSQL  ", &DefaultNormalizer);
        assert_eq!(a, b, "trimming/casing must not change the fingerprint");
    }

    #[test]
    fn fingerprint_differs_across_scopes() {
        let a_scope = Scope::new("t1", "u1");
        let b_scope = Scope::new("t1", "u2");
        let a = fingerprint(&a_scope, "same content", &DefaultNormalizer);
        let b = fingerprint(&b_scope, "same content", &DefaultNormalizer);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_differs_across_content() {
        let scope = Scope::new("t1", "u1");
        let a = fingerprint(&scope, "uses postgres", &DefaultNormalizer);
        let b = fingerprint(&scope, "uses mongodb", &DefaultNormalizer);
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_lock_key_is_order_independent() {
        let scope_hash = ScopeHash("abc".to_string());
        let id1 = MemoryId::from_hex("11111111111111111111111111111111");
        let id2 = MemoryId::from_hex("22222222222222222222222222222222");
        assert_eq!(
            resolve_lock_key(&scope_hash, &[id1.clone(), id2.clone()]),
            resolve_lock_key(&scope_hash, &[id2, id1]),
        );
    }
}
