//! Engine configuration — one serde/`toml`-backed struct per concern,
//! mirroring the teacher workspace's `AppConfig` pattern (nested sub-structs,
//! each with literal defaults, loaded with a fallback to `Default`).

use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::schema::Category;

/// Combined-score ranking weights (`spec.md` §4.6): `s = α·sv + β·sg +
/// γ·confidence/10 + δ·freshness`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub alpha_vector: f32,
    pub beta_graph: f32,
    pub gamma_confidence: f32,
    pub delta_freshness: f32,
    /// `freshness = exp(-age_days / tau_freshness_days)`.
    pub tau_freshness_days: f32,
    pub default_context_k: usize,
    pub default_min_confidence: u8,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            alpha_vector: 0.55,
            beta_graph: 0.25,
            gamma_confidence: 0.15,
            delta_freshness: 0.05,
            tau_freshness_days: 14.0,
            default_context_k: 5,
            default_min_confidence: 7,
        }
    }
}

/// Conflict-detection thresholds and token lists (`spec.md` §4.5, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// `τ_conflict` — vector similarity threshold above which two memories
    /// in the same scope/category are compared for contradiction.
    pub tau_conflict: f32,
    /// Negation markers checked across the supplied tokenizer's tokens.
    /// `spec.md` §9 flags the source's hardcoded Russian-substring check;
    /// this list is configurable instead of hardcoded to one language.
    pub negation_tokens: Vec<String>,
    /// Tag pairs considered mutually exclusive (each inner vec has exactly
    /// two entries).
    pub mutually_exclusive_tags: Vec<(String, String)>,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            tau_conflict: 0.85,
            negation_tokens: vec![
                "not".to_string(),
                "never".to_string(),
                "no longer".to_string(),
                "cannot".to_string(),
                "doesn't".to_string(),
                "does not".to_string(),
                "никогда".to_string(),
                "не".to_string(),
            ],
            mutually_exclusive_tags: vec![
                ("temporary".to_string(), "permanent".to_string()),
                ("deprecated".to_string(), "current".to_string()),
            ],
        }
    }
}

/// Query-result cache TTL and write-lock TTL (`spec.md` §4.3, §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub search_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { search_ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Write-budget safety margin added to the per-request deadline to
    /// compute the lock TTL (`spec.md` §4.3 step 3).
    pub write_budget_ms: u64,
    pub safety_margin_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            write_budget_ms: 2_000,
            safety_margin_ms: 500,
        }
    }
}

/// Expiry sweep cadence (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub period_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { period_secs: 60 }
    }
}

/// Compensation-queue retry policy (`spec.md` §4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CompensationConfig {
    pub base_backoff_secs: u64,
    pub backoff_factor: u32,
    pub max_backoff_secs: u64,
    pub max_attempts: u32,
    /// Bounded-channel capacity; a full queue sheds new tasks rather than
    /// growing unbounded (`spec.md` §4.7: "bounded concurrency").
    pub queue_capacity: usize,
    /// Max compensation tasks retried concurrently.
    pub max_concurrent: usize,
}

impl Default for CompensationConfig {
    fn default() -> Self {
        Self {
            base_backoff_secs: 1,
            backoff_factor: 2,
            max_backoff_secs: 60,
            max_attempts: 5,
            queue_capacity: 1024,
            max_concurrent: 8,
        }
    }
}

/// Weights for the `AuditQuality` quality-score aggregate. `spec.md` §9
/// flags the source's magic-coefficient weighted sum as an open question;
/// this config makes the weights explicit and overridable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub weight_active_ratio: f32,
    pub weight_avg_confidence: f32,
    pub weight_metadata_coverage: f32,
    pub weight_conflict_penalty: f32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            weight_active_ratio: 0.4,
            weight_avg_confidence: 0.3,
            weight_metadata_coverage: 0.1,
            weight_conflict_penalty: 0.2,
        }
    }
}

/// Per-port-call timeout budget (`spec.md` §5: "each port call receives
/// `min(remaining_deadline, per-port-budget)`").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub per_port_budget_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { per_port_budget_ms: 1_500 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retrieval: RetrievalConfig,
    pub conflict: ConflictConfig,
    pub cache: CacheConfig,
    pub lock: LockConfig,
    pub sweep: SweepConfig,
    pub compensation: CompensationConfig,
    pub audit: AuditConfig,
    pub timeouts: TimeoutConfig,
}

impl EngineConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Resolve a caller-supplied confidence/TTL pair against the
    /// per-category defaults, honoring "caller's value wins" (`spec.md`
    /// §4.4).
    pub fn resolve_confidence(&self, category: Category, caller_value: Option<u8>) -> u8 {
        caller_value.unwrap_or_else(|| crate::schema::category_default(category).confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_weights_sum_to_one() {
        let cfg = RetrievalConfig::default();
        let sum = cfg.alpha_vector + cfg.beta_graph + cfg.gamma_confidence + cfg.delta_freshness;
        assert!((sum - 1.0).abs() < 1e-6, "weights must sum to 1.0, got {sum}");
    }

    #[test]
    fn default_tau_conflict_matches_spec() {
        assert_eq!(ConflictConfig::default().tau_conflict, 0.85);
    }

    #[test]
    fn caller_supplied_confidence_wins_over_category_default() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.resolve_confidence(Category::Architecture, Some(3)), 3);
        assert_eq!(cfg.resolve_confidence(Category::Architecture, None), 8);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = EngineConfig::default();
        let rendered = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: EngineConfig = toml::from_str(&rendered).expect("deserialize");
        assert_eq!(parsed.retrieval.alpha_vector, cfg.retrieval.alpha_vector);
    }
}
