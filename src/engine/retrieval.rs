//! Hybrid retrieval (`spec.md` §4.6): `Search` / `GetContext` / `GetAll` /
//! `Get`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use tracing::instrument;

use crate::context::Context;
use crate::error::{MemoryError, Result};
use crate::fingerprint;
use crate::schema::{Category, MemoryId, MemoryRecord, Status};
use crate::scope::Scope;

/// Max hops the graph path's `neighborhood` traversal walks per entity
/// (`spec.md` §4.6 step 2: "`neighborhood(scope, entity, max_hops=2)`").
const NEIGHBORHOOD_MAX_HOPS: u32 = 2;

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub category: Option<Category>,
    pub tag: Option<String>,
    pub min_confidence: Option<u8>,
    pub include_conflicted: bool,
    pub include_deprecated: bool,
    pub include_expired: bool,
}

#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    pub score: f32,
    pub vector_score: f32,
    pub graph_score: f32,
}

/// `spec.md` §4.1's read-path degrade contract: if either backend's leg of
/// the fanout failed, the caller still gets the other leg's results but
/// must be told the read is `degraded`.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub matches: Vec<ScoredMemory>,
    pub degraded: bool,
}

impl super::MemoryEngine {
    #[instrument(skip(self, query))]
    pub async fn search(&self, scope: &Scope, query: &str, k: usize, filter: SearchFilter) -> Result<SearchResult> {
        let cache_key = fingerprint::search_cache_key(&scope.hash(), &fingerprint::hash_payload(&format!("{query}|{k}|{filter:?}")));
        search_impl(&self.ctx, scope, query, k, filter, &cache_key).await
    }

    /// `GetContext` — the active-only, quality-gated preset over [`search`].
    #[instrument(skip(self, query))]
    pub async fn get_context(&self, scope: &Scope, query: &str, min_confidence: Option<u8>, k: Option<usize>) -> Result<SearchResult> {
        let filter = SearchFilter {
            min_confidence: Some(min_confidence.unwrap_or(self.ctx.config.retrieval.default_min_confidence)),
            ..Default::default()
        };
        let k = k.unwrap_or(self.ctx.config.retrieval.default_context_k);
        let cache_key = fingerprint::context_cache_key(&scope.hash(), &fingerprint::hash_payload(&format!("{query}|{k}|{filter:?}")));
        search_impl(&self.ctx, scope, query, k, filter, &cache_key).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, scope: &Scope, id: &MemoryId) -> Result<MemoryRecord> {
        self.ctx
            .vector_store
            .get(scope, id)
            .await?
            .ok_or_else(|| MemoryError::not_found(format!("no record {id} in scope")).with_id(id.clone()))
    }

    /// `GetAll` with a simple lexicographic-id cursor: pass the last-seen id
    /// back in to resume. Page size is the caller's `k`, floored at 1.
    #[instrument(skip(self))]
    pub async fn get_all(&self, scope: &Scope, cursor: Option<&MemoryId>, page_size: usize) -> Result<Vec<MemoryRecord>> {
        let mut records = self.ctx.vector_store.list(scope).await?;
        records.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        let start = match cursor {
            Some(after) => records.iter().position(|r| r.id == *after).map(|idx| idx + 1).unwrap_or(0),
            None => 0,
        };
        let page_size = page_size.max(1);
        Ok(records.into_iter().skip(start).take(page_size).collect())
    }
}

async fn search_impl(
    ctx: &Context,
    scope: &Scope,
    query: &str,
    k: usize,
    filter: SearchFilter,
    cache_key: &str,
) -> Result<SearchResult> {
    // 1. Cache check. A cached result was only ever written for a
    // non-degraded read (see step 6), so a hit is always non-degraded.
    if let Some(cached) = ctx.cache.get(cache_key).await? {
        if let Ok((ids, _)) = bincode::serde::decode_from_slice::<Vec<MemoryId>, _>(&cached, bincode::config::standard()) {
            let mut hydrated = Vec::new();
            for id in ids {
                if let Some(record) = ctx.vector_store.get(scope, &id).await? {
                    hydrated.push(ScoredMemory { record, score: 0.0, vector_score: 0.0, graph_score: 0.0 });
                }
            }
            return Ok(SearchResult { matches: hydrated, degraded: false });
        }
    }

    // 2. Parallel fanout, each leg budgeted against the request deadline
    // (`spec.md` §5).
    let k_vec = k.max(2 * k).max(1);
    let k_graph = (2 * k).max(1);
    let deadline = ctx.fresh_deadline();
    let (embedding_result, extraction_result) = tokio::join!(
        ctx.budgeted(deadline, ctx.embedder.embed(query)),
        ctx.budgeted(deadline, ctx.extractor.extract(query)),
    );

    let mut vector_degraded = false;
    let vector_matches = match embedding_result {
        Ok(embedding) => match ctx.vector_store.search(scope, &embedding, k_vec).await {
            Ok(matches) => matches,
            Err(_) => {
                vector_degraded = true;
                Vec::new()
            }
        },
        Err(_) => {
            vector_degraded = true;
            Vec::new()
        }
    };

    let mut graph_degraded = false;
    let entities = match extraction_result {
        Ok(extraction) => extraction.entities,
        Err(_) => {
            graph_degraded = true;
            Vec::new()
        }
    };

    // Graph path source 1: per-entity `neighborhood` traversal, aggregated
    // and capped at `k_graph` (`spec.md` §4.6 step 2).
    let mut graph_scores: HashMap<MemoryId, f32> = HashMap::new();
    for entity in &entities {
        match ctx.graph_store.neighborhood(scope, entity, NEIGHBORHOOD_MAX_HOPS).await {
            Ok(ids) => {
                for id in ids {
                    *graph_scores.entry(id).or_insert(0.0) += 1.0;
                }
            }
            Err(_) => graph_degraded = true,
        }
    }

    // Graph path source 2: a direct textual match over entity names,
    // independent of the traversal above (`spec.md` §4.6 step 2).
    let query_terms: Vec<String> = query.split_whitespace().map(|t| t.to_string()).collect();
    match ctx.graph_store.search(scope, &query_terms, k_graph).await {
        Ok(text_matches) => {
            for m in text_matches {
                let entry = graph_scores.entry(m.id).or_insert(0.0);
                *entry = entry.max(m.score);
            }
        }
        Err(_) => graph_degraded = true,
    }

    let graph_max = graph_scores.values().cloned().fold(0.0_f32, f32::max).max(1.0);
    let mut graph_matches: Vec<(MemoryId, f32)> = graph_scores
        .into_iter()
        .map(|(id, score)| (id, (score / graph_max).min(1.0)))
        .collect();
    graph_matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    graph_matches.truncate(k_graph);

    // 3. Rehydrate and dedup.
    let mut scores: HashMap<MemoryId, (f32, f32)> = HashMap::new();
    for m in &vector_matches {
        scores.entry(m.id.clone()).or_insert((0.0, 0.0)).0 = m.similarity;
    }
    for (id, score) in &graph_matches {
        scores.entry(id.clone()).or_insert((0.0, 0.0)).1 = *score;
    }

    let now = ctx.clock.now();
    let mut candidates = Vec::new();
    for (id, (vector_score, graph_score)) in scores {
        let Some(record) = ctx.vector_store.get(scope, &id).await? else {
            continue;
        };

        // 4. Quality filter.
        if !filter.include_deprecated && record.status == Status::Deprecated {
            continue;
        }
        if !filter.include_expired && record.status == Status::Expired {
            continue;
        }
        if !filter.include_conflicted && record.status == Status::Conflicted {
            continue;
        }
        if let Some(min_confidence) = filter.min_confidence {
            if record.confidence < min_confidence {
                continue;
            }
        }
        if let Some(category) = filter.category {
            if record.category != category {
                continue;
            }
        }
        if let Some(tag) = &filter.tag {
            if !record.tags.contains(tag) {
                continue;
            }
        }

        // 5. Rank.
        let age_days = (now - record.created_at).num_seconds() as f32 / 86_400.0;
        let freshness = (-age_days.max(0.0) / ctx.config.retrieval.tau_freshness_days).exp();
        let r = &ctx.config.retrieval;
        let combined = r.alpha_vector * vector_score
            + r.beta_graph * graph_score
            + r.gamma_confidence * (record.confidence as f32 / 10.0)
            + r.delta_freshness * freshness;

        candidates.push(ScoredMemory { record, score: combined, vector_score, graph_score });
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.record.created_at.cmp(&a.record.created_at))
            .then_with(|| a.record.id.as_str().cmp(b.record.id.as_str()))
    });
    candidates.truncate(k);

    let degraded = vector_degraded || graph_degraded;

    // 6. Cache and return. A degraded read is never cached, so a later
    // cache hit can't silently mask a since-recovered backend's results.
    if !degraded {
        let ids: Vec<MemoryId> = candidates.iter().map(|c| c.record.id.clone()).collect();
        if let Ok(encoded) = bincode::serde::encode_to_vec(&ids, bincode::config::standard()) {
            let _ = ctx.cache.set(cache_key, encoded, Duration::from_secs(ctx.config.cache.search_ttl_secs)).await;
        }
    }

    Ok(SearchResult { matches: candidates, degraded })
}
