use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::Result;
use crate::ports::graph_store::{GraphNodeMatch, GraphStats};
use crate::ports::{Capabilities, GraphStore};
use crate::schema::{MemoryId, Relation};
use crate::scope::{Scope, ScopeHash};

#[derive(Debug, Clone, Default)]
struct Node {
    memory_ids: Vec<MemoryId>,
}

/// Per-scope entity graph. Nodes are entity names; edges carry the relation
/// type plus the originating memory id so a relation can be retracted when
/// its owning record is deleted.
#[derive(Default)]
struct ScopeGraph {
    graph: StableGraph<Node, (String, MemoryId)>,
    entity_index: HashMap<String, NodeIndex>,
}

impl ScopeGraph {
    fn entity_node(&mut self, entity: &str) -> NodeIndex {
        if let Some(&idx) = self.entity_index.get(entity) {
            return idx;
        }
        let idx = self.graph.add_node(Node::default());
        self.entity_index.insert(entity.to_string(), idx);
        idx
    }
}

#[derive(Default)]
pub struct InMemoryGraphStore {
    scopes: DashMap<ScopeHash, Mutex<ScopeGraph>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_node(&self, scope: &Scope, id: &MemoryId, entities: &[String]) -> Result<()> {
        let entry = self.scopes.entry(scope.hash()).or_default();
        let mut sg = entry.lock().expect("graph mutex poisoned");
        for entity in entities {
            let idx = sg.entity_node(entity);
            let node = &mut sg.graph[idx];
            if !node.memory_ids.contains(id) {
                node.memory_ids.push(id.clone());
            }
        }
        Ok(())
    }

    async fn upsert_relations(&self, scope: &Scope, id: &MemoryId, relations: &[Relation]) -> Result<()> {
        let entry = self.scopes.entry(scope.hash()).or_default();
        let mut sg = entry.lock().expect("graph mutex poisoned");
        for relation in relations {
            let src = sg.entity_node(&relation.src_entity);
            let dst = sg.entity_node(&relation.dst_entity);
            sg.graph.add_edge(src, dst, (relation.relation_type.clone(), id.clone()));
        }
        Ok(())
    }

    async fn delete_node(&self, scope: &Scope, id: &MemoryId) -> Result<()> {
        let Some(entry) = self.scopes.get(&scope.hash()) else {
            return Ok(());
        };
        let mut sg = entry.lock().expect("graph mutex poisoned");
        let edges_to_remove: Vec<_> = sg
            .graph
            .edge_indices()
            .filter(|&e| sg.graph[e].1 == *id)
            .collect();
        for edge in edges_to_remove {
            sg.graph.remove_edge(edge);
        }
        let node_indices: Vec<NodeIndex> = sg.graph.node_indices().collect();
        for idx in node_indices {
            sg.graph[idx].memory_ids.retain(|existing| existing != id);
        }
        Ok(())
    }

    async fn neighborhood(&self, scope: &Scope, entity: &str, max_hops: u32) -> Result<Vec<MemoryId>> {
        let Some(entry) = self.scopes.get(&scope.hash()) else {
            return Ok(Vec::new());
        };
        let sg = entry.lock().expect("graph mutex poisoned");
        let Some(&start) = sg.entity_index.get(entity) else {
            return Ok(Vec::new());
        };

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        visited.insert(start);
        let mut ids: HashSet<MemoryId> = sg.graph[start].memory_ids.iter().cloned().collect();

        let mut frontier = vec![start];
        for _ in 0..max_hops {
            let mut next_frontier = Vec::new();
            for idx in frontier {
                for neighbor in sg.graph.neighbors_undirected(idx) {
                    if visited.insert(neighbor) {
                        ids.extend(sg.graph[neighbor].memory_ids.iter().cloned());
                        next_frontier.push(neighbor);
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        Ok(ids.into_iter().collect())
    }

    async fn search(&self, scope: &Scope, query_terms: &[String], top_k: usize) -> Result<Vec<GraphNodeMatch>> {
        let Some(entry) = self.scopes.get(&scope.hash()) else {
            return Ok(Vec::new());
        };
        let sg = entry.lock().expect("graph mutex poisoned");
        let needles: Vec<String> = query_terms.iter().map(|t| t.to_lowercase()).collect();
        if needles.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores: HashMap<MemoryId, f32> = HashMap::new();
        for (entity_name, &idx) in &sg.entity_index {
            let entity_lower = entity_name.to_lowercase();
            let hits = needles
                .iter()
                .filter(|needle| entity_lower == **needle || entity_lower.contains(needle.as_str()) || needle.contains(entity_lower.as_str()))
                .count();
            if hits == 0 {
                continue;
            }
            for mem_id in &sg.graph[idx].memory_ids {
                *scores.entry(mem_id.clone()).or_insert(0.0) += hits as f32;
            }
        }

        let max_score = scores.values().cloned().fold(0.0_f32, f32::max).max(1.0);
        let mut matches: Vec<GraphNodeMatch> = scores
            .into_iter()
            .map(|(id, score)| GraphNodeMatch { id, score: (score / max_score).min(1.0) })
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn relations_for_entity(&self, scope: &Scope, entity: &str) -> Result<Vec<Relation>> {
        let Some(entry) = self.scopes.get(&scope.hash()) else {
            return Ok(Vec::new());
        };
        let sg = entry.lock().expect("graph mutex poisoned");
        let Some(&idx) = sg.entity_index.get(entity) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for edge in sg.graph.edges_directed(idx, Direction::Outgoing) {
            let dst_entity = sg
                .entity_index
                .iter()
                .find(|(_, &v)| v == edge.target())
                .map(|(k, _)| k.clone())
                .unwrap_or_default();
            out.push(Relation {
                src_entity: entity.to_string(),
                relation_type: edge.weight().0.clone(),
                dst_entity,
            });
        }
        Ok(out)
    }

    async fn stats(&self, scope: &Scope) -> Result<GraphStats> {
        let Some(entry) = self.scopes.get(&scope.hash()) else {
            return Ok(GraphStats::default());
        };
        let sg = entry.lock().expect("graph mutex poisoned");
        Ok(GraphStats {
            node_count: sg.graph.node_count(),
            edge_count: sg.graph.edge_count(),
        })
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_metadata_filter: false,
            supports_batch: false,
            supports_transactions: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn neighborhood_finds_direct_and_one_hop_hits() {
        let store = InMemoryGraphStore::new();
        let scope = Scope::new("t1", "u1");
        let id = MemoryId::from_hex("11111111111111111111111111111111");
        store.upsert_node(&scope, &id, &["Service".to_string(), "PostgreSQL".to_string()]).await.unwrap();
        store
            .upsert_relations(
                &scope,
                &id,
                &[Relation { src_entity: "Service".to_string(), relation_type: "uses".to_string(), dst_entity: "PostgreSQL".to_string() }],
            )
            .await
            .unwrap();

        let hits = store.neighborhood(&scope, "Service", 2).await.unwrap();
        assert!(hits.contains(&id));
    }

    #[tokio::test]
    async fn neighborhood_respects_max_hops() {
        let store = InMemoryGraphStore::new();
        let scope = Scope::new("t1", "u1");
        let near = MemoryId::from_hex("44444444444444444444444444444444");
        let far = MemoryId::from_hex("55555555555555555555555555555555");
        store.upsert_node(&scope, &near, &["A".to_string(), "B".to_string()]).await.unwrap();
        store.upsert_node(&scope, &far, &["C".to_string(), "D".to_string()]).await.unwrap();
        store
            .upsert_relations(&scope, &near, &[Relation { src_entity: "A".to_string(), relation_type: "uses".to_string(), dst_entity: "B".to_string() }])
            .await
            .unwrap();
        store
            .upsert_relations(&scope, &far, &[Relation { src_entity: "B".to_string(), relation_type: "uses".to_string(), dst_entity: "C".to_string() }])
            .await
            .unwrap();

        let one_hop = store.neighborhood(&scope, "A", 1).await.unwrap();
        assert!(!one_hop.contains(&far), "two hops away must not appear within a 1-hop neighborhood");

        let two_hops = store.neighborhood(&scope, "A", 2).await.unwrap();
        assert!(two_hops.contains(&far), "two hops away must appear within a 2-hop neighborhood");
    }

    #[tokio::test]
    async fn search_matches_entity_name_by_text() {
        let store = InMemoryGraphStore::new();
        let scope = Scope::new("t1", "u1");
        let id = MemoryId::from_hex("66666666666666666666666666666666");
        store.upsert_node(&scope, &id, &["PostgreSQL".to_string()]).await.unwrap();

        let hits = store.search(&scope, &["postgresql".to_string()], 5).await.unwrap();
        assert!(hits.iter().any(|h| h.id == id));
    }

    #[tokio::test]
    async fn delete_node_retracts_edges() {
        let store = InMemoryGraphStore::new();
        let scope = Scope::new("t1", "u1");
        let id = MemoryId::from_hex("33333333333333333333333333333333");
        store.upsert_node(&scope, &id, &["A".to_string(), "B".to_string()]).await.unwrap();
        store
            .upsert_relations(&scope, &id, &[Relation { src_entity: "A".to_string(), relation_type: "uses".to_string(), dst_entity: "B".to_string() }])
            .await
            .unwrap();
        store.delete_node(&scope, &id).await.unwrap();
        let relations = store.relations_for_entity(&scope, "A").await.unwrap();
        assert!(relations.is_empty());
    }
}
