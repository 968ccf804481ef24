//! Quality audit & project-state rollups (`spec.md` §4.8): `ValidateProject`,
//! `AuditQuality`, `GetProjectState`, `TrackEvolution`, `GetEntityRelationships`.

use std::collections::BTreeMap;

use tracing::instrument;

use crate::error::Result;
use crate::schema::{MemoryRecord, Status};
use crate::scope::Scope;

#[derive(Debug, Clone, Default)]
pub struct QualityReport {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub expired_count: usize,
    pub conflicted_count: usize,
    pub average_confidence: f32,
    pub metadata_coverage: f32,
    pub quality_score: f32,
    pub recommendations: Vec<String>,
}

pub type ValidationReport = QualityReport;

#[derive(Debug, Clone, Default)]
pub struct ProjectState {
    pub milestones: Vec<MemoryRecord>,
    pub latest_status: Option<MemoryRecord>,
    pub phase: String,
}

#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub entries: Vec<MemoryRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct EntityRelationships {
    pub direct_mentions: usize,
    pub related_entities: Vec<String>,
    pub relationship_types: Vec<String>,
    pub connection_strength: f32,
}

impl super::MemoryEngine {
    /// `ValidateProject` (`spec.md` §4.8 and §6).
    #[instrument(skip(self))]
    pub async fn validate_project_context(&self, scope: &Scope) -> Result<ValidationReport> {
        self.quality_report_for(scope).await
    }

    /// `AuditQuality` over a single scope; the cross-scope variant is an
    /// operator-identity-gated concern for the transport layer, out of
    /// this crate's scope (`spec.md` §4.8).
    #[instrument(skip(self))]
    pub async fn audit_memory_quality(&self, scope: &Scope) -> Result<QualityReport> {
        self.quality_report_for(scope).await
    }

    async fn quality_report_for(&self, scope: &Scope) -> Result<QualityReport> {
        let records = self.ctx.vector_store.list(scope).await?;
        let total = records.len();
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        let mut expired_count = 0;
        let mut conflicted_count = 0;
        let mut confidence_sum = 0u32;
        let mut with_metadata = 0;

        for record in &records {
            *by_status.entry(status_label(record.status).to_string()).or_insert(0) += 1;
            *by_category.entry(record.category.slug().to_string()).or_insert(0) += 1;
            if record.status == Status::Expired {
                expired_count += 1;
            }
            if record.status == Status::Conflicted {
                conflicted_count += 1;
            }
            confidence_sum += record.confidence as u32;
            if !record.extra_metadata.is_empty() {
                with_metadata += 1;
            }
        }

        let average_confidence = if total > 0 { confidence_sum as f32 / total as f32 } else { 0.0 };
        let metadata_coverage = if total > 0 { with_metadata as f32 / total as f32 } else { 0.0 };
        let active_ratio = if total > 0 {
            *by_status.get(status_label(Status::Active)).unwrap_or(&0) as f32 / total as f32
        } else {
            0.0
        };
        let conflict_penalty = if total > 0 { conflicted_count as f32 / total as f32 } else { 0.0 };

        let audit = &self.ctx.config.audit;
        let quality_score = (audit.weight_active_ratio * active_ratio
            + audit.weight_avg_confidence * (average_confidence / 10.0)
            + audit.weight_metadata_coverage * metadata_coverage
            - audit.weight_conflict_penalty * conflict_penalty)
            .clamp(0.0, 1.0);

        let mut recommendations = Vec::new();
        if conflicted_count > 0 {
            recommendations.push("resolve conflicts".to_string());
        }
        if expired_count > 0 {
            recommendations.push("review expired memories for relevance".to_string());
        }
        if metadata_coverage < 0.3 {
            recommendations.push("enrich records with extra_metadata for better audits".to_string());
        }

        Ok(QualityReport {
            total,
            by_status,
            by_category,
            expired_count,
            conflicted_count,
            average_confidence,
            metadata_coverage,
            quality_score,
            recommendations,
        })
    }

    /// `GetProjectState` (`spec.md` §4.8): last `limit` milestones plus the
    /// most recent status record, with a derived phase.
    #[instrument(skip(self))]
    pub async fn get_current_project_state(&self, scope: &Scope, project_id: &str, limit: usize) -> Result<ProjectState> {
        let records = project_records(&self.ctx, scope, project_id).await?;
        let limit = if limit == 0 { 5 } else { limit };

        let mut milestones: Vec<MemoryRecord> = records
            .iter()
            .filter(|r| r.category == crate::schema::Category::Milestone)
            .cloned()
            .collect();
        milestones.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        milestones.truncate(limit);

        let latest_status = records
            .iter()
            .filter(|r| r.category == crate::schema::Category::Status)
            .max_by_key(|r| r.created_at)
            .cloned();

        let phase = match milestones.len() {
            0 => "planning",
            1..=2 => "in_progress",
            3..=4 => "advanced",
            _ => "mature",
        }
        .to_string();

        Ok(ProjectState { milestones, latest_status, phase })
    }

    /// `TrackEvolution` (`spec.md` §4.8): the full timeline including
    /// deprecated records, ordered by `created_at`.
    #[instrument(skip(self))]
    pub async fn track_project_evolution(&self, scope: &Scope, project_id: &str, limit: Option<usize>) -> Result<Timeline> {
        let mut records = project_records(&self.ctx, scope, project_id).await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(Timeline { entries: records })
    }

    /// `GetEntityRelationships` (`spec.md` §6).
    #[instrument(skip(self))]
    pub async fn get_entity_relationships(&self, scope: &Scope, entity_name: &str) -> Result<EntityRelationships> {
        let relations = self.ctx.graph_store.relations_for_entity(scope, entity_name).await?;
        let direct_mentions = relations.len();
        let mut related_entities: Vec<String> = relations.iter().map(|r| r.dst_entity.clone()).collect();
        related_entities.sort();
        related_entities.dedup();
        let mut relationship_types: Vec<String> = relations.iter().map(|r| r.relation_type.clone()).collect();
        relationship_types.sort();
        relationship_types.dedup();

        let stats = self.ctx.graph_store.stats(scope).await?;
        let connection_strength = if stats.edge_count > 0 {
            (direct_mentions as f32 / stats.edge_count as f32).min(1.0)
        } else {
            0.0
        };

        Ok(EntityRelationships { direct_mentions, related_entities, relationship_types, connection_strength })
    }
}

async fn project_records(ctx: &crate::context::Context, scope: &Scope, project_id: &str) -> Result<Vec<MemoryRecord>> {
    let project_scope = Scope { project: Some(project_id.to_string()), ..scope.clone() };
    ctx.vector_store.list(&project_scope).await
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Active => "active",
        Status::Deprecated => "deprecated",
        Status::Conflicted => "conflicted",
        Status::Expired => "expired",
    }
}
