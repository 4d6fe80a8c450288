//! The Memory Store API (§4.4): the write/read surface for memory units,
//! layered over a [`VectorStore`] and an [`EmbeddingService`].

pub mod provenance;
pub mod query_expansion;
pub mod retrieval;
pub mod trust;
pub mod usage;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::LifecycleConfig;
use crate::embeddings::EmbeddingService;
use crate::lifecycle;
use crate::model::{
    ContextLevel, MemoryCategory, MemoryProvenance, MemoryScope, MemoryUnit, MetadataValue,
    ProvenanceSource,
};
use crate::store::{SearchFilters, VectorStore};
use crate::{Error, Result};

use query_expansion::RecentQuery;
use trust::TrustSignals;

/// A single search hit (§4.5): the stored unit, its lifecycle-reweighted
/// score, and the trust signals computed for it.
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub unit: MemoryUnit,
    pub score: f32,
    pub trust: TrustSignals,
}

/// The pipeline inputs shared by [`MemoryStore::retrieve`] and the
/// specialized wrappers in [`retrieval`]: everything `run_search` needs
/// besides the query text and filters.
pub(crate) struct RetrievalContext<'a> {
    pub store: &'a dyn VectorStore,
    pub embeddings: &'a EmbeddingService,
    pub lifecycle_config: &'a LifecycleConfig,
    pub query_expansion_threshold: f32,
    pub query_expansion_enabled: bool,
}

/// Expand the query against recent history, embed it, run the filtered k-NN
/// search, reweight by lifecycle, and attach trust signals to each hit.
///
/// Contradiction/duplicate relationships are not recomputed here:
/// `has_contradiction`/`related_count` are reported as `false`/`0`, since
/// their true values come from the O(n^2) category-wide scans in
/// [`crate::consolidation`], which run as periodic jobs rather than per
/// query.
pub(crate) async fn run_search(
    ctx: &RetrievalContext<'_>,
    query: &str,
    recent_queries: &[RecentQuery<'_>],
    filters: Option<&SearchFilters>,
    limit: usize,
) -> Result<Vec<RetrievedMemory>> {
    let embeddings = ctx.embeddings;
    let expanded = query_expansion::expand_query(
        query,
        recent_queries,
        ctx.query_expansion_threshold,
        ctx.query_expansion_enabled,
        |text| async move { embeddings.generate(&text).await },
    )
    .await;

    let vector = ctx.embeddings.generate(&expanded).await?;
    let hits = ctx.store.retrieve(&vector, filters, limit).await?;

    let now = Utc::now();
    let reweighted = lifecycle::reweight_by_lifecycle(hits, ctx.lifecycle_config, now);

    let mut enriched = Vec::with_capacity(reweighted.len());
    for (unit, score) in reweighted {
        let use_count = usage::usage_stats(ctx.store, unit.id).await?.map(|u| u.use_count).unwrap_or(0);
        let trust = trust::compute_trust_signals(&unit, score, use_count, false, 0, now);
        if let Err(e) = usage::record_usage(ctx.store, unit.id, score).await {
            tracing::warn!("best-effort usage update failed for {}: {e}", unit.id);
        }
        enriched.push(RetrievedMemory { unit, score, trust });
    }

    Ok(enriched)
}

/// Provenance context supplied alongside a write (§4.4).
#[derive(Debug, Clone, Default)]
pub struct ProvenanceContext {
    /// Conversation this memory was captured during, if any.
    pub conversation_id: Option<String>,
    /// Source files this memory references or was derived from.
    pub file_context: Vec<String>,
}

/// Parameters accepted by [`MemoryStore::store`].
pub struct StoreRequest {
    /// Memory content. Must be non-empty.
    pub content: String,
    /// Subject-matter category.
    pub category: MemoryCategory,
    /// Context layer; defaults to `PROJECT_CONTEXT`.
    pub context_level: Option<ContextLevel>,
    /// Visibility scope; defaults to `global`.
    pub scope: Option<MemoryScope>,
    /// Required when scope resolves to `project`.
    pub project_name: Option<String>,
    /// Importance in [0, 1]; defaults to 0.5.
    pub importance: Option<f32>,
    /// Free-form tags.
    pub tags: HashSet<String>,
    /// Open metadata map.
    pub metadata: HashMap<String, MetadataValue>,
    /// Where this memory came from.
    pub source: ProvenanceSource,
    /// Additional provenance context.
    pub provenance_context: ProvenanceContext,
}

/// The higher-level write/read surface for memory units (§4.4).
pub struct MemoryStore {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<EmbeddingService>,
    lifecycle_config: LifecycleConfig,
    query_expansion_threshold: f32,
    query_expansion_enabled: bool,
}

impl MemoryStore {
    /// Build a memory store over `store` using `embeddings` to vectorize
    /// content, with default lifecycle thresholds and query expansion
    /// settings (see [`crate::config::Config::from_env`]'s defaults).
    pub fn new(store: Arc<dyn VectorStore>, embeddings: Arc<EmbeddingService>) -> Self {
        Self::with_config(store, embeddings, LifecycleConfig::default(), 0.75, true)
    }

    /// Build a memory store with explicit lifecycle and query-expansion
    /// configuration, typically sourced from a [`crate::config::Config`].
    pub fn with_config(
        store: Arc<dyn VectorStore>,
        embeddings: Arc<EmbeddingService>,
        lifecycle_config: LifecycleConfig,
        query_expansion_threshold: f32,
        query_expansion_enabled: bool,
    ) -> Self {
        Self { store, embeddings, lifecycle_config, query_expansion_threshold, query_expansion_enabled }
    }

    fn retrieval_context(&self) -> RetrievalContext<'_> {
        RetrievalContext {
            store: self.store.as_ref(),
            embeddings: self.embeddings.as_ref(),
            lifecycle_config: &self.lifecycle_config,
            query_expansion_threshold: self.query_expansion_threshold,
            query_expansion_enabled: self.query_expansion_enabled,
        }
    }

    /// Capture provenance, generate the embedding, and upsert through the
    /// vector store.
    pub async fn store(&self, req: StoreRequest) -> Result<Uuid> {
        let now = Utc::now();
        let mut provenance = MemoryProvenance::capture(req.source, req.provenance_context.conversation_id);
        provenance.file_context = req.provenance_context.file_context;

        let unit = MemoryUnit {
            id: Uuid::new_v4(),
            content: req.content,
            category: req.category,
            context_level: req.context_level.unwrap_or(ContextLevel::ProjectContext),
            scope: req.scope.unwrap_or(MemoryScope::Global),
            project_name: req.project_name,
            importance: req.importance.unwrap_or(0.5),
            tags: req.tags,
            metadata: req.metadata,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            lifecycle_state: crate::model::LifecycleState::Active,
            provenance,
            embedding_model: self.embeddings.model_id().to_string(),
        };
        unit.validate()?;

        let vector = self.embeddings.generate(&unit.content).await?;
        self.store.store(unit, vector).await
    }

    /// Expand the query against `recent_queries`, run the filtered k-NN
    /// search, reweight by lifecycle, and attach trust signals, with
    /// best-effort access tracking on every returned record (failures are
    /// logged, never fail the search). `recent_queries` is entirely
    /// caller-supplied: this store does not track conversation history
    /// itself (see [`query_expansion`]).
    pub async fn retrieve(
        &self,
        query: &str,
        recent_queries: &[RecentQuery<'_>],
        filters: Option<&SearchFilters>,
        limit: usize,
    ) -> Result<Vec<RetrievedMemory>> {
        run_search(&self.retrieval_context(), query, recent_queries, filters, limit).await
    }

    /// Direct fetch without search.
    pub async fn get_by_id(&self, id: Uuid) -> Result<MemoryUnit> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::MemoryNotFound(id.to_string()))
    }

    /// Mark a memory verified, recording a dated note and boosting
    /// confidence (§4.4).
    pub async fn verify_memory(&self, id: Uuid, verified: bool, notes: Option<&str>) -> Result<()> {
        let mut unit = self.get_by_id(id).await?;
        if verified {
            provenance::verify(&mut unit.provenance, notes, Utc::now());
        } else {
            provenance::unverify(&mut unit.provenance);
        }
        let metadata = provenance_metadata(&unit.provenance);
        self.store.update(id, metadata).await?;
        Ok(())
    }

    /// Records sorted by ascending confidence, capped at `limit`. Confidence
    /// is recomputed at read time (age decay, verification/access boosts)
    /// rather than read back from whatever was last written.
    pub async fn get_low_confidence_memories(&self, threshold: f32, limit: u64) -> Result<Vec<MemoryUnit>> {
        let (mut units, _) = self
            .store
            .list_memories(None, crate::store::SortField::CreatedAt, crate::store::SortOrder::Desc, u64::MAX, 0)
            .await?;
        let now = Utc::now();
        for unit in &mut units {
            unit.provenance.confidence = provenance::recompute_confidence(unit, now);
        }
        units.retain(|u| u.provenance.confidence < threshold);
        units.sort_by(|a, b| {
            a.provenance
                .confidence
                .partial_cmp(&b.provenance.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        units.truncate(limit as usize);
        Ok(units)
    }

    /// Unverified records, newest-first (supplement).
    pub async fn get_unverified_memories(&self, limit: u64) -> Result<Vec<MemoryUnit>> {
        let (mut units, _) = self
            .store
            .list_memories(None, crate::store::SortField::CreatedAt, crate::store::SortOrder::Desc, u64::MAX, 0)
            .await?;
        units.retain(|u| !u.provenance.verified);
        units.truncate(limit as usize);
        Ok(units)
    }
}

fn provenance_metadata(provenance: &MemoryProvenance) -> HashMap<String, MetadataValue> {
    let mut map = HashMap::new();
    map.insert("provenance_verified".to_string(), MetadataValue::Bool(provenance.verified));
    if let Some(last_confirmed) = provenance.last_confirmed {
        map.insert(
            "provenance_last_confirmed".to_string(),
            MetadataValue::String(last_confirmed.to_rfc3339()),
        );
    }
    map.insert(
        "provenance_confidence".to_string(),
        MetadataValue::Number(provenance.confidence as f64),
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddingBackend;
    use crate::store::InMemoryVectorStore;

    fn memory_store() -> MemoryStore {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let embeddings = Arc::new(EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 8)), 16));
        MemoryStore::new(store, embeddings)
    }

    #[tokio::test]
    async fn store_then_retrieve_preference() {
        let mem = memory_store();
        let id = mem
            .store(StoreRequest {
                content: "User prefers Python for backend development".into(),
                category: MemoryCategory::Preference,
                context_level: Some(ContextLevel::UserPreference),
                scope: Some(MemoryScope::Global),
                project_name: None,
                importance: Some(0.9),
                tags: ["python", "backend"].iter().map(|s| s.to_string()).collect(),
                metadata: HashMap::new(),
                source: ProvenanceSource::UserExplicit,
                provenance_context: ProvenanceContext::default(),
            })
            .await
            .unwrap();

        let hits = mem.retrieve("python backend", &[], None, 5).await.unwrap();
        assert!(hits.iter().any(|h| h.unit.id == id));
    }

    #[tokio::test]
    async fn verify_memory_boosts_confidence() {
        let mem = memory_store();
        let id = mem
            .store(StoreRequest {
                content: "fact".into(),
                category: MemoryCategory::Fact,
                context_level: None,
                scope: None,
                project_name: None,
                importance: None,
                tags: HashSet::new(),
                metadata: HashMap::new(),
                source: ProvenanceSource::AutoClassified,
                provenance_context: ProvenanceContext::default(),
            })
            .await
            .unwrap();

        let before = mem.get_by_id(id).await.unwrap().provenance.confidence;
        mem.verify_memory(id, true, Some("looks right")).await.unwrap();
        let after = mem.get_by_id(id).await.unwrap();
        assert!(after.provenance.confidence > before);
        assert!(after.provenance.verified);
    }
}
