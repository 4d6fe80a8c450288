//! Specialized retrieval convenience wrappers (§4.9): typed façades over the
//! same expand→embed→search→reweight→trust pipeline [`MemoryStore::retrieve`]
//! runs, for the context-level/category access patterns callers reach for
//! most often.

use std::collections::HashMap;

use super::query_expansion::RecentQuery;
use super::{run_search, RetrievalContext, RetrievedMemory};
use crate::model::{ContextLevel, MemoryCategory};
use crate::store::SearchFilters;
use crate::Result;

/// `context_level = USER_PREFERENCE`.
pub async fn retrieve_preferences(
    ctx: &RetrievalContext<'_>,
    query: &str,
    recent_queries: &[RecentQuery<'_>],
    limit: usize,
    scope: Option<String>,
    project: Option<String>,
) -> Result<Vec<RetrievedMemory>> {
    let filters = SearchFilters {
        context_level: Some(ContextLevel::UserPreference.to_string()),
        scope,
        project_name: project,
        ..Default::default()
    };
    run_search(ctx, query, recent_queries, Some(&filters), limit).await
}

/// `context_level = PROJECT_CONTEXT`.
pub async fn retrieve_project_context(
    ctx: &RetrievalContext<'_>,
    query: &str,
    recent_queries: &[RecentQuery<'_>],
    limit: usize,
    project: Option<String>,
) -> Result<Vec<RetrievedMemory>> {
    let filters = SearchFilters {
        context_level: Some(ContextLevel::ProjectContext.to_string()),
        project_name: project,
        ..Default::default()
    };
    run_search(ctx, query, recent_queries, Some(&filters), limit).await
}

/// `context_level = SESSION_STATE`.
pub async fn retrieve_session_state(
    ctx: &RetrievalContext<'_>,
    query: &str,
    recent_queries: &[RecentQuery<'_>],
    limit: usize,
) -> Result<Vec<RetrievedMemory>> {
    let filters = SearchFilters { context_level: Some(ContextLevel::SessionState.to_string()), ..Default::default() };
    run_search(ctx, query, recent_queries, Some(&filters), limit).await
}

/// Filter by an arbitrary [`MemoryCategory`].
pub async fn retrieve_by_category(
    ctx: &RetrievalContext<'_>,
    query: &str,
    recent_queries: &[RecentQuery<'_>],
    category: MemoryCategory,
    limit: usize,
) -> Result<Vec<RetrievedMemory>> {
    let filters = SearchFilters { category: Some(category), ..Default::default() };
    run_search(ctx, query, recent_queries, Some(&filters), limit).await
}

/// One expanded query, N filtered searches, one per requested context level.
pub async fn retrieve_multi_level(
    ctx: &RetrievalContext<'_>,
    query: &str,
    recent_queries: &[RecentQuery<'_>],
    levels: &[ContextLevel],
    limit: usize,
) -> Result<HashMap<ContextLevel, Vec<RetrievedMemory>>> {
    let mut out = HashMap::with_capacity(levels.len());
    for &level in levels {
        let filters = SearchFilters { context_level: Some(level.to_string()), ..Default::default() };
        let hits = run_search(ctx, query, recent_queries, Some(&filters), limit).await?;
        out.insert(level, hits);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::embeddings::{EmbeddingService, HashEmbeddingBackend};
    use crate::model::{LifecycleState, MemoryCategory, MemoryProvenance, MemoryScope, MemoryUnit, ProvenanceSource};
    use crate::store::InMemoryVectorStore;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn unit(level: ContextLevel) -> MemoryUnit {
        let now = chrono::Utc::now();
        MemoryUnit {
            id: Uuid::new_v4(),
            content: "x".into(),
            category: MemoryCategory::Fact,
            context_level: level,
            scope: MemoryScope::Global,
            project_name: None,
            importance: 0.5,
            tags: HashSet::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            last_accessed: now,
            lifecycle_state: LifecycleState::Active,
            provenance: MemoryProvenance::capture(ProvenanceSource::UserExplicit, None),
            embedding_model: "test".into(),
        }
    }

    #[tokio::test]
    async fn retrieve_multi_level_partitions_by_level() {
        let store = InMemoryVectorStore::new();
        store.store(unit(ContextLevel::UserPreference), vec![1.0, 0.0]).await.unwrap();
        store.store(unit(ContextLevel::ProjectContext), vec![1.0, 0.0]).await.unwrap();

        let embeddings = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 2)), 16);
        let lifecycle_config = LifecycleConfig::default();
        let ctx = RetrievalContext {
            store: &store,
            embeddings: &embeddings,
            lifecycle_config: &lifecycle_config,
            query_expansion_threshold: 0.75,
            query_expansion_enabled: true,
        };

        let results = retrieve_multi_level(
            &ctx,
            "anything",
            &[],
            &[ContextLevel::UserPreference, ContextLevel::ProjectContext],
            10,
        )
        .await
        .unwrap();

        assert_eq!(results[&ContextLevel::UserPreference].len(), 1);
        assert_eq!(results[&ContextLevel::ProjectContext].len(), 1);
    }
}
