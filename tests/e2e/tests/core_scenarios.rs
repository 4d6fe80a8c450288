//! End-to-end scenarios exercising the public surface the way a host
//! process would: memory store, incremental indexer, repository registry,
//! consolidation, and read-only enforcement wired together.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use codemem_core::embeddings::{EmbeddingService, HashEmbeddingBackend};
use codemem_core::indexing::{IncrementalIndexer, ParsedUnit, ParserService};
use codemem_core::memory::{MemoryStore, ProvenanceContext, StoreRequest};
use codemem_core::model::{
    ContextLevel, MemoryCategory, MemoryScope, MergeStrategy, ProvenanceSource, RepositoryType,
    UnitKind,
};
use codemem_core::registry::RepositoryRegistry;
use codemem_core::store::{InMemoryVectorStore, ReadOnlyVectorStore, SearchFilters, VectorStore};
use codemem_core::{consolidation, Error};

fn memory_store_over(store: Arc<dyn VectorStore>) -> MemoryStore {
    let embeddings = Arc::new(EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 16)), 64));
    MemoryStore::new(store, embeddings)
}

/// Splits a file into one unit per non-empty line, treating every line as a
/// function. Enough to exercise content-hash diffing without a real parser.
struct LineParser;

impl ParserService for LineParser {
    fn language_for_extension(&self, extension: &str) -> Option<&'static str> {
        match extension {
            "txt" => Some("text"),
            _ => None,
        }
    }

    fn parse(&self, _path: &Path, content: &str) -> codemem_core::Result<Vec<ParsedUnit>> {
        Ok(content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| ParsedUnit {
                name: format!("line_{i}"),
                unit_kind: UnitKind::Function,
                start_line: i as u32 + 1,
                end_line: i as u32 + 1,
                body: line.to_string(),
            })
            .collect())
    }
}

/// Scenario 1: store a user preference, retrieve it by semantic search.
#[tokio::test]
async fn store_and_retrieve_user_preference() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let mem = memory_store_over(store);

    let id = mem
        .store(StoreRequest {
            content: "User prefers tabs over spaces in Rust files".into(),
            category: MemoryCategory::Preference,
            context_level: Some(ContextLevel::UserPreference),
            scope: Some(MemoryScope::Global),
            project_name: None,
            importance: Some(0.8),
            tags: ["rust", "formatting"].iter().map(|s| s.to_string()).collect(),
            metadata: HashMap::new(),
            source: ProvenanceSource::UserExplicit,
            provenance_context: ProvenanceContext::default(),
        })
        .await
        .expect("store should succeed");

    let hits = mem.retrieve("tabs spaces formatting preference", &[], None, 5).await.unwrap();
    assert!(hits.iter().any(|h| h.unit.id == id));

    let fetched = mem.get_by_id(id).await.unwrap();
    assert_eq!(fetched.category, MemoryCategory::Preference);
    assert_eq!(fetched.context_level, ContextLevel::UserPreference);
}

/// Scenario 2: a second indexing pass over an unchanged tree indexes no
/// new units and reports every file as skipped.
#[tokio::test]
async fn incremental_reindex_with_no_changes_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("a.txt"), "first line\nsecond line\n").await.unwrap();
    tokio::fs::write(dir.path().join("b.txt"), "only line\n").await.unwrap();

    let store = InMemoryVectorStore::new();
    let embeddings = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 16)), 64);
    let parser = LineParser;
    let repository_id = uuid::Uuid::new_v4();

    let mut indexer = IncrementalIndexer::new(&store, &embeddings, &parser, repository_id, HashMap::new());
    let first = indexer.index_directory(dir.path(), true, |_| {}).await.unwrap();
    assert_eq!(first.indexed_files, 2);
    assert_eq!(first.skipped_files, 0);
    assert!(first.total_units > 0);

    let file_hashes = indexer.file_hashes().clone();
    let count_after_first = store.count(None).await.unwrap();

    let mut second = IncrementalIndexer::new(&store, &embeddings, &parser, repository_id, file_hashes);
    let rerun = second.index_directory(dir.path(), true, |_| {}).await.unwrap();
    assert_eq!(rerun.indexed_files, 0);
    assert_eq!(rerun.skipped_files, 2);

    let count_after_second = store.count(None).await.unwrap();
    assert_eq!(count_after_first, count_after_second);
}

/// Scenario 3: search results can be filtered down to a single context
/// level even when multiple levels share a vector neighborhood.
#[tokio::test]
async fn filtered_search_by_context_level() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let mem = memory_store_over(store);

    let pref_id = mem
        .store(StoreRequest {
            content: "deploy workflow uses blue-green releases".into(),
            category: MemoryCategory::Workflow,
            context_level: Some(ContextLevel::ProjectContext),
            scope: Some(MemoryScope::Global),
            project_name: None,
            importance: Some(0.6),
            tags: HashSet::new(),
            metadata: HashMap::new(),
            source: ProvenanceSource::AutoClassified,
            provenance_context: ProvenanceContext::default(),
        })
        .await
        .unwrap();

    let session_id = mem
        .store(StoreRequest {
            content: "deploy workflow currently paused for investigation".into(),
            category: MemoryCategory::Event,
            context_level: Some(ContextLevel::SessionState),
            scope: Some(MemoryScope::Global),
            project_name: None,
            importance: Some(0.4),
            tags: HashSet::new(),
            metadata: HashMap::new(),
            source: ProvenanceSource::AutoClassified,
            provenance_context: ProvenanceContext::default(),
        })
        .await
        .unwrap();

    let filters = SearchFilters { context_level: Some(ContextLevel::ProjectContext.to_string()), ..Default::default() };
    let hits = mem.retrieve("deploy workflow", &[], Some(&filters), 10).await.unwrap();

    assert!(hits.iter().any(|h| h.unit.id == pref_id));
    assert!(!hits.iter().any(|h| h.unit.id == session_id));
}

/// Scenario 4: the repository registry refuses a dependency edge that
/// would close a cycle.
#[tokio::test]
async fn repository_registry_rejects_dependency_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let registry = RepositoryRegistry::load(dir.path().join("registry.json")).await.unwrap();

    let a = registry.register("a".into(), "/repos/a".into(), RepositoryType::Standalone, None).await.unwrap();
    let b = registry.register("b".into(), "/repos/b".into(), RepositoryType::Standalone, None).await.unwrap();
    let c = registry.register("c".into(), "/repos/c".into(), RepositoryType::Standalone, None).await.unwrap();

    registry.add_dependency(a.id, b.id).await.unwrap();
    registry.add_dependency(b.id, c.id).await.unwrap();

    let err = registry.add_dependency(c.id, a.id).await.unwrap_err();
    assert!(matches!(err, Error::DependencyCycle { .. }));
}

/// Scenario 5: merging near-duplicates with KEEP_MOST_RECENT collapses the
/// cluster into the newest member's content and removes the others.
#[tokio::test]
async fn merge_duplicates_keeps_most_recent() {
    let store = InMemoryVectorStore::new();
    let embeddings = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 16)), 64);

    let vector_a = embeddings.generate("older note about the release process").await.unwrap();
    let older = codemem_core::model::MemoryUnit {
        id: uuid::Uuid::new_v4(),
        content: "older note about the release process".into(),
        category: MemoryCategory::Fact,
        context_level: ContextLevel::ProjectContext,
        scope: MemoryScope::Global,
        project_name: None,
        importance: 0.3,
        tags: HashSet::new(),
        metadata: HashMap::new(),
        created_at: chrono::Utc::now() - chrono::Duration::days(5),
        updated_at: chrono::Utc::now() - chrono::Duration::days(5),
        last_accessed: chrono::Utc::now() - chrono::Duration::days(5),
        lifecycle_state: codemem_core::model::LifecycleState::Active,
        provenance: codemem_core::model::MemoryProvenance::capture(ProvenanceSource::AutoClassified, None),
        embedding_model: "test".into(),
    };
    let canonical_id = store.store(older, vector_a).await.unwrap();

    let vector_b = embeddings.generate("release process note, now updated").await.unwrap();
    let mut newer = codemem_core::model::MemoryUnit {
        id: uuid::Uuid::new_v4(),
        content: "release process note, now updated".into(),
        category: MemoryCategory::Fact,
        context_level: ContextLevel::ProjectContext,
        scope: MemoryScope::Global,
        project_name: None,
        importance: 0.3,
        tags: HashSet::new(),
        metadata: HashMap::new(),
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
        last_accessed: chrono::Utc::now(),
        lifecycle_state: codemem_core::model::LifecycleState::Active,
        provenance: codemem_core::model::MemoryProvenance::capture(ProvenanceSource::AutoClassified, None),
        embedding_model: "test".into(),
    };
    newer.id = uuid::Uuid::new_v4();
    let duplicate_id = store.store(newer, vector_b).await.unwrap();

    let (representation, history) = consolidation::merge_memories(
        &store,
        |text| Box::pin(embeddings.generate(text)),
        canonical_id,
        &[duplicate_id],
        MergeStrategy::KeepMostRecent,
        false,
    )
    .await
    .unwrap();

    assert_eq!(representation.canonical_id, duplicate_id);
    assert_eq!(history.strategy, MergeStrategy::KeepMostRecent);
    assert!(!history.dry_run);

    assert!(store.get_by_id(canonical_id).await.unwrap().is_none());
    let merged = store.get_by_id(duplicate_id).await.unwrap().unwrap();
    assert_eq!(merged.content, "release process note, now updated");
}

/// Scenario 6: a read-only store forwards reads but rejects writes with a
/// message naming both the restriction and how to lift it.
#[tokio::test]
async fn read_only_store_rejects_writes_but_allows_reads() {
    let inner = Arc::new(InMemoryVectorStore::new());
    let embeddings = Arc::new(EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 16)), 64));

    let writable = MemoryStore::new(inner.clone(), embeddings.clone());
    let id = writable
        .store(StoreRequest {
            content: "seeded before read-only mode was enabled".into(),
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

    let read_only: Arc<dyn VectorStore> = Arc::new(ReadOnlyVectorStore::new(inner));
    let mem = MemoryStore::new(read_only, embeddings);

    let fetched = mem.get_by_id(id).await.unwrap();
    assert_eq!(fetched.id, id);

    let err = mem
        .store(StoreRequest {
            content: "should never be written".into(),
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
        .unwrap_err();

    let message = err.to_string();
    assert!(message.to_lowercase().contains("read-only") || message.to_lowercase().contains("read only"));
    assert!(message.to_lowercase().contains("restart") || message.to_lowercase().contains("unset"));
}
