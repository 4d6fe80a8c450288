//! Multi-repository indexer (§4.8): runs an [`IncrementalIndexer`] per
//! repository under bounded concurrency.

use std::collections::HashMap;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use super::incremental::{IndexResult, IncrementalIndexer, ParserService};
use crate::embeddings::EmbeddingService;
use crate::model::RepositoryStatus;
use crate::registry::RepositoryRegistry;
use crate::store::VectorStore;
use crate::Result;

/// Default bound on concurrently-running per-repository indexing passes.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// One repository's outcome within a [`BatchIndexResult`].
#[derive(Debug, Clone)]
pub struct RepoIndexOutcome {
    pub repository_id: Uuid,
    pub result: Option<IndexResult>,
    pub error: Option<String>,
}

/// Aggregated result of indexing several repositories.
#[derive(Debug, Clone, Default)]
pub struct BatchIndexResult {
    pub total_repositories: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub per_repository: Vec<RepoIndexOutcome>,
}

/// Rollup returned by [`get_indexing_status`].
#[derive(Debug, Clone, Default)]
pub struct IndexingStatusRollup {
    pub counts_by_status: HashMap<RepositoryStatus, usize>,
    pub total_files: u64,
    pub total_units: u64,
}

/// Index `repository_ids` under bounded concurrency (at most `concurrency`
/// indexing passes in flight at once), moving each repository's registry
/// status `INDEXING -> (INDEXED | ERROR)`.
pub async fn index_repositories(
    registry: &RepositoryRegistry,
    store: &dyn VectorStore,
    embeddings: &EmbeddingService,
    parser: &dyn ParserService,
    repository_ids: &[Uuid],
    concurrency: usize,
) -> Result<BatchIndexResult> {
    let outcomes: Vec<RepoIndexOutcome> = stream::iter(repository_ids.iter().copied())
        .map(|repository_id| index_one_repository(registry, store, embeddings, parser, repository_id))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let succeeded = outcomes.iter().filter(|o| o.error.is_none()).count();
    let failed = outcomes.len() - succeeded;
    Ok(BatchIndexResult { total_repositories: outcomes.len(), succeeded, failed, per_repository: outcomes })
}

async fn index_one_repository(
    registry: &RepositoryRegistry,
    store: &dyn VectorStore,
    embeddings: &EmbeddingService,
    parser: &dyn ParserService,
    repository_id: Uuid,
) -> RepoIndexOutcome {
    let Some(repo) = registry.get(repository_id).await else {
        return RepoIndexOutcome { repository_id, result: None, error: Some("repository not registered".to_string()) };
    };

    let _ = registry.update(repository_id, |r| r.status = RepositoryStatus::Indexing).await;

    let mut indexer = IncrementalIndexer::new(store, embeddings, parser, repository_id, HashMap::new());
    let root = std::path::Path::new(&repo.path);

    match indexer.index_directory(root, true, |_| {}).await {
        Ok(result) => {
            let _ = registry
                .update(repository_id, |r| {
                    r.status = RepositoryStatus::Indexed;
                    r.indexed_at = Some(Utc::now());
                    r.file_count = result.total_files as u64;
                    r.unit_count = result.total_units as u64;
                })
                .await;
            RepoIndexOutcome { repository_id, result: Some(result), error: None }
        }
        Err(e) => {
            let _ = registry.update(repository_id, |r| r.status = RepositoryStatus::Error).await;
            RepoIndexOutcome { repository_id, result: None, error: Some(e.to_string()) }
        }
    }
}

/// Repositories whose status is STALE/ERROR, or INDEXED but older than
/// `max_age_days`, re-indexed together.
pub async fn reindex_stale_repositories(
    registry: &RepositoryRegistry,
    store: &dyn VectorStore,
    embeddings: &EmbeddingService,
    parser: &dyn ParserService,
    max_age_days: i64,
    concurrency: usize,
) -> Result<BatchIndexResult> {
    let now = Utc::now();
    let repos = registry.list(&Default::default()).await;
    let targets: Vec<Uuid> = repos
        .into_iter()
        .filter(|r| match r.status {
            RepositoryStatus::Stale | RepositoryStatus::Error => true,
            RepositoryStatus::Indexed => r.last_updated < now - chrono::Duration::days(max_age_days),
            RepositoryStatus::Indexing | RepositoryStatus::NotIndexed => false,
        })
        .map(|r| r.id)
        .collect();

    index_repositories(registry, store, embeddings, parser, &targets, concurrency).await
}

/// Status-count rollup plus aggregate file/unit totals across every
/// registered repository.
pub async fn get_indexing_status(registry: &RepositoryRegistry) -> IndexingStatusRollup {
    let repos = registry.list(&Default::default()).await;
    let mut rollup = IndexingStatusRollup::default();
    for repo in &repos {
        *rollup.counts_by_status.entry(repo.status).or_insert(0) += 1;
        rollup.total_files += repo.file_count;
        rollup.total_units += repo.unit_count;
    }
    rollup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddingBackend;
    use crate::indexing::incremental::{ParsedUnit, ParserService};
    use crate::model::{RepositoryType, UnitKind};
    use crate::store::InMemoryVectorStore;
    use std::path::Path;

    struct LineParser;
    impl ParserService for LineParser {
        fn language_for_extension(&self, extension: &str) -> Option<&'static str> {
            (extension == "rs").then_some("rust")
        }
        fn parse(&self, _path: &Path, content: &str) -> Result<Vec<ParsedUnit>> {
            Ok(content
                .lines()
                .enumerate()
                .filter(|(_, l)| l.starts_with("fn "))
                .map(|(i, l)| ParsedUnit {
                    name: l.to_string(),
                    unit_kind: UnitKind::Function,
                    start_line: i as u32 + 1,
                    end_line: i as u32 + 1,
                    body: l.to_string(),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn indexing_moves_repository_status_to_indexed() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("lib.rs"), "fn a() {\n").await.unwrap();

        let registry_dir = tempfile::tempdir().unwrap();
        let registry = RepositoryRegistry::load(registry_dir.path().join("repositories.json")).await.unwrap();
        let repo = registry
            .register("r".into(), dir.path().to_string_lossy().into_owned(), RepositoryType::Standalone, None)
            .await
            .unwrap();

        let store = InMemoryVectorStore::new();
        let embeddings = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 8)), 16);
        let parser = LineParser;

        let result = index_repositories(&registry, &store, &embeddings, &parser, &[repo.id], DEFAULT_CONCURRENCY)
            .await
            .unwrap();
        assert_eq!(result.succeeded, 1);

        let repo_after = registry.get(repo.id).await.unwrap();
        assert_eq!(repo_after.status, RepositoryStatus::Indexed);
        assert_eq!(repo_after.unit_count, 1);
    }
}
