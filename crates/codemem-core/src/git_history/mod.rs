//! Git history indexer (§4.10, optional): turns a repository's commit log
//! and diffs into embedded records alongside code units, so that "what
//! changed around the time I added auth" is a normal filtered search rather
//! than a second backend connection.
//!
//! Gated behind the `git-history` feature; built on `git2` rather than
//! shelling out to `git`.

use std::path::Path;

use uuid::Uuid;

use crate::config::GitIndexingConfig;
use crate::embeddings::EmbeddingService;
use crate::model::{
    ChangeType, CommitStats, ContextLevel, GitCommitRecord, GitFileChangeRecord, LifecycleState,
    MemoryCategory, MemoryProvenance, MemoryScope, MemoryUnit, MetadataValue, ProvenanceSource,
};
use crate::store::VectorStore;
use crate::{Error, Result};

/// Running counters for one or more [`GitHistoryIndexer::index_repository`]
/// calls, mirroring the per-file error isolation of the incremental indexer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GitIndexStats {
    pub repos_indexed: u64,
    pub commits_indexed: u64,
    pub file_changes_indexed: u64,
    pub diffs_embedded: u64,
    pub errors: u64,
}

/// Outcome of indexing a single repository's history.
#[derive(Debug, Clone, Default)]
pub struct GitIndexResult {
    pub commits_indexed: usize,
    pub file_changes_indexed: usize,
    pub diffs_embedded: usize,
    pub errors: usize,
}

/// Deterministic id for a commit record, so re-indexing the same commit
/// upserts in place rather than accumulating duplicates.
fn commit_record_id(repository_id: Uuid, commit_hash: &str) -> Uuid {
    Uuid::new_v5(&repository_id, commit_hash.as_bytes())
}

/// Deterministic id for a file-change record.
fn file_change_record_id(repository_id: Uuid, commit_hash: &str, file_path: &str) -> Uuid {
    Uuid::new_v5(&repository_id, GitFileChangeRecord::make_id(commit_hash, file_path).as_bytes())
}

/// Indexes git history into the same vector store that holds code units and
/// memories, under `category = commit` / `category = file_change`.
pub struct GitHistoryIndexer<'a> {
    store: &'a dyn VectorStore,
    embeddings: &'a EmbeddingService,
    config: GitIndexingConfig,
    stats: GitIndexStats,
}

impl<'a> GitHistoryIndexer<'a> {
    /// Build an indexer over `store`/`embeddings`, governed by `config`.
    pub fn new(store: &'a dyn VectorStore, embeddings: &'a EmbeddingService, config: GitIndexingConfig) -> Self {
        Self { store, embeddings, config, stats: GitIndexStats::default() }
    }

    /// Running totals across every `index_repository` call made on this
    /// indexer so far.
    pub fn stats(&self) -> GitIndexStats {
        self.stats
    }

    /// Index `repo_path`'s history under `repository_id`. Returns
    /// immediately with an empty result when git indexing is disabled by
    /// configuration.
    pub async fn index_repository(&mut self, repo_path: &Path, repository_id: Uuid) -> Result<GitIndexResult> {
        if !self.config.enabled {
            tracing::info!(path = %repo_path.display(), "git indexing disabled, skipping");
            return Ok(GitIndexResult::default());
        }

        if !repo_path.exists() {
            return Err(Error::Validation(format!("repository path does not exist: {}", repo_path.display())));
        }

        let repo = git2::Repository::open(repo_path).map_err(|e| Error::Storage(e.to_string()))?;
        let repo_path_str = repo_path.to_string_lossy().into_owned();

        let include_diffs = !self.exceeds_size_threshold(repo_path);
        if !include_diffs {
            tracing::info!(
                path = %repo_path.display(),
                threshold_mb = self.config.auto_disable_size_threshold_mb,
                "repository exceeds size threshold, disabling diff embedding"
            );
        }

        let commits = collect_commit_oids(&repo, self.config.commit_count, &self.config.branches)
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut result = GitIndexResult::default();

        for oid in commits {
            match self.index_commit(&repo, oid, repository_id, &repo_path_str, include_diffs).await {
                Ok((file_changes, diffs_embedded)) => {
                    result.commits_indexed += 1;
                    result.file_changes_indexed += file_changes;
                    result.diffs_embedded += diffs_embedded;
                    self.stats.commits_indexed += 1;
                    self.stats.file_changes_indexed += file_changes as u64;
                    self.stats.diffs_embedded += diffs_embedded as u64;
                }
                Err(e) => {
                    tracing::error!(commit = %oid, error = %e, "failed to index commit");
                    result.errors += 1;
                    self.stats.errors += 1;
                }
            }
        }

        self.stats.repos_indexed += 1;
        Ok(result)
    }

    fn exceeds_size_threshold(&self, repo_path: &Path) -> bool {
        git_dir_size_mb(repo_path) > self.config.auto_disable_size_threshold_mb as f64
    }

    async fn index_commit(
        &self,
        repo: &git2::Repository,
        oid: git2::Oid,
        repository_id: Uuid,
        repo_path_str: &str,
        include_diffs: bool,
    ) -> Result<(usize, usize)> {
        let commit = repo.find_commit(oid).map_err(|e| Error::Storage(e.to_string()))?;
        let record = extract_commit_record(repo, &commit, repo_path_str)?;

        let vector = self.embeddings.generate(&record.message).await?;
        let id = commit_record_id(repository_id, &record.commit_hash);
        let memory = commit_memory_unit(id, repository_id, &record, self.embeddings.model_id());
        self.store.store(memory, vector).await?;

        if !include_diffs {
            return Ok((0, 0));
        }

        let file_changes = extract_file_changes(repo, &commit)?;
        let total_changes = file_changes.len();
        let mut diffs_embedded = 0;

        for mut change in file_changes {
            if let Some(diff_text) = change.diff_content.take() {
                let size_kb = diff_text.len() as u64 / 1024;
                if size_kb > self.config.diff_size_limit_kb {
                    tracing::debug!(file = %change.file_path, size_kb, "skipping oversized diff");
                } else {
                    match self.embeddings.generate(&diff_text).await {
                        Ok(vector) => {
                            change.diff_content = Some(diff_text);
                            change.diff_embedding = Some(vector);
                            diffs_embedded += 1;
                        }
                        Err(e) => tracing::debug!(file = %change.file_path, error = %e, "diff embedding failed"),
                    }
                }
            }

            let change_id = file_change_record_id(repository_id, &change.commit_hash, &change.file_path);
            let memory = file_change_memory_unit(change_id, repository_id, &change, self.embeddings.model_id());
            self.store.store(memory, change.diff_embedding.clone().unwrap_or_default()).await?;
        }

        Ok((total_changes, diffs_embedded))
    }
}

fn git_dir_size_mb(repo_path: &Path) -> f64 {
    let git_dir = repo_path.join(".git");
    let total: u64 = walkdir::WalkDir::new(&git_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    total as f64 / (1024.0 * 1024.0)
}

fn collect_commit_oids(repo: &git2::Repository, max_count: usize, branches: &str) -> std::result::Result<Vec<git2::Oid>, git2::Error> {
    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(git2::Sort::TIME)?;

    if branches == "all" {
        for reference in repo.references_glob("refs/heads/*")? {
            let reference = reference?;
            if let Some(target) = reference.target() {
                revwalk.push(target)?;
            }
        }
    } else {
        revwalk.push_head()?;
    }

    revwalk.take(max_count).collect()
}

fn extract_commit_record(repo: &git2::Repository, commit: &git2::Commit, repo_path_str: &str) -> Result<GitCommitRecord> {
    let author = commit.author();
    let committer = commit.committer();

    let author_date = git_time_to_chrono(commit.time());
    let committer_time = committer.when();
    let committer_date = git_time_to_chrono(committer_time);

    let message = commit.message().unwrap_or_default().trim().to_string();
    let commit_hash = commit.id().to_string();

    let branch_names = branches_containing(repo, commit.id()).unwrap_or_else(|e| {
        tracing::debug!(commit = %commit_hash, error = %e, "could not resolve branches for commit");
        Vec::new()
    });
    let tags = tags_pointing_at(repo, commit.id()).unwrap_or_else(|e| {
        tracing::debug!(commit = %commit_hash, error = %e, "could not resolve tags for commit");
        Vec::new()
    });
    let parent_hashes = commit.parent_ids().map(|id| id.to_string()).collect();
    let stats = commit_stats(repo, commit).map_err(|e| Error::Storage(e.to_string()))?;

    Ok(GitCommitRecord {
        commit_hash,
        repository_path: repo_path_str.to_string(),
        author_name: author.name().unwrap_or_default().to_string(),
        author_email: author.email().unwrap_or_default().to_string(),
        author_date,
        committer_name: committer.name().unwrap_or_default().to_string(),
        committer_date,
        message,
        message_embedding: Vec::new(),
        branch_names,
        tags,
        parent_hashes,
        stats,
    })
}

fn git_time_to_chrono(time: git2::Time) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(time.seconds(), 0).unwrap_or_else(chrono::Utc::now)
}

fn branches_containing(repo: &git2::Repository, target: git2::Oid) -> std::result::Result<Vec<String>, git2::Error> {
    let mut names = Vec::new();
    for branch in repo.branches(Some(git2::BranchType::Local))? {
        let (branch, _) = branch?;
        let Some(branch_oid) = branch.get().target() else { continue };
        if branch_oid == target || repo.graph_descendant_of(branch_oid, target)? {
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

fn tags_pointing_at(repo: &git2::Repository, target: git2::Oid) -> std::result::Result<Vec<String>, git2::Error> {
    let mut names = Vec::new();
    for tag_name in repo.tag_names(None)?.iter().flatten() {
        let reference = repo.find_reference(&format!("refs/tags/{tag_name}"))?;
        if let Ok(commit) = reference.peel_to_commit() {
            if commit.id() == target {
                names.push(tag_name.to_string());
            }
        }
    }
    Ok(names)
}

fn commit_stats(repo: &git2::Repository, commit: &git2::Commit) -> std::result::Result<CommitStats, git2::Error> {
    let tree = commit.tree()?;
    let parent_tree = commit.parents().next().map(|p| p.tree()).transpose()?;
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    let diff_stats = diff.stats()?;
    Ok(CommitStats {
        files_changed: diff_stats.files_changed() as u32,
        insertions: diff_stats.insertions() as u32,
        deletions: diff_stats.deletions() as u32,
    })
}

fn extract_file_changes(repo: &git2::Repository, commit: &git2::Commit) -> Result<Vec<GitFileChangeRecord>> {
    let tree = commit.tree().map_err(|e| Error::Storage(e.to_string()))?;
    let parent_tree = commit.parents().next().map(|p| p.tree()).transpose().map_err(|e| Error::Storage(e.to_string()))?;
    let diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
        .map_err(|e| Error::Storage(e.to_string()))?;

    let commit_hash = commit.id().to_string();
    let deltas: Vec<git2::DiffDelta> = diff.deltas().collect();
    let mut changes = Vec::with_capacity(deltas.len());

    for (idx, delta) in deltas.into_iter().enumerate() {
        let change_type = match delta.status() {
            git2::Delta::Added => ChangeType::Added,
            git2::Delta::Deleted => ChangeType::Deleted,
            git2::Delta::Renamed => ChangeType::Renamed,
            _ => ChangeType::Modified,
        };
        let file_path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().into_owned());
        let Some(file_path) = file_path else { continue };

        let (diff_content, lines_added, lines_deleted) = match git2::Patch::from_diff(&diff, idx) {
            Ok(Some(mut patch)) => {
                let (_, insertions, deletions) = patch.line_stats().unwrap_or((0, 0, 0));
                let text = patch.to_buf().ok().map(|buf| buf.as_str().unwrap_or_default().to_string());
                (text, insertions as u32, deletions as u32)
            }
            _ => (None, 0, 0),
        };

        changes.push(GitFileChangeRecord {
            id: GitFileChangeRecord::make_id(&commit_hash, &file_path),
            commit_hash: commit_hash.clone(),
            file_path,
            change_type,
            lines_added,
            lines_deleted,
            diff_content,
            diff_embedding: None,
        });
    }

    Ok(changes)
}

fn commit_memory_unit(id: Uuid, repository_id: Uuid, record: &GitCommitRecord, embedding_model: &str) -> MemoryUnit {
    let now = chrono::Utc::now();
    let mut metadata = std::collections::HashMap::new();
    metadata.insert("repository_id".to_string(), MetadataValue::String(repository_id.to_string()));
    metadata.insert("commit_hash".to_string(), MetadataValue::String(record.commit_hash.clone()));
    metadata.insert("repository_path".to_string(), MetadataValue::String(record.repository_path.clone()));
    metadata.insert("author_name".to_string(), MetadataValue::String(record.author_name.clone()));
    metadata.insert("author_email".to_string(), MetadataValue::String(record.author_email.clone()));
    metadata.insert("author_date".to_string(), MetadataValue::String(record.author_date.to_rfc3339()));
    metadata.insert("committer_name".to_string(), MetadataValue::String(record.committer_name.clone()));
    metadata.insert("committer_date".to_string(), MetadataValue::String(record.committer_date.to_rfc3339()));
    metadata.insert("branch_names".to_string(), MetadataValue::String(record.branch_names.join(",")));
    metadata.insert("tags".to_string(), MetadataValue::String(record.tags.join(",")));
    metadata.insert("parent_hashes".to_string(), MetadataValue::String(record.parent_hashes.join(",")));
    metadata.insert("files_changed".to_string(), MetadataValue::Number(record.stats.files_changed as f64));
    metadata.insert("insertions".to_string(), MetadataValue::Number(record.stats.insertions as f64));
    metadata.insert("deletions".to_string(), MetadataValue::Number(record.stats.deletions as f64));

    MemoryUnit {
        id,
        content: record.message.clone(),
        category: MemoryCategory::Commit,
        context_level: ContextLevel::ProjectContext,
        scope: MemoryScope::Global,
        project_name: None,
        importance: 0.3,
        tags: Default::default(),
        metadata,
        created_at: record.author_date,
        updated_at: now,
        last_accessed: now,
        lifecycle_state: LifecycleState::Active,
        provenance: MemoryProvenance::capture(ProvenanceSource::CodeIndexed, None),
        embedding_model: embedding_model.to_string(),
    }
}

fn file_change_memory_unit(id: Uuid, repository_id: Uuid, change: &GitFileChangeRecord, embedding_model: &str) -> MemoryUnit {
    let now = chrono::Utc::now();
    let mut metadata = std::collections::HashMap::new();
    metadata.insert("repository_id".to_string(), MetadataValue::String(repository_id.to_string()));
    metadata.insert("commit_hash".to_string(), MetadataValue::String(change.commit_hash.clone()));
    metadata.insert("file_path".to_string(), MetadataValue::String(change.file_path.clone()));
    metadata.insert("change_type".to_string(), MetadataValue::String(change.change_type.to_string()));
    metadata.insert("lines_added".to_string(), MetadataValue::Number(change.lines_added as f64));
    metadata.insert("lines_deleted".to_string(), MetadataValue::Number(change.lines_deleted as f64));
    metadata.insert("has_diff".to_string(), MetadataValue::Bool(change.diff_content.is_some()));

    let content = change.diff_content.clone().unwrap_or_else(|| format!("{} {}", change.change_type, change.file_path));

    MemoryUnit {
        id,
        content,
        category: MemoryCategory::FileChange,
        context_level: ContextLevel::ProjectContext,
        scope: MemoryScope::Global,
        project_name: None,
        importance: 0.2,
        tags: Default::default(),
        metadata,
        created_at: now,
        updated_at: now,
        last_accessed: now,
        lifecycle_state: LifecycleState::Active,
        provenance: MemoryProvenance::capture(ProvenanceSource::CodeIndexed, None),
        embedding_model: embedding_model.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddingBackend;
    use crate::store::InMemoryVectorStore;
    use std::process::Command;

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
            assert!(status.success());
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "a@example.com"]);
        run(&["config", "user.name", "A"]);
        std::fs::write(dir.join("a.txt"), "hello\n").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "initial commit"]);
        std::fs::write(dir.join("a.txt"), "hello world\n").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "second commit"]);
    }

    fn config() -> GitIndexingConfig {
        GitIndexingConfig {
            enabled: true,
            commit_count: 50,
            branches: "current".to_string(),
            diff_size_limit_kb: 100,
            auto_disable_size_threshold_mb: 500,
        }
    }

    #[tokio::test]
    async fn indexes_commits_and_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let store = InMemoryVectorStore::new();
        let embeddings = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 8)), 16);
        let mut indexer = GitHistoryIndexer::new(&store, &embeddings, config());

        let result = indexer.index_repository(dir.path(), Uuid::new_v4()).await.unwrap();
        assert_eq!(result.commits_indexed, 2);
        assert!(result.file_changes_indexed >= 2);
        assert_eq!(result.errors, 0);
    }

    #[tokio::test]
    async fn reindexing_is_idempotent_by_commit_hash() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let store = InMemoryVectorStore::new();
        let embeddings = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 8)), 16);
        let repository_id = Uuid::new_v4();
        let mut indexer = GitHistoryIndexer::new(&store, &embeddings, config());

        indexer.index_repository(dir.path(), repository_id).await.unwrap();
        let before = store.count(None).await.unwrap();
        indexer.index_repository(dir.path(), repository_id).await.unwrap();
        let after = store.count(None).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn disabled_config_indexes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let store = InMemoryVectorStore::new();
        let embeddings = EmbeddingService::new(Box::new(HashEmbeddingBackend::new("test", 8)), 16);
        let mut cfg = config();
        cfg.enabled = false;
        let mut indexer = GitHistoryIndexer::new(&store, &embeddings, cfg);

        let result = indexer.index_repository(dir.path(), Uuid::new_v4()).await.unwrap();
        assert_eq!(result.commits_indexed, 0);
    }
}
