//! Repository registry (§4.8): the single source of truth for repository
//! identity and inter-repository dependency edges.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{read_or_default, write_atomic};
use crate::model::{Repository, RepositoryStatus, RepositoryType};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryDocument {
    repositories: HashMap<Uuid, Repository>,
    last_updated: DateTime<Utc>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self { repositories: HashMap::new(), last_updated: Utc::now() }
    }
}

/// Optional filters for [`RepositoryRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct RepositoryFilters {
    pub status: Option<RepositoryStatus>,
    pub repo_type: Option<RepositoryType>,
    pub tag: Option<String>,
    pub workspace_id: Option<Uuid>,
}

impl RepositoryFilters {
    fn matches(&self, repo: &Repository) -> bool {
        if let Some(status) = self.status {
            if repo.status != status {
                return false;
            }
        }
        if let Some(repo_type) = self.repo_type {
            if repo.repo_type != repo_type {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !repo.tags.contains(tag) {
                return false;
            }
        }
        if let Some(workspace_id) = self.workspace_id {
            if !repo.workspace_ids.contains(&workspace_id) {
                return false;
            }
        }
        true
    }
}

/// JSON-file-backed repository registry, persisted atomically.
pub struct RepositoryRegistry {
    path: PathBuf,
    document: RwLock<RegistryDocument>,
}

impl RepositoryRegistry {
    /// Load the registry from `path` (creating an empty document if it does
    /// not yet exist).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let document = read_or_default(&path).await?;
        Ok(Self { path, document: RwLock::new(document) })
    }

    async fn persist(&self) -> Result<()> {
        let mut document = self.document.write().await;
        document.last_updated = Utc::now();
        write_atomic(&self.path, &*document).await
    }

    /// Register a new repository at `path` with `name`/`repo_type`, starting
    /// with `status = NOT_INDEXED`. Rejects duplicate paths.
    pub async fn register(&self, name: String, path: String, repo_type: RepositoryType, git_url: Option<String>) -> Result<Repository> {
        {
            let document = self.document.read().await;
            if document.repositories.values().any(|r| r.path == path) {
                return Err(Error::DuplicatePath(path));
            }
        }

        let now = Utc::now();
        let repo = Repository {
            id: Uuid::new_v4(),
            name,
            path,
            git_url,
            repo_type,
            status: RepositoryStatus::NotIndexed,
            indexed_at: None,
            last_updated: now,
            file_count: 0,
            unit_count: 0,
            workspace_ids: HashSet::new(),
            tags: HashSet::new(),
            depends_on: HashSet::new(),
            depended_by: HashSet::new(),
        };

        {
            let mut document = self.document.write().await;
            document.repositories.insert(repo.id, repo.clone());
        }
        self.persist().await?;
        Ok(repo)
    }

    /// Remove `id`, cleaning up every other record's dependency edges and
    /// workspace membership references.
    pub async fn unregister(&self, id: Uuid) -> Result<()> {
        {
            let mut document = self.document.write().await;
            document.repositories.remove(&id);
            for repo in document.repositories.values_mut() {
                repo.depends_on.remove(&id);
                repo.depended_by.remove(&id);
                repo.workspace_ids.remove(&id);
            }
        }
        self.persist().await
    }

    /// Fetch by id.
    pub async fn get(&self, id: Uuid) -> Option<Repository> {
        self.document.read().await.repositories.get(&id).cloned()
    }

    /// Fetch by on-disk path.
    pub async fn get_by_path(&self, path: &str) -> Option<Repository> {
        self.document.read().await.repositories.values().find(|r| r.path == path).cloned()
    }

    /// Fetch by display name (first match).
    pub async fn get_by_name(&self, name: &str) -> Option<Repository> {
        self.document.read().await.repositories.values().find(|r| r.name == name).cloned()
    }

    /// List every repository matching `filters`.
    pub async fn list(&self, filters: &RepositoryFilters) -> Vec<Repository> {
        self.document
            .read()
            .await
            .repositories
            .values()
            .filter(|r| filters.matches(r))
            .cloned()
            .collect()
    }

    /// Apply `mutate` to the stored record for `id`, then persist.
    pub async fn update(&self, id: Uuid, mutate: impl FnOnce(&mut Repository)) -> Result<Repository> {
        let updated = {
            let mut document = self.document.write().await;
            let repo = document.repositories.get_mut(&id).ok_or_else(|| Error::MemoryNotFound(id.to_string()))?;
            mutate(repo);
            repo.last_updated = Utc::now();
            repo.clone()
        };
        self.persist().await?;
        Ok(updated)
    }

    /// Add a tag.
    pub async fn add_tag(&self, id: Uuid, tag: String) -> Result<Repository> {
        self.update(id, |r| {
            r.tags.insert(tag);
        })
        .await
    }

    /// Remove a tag.
    pub async fn remove_tag(&self, id: Uuid, tag: &str) -> Result<Repository> {
        self.update(id, |r| {
            r.tags.remove(tag);
        })
        .await
    }

    /// Record membership in a workspace (the workspace side is the caller's
    /// responsibility to keep consistent; see [`crate::registry::WorkspaceManager`]).
    pub async fn add_workspace_membership(&self, id: Uuid, workspace_id: Uuid) -> Result<Repository> {
        self.update(id, |r| {
            r.workspace_ids.insert(workspace_id);
        })
        .await
    }

    /// Remove membership in a workspace.
    pub async fn remove_workspace_membership(&self, id: Uuid, workspace_id: Uuid) -> Result<Repository> {
        self.update(id, |r| {
            r.workspace_ids.remove(&workspace_id);
        })
        .await
    }

    fn transitive_closure(document: &RegistryDocument, start: Uuid) -> HashSet<Uuid> {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(repo) = document.repositories.get(&current) {
                for &dep in &repo.depends_on {
                    stack.push(dep);
                }
            }
        }
        visited
    }

    /// Add a dependency edge `from -> to`. Rejected with
    /// [`Error::DependencyCycle`] if `to` already transitively depends on
    /// `from`.
    pub async fn add_dependency(&self, from: Uuid, to: Uuid) -> Result<()> {
        {
            let document = self.document.read().await;
            let closure = Self::transitive_closure(&document, to);
            if closure.contains(&from) {
                return Err(Error::DependencyCycle { from: from.to_string(), to: to.to_string() });
            }
        }

        {
            let mut document = self.document.write().await;
            if let Some(repo) = document.repositories.get_mut(&from) {
                repo.depends_on.insert(to);
            }
            if let Some(repo) = document.repositories.get_mut(&to) {
                repo.depended_by.insert(from);
            }
        }
        self.persist().await
    }

    /// Remove a dependency edge `from -> to`.
    pub async fn remove_dependency(&self, from: Uuid, to: Uuid) -> Result<()> {
        {
            let mut document = self.document.write().await;
            if let Some(repo) = document.repositories.get_mut(&from) {
                repo.depends_on.remove(&to);
            }
            if let Some(repo) = document.repositories.get_mut(&to) {
                repo.depended_by.remove(&from);
            }
        }
        self.persist().await
    }

    /// Depth-keyed map of every repository transitively depended on by `id`,
    /// up to `max_depth` hops.
    pub async fn get_dependencies(&self, id: Uuid, max_depth: usize) -> HashMap<usize, Vec<Uuid>> {
        let document = self.document.read().await;
        let mut result = HashMap::new();
        let mut frontier: Vec<Uuid> = document.repositories.get(&id).map(|r| r.depends_on.iter().copied().collect()).unwrap_or_default();
        let mut visited: HashSet<Uuid> = frontier.iter().copied().collect();

        let mut depth = 1;
        while !frontier.is_empty() && depth <= max_depth {
            result.insert(depth, frontier.clone());
            let mut next = Vec::new();
            for repo_id in &frontier {
                if let Some(repo) = document.repositories.get(repo_id) {
                    for &dep in &repo.depends_on {
                        if visited.insert(dep) {
                            next.push(dep);
                        }
                    }
                }
            }
            frontier = next;
            depth += 1;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> (RepositoryRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.json");
        (RepositoryRegistry::load(path).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn register_then_lookup_round_trips() {
        let (registry, _dir) = registry().await;
        let repo = registry
            .register("codemem".into(), "/repos/codemem".into(), RepositoryType::Standalone, None)
            .await
            .unwrap();

        assert_eq!(registry.get(repo.id).await.unwrap().name, "codemem");
        assert_eq!(registry.get_by_path("/repos/codemem").await.unwrap().id, repo.id);
    }

    #[tokio::test]
    async fn duplicate_path_is_rejected() {
        let (registry, _dir) = registry().await;
        registry.register("a".into(), "/repos/a".into(), RepositoryType::Standalone, None).await.unwrap();
        let err = registry.register("b".into(), "/repos/a".into(), RepositoryType::Standalone, None).await.unwrap_err();
        assert!(matches!(err, Error::DuplicatePath(_)));
    }

    #[tokio::test]
    async fn cyclic_dependency_is_rejected() {
        let (registry, _dir) = registry().await;
        let a = registry.register("a".into(), "/repos/a".into(), RepositoryType::Standalone, None).await.unwrap();
        let b = registry.register("b".into(), "/repos/b".into(), RepositoryType::Standalone, None).await.unwrap();

        registry.add_dependency(a.id, b.id).await.unwrap();
        let err = registry.add_dependency(b.id, a.id).await.unwrap_err();
        assert!(matches!(err, Error::DependencyCycle { .. }));
    }

    #[tokio::test]
    async fn unregister_cleans_up_other_records_edges() {
        let (registry, _dir) = registry().await;
        let a = registry.register("a".into(), "/repos/a".into(), RepositoryType::Standalone, None).await.unwrap();
        let b = registry.register("b".into(), "/repos/b".into(), RepositoryType::Standalone, None).await.unwrap();
        registry.add_dependency(a.id, b.id).await.unwrap();

        registry.unregister(b.id).await.unwrap();
        let a_after = registry.get(a.id).await.unwrap();
        assert!(!a_after.depends_on.contains(&b.id));
    }

    #[tokio::test]
    async fn get_dependencies_is_depth_keyed() {
        let (registry, _dir) = registry().await;
        let a = registry.register("a".into(), "/repos/a".into(), RepositoryType::Standalone, None).await.unwrap();
        let b = registry.register("b".into(), "/repos/b".into(), RepositoryType::Standalone, None).await.unwrap();
        let c = registry.register("c".into(), "/repos/c".into(), RepositoryType::Standalone, None).await.unwrap();
        registry.add_dependency(a.id, b.id).await.unwrap();
        registry.add_dependency(b.id, c.id).await.unwrap();

        let deps = registry.get_dependencies(a.id, 5).await;
        assert_eq!(deps[&1], vec![b.id]);
        assert_eq!(deps[&2], vec![c.id]);
    }

    #[tokio::test]
    async fn persists_across_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.json");
        {
            let registry = RepositoryRegistry::load(path.clone()).await.unwrap();
            registry.register("a".into(), "/repos/a".into(), RepositoryType::Standalone, None).await.unwrap();
        }
        let reloaded = RepositoryRegistry::load(path).await.unwrap();
        assert!(reloaded.get_by_path("/repos/a").await.is_some());
    }
}
