//! Workspace manager (§4.8): named groupings of repositories for scoped
//! search and batch indexing.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repository::RepositoryRegistry;
use super::{read_or_default, write_atomic};
use crate::model::{MetadataValue, Workspace};
use crate::{Error, Result};

/// Serializes as the bare id-to-workspace map, with no wrapping key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct WorkspaceDocument {
    workspaces: HashMap<Uuid, Workspace>,
}

/// JSON-file-backed workspace manager, persisted atomically.
pub struct WorkspaceManager {
    path: PathBuf,
    document: RwLock<WorkspaceDocument>,
}

impl WorkspaceManager {
    /// Load the workspace document from `path`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let document = read_or_default(&path).await?;
        Ok(Self { path, document: RwLock::new(document) })
    }

    async fn persist(&self) -> Result<()> {
        let document = self.document.read().await;
        write_atomic(&self.path, &*document).await
    }

    /// Create a workspace with the given member repository ids. When
    /// `registry` is attached, every id is validated to exist first.
    pub async fn create(
        &self,
        name: String,
        description: Option<String>,
        repository_ids: HashSet<Uuid>,
        registry: Option<&RepositoryRegistry>,
    ) -> Result<Workspace> {
        if let Some(registry) = registry {
            for &id in &repository_ids {
                if registry.get(id).await.is_none() {
                    return Err(Error::MemoryNotFound(id.to_string()));
                }
            }
        }

        let now = Utc::now();
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name,
            description,
            repository_ids: repository_ids.clone(),
            auto_index: false,
            cross_repo_search_enabled: true,
            created_at: now,
            updated_at: now,
            tags: HashSet::new(),
            settings: HashMap::new(),
        };

        {
            let mut document = self.document.write().await;
            document.workspaces.insert(workspace.id, workspace.clone());
        }
        self.persist().await?;

        if let Some(registry) = registry {
            for &id in &repository_ids {
                registry.add_workspace_membership(id, workspace.id).await?;
            }
        }

        Ok(workspace)
    }

    /// Fetch by id.
    pub async fn get(&self, id: Uuid) -> Option<Workspace> {
        self.document.read().await.workspaces.get(&id).cloned()
    }

    /// List every workspace.
    pub async fn list(&self) -> Vec<Workspace> {
        self.document.read().await.workspaces.values().cloned().collect()
    }

    /// Add a repository to a workspace, propagating the membership through
    /// the registry when attached.
    pub async fn add_repository(&self, workspace_id: Uuid, repository_id: Uuid, registry: Option<&RepositoryRegistry>) -> Result<Workspace> {
        let updated = {
            let mut document = self.document.write().await;
            let workspace = document
                .workspaces
                .get_mut(&workspace_id)
                .ok_or_else(|| Error::MemoryNotFound(workspace_id.to_string()))?;
            workspace.repository_ids.insert(repository_id);
            workspace.updated_at = Utc::now();
            workspace.clone()
        };
        self.persist().await?;

        if let Some(registry) = registry {
            registry.add_workspace_membership(repository_id, workspace_id).await?;
        }
        Ok(updated)
    }

    /// Remove a repository from a workspace, propagating through the
    /// registry when attached.
    pub async fn remove_repository(&self, workspace_id: Uuid, repository_id: Uuid, registry: Option<&RepositoryRegistry>) -> Result<Workspace> {
        let updated = {
            let mut document = self.document.write().await;
            let workspace = document
                .workspaces
                .get_mut(&workspace_id)
                .ok_or_else(|| Error::MemoryNotFound(workspace_id.to_string()))?;
            workspace.repository_ids.remove(&repository_id);
            workspace.updated_at = Utc::now();
            workspace.clone()
        };
        self.persist().await?;

        if let Some(registry) = registry {
            registry.remove_workspace_membership(repository_id, workspace_id).await?;
        }
        Ok(updated)
    }

    /// Set an arbitrary workspace setting.
    pub async fn set_setting(&self, workspace_id: Uuid, key: String, value: MetadataValue) -> Result<Workspace> {
        let updated = {
            let mut document = self.document.write().await;
            let workspace = document
                .workspaces
                .get_mut(&workspace_id)
                .ok_or_else(|| Error::MemoryNotFound(workspace_id.to_string()))?;
            workspace.settings.insert(key, value);
            workspace.updated_at = Utc::now();
            workspace.clone()
        };
        self.persist().await?;
        Ok(updated)
    }

    /// Delete a workspace, removing its membership from every associated
    /// repository when a registry is attached.
    pub async fn delete(&self, workspace_id: Uuid, registry: Option<&RepositoryRegistry>) -> Result<()> {
        let removed = {
            let mut document = self.document.write().await;
            document.workspaces.remove(&workspace_id)
        };
        self.persist().await?;

        if let (Some(workspace), Some(registry)) = (removed, registry) {
            for repo_id in workspace.repository_ids {
                registry.remove_workspace_membership(repo_id, workspace_id).await?;
            }
        }
        Ok(())
    }
}
