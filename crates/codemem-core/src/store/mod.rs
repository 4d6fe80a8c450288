//! Vector store abstraction: the backend-agnostic contract every storage
//! backend implements, plus the two concrete backends (HTTP-backed,
//! in-memory) and the read-only decorator.

mod memory;
mod qdrant;
mod readonly;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantVectorStore;
pub use readonly::ReadOnlyVectorStore;

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{MemoryCategory, MemoryUnit, MetadataValue};
use crate::Result;

/// Structured filters applied during retrieval (§4.1 filter language).
///
/// Every populated field is conjoined (logical AND). Tag matches are
/// conjoined with each other as well: a record must carry every listed tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Restrict to a single context level.
    pub context_level: Option<String>,
    /// Restrict to a single scope.
    pub scope: Option<String>,
    /// Restrict to a single category.
    pub category: Option<MemoryCategory>,
    /// Restrict to a single project.
    pub project_name: Option<String>,
    /// Floor on `importance` (inclusive).
    pub min_importance: Option<f32>,
    /// Every tag listed must be present on the record.
    pub tags: Vec<String>,
}

impl SearchFilters {
    /// True when no constraint is set (matches every record).
    pub fn is_empty(&self) -> bool {
        self.context_level.is_none()
            && self.scope.is_none()
            && self.category.is_none()
            && self.project_name.is_none()
            && self.min_importance.is_none()
            && self.tags.is_empty()
    }

    /// Whether `unit` satisfies every populated constraint.
    pub fn matches(&self, unit: &MemoryUnit) -> bool {
        if let Some(level) = &self.context_level {
            if unit.context_level.to_string() != *level {
                return false;
            }
        }
        if let Some(scope) = &self.scope {
            if unit.scope.to_string() != *scope {
                return false;
            }
        }
        if let Some(category) = self.category {
            if unit.category != category {
                return false;
            }
        }
        if let Some(project) = &self.project_name {
            if unit.project_name.as_deref() != Some(project.as_str()) {
                return false;
            }
        }
        if let Some(floor) = self.min_importance {
            if unit.importance < floor {
                return false;
            }
        }
        self.tags.iter().all(|t| unit.tags.contains(t))
    }
}

/// Field by which `list_memories` paginates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Sort by creation time.
    CreatedAt,
    /// Sort by last update time.
    UpdatedAt,
    /// Sort by last access time.
    LastAccessed,
    /// Sort by importance.
    Importance,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Aggregate counts for a single project, backing reporting surfaces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectStats {
    /// Total memories scoped to this project.
    pub total_memories: u64,
    /// Distinct files referenced by this project's code units.
    pub num_files: u64,
    /// Number of function-kind code units.
    pub num_functions: u64,
    /// Number of class-kind code units.
    pub num_classes: u64,
    /// Per-category counts.
    pub categories: HashMap<String, u64>,
    /// Per-context-level counts.
    pub context_levels: HashMap<String, u64>,
    /// Most recent `updated_at` seen among this project's records.
    pub last_indexed: Option<chrono::DateTime<chrono::Utc>>,
}

/// A single k-NN hit: the stored unit plus its similarity score.
pub type ScoredUnit = (MemoryUnit, f32);

/// Backend-agnostic contract over a vector database (§4.1).
///
/// Every method is asynchronous and idempotent with respect to retried
/// identical inputs. Implementations must cap `retrieve`/`search_with_filters`
/// results at 100 regardless of the requested `limit`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Atomic single upsert; returns the stored id. `vector` must be
    /// L2-normalized and match the collection's configured dimension.
    async fn store(&self, unit: MemoryUnit, vector: Vec<f32>) -> Result<Uuid>;

    /// Bulk upsert, order-preserving.
    async fn batch_store(&self, items: Vec<(MemoryUnit, Vec<f32>)>) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(items.len());
        for (unit, vector) in items {
            ids.push(self.store(unit, vector).await?);
        }
        Ok(ids)
    }

    /// k-NN search with optional structured filters, descending by
    /// cosine similarity. Results are capped at 100 regardless of `limit`.
    async fn retrieve(
        &self,
        query_vector: &[f32],
        filters: Option<&SearchFilters>,
        limit: usize,
    ) -> Result<Vec<ScoredUnit>>;

    /// Same as [`VectorStore::retrieve`] with filters required.
    async fn search_with_filters(
        &self,
        query_vector: &[f32],
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<ScoredUnit>> {
        self.retrieve(query_vector, Some(filters), limit).await
    }

    /// Direct fetch without search.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>>;

    /// Merge fields into the record's payload, refreshing `updated_at`.
    /// Returns `false` if no record exists with that id.
    async fn update(&self, id: Uuid, partial_metadata: HashMap<String, MetadataValue>)
        -> Result<bool>;

    /// Remove a record. Returns `false` if it did not exist.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Total matching records, scrolling the backend when filters are set.
    async fn count(&self, filters: Option<&SearchFilters>) -> Result<u64> {
        let (_, total) = self
            .list_memories(filters, SortField::CreatedAt, SortOrder::Desc, u64::MAX, 0)
            .await?;
        Ok(total)
    }

    /// Deterministic pagination over all matching records.
    async fn list_memories(
        &self,
        filters: Option<&SearchFilters>,
        sort_by: SortField,
        order: SortOrder,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<MemoryUnit>, u64)>;

    /// Cheap backend reachability probe.
    async fn health_check(&self) -> Result<bool>;

    /// Distinct `project_name` values across the collection (default-implemented
    /// helper over `list_memories`).
    async fn list_projects(&self) -> Result<Vec<String>> {
        let (units, _) = self
            .list_memories(None, SortField::CreatedAt, SortOrder::Desc, u64::MAX, 0)
            .await?;
        let mut names: Vec<String> = units
            .into_iter()
            .filter_map(|u| u.project_name)
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        Ok(names)
    }

    /// Aggregate statistics for a single project (default-implemented helper
    /// over `list_memories`).
    async fn project_stats(&self, project_name: &str) -> Result<ProjectStats> {
        let filters = SearchFilters {
            project_name: Some(project_name.to_string()),
            ..Default::default()
        };
        let (units, total) = self
            .list_memories(Some(&filters), SortField::UpdatedAt, SortOrder::Desc, u64::MAX, 0)
            .await?;
        let mut stats = ProjectStats {
            total_memories: total,
            ..Default::default()
        };
        let mut files = std::collections::HashSet::new();
        for unit in &units {
            *stats.categories.entry(unit.category.to_string()).or_insert(0) += 1;
            *stats
                .context_levels
                .entry(unit.context_level.to_string())
                .or_insert(0) += 1;
            if stats.last_indexed.is_none_or(|t| unit.updated_at > t) {
                stats.last_indexed = Some(unit.updated_at);
            }
            if unit.category == MemoryCategory::Code {
                if let Some(MetadataValue::String(path)) = unit.metadata.get("file_path") {
                    files.insert(path.clone());
                }
                if let Some(MetadataValue::String(kind)) = unit.metadata.get("unit_kind") {
                    match kind.as_str() {
                        "function" => stats.num_functions += 1,
                        "class" => stats.num_classes += 1,
                        _ => {}
                    }
                }
            }
        }
        stats.num_files = files.len() as u64;
        Ok(stats)
    }
}
