//! In-process [`VectorStore`] implementation used by tests and by any
//! deployment that doesn't need a durable backend. Mirrors the
//! `InMemoryVectorStore` pattern observed across the wider ecosystem:
//! a lock-guarded map plus a brute-force cosine-similarity scan.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::embeddings::cosine_similarity;
use crate::model::{MemoryUnit, MetadataValue};
use crate::Result;

use super::{ProjectStats, ScoredUnit, SearchFilters, SortField, SortOrder, VectorStore};

struct Entry {
    unit: MemoryUnit,
    vector: Vec<f32>,
}

/// A `Send + Sync` in-memory vector store backed by a `RwLock<HashMap>`.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl InMemoryVectorStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn store(&self, unit: MemoryUnit, vector: Vec<f32>) -> Result<Uuid> {
        unit.validate()?;
        let id = unit.id;
        self.entries
            .write()
            .expect("in-memory store lock poisoned")
            .insert(id, Entry { unit, vector });
        Ok(id)
    }

    async fn retrieve(
        &self,
        query_vector: &[f32],
        filters: Option<&SearchFilters>,
        limit: usize,
    ) -> Result<Vec<ScoredUnit>> {
        let capped = limit.min(100);
        let guard = self.entries.read().expect("in-memory store lock poisoned");
        let mut scored: Vec<ScoredUnit> = guard
            .values()
            .filter(|e| filters.is_none_or(|f| f.matches(&e.unit)))
            .map(|e| (e.unit.clone(), cosine_similarity(query_vector, &e.vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.created_at.cmp(&a.0.created_at))
        });
        scored.truncate(capped);
        Ok(scored)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>> {
        Ok(self
            .entries
            .read()
            .expect("in-memory store lock poisoned")
            .get(&id)
            .map(|e| e.unit.clone()))
    }

    async fn update(
        &self,
        id: Uuid,
        partial_metadata: HashMap<String, MetadataValue>,
    ) -> Result<bool> {
        let mut guard = self.entries.write().expect("in-memory store lock poisoned");
        let Some(entry) = guard.get_mut(&id) else {
            return Ok(false);
        };
        entry.unit.metadata.extend(partial_metadata);
        entry.unit.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .expect("in-memory store lock poisoned")
            .remove(&id)
            .is_some())
    }

    async fn list_memories(
        &self,
        filters: Option<&SearchFilters>,
        sort_by: SortField,
        order: SortOrder,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<MemoryUnit>, u64)> {
        let guard = self.entries.read().expect("in-memory store lock poisoned");
        let mut units: Vec<MemoryUnit> = guard
            .values()
            .filter(|e| filters.is_none_or(|f| f.matches(&e.unit)))
            .map(|e| e.unit.clone())
            .collect();
        units.sort_by(|a, b| {
            let ord = match sort_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::LastAccessed => a.last_accessed.cmp(&b.last_accessed),
                SortField::Importance => a
                    .importance
                    .partial_cmp(&b.importance)
                    .unwrap_or(std::cmp::Ordering::Equal),
            };
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        let total = units.len() as u64;
        let page = units
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
