//! Transparent read-only decorator over any [`VectorStore`], grounded in
//! `original_source/src/store/readonly_wrapper.py`: every read forwards to
//! the inner store; every write fails fast with a [`crate::Error::ReadOnly`]
//! that names the next step.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{MemoryUnit, MetadataValue};
use crate::Result;

use super::{ScoredUnit, SearchFilters, SortField, SortOrder, VectorStore};

/// Wraps `inner`, forwarding reads and rejecting every write.
pub struct ReadOnlyVectorStore {
    inner: Arc<dyn VectorStore>,
}

impl ReadOnlyVectorStore {
    /// Wrap `inner` in a read-only facade.
    pub fn new(inner: Arc<dyn VectorStore>) -> Self {
        Self { inner }
    }

    fn write_rejected(op: &str) -> crate::Error {
        crate::Error::ReadOnly(format!(
            "{op} is disabled; this store was opened in read-only mode"
        ))
    }
}

#[async_trait]
impl VectorStore for ReadOnlyVectorStore {
    async fn store(&self, _unit: MemoryUnit, _vector: Vec<f32>) -> Result<Uuid> {
        Err(Self::write_rejected("store"))
    }

    async fn batch_store(&self, _items: Vec<(MemoryUnit, Vec<f32>)>) -> Result<Vec<Uuid>> {
        Err(Self::write_rejected("batch_store"))
    }

    async fn retrieve(
        &self,
        query_vector: &[f32],
        filters: Option<&SearchFilters>,
        limit: usize,
    ) -> Result<Vec<ScoredUnit>> {
        self.inner.retrieve(query_vector, filters, limit).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>> {
        self.inner.get_by_id(id).await
    }

    async fn update(&self, _id: Uuid, _partial_metadata: HashMap<String, MetadataValue>) -> Result<bool> {
        Err(Self::write_rejected("update"))
    }

    async fn delete(&self, _id: Uuid) -> Result<bool> {
        Err(Self::write_rejected("delete"))
    }

    async fn list_memories(
        &self,
        filters: Option<&SearchFilters>,
        sort_by: SortField,
        order: SortOrder,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<MemoryUnit>, u64)> {
        self.inner
            .list_memories(filters, sort_by, order, limit, offset)
            .await
    }

    async fn health_check(&self) -> Result<bool> {
        self.inner.health_check().await
    }
}
