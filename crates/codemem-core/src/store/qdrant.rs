//! HTTP-backed vector store, speaking the REST collection protocol described
//! in SPEC_FULL.md §4.1: `PUT .../points` for upsert, `POST .../points/query`
//! for k-NN search, `POST .../points/delete`, `GET .../points/{id}`,
//! `POST .../points/scroll` for unbounded listing, `GET .../{name}` for
//! health/stats.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::model::MemoryUnit;
use crate::{Error, Result};

use super::{ProjectStats, ScoredUnit, SearchFilters, SortField, SortOrder, VectorStore};

/// HNSW search-time tuning knob forwarded on every query.
const DEFAULT_EF_SEARCH: u64 = 128;

/// A [`VectorStore`] backed by an external HTTP vector database.
pub struct QdrantVectorStore {
    client: Client,
    base_url: String,
    collection: String,
}

impl QdrantVectorStore {
    /// Point at `base_url`'s `collection`, e.g.
    /// `QdrantVectorStore::new("http://localhost:6333", "codemem")`.
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            collection: collection.into(),
        }
    }

    fn points_url(&self) -> String {
        format!("{}/collections/{}/points", self.base_url, self.collection)
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn correlation_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn filters_to_must(filters: &SearchFilters) -> Vec<Value> {
        let mut must = Vec::new();
        if let Some(level) = &filters.context_level {
            must.push(json!({"key": "context_level", "match": {"value": level}}));
        }
        if let Some(scope) = &filters.scope {
            must.push(json!({"key": "scope", "match": {"value": scope}}));
        }
        if let Some(category) = filters.category {
            must.push(json!({"key": "category", "match": {"value": category.to_string()}}));
        }
        if let Some(project) = &filters.project_name {
            must.push(json!({"key": "project_name", "match": {"value": project}}));
        }
        if let Some(floor) = filters.min_importance {
            must.push(json!({"key": "importance", "range": {"gte": floor}}));
        }
        for tag in &filters.tags {
            must.push(json!({"key": "tags", "match": {"value": tag}}));
        }
        must
    }

    fn query_filter(filters: Option<&SearchFilters>) -> Option<Value> {
        let filters = filters?;
        if filters.is_empty() {
            return None;
        }
        Some(json!({"must": Self::filters_to_must(filters)}))
    }

    fn unit_to_payload(unit: &MemoryUnit) -> Result<Value> {
        serde_json::to_value(unit).map_err(Error::from)
    }

    fn payload_to_unit(payload: Value) -> Result<MemoryUnit> {
        serde_json::from_value(payload).map_err(Error::from)
    }
}

#[derive(Deserialize)]
struct ScrollResponsePoint {
    payload: Value,
}

#[derive(Deserialize)]
struct QueryResponsePoint {
    payload: Value,
    score: f32,
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn store(&self, unit: MemoryUnit, vector: Vec<f32>) -> Result<Uuid> {
        let payload = Self::unit_to_payload(&unit)?;
        let body = json!({
            "points": [{
                "id": unit.id.to_string(),
                "vector": vector,
                "payload": payload,
            }]
        });
        let resp = self
            .client
            .put(self.points_url())
            .header("X-Correlation-Id", Self::correlation_id())
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Storage(format!(
                "upsert failed with status {}",
                resp.status()
            )));
        }
        Ok(unit.id)
    }

    async fn retrieve(
        &self,
        query_vector: &[f32],
        filters: Option<&SearchFilters>,
        limit: usize,
    ) -> Result<Vec<ScoredUnit>> {
        let capped = limit.min(100);
        let body = json!({
            "query": query_vector,
            "query_filter": Self::query_filter(filters),
            "limit": capped,
            "params": {"hnsw_ef": DEFAULT_EF_SEARCH},
            "with_payload": true,
        });
        let resp = self
            .client
            .post(format!("{}/query", self.points_url()))
            .header("X-Correlation-Id", Self::correlation_id())
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Retrieval(format!(
                "search failed with status {}",
                resp.status()
            )));
        }
        #[derive(Deserialize)]
        struct QueryResponse {
            result: Vec<QueryResponsePoint>,
        }
        let parsed: QueryResponse = resp.json().await?;
        let mut hits = Vec::with_capacity(parsed.result.len());
        for point in parsed.result {
            match Self::payload_to_unit(point.payload) {
                Ok(unit) => hits.push((unit, point.score)),
                Err(e) => tracing::warn!("skipping unparseable retrieved payload: {e}"),
            }
        }
        Ok(hits)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>> {
        let resp = self
            .client
            .get(format!("{}/{}", self.points_url(), id))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::Storage(format!(
                "get_by_id failed with status {}",
                resp.status()
            )));
        }
        #[derive(Deserialize)]
        struct GetResponse {
            result: ScrollResponsePoint,
        }
        let parsed: GetResponse = resp.json().await?;
        Ok(Some(Self::payload_to_unit(parsed.result.payload)?))
    }

    async fn update(
        &self,
        id: Uuid,
        partial_metadata: HashMap<String, crate::model::MetadataValue>,
    ) -> Result<bool> {
        let Some(mut unit) = self.get_by_id(id).await? else {
            return Ok(false);
        };
        unit.metadata.extend(partial_metadata);
        unit.updated_at = chrono::Utc::now();
        let payload = Self::unit_to_payload(&unit)?;
        let body = json!({
            "points": [id.to_string()],
            "payload": payload,
        });
        let resp = self
            .client
            .post(format!("{}/payload", self.points_url()))
            .header("X-Correlation-Id", Self::correlation_id())
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Storage(format!(
                "payload update failed with status {}",
                resp.status()
            )));
        }
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        if self.get_by_id(id).await?.is_none() {
            return Ok(false);
        }
        let body = json!({"points": [id.to_string()]});
        let resp = self
            .client
            .post(format!("{}/delete", self.points_url()))
            .header("X-Correlation-Id", Self::correlation_id())
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Storage(format!(
                "delete failed with status {}",
                resp.status()
            )));
        }
        Ok(true)
    }

    async fn list_memories(
        &self,
        filters: Option<&SearchFilters>,
        sort_by: SortField,
        order: SortOrder,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<MemoryUnit>, u64)> {
        let body = json!({
            "filter": Self::query_filter(filters),
            "limit": 10_000,
            "with_payload": true,
        });
        let resp = self
            .client
            .post(format!("{}/scroll", self.points_url()))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Storage(format!(
                "scroll failed with status {}",
                resp.status()
            )));
        }
        #[derive(Deserialize)]
        struct ScrollResponse {
            result: ScrollResult,
        }
        #[derive(Deserialize)]
        struct ScrollResult {
            points: Vec<ScrollResponsePoint>,
        }
        let parsed: ScrollResponse = resp.json().await?;
        let mut units: Vec<MemoryUnit> = parsed
            .result
            .points
            .into_iter()
            .filter_map(|p| match Self::payload_to_unit(p.payload) {
                Ok(u) => Some(u),
                Err(e) => {
                    tracing::warn!("skipping unparseable scrolled payload: {e}");
                    None
                }
            })
            .collect();

        sort_units(&mut units, sort_by, order);
        let total = units.len() as u64;
        let page = units
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn health_check(&self) -> Result<bool> {
        let resp = self.client.get(self.collection_url()).send().await;
        Ok(resp.map(|r| r.status().is_success()).unwrap_or(false))
    }
}

fn sort_units(units: &mut [MemoryUnit], sort_by: SortField, order: SortOrder) {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryCategory;

    #[test]
    fn filters_to_must_builds_one_condition_per_tag() {
        let filters = SearchFilters {
            tags: vec!["python".into(), "backend".into()],
            category: Some(MemoryCategory::Preference),
            ..Default::default()
        };
        let must = QdrantVectorStore::filters_to_must(&filters);
        // 2 tag conditions + 1 category condition
        assert_eq!(must.len(), 3);
    }

    #[test]
    fn query_filter_is_none_for_empty_filters() {
        assert!(QdrantVectorStore::query_filter(Some(&SearchFilters::default())).is_none());
        assert!(QdrantVectorStore::query_filter(None).is_none());
    }
}
