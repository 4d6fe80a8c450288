//! Usage tracking co-located with the vector-store payload (§4.12), grounded
//! in `qdrant_store.py`'s usage-tracking methods.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{MemoryUnit, MetadataValue, UsageRecord};
use crate::store::VectorStore;
use crate::Result;

fn metadata_to_usage(metadata: &HashMap<String, MetadataValue>) -> Option<UsageRecord> {
    let first_seen = match metadata.get("usage_first_seen") {
        Some(MetadataValue::String(s)) => DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc),
        _ => return None,
    };
    let last_used = match metadata.get("usage_last_used") {
        Some(MetadataValue::String(s)) => DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc),
        _ => return None,
    };
    let use_count = match metadata.get("usage_count") {
        Some(MetadataValue::Number(n)) => *n as u64,
        _ => 0,
    };
    let last_search_score = match metadata.get("usage_last_score") {
        Some(MetadataValue::Number(n)) => *n as f32,
        _ => 0.0,
    };
    Some(UsageRecord { first_seen, last_used, use_count, last_search_score })
}

fn usage_to_metadata(usage: &UsageRecord) -> HashMap<String, MetadataValue> {
    let mut map = HashMap::new();
    map.insert(
        "usage_first_seen".to_string(),
        MetadataValue::String(usage.first_seen.to_rfc3339()),
    );
    map.insert(
        "usage_last_used".to_string(),
        MetadataValue::String(usage.last_used.to_rfc3339()),
    );
    map.insert(
        "usage_count".to_string(),
        MetadataValue::Number(usage.use_count as f64),
    );
    map.insert(
        "usage_last_score".to_string(),
        MetadataValue::Number(usage.last_search_score as f64),
    );
    map
}

/// Records a single use of `id`, creating its [`UsageRecord`] on first use
/// and incrementing it otherwise.
pub async fn record_usage(store: &dyn VectorStore, id: Uuid, search_score: f32) -> Result<()> {
    let Some(unit) = store.get_by_id(id).await? else {
        return Ok(());
    };
    let now = Utc::now();
    let usage = match metadata_to_usage(&unit.metadata) {
        Some(mut existing) => {
            existing.use_count += 1;
            existing.last_used = now;
            existing.last_search_score = search_score;
            existing
        }
        None => UsageRecord { first_seen: now, last_used: now, use_count: 1, last_search_score: search_score },
    };
    store.update(id, usage_to_metadata(&usage)).await?;
    Ok(())
}

/// Best-effort batch variant backing the Memory Store API's access tracking
/// (§4.4). Failures to update an individual record are logged, not
/// propagated: the search call that triggered tracking must not fail.
pub async fn batch_record_usage(store: Arc<dyn VectorStore>, records: Vec<(Uuid, f32)>) {
    for (id, score) in records {
        if let Err(e) = record_usage(store.as_ref(), id, score).await {
            tracing::warn!("best-effort usage update failed for {id}: {e}");
        }
    }
}

/// Fetch the usage record for a single memory, if any.
pub async fn usage_stats(store: &dyn VectorStore, id: Uuid) -> Result<Option<UsageRecord>> {
    Ok(store.get_by_id(id).await?.and_then(|u| metadata_to_usage(&u.metadata)))
}

/// Fetch usage records for every memory that has one.
pub async fn all_usage_stats(store: &dyn VectorStore) -> Result<Vec<UsageRecord>> {
    let (units, _) = store
        .list_memories(None, crate::store::SortField::CreatedAt, crate::store::SortOrder::Desc, u64::MAX, 0)
        .await?;
    Ok(units.iter().filter_map(|u| metadata_to_usage(&u.metadata)).collect())
}

/// Remove usage tracking fields from a memory's payload.
pub async fn clear_usage(store: &dyn VectorStore, id: Uuid) -> Result<bool> {
    let Some(_unit) = store.get_by_id(id).await? else {
        return Ok(false);
    };
    let cleared = [
        ("usage_first_seen".to_string(), MetadataValue::Bool(false)),
        ("usage_last_used".to_string(), MetadataValue::Bool(false)),
        ("usage_count".to_string(), MetadataValue::Number(0.0)),
        ("usage_last_score".to_string(), MetadataValue::Number(0.0)),
    ]
    .into_iter()
    .collect();
    store.update(id, cleared).await
}

/// Records with `use_count == 0` (or no usage record at all) whose last
/// activity predates `cutoff`, excluding any context level in
/// `exclude_context_levels`. Supports the storage optimizer and lifecycle
/// manager.
pub async fn find_unused_memories(
    store: &dyn VectorStore,
    cutoff: DateTime<Utc>,
    exclude_context_levels: &[String],
) -> Result<Vec<MemoryUnit>> {
    let (units, _) = store
        .list_memories(None, crate::store::SortField::LastAccessed, crate::store::SortOrder::Asc, u64::MAX, 0)
        .await?;
    Ok(units
        .into_iter()
        .filter(|u| !exclude_context_levels.contains(&u.context_level.to_string()))
        .filter(|u| u.last_accessed < cutoff)
        .filter(|u| metadata_to_usage(&u.metadata).map(|r| r.use_count).unwrap_or(0) == 0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContextLevel, LifecycleState, MemoryCategory, MemoryProvenance, MemoryScope, ProvenanceSource};
    use crate::store::InMemoryVectorStore;
    use std::collections::HashSet;

    fn unit() -> MemoryUnit {
        let now = Utc::now();
        MemoryUnit {
            id: Uuid::new_v4(),
            content: "x".into(),
            category: MemoryCategory::Fact,
            context_level: ContextLevel::ProjectContext,
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
    async fn record_usage_creates_then_increments() {
        let store = InMemoryVectorStore::new();
        let u = unit();
        let id = store.store(u, vec![1.0]).await.unwrap();

        record_usage(&store, id, 0.8).await.unwrap();
        let stats = usage_stats(&store, id).await.unwrap().unwrap();
        assert_eq!(stats.use_count, 1);

        record_usage(&store, id, 0.9).await.unwrap();
        let stats = usage_stats(&store, id).await.unwrap().unwrap();
        assert_eq!(stats.use_count, 2);
        assert_eq!(stats.last_search_score, 0.9);
    }

    #[tokio::test]
    async fn find_unused_memories_excludes_used_records() {
        let store = InMemoryVectorStore::new();
        let used = unit();
        let used_id = store.store(used, vec![1.0]).await.unwrap();
        let unused = unit();
        store.store(unused, vec![1.0]).await.unwrap();

        record_usage(&store, used_id, 0.5).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::days(1);
        let results = find_unused_memories(&store, cutoff, &[]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_ne!(results[0].id, used_id);
    }
}
