//! Merge strategies and the merge engine (§4.6).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{MemoryUnit, MergeStrategy};
use crate::store::VectorStore;
use crate::{Error, Result};

/// A completed (or dry-run) merge, recorded for audit purposes.
#[derive(Debug, Clone)]
pub struct MergeHistoryEntry {
    /// Canonical memory id the cluster collapsed into.
    pub canonical_id: Uuid,
    /// Strategy applied.
    pub strategy: MergeStrategy,
    /// Every id that took part (canonical + duplicates).
    pub input_ids: Vec<Uuid>,
    /// When the merge ran.
    pub timestamp: DateTime<Utc>,
    /// Whether this entry represents a dry run (no mutation occurred).
    pub dry_run: bool,
}

/// The merged-but-not-yet-persisted representation produced by applying a
/// [`MergeStrategy`] to a set of memories.
#[derive(Debug, Clone)]
pub struct MergedRepresentation {
    /// Id the merge result will be upserted under.
    pub canonical_id: Uuid,
    /// Final content.
    pub content: String,
    /// Union of every member's tags.
    pub tags: HashSet<String>,
    /// Max importance across members.
    pub importance: f32,
}

fn apply_strategy(strategy: MergeStrategy, members: &[MemoryUnit], use_counts: &[(Uuid, u64)]) -> MergedRepresentation {
    let tags = members.iter().fold(HashSet::new(), |mut acc, m| {
        acc.extend(m.tags.iter().cloned());
        acc
    });
    let importance = members.iter().map(|m| m.importance).fold(0.0_f32, f32::max);

    let canonical = match strategy {
        MergeStrategy::KeepMostRecent => members.iter().max_by_key(|m| m.created_at).unwrap(),
        MergeStrategy::KeepHighestImportance => members
            .iter()
            .max_by(|a, b| a.importance.partial_cmp(&b.importance).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap(),
        MergeStrategy::KeepMostAccessed => {
            let best = use_counts.iter().max_by_key(|(_, c)| *c);
            match best {
                Some((id, _)) => members.iter().find(|m| m.id == *id).unwrap_or(&members[0]),
                None => &members[0],
            }
        }
        MergeStrategy::MergeContent | MergeStrategy::UserSelected => &members[0],
    };

    let content = if strategy == MergeStrategy::MergeContent {
        merged_content(members)
    } else {
        canonical.content.clone()
    };

    MergedRepresentation { canonical_id: canonical.id, content, tags, importance }
}

/// Frozen merge-content format: a header naming the total member count,
/// followed by deduplicated contents separated by a horizontal rule. Pinned
/// by a test — do not change this string.
fn merged_content(members: &[MemoryUnit]) -> String {
    let mut seen = HashSet::new();
    let unique: Vec<&str> = members
        .iter()
        .map(|m| m.content.as_str())
        .filter(|c| seen.insert(*c))
        .collect();
    format!("[Merged from {} memories]\n\n{}", members.len(), unique.join("\n\n---\n\n"))
}

/// Load `canonical_id` and `duplicate_ids`, apply `strategy`, and either
/// return the merge preview (`dry_run`) or persist it: re-embed the merged
/// content, upsert under the canonical id, delete the duplicates, and record
/// a [`MergeHistoryEntry`].
///
/// Missing duplicate ids are logged and skipped rather than failing the
/// whole merge.
pub async fn merge_memories(
    store: &dyn VectorStore,
    embed: impl Fn(&str) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + '_>>,
    canonical_id: Uuid,
    duplicate_ids: &[Uuid],
    strategy: MergeStrategy,
    dry_run: bool,
) -> Result<(MergedRepresentation, MergeHistoryEntry)> {
    let canonical = store
        .get_by_id(canonical_id)
        .await?
        .ok_or_else(|| Error::MemoryNotFound(canonical_id.to_string()))?;

    let canonical_usage = crate::memory::usage::usage_stats(store, canonical_id).await?;
    let mut members = vec![canonical];
    let mut use_counts = vec![(canonical_id, canonical_usage.map(|u| u.use_count).unwrap_or(0))];
    let mut resolved_duplicates = Vec::new();

    for &id in duplicate_ids {
        match store.get_by_id(id).await? {
            Some(unit) => {
                let usage = crate::memory::usage::usage_stats(store, id).await?;
                use_counts.push((id, usage.map(|u| u.use_count).unwrap_or(0)));
                members.push(unit);
                resolved_duplicates.push(id);
            }
            None => tracing::warn!("merge_memories: duplicate {id} not found, skipping"),
        }
    }

    let representation = apply_strategy(strategy, &members, &use_counts);
    let now = Utc::now();
    let mut input_ids = vec![canonical_id];
    input_ids.extend(&resolved_duplicates);

    let history = MergeHistoryEntry { canonical_id: representation.canonical_id, strategy, input_ids, timestamp: now, dry_run };

    if dry_run {
        return Ok((representation, history));
    }

    let vector = embed(&representation.content).await?;
    let mut merged_unit = members
        .iter()
        .find(|m| m.id == representation.canonical_id)
        .cloned()
        .unwrap();
    merged_unit.content = representation.content.clone();
    merged_unit.tags = representation.tags.clone();
    merged_unit.importance = representation.importance;
    merged_unit.updated_at = now;

    let canonical_store_id = merged_unit.id;
    store.delete(canonical_store_id).await?;
    store.store(merged_unit, vector).await?;

    for &id in &resolved_duplicates {
        if id != representation.canonical_id {
            store.delete(id).await?;
        }
    }

    Ok((representation, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContextLevel, LifecycleState, MemoryCategory, MemoryProvenance, MemoryScope, ProvenanceSource};
    use crate::store::InMemoryVectorStore;
    use std::collections::HashMap;

    fn unit(content: &str, importance: f32) -> MemoryUnit {
        let now = Utc::now();
        MemoryUnit {
            id: Uuid::new_v4(),
            content: content.to_string(),
            category: MemoryCategory::Fact,
            context_level: ContextLevel::ProjectContext,
            scope: MemoryScope::Global,
            project_name: None,
            importance,
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

    fn fake_embed(text: &str) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + '_>> {
        let len = text.len();
        Box::pin(async move { Ok(vec![len as f32]) })
    }

    #[test]
    fn merge_content_format_is_pinned() {
        let a = unit("alpha", 0.5);
        let b = unit("beta", 0.9);
        let members = vec![a, b];
        let merged = merged_content(&members);
        assert_eq!(merged, "[Merged from 2 memories]\n\nalpha\n\n---\n\nbeta");
    }

    #[test]
    fn merge_content_deduplicates_identical_contents() {
        let a = unit("same text", 0.5);
        let mut b = unit("same text", 0.5);
        b.id = Uuid::new_v4();
        let merged = merged_content(&[a, b]);
        assert_eq!(merged, "[Merged from 2 memories]\n\nsame text");
    }

    #[tokio::test]
    async fn dry_run_does_not_mutate_store() {
        let store = InMemoryVectorStore::new();
        let a = unit("alpha content", 0.5);
        let a_id = store.store(a, vec![1.0]).await.unwrap();
        let b = unit("beta content", 0.9);
        let b_id = store.store(b, vec![1.0]).await.unwrap();

        let (representation, history) =
            merge_memories(&store, fake_embed, a_id, &[b_id], MergeStrategy::MergeContent, true).await.unwrap();

        assert!(history.dry_run);
        assert!(representation.content.contains("alpha content"));
        assert!(representation.content.contains("beta content"));
        assert!(store.get_by_id(a_id).await.unwrap().is_some());
        assert!(store.get_by_id(b_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn keep_highest_importance_selects_expected_canonical() {
        let store = InMemoryVectorStore::new();
        let a = unit("alpha", 0.2);
        let a_id = store.store(a, vec![1.0]).await.unwrap();
        let b = unit("beta", 0.95);
        let b_id = store.store(b, vec![1.0]).await.unwrap();

        let (representation, _) =
            merge_memories(&store, fake_embed, a_id, &[b_id], MergeStrategy::KeepHighestImportance, true)
                .await
                .unwrap();
        assert_eq!(representation.canonical_id, b_id);
        assert_eq!(representation.content, "beta");
    }

    #[tokio::test]
    async fn real_merge_reduces_population_by_duplicate_count() {
        let store = InMemoryVectorStore::new();
        let a = unit("alpha", 0.5);
        let a_id = store.store(a, vec![1.0]).await.unwrap();
        let b = unit("beta", 0.5);
        let b_id = store.store(b, vec![1.0]).await.unwrap();
        let c = unit("gamma", 0.5);
        let c_id = store.store(c, vec![1.0]).await.unwrap();

        merge_memories(&store, fake_embed, a_id, &[b_id, c_id], MergeStrategy::MergeContent, false)
            .await
            .unwrap();

        let (remaining, _) = store
            .list_memories(None, crate::store::SortField::CreatedAt, crate::store::SortOrder::Desc, u64::MAX, 0)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
