//! Cooperative, run-once background jobs (§4.6/§9): no scheduler lives here,
//! only the operations a caller's own cron/timer triggers.

use std::path::Path;

use chrono::Utc;
use uuid::Uuid;

use super::contradiction::{find_contradictions, ContradictionPair};
use super::duplicate::{find_duplicate_clusters, jaccard_similarity, DuplicateCluster, AUTO_MERGE_THRESHOLD, REVIEW_THRESHOLD};
use super::engine::merge_memories;
use crate::model::{MemoryCategory, MergeStrategy};
use crate::store::VectorStore;
use crate::Result;

/// Summary returned by [`run_daily_auto_merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoMergeSummary {
    /// Clusters collapsed.
    pub clusters_merged: usize,
    /// Total memories removed across all merges.
    pub memories_removed: usize,
}

/// Auto-merge every cluster at or above [`AUTO_MERGE_THRESHOLD`] across the
/// given categories, using [`MergeStrategy::KeepMostRecent`] to pick the
/// canonical member. `similarity_fn` drives the pairwise comparisons that
/// seed clustering (see [`find_duplicate_clusters`]).
pub async fn run_daily_auto_merge(
    store: &dyn VectorStore,
    embed: impl Fn(&str) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + '_>> + Copy,
    similarity_fn: impl Fn(&crate::model::MemoryUnit, &crate::model::MemoryUnit) -> f32 + Copy,
    categories: &[MemoryCategory],
) -> Result<AutoMergeSummary> {
    let mut summary = AutoMergeSummary::default();

    for &category in categories {
        let clusters = find_duplicate_clusters(store, category, None, AUTO_MERGE_THRESHOLD, similarity_fn).await?;
        for cluster in clusters.into_iter().filter(|c| c.is_auto_mergeable()) {
            let Some((canonical, duplicates)) = split_cluster(&cluster) else { continue };
            merge_memories(store, embed, canonical, &duplicates, MergeStrategy::KeepMostRecent, false).await?;
            summary.clusters_merged += 1;
            summary.memories_removed += duplicates.len();
        }
    }

    Ok(summary)
}

fn split_cluster(cluster: &DuplicateCluster) -> Option<(Uuid, Vec<Uuid>)> {
    let (first, rest) = cluster.members.split_first()?;
    Some((*first, rest.to_vec()))
}

/// Enumerate review-band clusters (0.85–0.95) across the given categories and
/// persist a plain-text report under `reports_dir`.
pub async fn run_weekly_review_scan(
    store: &dyn VectorStore,
    similarity_fn: impl Fn(&crate::model::MemoryUnit, &crate::model::MemoryUnit) -> f32 + Copy,
    categories: &[MemoryCategory],
    reports_dir: &Path,
) -> Result<Vec<DuplicateCluster>> {
    let mut all_clusters = Vec::new();
    for &category in categories {
        let clusters = find_duplicate_clusters(store, category, None, REVIEW_THRESHOLD, similarity_fn).await?;
        all_clusters.extend(clusters.into_iter().filter(|c| !c.is_auto_mergeable()));
    }

    let report = render_review_report(&all_clusters);
    write_report(reports_dir, "weekly-review-scan", &report).await?;
    Ok(all_clusters)
}

fn render_review_report(clusters: &[DuplicateCluster]) -> String {
    let mut out = String::from("Duplicate review candidates (similarity 0.85-0.95)\n\n");
    if clusters.is_empty() {
        out.push_str("No review candidates found.\n");
        return out;
    }
    for (i, cluster) in clusters.iter().enumerate() {
        let canonical = cluster.members[0];
        out.push_str(&format!(
            "Cluster {}: canonical={canonical} members={:?} min_similarity={:.3}\n  next step: codemem merge --canonical {canonical} --duplicates {}\n\n",
            i + 1,
            cluster.members,
            cluster.min_similarity,
            cluster.members[1..].iter().map(|id| id.to_string()).collect::<Vec<_>>().join(","),
        ));
    }
    out
}

/// Scan for contradictions across the given categories and persist a report
/// in the same style as [`run_weekly_review_scan`].
pub async fn run_monthly_contradiction_scan(
    store: &dyn VectorStore,
    categories: &[MemoryCategory],
    cue_words: &[String],
    similarity_fn: impl Fn(&crate::model::MemoryUnit, &crate::model::MemoryUnit) -> f32 + Copy,
    reports_dir: &Path,
) -> Result<Vec<ContradictionPair>> {
    let mut all_pairs = Vec::new();
    for &category in categories {
        let pairs = find_contradictions(store, category, cue_words, similarity_fn, Utc::now()).await?;
        all_pairs.extend(pairs);
    }

    let report = render_contradiction_report(&all_pairs);
    write_report(reports_dir, "monthly-contradiction-scan", &report).await?;
    Ok(all_pairs)
}

fn render_contradiction_report(pairs: &[ContradictionPair]) -> String {
    let mut out = String::from("Contradiction review candidates\n\n");
    if pairs.is_empty() {
        out.push_str("No contradictions found.\n");
        return out;
    }
    for (i, pair) in pairs.iter().enumerate() {
        out.push_str(&format!(
            "Pair {}: older={} newer={} similarity={:.3} cue_words={:?}\n  \"{}\"\n  \"{}\"\n\n",
            i + 1,
            pair.older.id,
            pair.newer.id,
            pair.similarity,
            pair.matched_cue_words,
            pair.older.content,
            pair.newer.content,
        ));
    }
    out
}

async fn write_report(reports_dir: &Path, name: &str, contents: &str) -> Result<()> {
    tokio::fs::create_dir_all(reports_dir).await?;
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let path = reports_dir.join(format!("{name}-{timestamp}.txt"));
    let tmp_path = reports_dir.join(format!("{name}-{timestamp}.txt.tmp"));
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, &path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContextLevel, LifecycleState, MemoryProvenance, MemoryScope, MemoryUnit, ProvenanceSource};
    use crate::store::InMemoryVectorStore;
    use std::collections::{HashMap, HashSet};

    fn unit(content: &str) -> MemoryUnit {
        let now = Utc::now();
        MemoryUnit {
            id: Uuid::new_v4(),
            content: content.to_string(),
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

    fn fake_embed(text: &str) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + '_>> {
        let len = text.len();
        Box::pin(async move { Ok(vec![len as f32]) })
    }

    #[tokio::test]
    async fn daily_auto_merge_collapses_identical_clusters() {
        let store = InMemoryVectorStore::new();
        store.store(unit("rust tokio async scheduler runtime"), vec![1.0]).await.unwrap();
        store.store(unit("rust tokio async scheduler runtime"), vec![1.0]).await.unwrap();

        let summary = run_daily_auto_merge(&store, fake_embed, jaccard_similarity, &[MemoryCategory::Fact]).await.unwrap();
        assert_eq!(summary.clusters_merged, 1);
        assert_eq!(summary.memories_removed, 1);
    }

    #[tokio::test]
    async fn weekly_review_scan_writes_report_file() {
        let store = InMemoryVectorStore::new();
        let dir = tempfile::tempdir().unwrap();

        run_weekly_review_scan(&store, jaccard_similarity, &[MemoryCategory::Fact], dir.path()).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut found = false;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().starts_with("weekly-review-scan") {
                found = true;
            }
        }
        assert!(found);
    }
}
