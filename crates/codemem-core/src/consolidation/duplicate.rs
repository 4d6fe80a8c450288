//! Near-duplicate detection via union-find clustering (§4.6).

use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{MemoryCategory, MemoryUnit};
use crate::store::{SearchFilters, VectorStore};
use crate::Result;

/// Similarity ≥ this value is safe to auto-merge without review.
pub const AUTO_MERGE_THRESHOLD: f32 = 0.95;
/// Similarity ≥ this value (and below [`AUTO_MERGE_THRESHOLD`]) is surfaced
/// for user review.
pub const REVIEW_THRESHOLD: f32 = 0.85;

/// A cluster of candidate-duplicate memory ids, sized ≥ 2.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCluster {
    /// Member ids, in the order first observed.
    pub members: Vec<Uuid>,
    /// Lowest pairwise similarity observed within the cluster.
    pub min_similarity: f32,
}

impl DuplicateCluster {
    /// True when every pairwise similarity that formed this cluster met the
    /// auto-merge threshold.
    pub fn is_auto_mergeable(&self) -> bool {
        self.min_similarity >= AUTO_MERGE_THRESHOLD
    }
}

struct UnionFind {
    parent: HashMap<Uuid, Uuid>,
}

impl UnionFind {
    fn new() -> Self {
        Self { parent: HashMap::new() }
    }

    fn find(&mut self, x: Uuid) -> Uuid {
        let p = *self.parent.entry(x).or_insert(x);
        if p == x {
            x
        } else {
            let root = self.find(p);
            self.parent.insert(x, root);
            root
        }
    }

    fn union(&mut self, a: Uuid, b: Uuid) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

/// Scan every memory of `category` (and, when `scope_project` is set, also
/// matching scope/project) for near-duplicate clusters at or above
/// `min_threshold`, comparing every pair with `similarity_fn`. Clustering is
/// independent of input ordering: the union-find pass only cares about which
/// pairs cross the threshold, not the order they were visited in.
pub async fn find_duplicate_clusters(
    store: &dyn VectorStore,
    category: MemoryCategory,
    scope_project: Option<(crate::model::MemoryScope, Option<String>)>,
    min_threshold: f32,
    similarity_fn: impl Fn(&MemoryUnit, &MemoryUnit) -> f32,
) -> Result<Vec<DuplicateCluster>> {
    let filters = SearchFilters {
        category: Some(category),
        scope: scope_project.as_ref().map(|(s, _)| s.to_string()),
        project_name: scope_project.and_then(|(_, p)| p),
        ..Default::default()
    };
    let (units, _) = store
        .list_memories(Some(&filters), crate::store::SortField::CreatedAt, crate::store::SortOrder::Asc, u64::MAX, 0)
        .await?;

    if units.len() < 2 {
        return Ok(Vec::new());
    }

    let mut uf = UnionFind::new();
    let mut pair_similarity: HashMap<(Uuid, Uuid), f32> = HashMap::new();

    for i in 0..units.len() {
        for j in (i + 1)..units.len() {
            let sim = similarity_fn(&units[i], &units[j]);
            if sim >= min_threshold {
                uf.union(units[i].id, units[j].id);
                pair_similarity.insert(key(units[i].id, units[j].id), sim);
            }
        }
    }

    let mut clusters: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for u in &units {
        let root = uf.find(u.id);
        clusters.entry(root).or_default().push(u.id);
    }

    let mut result: Vec<DuplicateCluster> = clusters
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|members| {
            let min_similarity = min_pairwise_similarity(&members, &pair_similarity);
            DuplicateCluster { members, min_similarity }
        })
        .collect();

    result.sort_by(|a, b| a.members[0].cmp(&b.members[0]));
    Ok(result)
}

fn key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn min_pairwise_similarity(members: &[Uuid], pair_similarity: &HashMap<(Uuid, Uuid), f32>) -> f32 {
    let mut min = 1.0_f32;
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            if let Some(sim) = pair_similarity.get(&key(members[i], members[j])) {
                min = min.min(*sim);
            }
        }
    }
    min
}

/// Bag-of-words Jaccard similarity over normalized content terms. A
/// `similarity_fn` fallback for callers with no embedding service on hand;
/// production callers should pass a cosine-similarity closure over the
/// caller's embedding service instead.
pub fn jaccard_similarity(a: &MemoryUnit, b: &MemoryUnit) -> f32 {
    let ta = crate::memory::query_expansion::extract_key_terms(&a.content);
    let tb = crate::memory::query_expansion::extract_key_terms(&b.content);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}
