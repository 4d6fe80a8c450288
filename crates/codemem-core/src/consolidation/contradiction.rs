//! Contradiction detection between same-category memories (§4.6), using the
//! same key-term tokenizer as query expansion (§4.11).

use chrono::{DateTime, Utc};

use crate::memory::query_expansion::extract_key_terms;
use crate::model::{MemoryCategory, MemoryUnit};
use crate::store::{SearchFilters, VectorStore};
use crate::Result;

/// Minimum cosine similarity for two memories to even be considered for
/// contradiction.
pub const SIMILARITY_THRESHOLD: f32 = 0.7;
/// Minimum age gap between two memories for a contradiction to be plausible.
pub const MIN_AGE_GAP_DAYS: i64 = 30;

/// A pair flagged as contradictory, surfaced for review — never
/// auto-resolved.
#[derive(Debug, Clone)]
pub struct ContradictionPair {
    /// The older of the two memories.
    pub older: MemoryUnit,
    /// The newer of the two memories.
    pub newer: MemoryUnit,
    /// Cosine similarity between the pair.
    pub similarity: f32,
    /// Cue words that triggered the flag.
    pub matched_cue_words: Vec<String>,
}

/// `true` when `a` and `b` share at least one cue-word anchor term while
/// their remaining (non-cue) terms are disjoint: they agree on the subject,
/// disagree on the assertion.
fn is_contradictory(a: &str, b: &str, cue_words: &[String]) -> (bool, Vec<String>) {
    let terms_a = extract_key_terms(a);
    let terms_b = extract_key_terms(b);

    let matched: Vec<String> = cue_words
        .iter()
        .filter(|cue| terms_a.contains(cue.as_str()) && terms_b.contains(cue.as_str()))
        .cloned()
        .collect();
    if matched.is_empty() {
        return (false, matched);
    }

    let remainder_a: std::collections::HashSet<&String> =
        terms_a.iter().filter(|t| !cue_words.contains(t)).collect();
    let remainder_b: std::collections::HashSet<&String> =
        terms_b.iter().filter(|t| !cue_words.contains(t)).collect();

    let disjoint = remainder_a.is_disjoint(&remainder_b);
    (disjoint, matched)
}

/// Scan all memories of `category` pairwise for contradictions, using
/// `similarity` as a stand-in for embedding cosine similarity between pairs
/// (callers that have vectors on hand should use those instead; this
/// signature takes unit pairs so pure content-based scans are possible
/// without re-embedding).
pub async fn find_contradictions(
    store: &dyn VectorStore,
    category: MemoryCategory,
    cue_words: &[String],
    similarity_fn: impl Fn(&MemoryUnit, &MemoryUnit) -> f32,
    now: DateTime<Utc>,
) -> Result<Vec<ContradictionPair>> {
    let filters = SearchFilters { category: Some(category), ..Default::default() };
    let (units, _) = store
        .list_memories(Some(&filters), crate::store::SortField::CreatedAt, crate::store::SortOrder::Asc, u64::MAX, 0)
        .await?;

    let mut pairs = Vec::new();
    for i in 0..units.len() {
        for j in (i + 1)..units.len() {
            let (older, newer) = if units[i].created_at <= units[j].created_at {
                (&units[i], &units[j])
            } else {
                (&units[j], &units[i])
            };

            let age_gap = (newer.created_at - older.created_at).num_days();
            if age_gap < MIN_AGE_GAP_DAYS {
                continue;
            }

            let similarity = similarity_fn(older, newer);
            if similarity <= SIMILARITY_THRESHOLD {
                continue;
            }

            let (flagged, matched_cue_words) = is_contradictory(&older.content, &newer.content, cue_words);
            if flagged {
                pairs.push(ContradictionPair {
                    older: older.clone(),
                    newer: newer.clone(),
                    similarity,
                    matched_cue_words,
                });
            }
        }
    }

    let _ = now;
    Ok(pairs)
}
