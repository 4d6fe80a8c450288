//! Stateless query expansion (§4.11), scoped down from the pre-distillation
//! conversational expander to a pure function of the current query and a
//! caller-supplied list of recent queries: no conversation-tracking
//! subsystem lives here.

use std::collections::HashSet;

use crate::embeddings::cosine_similarity;

const MAX_EXPANSION_TERMS: usize = 5;
const MIN_TERM_LENGTH: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "up", "about", "into", "through", "during", "before", "after", "above", "below",
    "between", "under", "again", "further", "then", "once", "here", "there", "when", "where",
    "why", "how", "all", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "can", "will", "just",
    "should", "now", "what", "does", "is", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "having", "do", "did", "doing",
];

/// A previously issued query, optionally carrying a precomputed embedding.
pub struct RecentQuery<'a> {
    /// The prior query text.
    pub text: &'a str,
    /// Precomputed embedding, if the caller already has one.
    pub embedding: Option<&'a [f32]>,
}

/// Lowercase, stop-word-filtered term extraction shared with the
/// contradiction heuristic (§4.6).
pub fn extract_key_terms(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    let normalized: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    normalized
        .split_whitespace()
        .filter(|w| w.len() >= MIN_TERM_LENGTH && !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Expand `query` using semantically related `recent_queries`. Returns the
/// original query unchanged when there are no recent queries, the feature is
/// disabled, or no related terms survive the threshold/dedup/cap pipeline.
///
/// `embed` is called to generate an embedding for the current query and for
/// any recent query that did not carry a precomputed one.
pub async fn expand_query<F, Fut>(
    query: &str,
    recent_queries: &[RecentQuery<'_>],
    similarity_threshold: f32,
    enabled: bool,
    embed: F,
) -> String
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = crate::Result<Vec<f32>>>,
{
    if recent_queries.is_empty() || !enabled {
        return query.to_string();
    }

    let current_embedding = match embed(query.to_string()).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("query expansion: failed to embed current query: {e}");
            return query.to_string();
        }
    };

    let mut related_terms: HashSet<String> = HashSet::new();
    for recent in recent_queries {
        let owned;
        let past_embedding: &[f32] = match recent.embedding {
            Some(e) => e,
            None => match embed(recent.text.to_string()).await {
                Ok(v) => {
                    owned = v;
                    &owned
                }
                Err(e) => {
                    tracing::warn!("query expansion: failed to embed recent query: {e}");
                    continue;
                }
            },
        };

        let similarity = cosine_similarity(&current_embedding, past_embedding);
        if similarity >= similarity_threshold {
            related_terms.extend(extract_key_terms(recent.text));
        }
    }

    if related_terms.is_empty() {
        return query.to_string();
    }

    let current_terms = extract_key_terms(query);
    let mut new_terms: Vec<String> = related_terms
        .into_iter()
        .filter(|t| !current_terms.contains(t))
        .collect();
    if new_terms.is_empty() {
        return query.to_string();
    }

    // Deterministic order: sorted lexicographically, since HashSet iteration
    // order must not leak into output.
    new_terms.sort();
    new_terms.truncate(MAX_EXPANSION_TERMS);

    format!("{query} {}", new_terms.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fake_embed(text: String) -> crate::Result<Vec<f32>> {
        // Deterministic: presence of a marker word moves the vector.
        if text.contains("rust") {
            Ok(vec![1.0, 0.0])
        } else if text.contains("unrelated") {
            Ok(vec![0.0, 1.0])
        } else {
            Ok(vec![0.9, 0.1])
        }
    }

    #[tokio::test]
    async fn returns_original_when_no_recent_queries() {
        let out = expand_query("rust async patterns", &[], 0.5, true, fake_embed).await;
        assert_eq!(out, "rust async patterns");
    }

    #[tokio::test]
    async fn returns_original_when_disabled() {
        let recent = [RecentQuery { text: "rust traits", embedding: None }];
        let out = expand_query("rust async patterns", &recent, 0.5, false, fake_embed).await;
        assert_eq!(out, "rust async patterns");
    }

    #[tokio::test]
    async fn appends_terms_from_similar_recent_query() {
        let recent = [RecentQuery { text: "rust trait objects", embedding: None }];
        let out = expand_query("rust async patterns", &recent, 0.5, true, fake_embed).await;
        assert!(out.starts_with("rust async patterns "));
        assert!(out.contains("trait"));
        assert!(out.contains("objects"));
    }

    #[tokio::test]
    async fn ignores_dissimilar_recent_query() {
        let recent = [RecentQuery { text: "completely unrelated topic", embedding: None }];
        let out = expand_query("rust async patterns", &recent, 0.95, true, fake_embed).await;
        assert_eq!(out, "rust async patterns");
    }

    #[tokio::test]
    async fn caps_at_five_terms_in_sorted_order() {
        let recent = [RecentQuery {
            text: "rust zeta yankee xray whiskey victor uniform",
            embedding: None,
        }];
        let out = expand_query("rust query", &recent, 0.5, true, fake_embed).await;
        let added: Vec<&str> = out.trim_start_matches("rust query ").split(' ').collect();
        assert_eq!(added.len(), 5);
        let mut sorted = added.clone();
        sorted.sort();
        assert_eq!(added, sorted);
    }

    #[test]
    fn extract_key_terms_drops_stop_words_and_short_tokens() {
        let terms = extract_key_terms("The cat is on a mat, and it runs.");
        assert!(!terms.contains("the"));
        assert!(!terms.contains("is"));
        assert!(!terms.contains("on"));
        assert!(!terms.contains("a"));
        assert!(terms.contains("runs"));
    }
}
