//! Trust-signal computation for search results (§4.5), grounded in the
//! pre-distillation trust-signals module.

use chrono::{DateTime, Utc};

use crate::model::MemoryUnit;

/// Coarse confidence banding derived from `trust_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    /// `trust_score >= 0.8`.
    Excellent,
    /// `trust_score >= 0.65`.
    Good,
    /// `trust_score >= 0.5`.
    Fair,
    /// `trust_score < 0.5`.
    Poor,
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        };
        f.write_str(s)
    }
}

impl From<f32> for ConfidenceLevel {
    fn from(score: f32) -> Self {
        if score >= 0.8 {
            Self::Excellent
        } else if score >= 0.65 {
            Self::Good
        } else if score >= 0.5 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// Trust annotation attached to a single search result.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustSignals {
    /// Weighted-sum trust score in [0, 1].
    pub trust_score: f32,
    /// Coarse band derived from `trust_score`.
    pub confidence_level: ConfidenceLevel,
    /// Deterministically assembled, human-readable explanations.
    pub reasons: Vec<String>,
    /// Relative-phrase rendering of `last_confirmed`, if any.
    pub last_verified: Option<String>,
    /// Whether a contradicting relationship exists for this record.
    pub contradiction_detected: bool,
    /// Count of related records (via an edge lookup).
    pub related_count: u32,
    /// Source-quality label derived from `provenance.source`.
    pub source_quality: &'static str,
}

fn access_bucket(use_count: u64) -> f32 {
    if use_count >= 20 {
        0.20
    } else if use_count >= 10 {
        0.15
    } else if use_count >= 5 {
        0.10
    } else {
        0.05
    }
}

fn recency_bucket(age_days: i64) -> f32 {
    if age_days < 30 {
        0.15
    } else if age_days < 90 {
        0.12
    } else if age_days < 180 {
        0.08
    } else {
        0.05
    }
}

fn relative_phrase(days: i64) -> String {
    match days {
        0 => "today".to_string(),
        1 => "yesterday".to_string(),
        d if d < 14 => format!("{d} days ago"),
        d if d < 60 => format!("{} weeks ago", d / 7),
        d if d < 365 => format!("{} months ago", d / 30),
        d => format!("{} years ago", d / 365),
    }
}

/// Compute trust signals for `unit` given its usage count, search similarity,
/// and whether a contradicting relationship exists.
pub fn compute_trust_signals(
    unit: &MemoryUnit,
    similarity: f32,
    use_count: u64,
    has_contradiction: bool,
    related_count: u32,
    now: DateTime<Utc>,
) -> TrustSignals {
    let mut score = 0.0_f32;
    let mut reasons = Vec::new();

    score += unit.provenance.confidence * 0.3;

    if unit.provenance.verified {
        score += 0.25;
    } else {
        score += 0.10;
    }

    score += access_bucket(use_count);

    let age_days = (now - unit.last_accessed).num_days().max(0);
    let mut recency_component = recency_bucket(age_days);
    if let Some(last_confirmed) = unit.provenance.last_confirmed {
        if (now - last_confirmed).num_days() <= 30 {
            recency_component = (recency_component + 0.05).min(0.15);
        }
    }
    score += recency_component;

    score += if has_contradiction { 0.0 } else { 0.10 };

    score = score.clamp(0.0, 1.0);

    if similarity >= 0.9 {
        reasons.push(format!("Exact semantic match ({similarity:.2})"));
    } else if similarity >= 0.7 {
        reasons.push(format!("Strong semantic match ({similarity:.2})"));
    }
    if let Some(project) = &unit.project_name {
        reasons.push(format!("From current project: {project}"));
    }
    let last_verified = unit.provenance.last_confirmed.map(|lc| {
        let days = (now - lc).num_days().max(0);
        let phrase = relative_phrase(days);
        reasons.push(format!("You verified this {phrase}"));
        phrase
    });
    if related_count > 0 {
        reasons.push(format!("Related to {related_count} other memories"));
    }

    TrustSignals {
        trust_score: score,
        confidence_level: ConfidenceLevel::from(score),
        reasons,
        last_verified,
        contradiction_detected: has_contradiction,
        related_count,
        source_quality: unit.provenance.source.quality_label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ContextLevel, LifecycleState, MemoryCategory, MemoryProvenance, MemoryScope,
        ProvenanceSource,
    };
    use std::collections::{HashMap, HashSet};
    use uuid::Uuid;

    fn unit(source: ProvenanceSource, verified: bool) -> MemoryUnit {
        let now = Utc::now();
        let mut provenance = MemoryProvenance::capture(source, None);
        provenance.verified = verified;
        MemoryUnit {
            id: Uuid::new_v4(),
            content: "x".into(),
            category: MemoryCategory::Fact,
            context_level: ContextLevel::ProjectContext,
            scope: MemoryScope::Global,
            project_name: Some("codemem".into()),
            importance: 0.5,
            tags: HashSet::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            last_accessed: now,
            lifecycle_state: LifecycleState::Active,
            provenance,
            embedding_model: "test".into(),
        }
    }

    #[test]
    fn confidence_level_bands_match_spec() {
        assert_eq!(ConfidenceLevel::from(0.85).to_string(), "excellent");
        assert_eq!(ConfidenceLevel::from(0.7).to_string(), "good");
        assert_eq!(ConfidenceLevel::from(0.55).to_string(), "fair");
        assert_eq!(ConfidenceLevel::from(0.2).to_string(), "poor");
    }

    #[test]
    fn trust_score_stays_in_bounds() {
        let u = unit(ProvenanceSource::UserExplicit, true);
        let signals = compute_trust_signals(&u, 0.95, 25, false, 3, Utc::now());
        assert!(signals.trust_score <= 1.0);
        assert!(signals.trust_score > 0.0);
        assert!(!signals.reasons.is_empty());
    }

    #[test]
    fn contradiction_lowers_score_relative_to_no_contradiction() {
        let u = unit(ProvenanceSource::UserExplicit, true);
        let with = compute_trust_signals(&u, 0.8, 10, true, 0, Utc::now());
        let without = compute_trust_signals(&u, 0.8, 10, false, 0, Utc::now());
        assert!(with.trust_score < without.trust_score);
    }

    #[test]
    fn source_quality_label_reflects_provenance() {
        let u = unit(ProvenanceSource::Documentation, false);
        let signals = compute_trust_signals(&u, 0.5, 0, false, 0, Utc::now());
        assert_eq!(signals.source_quality, "documentation");
    }
}
