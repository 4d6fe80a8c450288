//! Lifecycle classification and search re-weighting (§4.7).

pub mod optimizer;

use chrono::{DateTime, Utc};

use crate::config::LifecycleConfig;
use crate::model::{LifecycleState, MemoryUnit};
use crate::store::ScoredUnit;

/// Classify `unit` into a [`LifecycleState`] given `now` and the configured
/// thresholds. Driven entirely by `last_accessed`; reverting to ACTIVE after
/// a fresh access is the expected, non-anomalous path.
pub fn classify(unit: &MemoryUnit, config: &LifecycleConfig, now: DateTime<Utc>) -> LifecycleState {
    let age_days = (now - unit.last_accessed).num_days().max(0);
    if age_days <= config.active_days {
        LifecycleState::Active
    } else if age_days <= config.recent_days {
        LifecycleState::Recent
    } else if age_days <= config.archived_days {
        LifecycleState::Archived
    } else {
        LifecycleState::Stale
    }
}

fn weight(state: LifecycleState, config: &LifecycleConfig) -> f32 {
    match state {
        LifecycleState::Active => config.active_weight,
        LifecycleState::Recent => config.recent_weight,
        LifecycleState::Archived => config.archived_weight,
        LifecycleState::Stale => config.stale_weight,
    }
}

/// Multiply each hit's score by its current lifecycle weight and re-sort
/// descending, breaking ties by `created_at` descending. Scores remain in
/// `[0, 1]` since every weight is itself in `[0, 1]`.
pub fn reweight_by_lifecycle(mut hits: Vec<ScoredUnit>, config: &LifecycleConfig, now: DateTime<Utc>) -> Vec<ScoredUnit> {
    for (unit, score) in hits.iter_mut() {
        let state = classify(unit, config, now);
        *score *= weight(state, config);
    }

    hits.sort_by(|(a, score_a), (b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    hits
}
