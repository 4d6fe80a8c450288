//! Provenance capture and confidence recomputation (§4.4), grounded in the
//! pre-distillation provenance tracker.

use chrono::{DateTime, Utc};

use crate::model::{MemoryProvenance, MemoryUnit, MetadataValue, ProvenanceSource};

/// Recompute `provenance.confidence` as a pure function of record state.
///
/// The two age bands are mutually exclusive (`else if`, not two independent
/// multiplications) — this precedence is load-bearing and must not change.
pub fn recompute_confidence(unit: &MemoryUnit, now: DateTime<Utc>) -> f32 {
    let mut confidence = unit.provenance.confidence;

    let age_days = (now - unit.created_at).num_days();
    if age_days > 365 {
        confidence *= 0.8;
    } else if age_days > 180 {
        confidence *= 0.9;
    }

    if unit.provenance.verified {
        confidence += 0.15;
    }

    if let Some(last_confirmed) = unit.provenance.last_confirmed {
        if (now - last_confirmed).num_days() <= 30 {
            confidence += 0.10;
        }
    }

    let access_count = match unit.metadata.get("access_count") {
        Some(MetadataValue::Number(n)) => *n,
        _ => 0.0,
    };
    if access_count > 10.0 {
        confidence += 0.05;
    }

    confidence.clamp(0.0, 1.0)
}

/// Mark a memory verified: sets `verified`, appends a dated note, sets
/// `last_confirmed = now`, and boosts confidence by +0.15 (capped at 1.0).
pub fn verify(provenance: &mut MemoryProvenance, notes: Option<&str>, now: DateTime<Utc>) {
    provenance.verified = true;
    provenance.last_confirmed = Some(now);
    provenance.confidence = (provenance.confidence + 0.15).min(1.0);
    if let Some(note) = notes {
        let dated = format!("[{}] {}", now.format("%Y-%m-%d"), note);
        provenance.notes = Some(match provenance.notes.take() {
            Some(existing) => format!("{existing}\n{dated}"),
            None => dated,
        });
    }
}

/// Reverse verification. Does not lower confidence.
pub fn unverify(provenance: &mut MemoryProvenance) {
    provenance.verified = false;
}

/// Initial provenance for a freshly captured memory, per the §4.4 source
/// table (delegates to [`ProvenanceSource::base_confidence`]).
pub fn capture(source: ProvenanceSource, conversation_id: Option<String>) -> MemoryProvenance {
    MemoryProvenance::capture(source, conversation_id)
}
