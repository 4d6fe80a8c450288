//! Storage optimizer: identifies opportunities to reclaim space without
//! losing data the user still needs (§4.7).

use chrono::Utc;

use super::classify;
use crate::config::{LifecycleConfig, OptimizerConfig};
use crate::model::{ContextLevel, LifecycleState, MemoryUnit};
use crate::store::VectorStore;
use crate::Result;

/// Coarse risk banding for an optimization opportunity. Ordered
/// `safe < low < medium < high` for tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    /// No judgment call required; always safe to apply automatically.
    Safe,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Safe => "safe",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// The kind of space-saving action an opportunity describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpportunityType {
    /// Payload is large enough to benefit from compression.
    Compress,
    /// Part of a coarse-signature duplicate group.
    Deduplicate,
    /// STALE record eligible for deletion.
    DeleteStale,
    /// SESSION_STATE record past its expiry window.
    DeleteSessionExpired,
}

/// A single identified opportunity.
#[derive(Debug, Clone)]
pub struct Opportunity {
    /// What kind of action this describes.
    pub opportunity_type: OpportunityType,
    /// Human-readable explanation.
    pub description: String,
    /// How many records this opportunity covers.
    pub affected_count: usize,
    /// Estimated space reclaimed, in megabytes.
    pub storage_savings_mb: f64,
    /// How risky applying this opportunity is.
    pub risk_level: RiskLevel,
    /// Affected memory ids.
    pub details: Vec<uuid::Uuid>,
}

/// Rollup returned by [`analyze`].
#[derive(Debug, Clone, Default)]
pub struct StorageAnalysisResult {
    /// Every opportunity found, sorted by savings desc / risk asc.
    pub opportunities: Vec<OpportunitySummary>,
    /// Total records touched across all opportunities.
    pub total_affected_records: usize,
    /// Total projected savings in megabytes across all opportunities.
    pub total_projected_savings_mb: f64,
    /// Count of opportunities per risk level.
    pub counts_by_risk: [(RiskLevel, usize); 4],
}

/// A lighter-weight view of [`Opportunity`] used in the rollup, omitting the
/// full id list.
#[derive(Debug, Clone)]
pub struct OpportunitySummary {
    pub opportunity_type: OpportunityType,
    pub description: String,
    pub affected_count: usize,
    pub storage_savings_mb: f64,
    pub risk_level: RiskLevel,
}

impl From<&Opportunity> for OpportunitySummary {
    fn from(o: &Opportunity) -> Self {
        Self {
            opportunity_type: o.opportunity_type,
            description: o.description.clone(),
            affected_count: o.affected_count,
            storage_savings_mb: o.storage_savings_mb,
            risk_level: o.risk_level,
        }
    }
}

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

fn estimate_payload_bytes(unit: &MemoryUnit) -> usize {
    unit.content.len() + unit.metadata.len() * 64
}

fn find_compress_opportunities(units: &[MemoryUnit], config: &OptimizerConfig, lifecycle: &LifecycleConfig) -> Vec<Opportunity> {
    let now = Utc::now();
    units
        .iter()
        .filter(|u| estimate_payload_bytes(u) > config.compress_size_threshold_bytes)
        .map(|u| {
            let state = classify(u, lifecycle, now);
            let risk = match state {
                LifecycleState::Archived | LifecycleState::Stale => RiskLevel::Low,
                LifecycleState::Active | LifecycleState::Recent => RiskLevel::Medium,
            };
            let savings = estimate_payload_bytes(u) as f64 * 0.5 / BYTES_PER_MB;
            Opportunity {
                opportunity_type: OpportunityType::Compress,
                description: format!("Payload for {} exceeds {} bytes", u.id, config.compress_size_threshold_bytes),
                affected_count: 1,
                storage_savings_mb: savings,
                risk_level: risk,
                details: vec![u.id],
            }
        })
        .collect()
}

fn dedup_signature(unit: &MemoryUnit, bucket_width: usize) -> (String, String, usize) {
    let bucket = if bucket_width == 0 { 0 } else { unit.content.len() / bucket_width };
    (unit.category.to_string(), unit.context_level.to_string(), bucket)
}

fn find_deduplicate_opportunities(units: &[MemoryUnit], config: &OptimizerConfig) -> Vec<Opportunity> {
    use std::collections::HashMap;
    let mut groups: HashMap<(String, String, usize), Vec<&MemoryUnit>> = HashMap::new();
    for u in units {
        groups.entry(dedup_signature(u, config.dedup_length_bucket)).or_default().push(u);
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(sig, members)| {
            let savings = members.iter().skip(1).map(|m| estimate_payload_bytes(m) as f64).sum::<f64>() / BYTES_PER_MB;
            Opportunity {
                opportunity_type: OpportunityType::Deduplicate,
                description: format!(
                    "{} records share signature category={} context_level={} length_bucket={}",
                    members.len(),
                    sig.0,
                    sig.1,
                    sig.2
                ),
                affected_count: members.len(),
                storage_savings_mb: savings,
                risk_level: RiskLevel::Medium,
                details: members.iter().map(|m| m.id).collect(),
            }
        })
        .collect()
}

fn find_delete_stale_opportunities(units: &[MemoryUnit], lifecycle: &LifecycleConfig) -> Vec<Opportunity> {
    let now = Utc::now();
    let stale: Vec<&MemoryUnit> = units.iter().filter(|u| classify(u, lifecycle, now) == LifecycleState::Stale).collect();
    if stale.is_empty() {
        return Vec::new();
    }
    let savings = stale.iter().map(|u| estimate_payload_bytes(u) as f64).sum::<f64>() / BYTES_PER_MB;
    vec![Opportunity {
        opportunity_type: OpportunityType::DeleteStale,
        description: format!("{} STALE records older than {} days", stale.len(), lifecycle.archived_days),
        affected_count: stale.len(),
        storage_savings_mb: savings,
        risk_level: RiskLevel::Low,
        details: stale.iter().map(|u| u.id).collect(),
    }]
}

fn find_delete_session_expired_opportunities(units: &[MemoryUnit], lifecycle: &LifecycleConfig) -> Vec<Opportunity> {
    let now = Utc::now();
    let expired: Vec<&MemoryUnit> = units
        .iter()
        .filter(|u| u.context_level == ContextLevel::SessionState)
        .filter(|u| (now - u.last_accessed).num_hours() > lifecycle.session_expiry_hours)
        .collect();
    if expired.is_empty() {
        return Vec::new();
    }
    let savings = expired.iter().map(|u| estimate_payload_bytes(u) as f64).sum::<f64>() / BYTES_PER_MB;
    vec![Opportunity {
        opportunity_type: OpportunityType::DeleteSessionExpired,
        description: format!("{} SESSION_STATE records past {}h expiry", expired.len(), lifecycle.session_expiry_hours),
        affected_count: expired.len(),
        storage_savings_mb: savings,
        risk_level: RiskLevel::Safe,
        details: expired.iter().map(|u| u.id).collect(),
    }]
}

fn all_opportunities(units: &[MemoryUnit], lifecycle: &LifecycleConfig, optimizer: &OptimizerConfig) -> Vec<Opportunity> {
    let mut all = Vec::new();
    all.extend(find_compress_opportunities(units, optimizer, lifecycle));
    all.extend(find_deduplicate_opportunities(units, optimizer));
    all.extend(find_delete_stale_opportunities(units, lifecycle));
    all.extend(find_delete_session_expired_opportunities(units, lifecycle));
    all.sort_by(|a, b| {
        b.storage_savings_mb
            .partial_cmp(&a.storage_savings_mb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.risk_level.cmp(&b.risk_level))
    });
    all
}

async fn load_all(store: &dyn VectorStore) -> Result<Vec<MemoryUnit>> {
    let (units, _) = store
        .list_memories(None, crate::store::SortField::CreatedAt, crate::store::SortOrder::Desc, u64::MAX, 0)
        .await?;
    Ok(units)
}

/// Identify every opportunity without applying anything, plus a rollup.
pub async fn analyze(store: &dyn VectorStore, lifecycle: &LifecycleConfig, optimizer: &OptimizerConfig) -> Result<StorageAnalysisResult> {
    let units = load_all(store).await?;
    let opportunities = all_opportunities(&units, lifecycle, optimizer);

    let total_affected_records = opportunities.iter().map(|o| o.affected_count).sum();
    let total_projected_savings_mb = opportunities.iter().map(|o| o.storage_savings_mb).sum();
    let mut counts_by_risk = [
        (RiskLevel::Safe, 0),
        (RiskLevel::Low, 0),
        (RiskLevel::Medium, 0),
        (RiskLevel::High, 0),
    ];
    for o in &opportunities {
        for (level, count) in counts_by_risk.iter_mut() {
            if *level == o.risk_level {
                *count += 1;
            }
        }
    }

    Ok(StorageAnalysisResult {
        opportunities: opportunities.iter().map(OpportunitySummary::from).collect(),
        total_affected_records,
        total_projected_savings_mb,
        counts_by_risk,
    })
}

/// Read-only subset query: every currently-safe opportunity.
pub async fn get_safe_optimizations(store: &dyn VectorStore, lifecycle: &LifecycleConfig, optimizer: &OptimizerConfig) -> Result<Vec<Opportunity>> {
    let units = load_all(store).await?;
    Ok(all_opportunities(&units, lifecycle, optimizer)
        .into_iter()
        .filter(|o| o.risk_level == RiskLevel::Safe)
        .collect())
}

/// Apply every `risk_level = safe` opportunity (currently: session-expired
/// deletes). `dry_run` returns the opportunities that would be applied
/// without deleting anything.
pub async fn auto_optimize(store: &dyn VectorStore, lifecycle: &LifecycleConfig, optimizer: &OptimizerConfig, dry_run: bool) -> Result<Vec<Opportunity>> {
    let safe = get_safe_optimizations(store, lifecycle, optimizer).await?;
    if dry_run {
        return Ok(safe);
    }
    for opportunity in &safe {
        for id in &opportunity.details {
            store.delete(*id).await?;
        }
    }
    Ok(safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemoryCategory, MemoryProvenance, MemoryScope, ProvenanceSource};
    use crate::store::InMemoryVectorStore;
    use std::collections::{HashMap, HashSet};
    use uuid::Uuid;

    fn unit(content: &str, context_level: ContextLevel, last_accessed: chrono::DateTime<Utc>) -> MemoryUnit {
        let now = Utc::now();
        MemoryUnit {
            id: Uuid::new_v4(),
            content: content.to_string(),
            category: MemoryCategory::Fact,
            context_level,
            scope: MemoryScope::Global,
            project_name: None,
            importance: 0.5,
            tags: HashSet::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            last_accessed,
            lifecycle_state: LifecycleState::Active,
            provenance: MemoryProvenance::capture(ProvenanceSource::UserExplicit, None),
            embedding_model: "test".into(),
        }
    }

    #[tokio::test]
    async fn session_expired_records_are_safe_and_auto_optimized() {
        let store = InMemoryVectorStore::new();
        let lifecycle = LifecycleConfig::default();
        let optimizer = OptimizerConfig::default();
        let expired_at = Utc::now() - chrono::Duration::hours(lifecycle.session_expiry_hours + 1);
        let id = store
            .store(unit("stale session", ContextLevel::SessionState, expired_at), vec![1.0])
            .await
            .unwrap();

        let safe = get_safe_optimizations(&store, &lifecycle, &optimizer).await.unwrap();
        assert!(safe.iter().any(|o| o.details.contains(&id)));

        auto_optimize(&store, &lifecycle, &optimizer, false).await.unwrap();
        assert!(store.get_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dry_run_auto_optimize_does_not_delete() {
        let store = InMemoryVectorStore::new();
        let lifecycle = LifecycleConfig::default();
        let optimizer = OptimizerConfig::default();
        let expired_at = Utc::now() - chrono::Duration::hours(lifecycle.session_expiry_hours + 1);
        let id = store
            .store(unit("stale session", ContextLevel::SessionState, expired_at), vec![1.0])
            .await
            .unwrap();

        auto_optimize(&store, &lifecycle, &optimizer, true).await.unwrap();
        assert!(store.get_by_id(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn analyze_sorts_by_savings_desc_risk_asc() {
        let store = InMemoryVectorStore::new();
        let lifecycle = LifecycleConfig::default();
        let optimizer = OptimizerConfig::default();
        store
            .store(unit(&"x".repeat(20_000), ContextLevel::ProjectContext, Utc::now()), vec![1.0])
            .await
            .unwrap();
        let expired_at = Utc::now() - chrono::Duration::hours(lifecycle.session_expiry_hours + 1);
        store
            .store(unit("expired", ContextLevel::SessionState, expired_at), vec![1.0])
            .await
            .unwrap();

        let result = analyze(&store, &lifecycle, &optimizer).await.unwrap();
        for pair in result.opportunities.windows(2) {
            assert!(pair[0].storage_savings_mb >= pair[1].storage_savings_mb);
        }
    }
}
