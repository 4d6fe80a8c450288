//! Duplicate detection, merge engine, contradiction heuristic, and the
//! cooperative background jobs that tie them together (§4.6).

pub mod contradiction;
pub mod duplicate;
pub mod engine;
pub mod jobs;

pub use contradiction::{find_contradictions, ContradictionPair};
pub use duplicate::{find_duplicate_clusters, jaccard_similarity, DuplicateCluster, AUTO_MERGE_THRESHOLD, REVIEW_THRESHOLD};
pub use engine::{merge_memories, MergeHistoryEntry, MergedRepresentation};
pub use jobs::{run_daily_auto_merge, run_monthly_contradiction_scan, run_weekly_review_scan, AutoMergeSummary};
