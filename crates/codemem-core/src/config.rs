//! Layered configuration for the code-memory core.
//!
//! Mirrors the `directories`-based path resolution the storage layer uses
//! for its database file: defaults come from `ProjectDirs`, overridden by
//! environment variables with a documented `CODEMEM_` prefix.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_var(name) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f32(name: &str, default: f32) -> f32 {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env_var(name).unwrap_or_else(|| default.to_string())
}

/// GPU/accelerator selection policy for the embedding service (§4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct GpuPolicy {
    /// Force CPU inference even if an accelerator is available.
    pub force_cpu: bool,
    /// Allow GPU inference when an accelerator is detected.
    pub enable_gpu: bool,
    /// Fraction of GPU memory the embedding backend may claim.
    pub gpu_memory_fraction: f32,
}

impl Default for GpuPolicy {
    fn default() -> Self {
        Self {
            force_cpu: env_bool("CODEMEM_FORCE_CPU", false),
            enable_gpu: env_bool("CODEMEM_ENABLE_GPU", false),
            gpu_memory_fraction: env_f32("CODEMEM_GPU_MEMORY_FRACTION", 0.5),
        }
    }
}

/// Lifecycle thresholds (§4.7), in days unless noted.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    /// Accessed within this many days: ACTIVE.
    pub active_days: i64,
    /// Accessed within this many days: RECENT.
    pub recent_days: i64,
    /// Accessed within this many days: ARCHIVED; older: STALE.
    pub archived_days: i64,
    /// Session-scoped records expire after this many hours.
    pub session_expiry_hours: i64,
    /// Score multiplier applied to ACTIVE results during re-weighting.
    pub active_weight: f32,
    /// Score multiplier applied to RECENT results during re-weighting.
    pub recent_weight: f32,
    /// Score multiplier applied to ARCHIVED results during re-weighting.
    pub archived_weight: f32,
    /// Score multiplier applied to STALE results during re-weighting.
    pub stale_weight: f32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            active_days: env_u64("CODEMEM_LIFECYCLE_ACTIVE_DAYS", 14) as i64,
            recent_days: env_u64("CODEMEM_LIFECYCLE_RECENT_DAYS", 60) as i64,
            archived_days: env_u64("CODEMEM_LIFECYCLE_ARCHIVED_DAYS", 180) as i64,
            session_expiry_hours: env_u64("CODEMEM_SESSION_EXPIRY_HOURS", 48) as i64,
            active_weight: 1.0,
            recent_weight: 0.9,
            archived_weight: 0.7,
            stale_weight: 0.5,
        }
    }
}

/// Storage optimizer thresholds (§4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Payloads larger than this many bytes are compression candidates.
    pub compress_size_threshold_bytes: usize,
    /// Width in bytes of the content-length bucket used for dedup signatures.
    pub dedup_length_bucket: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            compress_size_threshold_bytes: env_u64("CODEMEM_COMPRESS_THRESHOLD_BYTES", 8192)
                as usize,
            dedup_length_bucket: env_u64("CODEMEM_DEDUP_LENGTH_BUCKET", 256) as usize,
        }
    }
}

/// Git history indexer thresholds (§4.10).
#[derive(Debug, Clone, PartialEq)]
pub struct GitIndexingConfig {
    /// Whether git history indexing is enabled at all.
    pub enabled: bool,
    /// Number of commits to index by default.
    pub commit_count: usize,
    /// "current" or "all" branches.
    pub branches: String,
    /// Diffs larger than this many KB are stored as metadata-only.
    pub diff_size_limit_kb: u64,
    /// Repositories whose `.git` directory exceeds this many MB auto-disable
    /// diff embedding.
    pub auto_disable_size_threshold_mb: u64,
}

impl Default for GitIndexingConfig {
    fn default() -> Self {
        Self {
            enabled: env_bool("CODEMEM_GIT_INDEXING", true),
            commit_count: env_u64("CODEMEM_GIT_COMMIT_COUNT", 500) as usize,
            branches: env_string("CODEMEM_GIT_BRANCHES", "current"),
            diff_size_limit_kb: env_u64("CODEMEM_GIT_DIFF_SIZE_LIMIT_KB", 100),
            auto_disable_size_threshold_mb: env_u64("CODEMEM_GIT_AUTO_SIZE_THRESHOLD_MB", 500),
        }
    }
}

/// Concurrency limits (§5).
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyConfig {
    /// Maximum repositories indexed in parallel by the multi-repository indexer.
    pub max_concurrent_repos: usize,
    /// Size of the embedding worker pool.
    pub embedding_workers: usize,
    /// Age after which a lock file is considered stale and force-evicted.
    pub lock_timeout: Duration,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_repos: env_u64("CODEMEM_MAX_CONCURRENT_REPOS", 3) as usize,
            embedding_workers: env_u64("CODEMEM_EMBEDDING_WORKERS", 2) as usize,
            lock_timeout: Duration::from_secs(env_u64("CODEMEM_LOCK_TIMEOUT_SECS", 600)),
        }
    }
}

/// Top-level configuration object exposing every knob named in spec §6.
#[derive(Debug, Clone)]
pub struct Config {
    /// Vector store backend URL, e.g. `http://localhost:6333`.
    pub store_url: String,
    /// Collection name within the vector store.
    pub collection_name: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Default batch size for `batch_generate`.
    pub embedding_batch_size: usize,
    /// Whether the embedding cache is enabled.
    pub cache_enabled: bool,
    /// GPU/accelerator selection policy.
    pub gpu_policy: GpuPolicy,
    /// Lifecycle thresholds and re-weighting multipliers.
    pub lifecycle: LifecycleConfig,
    /// Storage optimizer thresholds.
    pub optimizer: OptimizerConfig,
    /// Git history indexing thresholds.
    pub git_indexing: GitIndexingConfig,
    /// Concurrency limits.
    pub concurrency: ConcurrencyConfig,
    /// Force the vector store into read-only mode (all writes fail fast).
    pub read_only: bool,
    /// Similarity threshold above which a recent query contributes terms
    /// to query expansion (§4.11).
    pub query_expansion_similarity_threshold: f32,
    /// Whether query expansion runs at all.
    pub query_expansion_enabled: bool,
    /// Cue words used by the contradiction heuristic (§4.6).
    pub contradiction_cue_words: Vec<String>,
    /// Base directory for the registry/workspace JSON, embedding cache,
    /// lock files, and job reports.
    pub data_dir: PathBuf,
}

impl Config {
    /// Resolve the default on-disk data directory via `ProjectDirs`.
    fn default_data_dir() -> PathBuf {
        if let Some(dir) = env_var("CODEMEM_DATA_DIR") {
            return PathBuf::from(dir);
        }
        ProjectDirs::from("dev", "codemem", "codemem")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".codemem"))
    }

    /// Build configuration from environment variables, falling back to
    /// documented defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            store_url: env_string("CODEMEM_STORE_URL", "http://localhost:6333"),
            collection_name: env_string("CODEMEM_COLLECTION", "codemem"),
            embedding_model: env_string("CODEMEM_EMBEDDING_MODEL", "all-MiniLM-L6-v2"),
            embedding_batch_size: env_u64("CODEMEM_EMBEDDING_BATCH_SIZE", 32) as usize,
            cache_enabled: env_bool("CODEMEM_CACHE_ENABLED", true),
            gpu_policy: GpuPolicy::default(),
            lifecycle: LifecycleConfig::default(),
            optimizer: OptimizerConfig::default(),
            git_indexing: GitIndexingConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            read_only: env_bool("CODEMEM_READ_ONLY", false),
            query_expansion_similarity_threshold: env_f32(
                "CODEMEM_QUERY_EXPANSION_THRESHOLD",
                0.75,
            ),
            query_expansion_enabled: env_bool("CODEMEM_QUERY_EXPANSION_ENABLED", true),
            contradiction_cue_words: vec![
                "always".into(),
                "never".into(),
                "prefer".into(),
                "avoid".into(),
                "use".into(),
                "don't".into(),
            ],
            data_dir: Self::default_data_dir(),
        }
    }

    /// Path to the repository registry JSON file.
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("repositories.json")
    }

    /// Path to the workspace JSON file.
    pub fn workspace_path(&self) -> PathBuf {
        self.data_dir.join("workspaces.json")
    }

    /// Path to the directory holding weekly/monthly job reports.
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    /// Path to the directory holding exclusive-create lock files.
    pub fn locks_dir(&self) -> PathBuf {
        self.data_dir.join("locks")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        // SAFETY: tests run single-threaded per process in this crate's
        // test suite; no other test mutates this variable concurrently.
        unsafe {
            std::env::remove_var("CODEMEM_STORE_URL");
        }
        let cfg = Config::from_env();
        assert_eq!(cfg.store_url, "http://localhost:6333");
        assert_eq!(cfg.lifecycle.active_weight, 1.0);
        assert_eq!(cfg.concurrency.max_concurrent_repos, 3);
        assert!(!cfg.read_only);
    }

    #[test]
    fn data_dir_paths_nest_under_data_dir() {
        let mut cfg = Config::from_env();
        cfg.data_dir = PathBuf::from("/tmp/codemem-test");
        assert_eq!(
            cfg.registry_path(),
            PathBuf::from("/tmp/codemem-test/repositories.json")
        );
        assert_eq!(
            cfg.locks_dir(),
            PathBuf::from("/tmp/codemem-test/locks")
        );
    }
}
