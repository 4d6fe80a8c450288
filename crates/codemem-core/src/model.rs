//! Core data model: memory units, code units, repositories, workspaces,
//! and the supplemental usage/git-history records.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scalar value inside the open `metadata` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A string scalar.
    String(String),
    /// A numeric scalar.
    Number(f64),
    /// A boolean scalar.
    Bool(bool),
}

/// Broad classification of a [`MemoryUnit`]'s subject matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// A stated or inferred user preference.
    Preference,
    /// A factual statement.
    Fact,
    /// A dated occurrence.
    Event,
    /// A described workflow or procedure.
    Workflow,
    /// Ambient contextual notes.
    Context,
    /// Reserved for the [`CodeUnit`] specialization.
    Code,
    /// A git commit record (§4.10/§9 category extension).
    Commit,
    /// A git file-change record (§4.10/§9 category extension).
    FileChange,
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Preference => "preference",
            Self::Fact => "fact",
            Self::Event => "event",
            Self::Workflow => "workflow",
            Self::Context => "context",
            Self::Code => "code",
            Self::Commit => "commit",
            Self::FileChange => "file_change",
        };
        f.write_str(s)
    }
}

impl FromStr for MemoryCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preference" => Ok(Self::Preference),
            "fact" => Ok(Self::Fact),
            "event" => Ok(Self::Event),
            "workflow" => Ok(Self::Workflow),
            "context" => Ok(Self::Context),
            "code" => Ok(Self::Code),
            "commit" => Ok(Self::Commit),
            "file_change" => Ok(Self::FileChange),
            other => Err(crate::Error::Validation(format!(
                "unknown memory category: {other}"
            ))),
        }
    }
}

/// The layer at which a memory applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextLevel {
    /// A durable preference about how the user likes things done.
    UserPreference,
    /// Facts and notes scoped to a particular project.
    ProjectContext,
    /// Short-lived, session-scoped state.
    SessionState,
}

impl fmt::Display for ContextLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UserPreference => "USER_PREFERENCE",
            Self::ProjectContext => "PROJECT_CONTEXT",
            Self::SessionState => "SESSION_STATE",
        };
        f.write_str(s)
    }
}

impl FromStr for ContextLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER_PREFERENCE" => Ok(Self::UserPreference),
            "PROJECT_CONTEXT" => Ok(Self::ProjectContext),
            "SESSION_STATE" => Ok(Self::SessionState),
            other => Err(crate::Error::Validation(format!(
                "unknown context level: {other}"
            ))),
        }
    }
}

/// Visibility scope of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    /// Visible across all projects.
    Global,
    /// Visible only within `project_name`.
    Project,
}

impl fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Global => "global",
            Self::Project => "project",
        };
        f.write_str(s)
    }
}

impl FromStr for MemoryScope {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Self::Global),
            "project" => Ok(Self::Project),
            other => Err(crate::Error::Validation(format!(
                "unknown memory scope: {other}"
            ))),
        }
    }
}

/// Derived recency classification (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Accessed within the active window (default 14 days).
    Active,
    /// Accessed within the recent window (default 60 days).
    Recent,
    /// Accessed within the archived window (default 180 days).
    Archived,
    /// Older than the archived window.
    Stale,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Recent => "recent",
            Self::Archived => "archived",
            Self::Stale => "stale",
        };
        f.write_str(s)
    }
}

/// Origin of a memory, used to seed its initial confidence (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvenanceSource {
    /// The user stated this directly.
    UserExplicit,
    /// Inferred by the assistant from conversation.
    ClaudeInferred,
    /// Extracted from project documentation.
    Documentation,
    /// Derived from indexed source code.
    CodeIndexed,
    /// Assigned by an automatic classifier.
    AutoClassified,
    /// Brought in from an external import.
    Imported,
    /// Carried over from a prior, unmaintained system.
    Legacy,
}

impl ProvenanceSource {
    /// Base confidence assigned at capture time (§4.4 table).
    pub fn base_confidence(self) -> f32 {
        match self {
            Self::UserExplicit => 0.9,
            Self::Documentation => 0.85,
            Self::CodeIndexed => 0.8,
            Self::ClaudeInferred => 0.7,
            Self::AutoClassified => 0.6,
            Self::Imported => 0.5,
            Self::Legacy => 0.5,
        }
    }

    /// Human-readable source-quality label (§4.5 supplement).
    pub fn quality_label(self) -> &'static str {
        match self {
            Self::UserExplicit => "user-confirmed",
            Self::ClaudeInferred => "inferred",
            Self::Documentation => "documentation",
            Self::CodeIndexed => "indexed code",
            Self::AutoClassified => "auto-classified",
            Self::Imported => "imported",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for ProvenanceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UserExplicit => "USER_EXPLICIT",
            Self::ClaudeInferred => "CLAUDE_INFERRED",
            Self::Documentation => "DOCUMENTATION",
            Self::CodeIndexed => "CODE_INDEXED",
            Self::AutoClassified => "AUTO_CLASSIFIED",
            Self::Imported => "IMPORTED",
            Self::Legacy => "LEGACY",
        };
        f.write_str(s)
    }
}

impl FromStr for ProvenanceSource {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER_EXPLICIT" => Ok(Self::UserExplicit),
            "CLAUDE_INFERRED" => Ok(Self::ClaudeInferred),
            "DOCUMENTATION" => Ok(Self::Documentation),
            "CODE_INDEXED" => Ok(Self::CodeIndexed),
            "AUTO_CLASSIFIED" => Ok(Self::AutoClassified),
            "IMPORTED" => Ok(Self::Imported),
            "LEGACY" => Ok(Self::Legacy),
            other => Err(crate::Error::Validation(format!(
                "unknown provenance source: {other}"
            ))),
        }
    }
}

/// Provenance metadata attached to every [`MemoryUnit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryProvenance {
    /// Where this memory came from.
    pub source: ProvenanceSource,
    /// Derived label, e.g. "user" or "claude (inferred)".
    pub created_by: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Whether a human has explicitly verified this memory.
    pub verified: bool,
    /// When the memory was last confirmed, if ever.
    pub last_confirmed: Option<DateTime<Utc>>,
    /// Conversation this memory was captured during, if any.
    pub conversation_id: Option<String>,
    /// Source files this memory references or was derived from.
    pub file_context: Vec<String>,
    /// Free-text notes, including dated verification annotations.
    pub notes: Option<String>,
}

impl MemoryProvenance {
    /// Build initial provenance for a freshly captured memory.
    pub fn capture(source: ProvenanceSource, conversation_id: Option<String>) -> Self {
        let created_by = match source {
            ProvenanceSource::UserExplicit => "user".to_string(),
            ProvenanceSource::ClaudeInferred => "claude (inferred)".to_string(),
            ProvenanceSource::Documentation => "documentation".to_string(),
            ProvenanceSource::CodeIndexed => "code indexer".to_string(),
            ProvenanceSource::AutoClassified => "auto-classifier".to_string(),
            ProvenanceSource::Imported => "import".to_string(),
            ProvenanceSource::Legacy => "legacy".to_string(),
        };
        Self {
            source,
            created_by,
            confidence: source.base_confidence(),
            verified: false,
            last_confirmed: None,
            conversation_id,
            file_context: Vec::new(),
            notes: None,
        }
    }
}

/// The base persisted record shared by general memories and code units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUnit {
    /// Stable opaque identifier, unique within the vector store.
    pub id: Uuid,
    /// Non-empty UTF-8 content.
    pub content: String,
    /// Subject-matter category.
    pub category: MemoryCategory,
    /// Context layer this memory applies at.
    pub context_level: ContextLevel,
    /// Visibility scope.
    pub scope: MemoryScope,
    /// Required when `scope = project`.
    pub project_name: Option<String>,
    /// Importance in [0, 1].
    pub importance: f32,
    /// Free-form tags.
    pub tags: HashSet<String>,
    /// Open map of scalar metadata.
    pub metadata: HashMap<String, MetadataValue>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
    /// Last time this record was returned by a search.
    pub last_accessed: DateTime<Utc>,
    /// Derived recency classification.
    pub lifecycle_state: LifecycleState,
    /// Origin metadata.
    pub provenance: MemoryProvenance,
    /// Identifier of the embedding model used to produce the stored vector.
    pub embedding_model: String,
}

impl MemoryUnit {
    /// Validate the invariants from §3 that apply at construction time.
    pub fn validate(&self) -> crate::Result<()> {
        if self.content.trim().is_empty() {
            return Err(crate::Error::Validation("content must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.importance) {
            return Err(crate::Error::Validation(format!(
                "importance out of range: {}",
                self.importance
            )));
        }
        if self.scope == MemoryScope::Project && self.project_name.is_none() {
            return Err(crate::Error::Validation(
                "project_name is required when scope = project".into(),
            ));
        }
        Ok(())
    }
}

/// The kind of source element a [`CodeUnit`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// A free function.
    Function,
    /// A method on a type.
    Method,
    /// A class or struct-like type.
    Class,
    /// A module-level file or namespace.
    Module,
    /// A module-level block not otherwise classified.
    Block,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Module => "module",
            Self::Block => "block",
        };
        f.write_str(s)
    }
}

/// A `category = code` specialization of [`MemoryUnit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeUnit {
    /// The shared base record (`category` must be `Code`).
    #[serde(flatten)]
    pub memory: MemoryUnit,
    /// Path relative to the owning repository's root.
    pub file_path: String,
    /// Source language, e.g. "rust", "python".
    pub language: String,
    /// What kind of syntactic element this is.
    pub unit_kind: UnitKind,
    /// The unit's name (function name, class name, ...).
    pub name: String,
    /// 1-based start line.
    pub start_line: u32,
    /// 1-based end line, inclusive.
    pub end_line: u32,
    /// Hash of the unit's body text, used for incremental re-indexing.
    pub content_hash: String,
    /// Owning repository.
    pub repository_id: Uuid,
}

/// Storage layout style of a [`Repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryType {
    /// Single repository containing multiple logical projects.
    Monorepo,
    /// Multiple independent repositories tracked together.
    MultiRepo,
    /// One repository, one project.
    Standalone,
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Monorepo => "monorepo",
            Self::MultiRepo => "multi_repo",
            Self::Standalone => "standalone",
        };
        f.write_str(s)
    }
}

/// Indexing status of a [`Repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    /// Successfully indexed and up to date.
    Indexed,
    /// An indexing pass is currently in progress.
    Indexing,
    /// Known to be out of date relative to the file system.
    Stale,
    /// The last indexing attempt failed.
    Error,
    /// Registered but never indexed.
    NotIndexed,
}

impl fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Indexed => "indexed",
            Self::Indexing => "indexing",
            Self::Stale => "stale",
            Self::Error => "error",
            Self::NotIndexed => "not_indexed",
        };
        f.write_str(s)
    }
}

/// A catalogued source repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Absolute, normalized path on disk.
    pub path: String,
    /// Remote URL, if known.
    pub git_url: Option<String>,
    /// Layout style.
    pub repo_type: RepositoryType,
    /// Current indexing status.
    pub status: RepositoryStatus,
    /// When the last successful index completed.
    pub indexed_at: Option<DateTime<Utc>>,
    /// When this record was last updated.
    pub last_updated: DateTime<Utc>,
    /// Number of files last seen during indexing.
    pub file_count: u64,
    /// Number of code units last seen during indexing.
    pub unit_count: u64,
    /// Workspaces this repository belongs to.
    pub workspace_ids: HashSet<Uuid>,
    /// Free-form tags.
    pub tags: HashSet<String>,
    /// Repositories this one depends on.
    pub depends_on: HashSet<Uuid>,
    /// Repositories that depend on this one.
    pub depended_by: HashSet<Uuid>,
}

/// A named grouping of repositories for scoped search and batch indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Member repositories.
    pub repository_ids: HashSet<Uuid>,
    /// Whether new repositories are indexed automatically on add.
    pub auto_index: bool,
    /// Whether search across this workspace spans all member repositories.
    pub cross_repo_search_enabled: bool,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
    /// Free-form tags.
    pub tags: HashSet<String>,
    /// Open settings map.
    pub settings: HashMap<String, MetadataValue>,
}

/// Per-memory usage statistics, co-located with its vector-store payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// First time this memory was used in a search result.
    pub first_seen: DateTime<Utc>,
    /// Most recent time this memory was used.
    pub last_used: DateTime<Utc>,
    /// Total number of times this memory has been surfaced.
    pub use_count: u64,
    /// Similarity score of the most recent use.
    pub last_search_score: f32,
}

/// A cached, content-addressed embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingCacheEntry {
    /// `hash(model_id, text)`.
    pub key: String,
    /// L2-normalized vector, length equal to the model's dimension.
    pub vector: Vec<f32>,
}

/// Aggregate statistics for a single commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    /// Number of files touched by the commit.
    pub files_changed: u32,
    /// Total lines added across all files.
    pub insertions: u32,
    /// Total lines deleted across all files.
    pub deletions: u32,
}

/// A structured, embedded record of a single git commit (§4.10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitCommitRecord {
    /// Full commit SHA.
    pub commit_hash: String,
    /// Absolute path of the repository this commit belongs to.
    pub repository_path: String,
    /// Author's display name.
    pub author_name: String,
    /// Author's email.
    pub author_email: String,
    /// Authoring timestamp.
    pub author_date: DateTime<Utc>,
    /// Committer's display name.
    pub committer_name: String,
    /// Commit timestamp.
    pub committer_date: DateTime<Utc>,
    /// Full commit message.
    pub message: String,
    /// Embedding of `message`.
    pub message_embedding: Vec<f32>,
    /// Branches known to contain this commit, best-effort.
    pub branch_names: Vec<String>,
    /// Tags pointing at this commit, best-effort.
    pub tags: Vec<String>,
    /// Parent commit hashes.
    pub parent_hashes: Vec<String>,
    /// Aggregate change statistics.
    pub stats: CommitStats,
}

/// The kind of change a file underwent in a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The file did not exist before this commit.
    Added,
    /// The file's content changed.
    Modified,
    /// The file was removed.
    Deleted,
    /// The file was renamed, possibly with content changes.
    Renamed,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
        };
        f.write_str(s)
    }
}

/// A per-file change within a commit (§4.10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitFileChangeRecord {
    /// `{commit_hash}:{file_path}`.
    pub id: String,
    /// Owning commit.
    pub commit_hash: String,
    /// Path of the changed file.
    pub file_path: String,
    /// What kind of change this was.
    pub change_type: ChangeType,
    /// Lines added to this file.
    pub lines_added: u32,
    /// Lines removed from this file.
    pub lines_deleted: u32,
    /// Raw diff text, present only when under the configured size limit.
    pub diff_content: Option<String>,
    /// Embedding of `diff_content`, present only when it was embedded.
    pub diff_embedding: Option<Vec<f32>>,
}

impl GitFileChangeRecord {
    /// Build the record's composite id from its commit and path.
    pub fn make_id(commit_hash: &str, file_path: &str) -> String {
        format!("{commit_hash}:{file_path}")
    }
}

/// Strategy used to collapse a cluster of near-duplicate memories (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Canonical is the newest by `created_at`.
    KeepMostRecent,
    /// Canonical is the highest-`importance` member.
    KeepHighestImportance,
    /// Canonical is the member with the highest `use_count`.
    KeepMostAccessed,
    /// Concatenate deduplicated contents under a frozen header format.
    MergeContent,
    /// Caller designates the canonical member explicitly.
    UserSelected,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::KeepMostRecent => "keep_most_recent",
            Self::KeepHighestImportance => "keep_highest_importance",
            Self::KeepMostAccessed => "keep_most_accessed",
            Self::MergeContent => "merge_content",
            Self::UserSelected => "user_selected",
        };
        f.write_str(s)
    }
}
