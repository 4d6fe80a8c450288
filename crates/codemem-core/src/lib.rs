//! # codemem-core
//!
//! Code-memory indexing and retrieval core for a semantic memory server: a
//! long-term, queryable knowledge base over a user's source code and
//! curated memories. Two record families share one vector index —
//! *semantic code units* extracted from parsed source files, and *memory
//! units* representing facts, preferences, events, workflows, or
//! contextual notes.
//!
//! ## What lives here
//!
//! - A [`store::VectorStore`] abstraction with an HTTP-backed implementation,
//!   an in-memory test backend, and a read-only decorator.
//! - An [`embeddings::EmbeddingService`] with a content-addressed cache over
//!   a pluggable [`embeddings::EmbeddingBackend`].
//! - [`memory`] — the write/read surface for memory units: provenance,
//!   trust scoring, query expansion, usage tracking, specialized retrieval.
//! - [`consolidation`] — duplicate detection, merge strategies, contradiction
//!   detection, and the background jobs that run them.
//! - [`lifecycle`] — age/access-based classification and the storage
//!   optimizer built on top of it.
//! - [`registry`] — the repository registry and workspace manager.
//! - [`indexing`] — the incremental indexer, watch mode, and the
//!   bounded-concurrency multi-repository indexer.
//! - [`git_history`] (feature `git-history`) — commit and diff indexing.
//!
//! ## Out of scope
//!
//! The command-line front-end, the RPC transport that exposes these tools
//! to an LLM host, telemetry dashboards, and the parser/embedding model
//! implementations themselves are treated as external collaborators; this
//! crate defines the seams ([`indexing::ParserService`],
//! [`embeddings::EmbeddingBackend`]) rather than the implementations.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod consolidation;
pub mod embeddings;
pub mod error;
pub mod indexing;
pub mod lifecycle;
pub mod memory;
pub mod model;
pub mod registry;
pub mod store;

#[cfg(feature = "git-history")]
#[cfg_attr(docsrs, doc(cfg(feature = "git-history")))]
pub mod git_history;

pub use error::{Error, Result};

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::embeddings::{EmbeddingBackend, EmbeddingService};
    pub use crate::memory::MemoryStore;
    pub use crate::model::{MemoryCategory, MemoryScope, MemoryUnit};
    pub use crate::store::{SearchFilters, VectorStore};
    pub use crate::{Error, Result};
}
