//! Code indexing (§4.3, §4.8): keeps per-repository `CodeUnit` records in
//! sync with source trees, either on demand, continuously via a watcher, or
//! across a whole registry/workspace at once.

pub mod incremental;
pub mod multi_repo;
pub mod watch;

pub use incremental::{
    FailedFile, IncrementalIndexer, IndexProgress, IndexResult, ParsedUnit, ParserService,
};
pub use multi_repo::{
    get_indexing_status, index_repositories, reindex_stale_repositories, BatchIndexResult,
    IndexingStatusRollup, RepoIndexOutcome, DEFAULT_CONCURRENCY,
};
pub use watch::{DebouncedChange, DirectoryWatcher, DEFAULT_DEBOUNCE};
