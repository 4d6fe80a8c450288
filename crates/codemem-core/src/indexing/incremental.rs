//! Incremental indexer (§4.3): keeps a repository's `CodeUnit` records in
//! sync with its current source tree via content-hash diffing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::embeddings::EmbeddingService;
use crate::model::{CodeUnit, UnitKind};
use crate::store::VectorStore;
use crate::Result;

/// A single semantic unit as returned by a [`ParserService`] for one file.
#[derive(Debug, Clone)]
pub struct ParsedUnit {
    pub name: String,
    pub unit_kind: UnitKind,
    pub start_line: u32,
    pub end_line: u32,
    pub body: String,
}

/// Maps a source file to its ordered semantic units. Treated as an external
/// collaborator: this crate defines the seam, not a language parser.
pub trait ParserService: Send + Sync {
    /// Language identifier this parser handles, e.g. `"rust"`.
    fn language_for_extension(&self, extension: &str) -> Option<&'static str>;
    /// Parse `content` (the file at `path`) into semantic units.
    fn parse(&self, path: &Path, content: &str) -> Result<Vec<ParsedUnit>>;
}

/// Directories skipped during traversal regardless of depth.
const IGNORED_DIR_NAMES: &[&str] = &[".git", "node_modules", ".venv", "venv", "__pycache__", "target", "dist", "build", ".cache"];

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Progress reported per file; never load-bearing for correctness.
#[derive(Debug, Clone)]
pub struct IndexProgress<'a> {
    pub current: usize,
    pub total: usize,
    pub current_file: &'a Path,
    pub error: Option<&'a str>,
}

/// A single file's indexing failure, captured rather than aborting the pass.
#[derive(Debug, Clone)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Aggregated result of one indexing pass.
#[derive(Debug, Clone, Default)]
pub struct IndexResult {
    pub total_files: usize,
    pub indexed_files: usize,
    pub skipped_files: usize,
    pub total_units: usize,
    pub failed_files: Vec<FailedFile>,
}

/// Walk `root`, keeping the vector store's `CodeUnit` records in sync with
/// the files on disk for `repository_id`.
pub struct IncrementalIndexer<'a> {
    store: &'a dyn VectorStore,
    embeddings: &'a EmbeddingService,
    parser: &'a dyn ParserService,
    repository_id: Uuid,
    file_hashes: HashMap<PathBuf, String>,
}

impl<'a> IncrementalIndexer<'a> {
    /// Build an indexer over `store`/`embeddings`/`parser` for `repository_id`.
    /// `file_hashes` is the indexer's memory of each file's last-seen
    /// content hash, seeded from the caller's prior run (or empty on first
    /// run).
    pub fn new(
        store: &'a dyn VectorStore,
        embeddings: &'a EmbeddingService,
        parser: &'a dyn ParserService,
        repository_id: Uuid,
        file_hashes: HashMap<PathBuf, String>,
    ) -> Self {
        Self { store, embeddings, parser, repository_id, file_hashes }
    }

    /// Current file-hash cache, to be persisted by the caller for the next
    /// run.
    pub fn file_hashes(&self) -> &HashMap<PathBuf, String> {
        &self.file_hashes
    }

    /// Index every recognized file under `root`, in lexicographic traversal
    /// order, calling `progress` after each file.
    pub async fn index_directory(
        &mut self,
        root: &Path,
        recursive: bool,
        mut progress: impl FnMut(IndexProgress<'_>),
    ) -> Result<IndexResult> {
        let files = walk_files(root, recursive, self.parser);
        let total = files.len();
        let mut result = IndexResult { total_files: total, ..Default::default() };

        for (i, path) in files.iter().enumerate() {
            match self.index_file(path).await {
                Ok(Some(unit_count)) => {
                    result.indexed_files += 1;
                    result.total_units += unit_count;
                    progress(IndexProgress { current: i + 1, total, current_file: path, error: None });
                }
                Ok(None) => {
                    result.skipped_files += 1;
                    progress(IndexProgress { current: i + 1, total, current_file: path, error: None });
                }
                Err(e) => {
                    let message = e.to_string();
                    result.failed_files.push(FailedFile { path: path.clone(), error: message.clone() });
                    progress(IndexProgress { current: i + 1, total, current_file: path, error: Some(&message) });
                }
            }
        }

        Ok(result)
    }

    /// Index a single file, returning `Some(unit_count)` if it was
    /// (re-)indexed, or `None` if its content hash was unchanged and it was
    /// skipped.
    pub async fn index_file(&mut self, path: &Path) -> Result<Option<usize>> {
        let bytes = tokio::fs::read(path).await?;
        let file_hash = content_hash(&bytes);

        if self.file_hashes.get(path) == Some(&file_hash) {
            return Ok(None);
        }

        let content = String::from_utf8_lossy(&bytes).into_owned();
        let parsed = self.parser.parse(path, &content)?;

        let file_path_str = path.to_string_lossy().into_owned();
        let existing = self.existing_units_for_file(&file_path_str).await?;

        let mut seen_keys = std::collections::HashSet::new();
        let mut to_embed = Vec::new();
        let mut bodies = Vec::new();

        for unit in &parsed {
            let key = (unit.name.clone(), unit.unit_kind, unit.start_line);
            seen_keys.insert(key.clone());
            let unit_hash = content_hash(unit.body.as_bytes());

            let unchanged = existing
                .get(&key)
                .map(|existing_unit| existing_unit.content_hash == unit_hash)
                .unwrap_or(false);
            if unchanged {
                continue;
            }

            to_embed.push((unit, unit_hash, existing.get(&key).map(|u| u.memory.id)));
            bodies.push(unit.body.clone());
        }

        if !bodies.is_empty() {
            let vectors = self.embeddings.batch_generate(&bodies).await?;
            for ((unit, unit_hash, existing_id), vector) in to_embed.into_iter().zip(vectors) {
                let code_unit = self.build_code_unit(unit, &file_path_str, unit_hash, existing_id);
                self.store.store(code_unit.memory, vector).await?;
            }
        }

        for (key, existing_unit) in &existing {
            if !seen_keys.contains(key) {
                self.store.delete(existing_unit.memory.id).await?;
            }
        }

        self.file_hashes.insert(path.to_path_buf(), file_hash);
        Ok(Some(parsed.len()))
    }

    fn build_code_unit(&self, unit: &ParsedUnit, file_path: &str, content_hash: String, existing_id: Option<Uuid>) -> CodeUnit {
        let now = chrono::Utc::now();
        let language = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.parser.language_for_extension(ext))
            .unwrap_or("unknown")
            .to_string();

        let id = existing_id.unwrap_or_else(Uuid::new_v4);
        let mut metadata = HashMap::new();
        metadata.insert("repository_id".to_string(), crate::model::MetadataValue::String(self.repository_id.to_string()));
        metadata.insert("file_path".to_string(), crate::model::MetadataValue::String(file_path.to_string()));
        metadata.insert("unit_kind".to_string(), crate::model::MetadataValue::String(unit.unit_kind.to_string()));
        metadata.insert("unit_name".to_string(), crate::model::MetadataValue::String(unit.name.clone()));
        metadata.insert("start_line".to_string(), crate::model::MetadataValue::Number(unit.start_line as f64));
        metadata.insert("end_line".to_string(), crate::model::MetadataValue::Number(unit.end_line as f64));
        metadata.insert("content_hash".to_string(), crate::model::MetadataValue::String(content_hash.clone()));
        metadata.insert("language".to_string(), crate::model::MetadataValue::String(language.clone()));

        let memory = crate::model::MemoryUnit {
            id,
            content: unit.body.clone(),
            category: crate::model::MemoryCategory::Code,
            context_level: crate::model::ContextLevel::ProjectContext,
            scope: crate::model::MemoryScope::Global,
            project_name: None,
            importance: 0.5,
            tags: Default::default(),
            metadata,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            lifecycle_state: crate::model::LifecycleState::Active,
            provenance: crate::model::MemoryProvenance::capture(crate::model::ProvenanceSource::CodeIndexed, None),
            embedding_model: self.embeddings.model_id().to_string(),
        };

        CodeUnit {
            memory,
            file_path: file_path.to_string(),
            language,
            unit_kind: unit.unit_kind,
            name: unit.name.clone(),
            start_line: unit.start_line,
            end_line: unit.end_line,
            content_hash,
            repository_id: self.repository_id,
        }
    }

    async fn existing_units_for_file(&self, file_path: &str) -> Result<HashMap<(String, UnitKind, u32), CodeUnit>> {
        let filters = crate::store::SearchFilters {
            category: Some(crate::model::MemoryCategory::Code),
            ..Default::default()
        };
        let (units, _) = self
            .store
            .list_memories(Some(&filters), crate::store::SortField::CreatedAt, crate::store::SortOrder::Asc, u64::MAX, 0)
            .await?;

        Ok(units
            .into_iter()
            .filter_map(|u| code_unit_from_memory(u, self.repository_id, file_path))
            .map(|cu| ((cu.name.clone(), cu.unit_kind, cu.start_line), cu))
            .collect())
    }
}

/// Reconstruct a [`CodeUnit`]'s indexer-relevant fields from its stored
/// metadata, since [`VectorStore`] operates on [`MemoryUnit`] directly.
fn code_unit_from_memory(unit: crate::model::MemoryUnit, repository_id: Uuid, file_path: &str) -> Option<CodeUnit> {
    use crate::model::MetadataValue;

    let stored_repo = match unit.metadata.get("repository_id") {
        Some(MetadataValue::String(s)) => s.parse::<Uuid>().ok()?,
        _ => return None,
    };
    if stored_repo != repository_id {
        return None;
    }
    let stored_path = match unit.metadata.get("file_path") {
        Some(MetadataValue::String(s)) => s.clone(),
        _ => return None,
    };
    if stored_path != file_path {
        return None;
    }
    let unit_kind = match unit.metadata.get("unit_kind") {
        Some(MetadataValue::String(s)) => parse_unit_kind(s)?,
        _ => return None,
    };
    let name = match unit.metadata.get("unit_name") {
        Some(MetadataValue::String(s)) => s.clone(),
        _ => return None,
    };
    let start_line = match unit.metadata.get("start_line") {
        Some(MetadataValue::Number(n)) => *n as u32,
        _ => return None,
    };
    let end_line = match unit.metadata.get("end_line") {
        Some(MetadataValue::Number(n)) => *n as u32,
        _ => return None,
    };
    let content_hash = match unit.metadata.get("content_hash") {
        Some(MetadataValue::String(s)) => s.clone(),
        _ => return None,
    };
    let language = match unit.metadata.get("language") {
        Some(MetadataValue::String(s)) => s.clone(),
        _ => "unknown".to_string(),
    };

    Some(CodeUnit { memory: unit, file_path: stored_path, language, unit_kind, name, start_line, end_line, content_hash, repository_id })
}

fn parse_unit_kind(s: &str) -> Option<UnitKind> {
    Some(match s {
        "function" => UnitKind::Function,
        "method" => UnitKind::Method,
        "class" => UnitKind::Class,
        "module" => UnitKind::Module,
        "block" => UnitKind::Block,
        _ => return None,
    })
}

fn walk_files(root: &Path, recursive: bool, parser: &dyn ParserService) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.file_type().is_file()
                || !e
                    .file_name()
                    .to_str()
                    .map(|name| IGNORED_DIR_NAMES.contains(&name))
                    .unwrap_or(false)
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let recognized = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| parser.language_for_extension(ext).is_some())
            .unwrap_or(false);
        if recognized {
            files.push(entry.path().to_path_buf());
        }
    }
    files
}
