//! Repository registry and workspace manager (§4.8): JSON-file-backed
//! documents written atomically via a sibling temp file plus rename.

pub mod repository;
pub mod workspace;

pub use repository::RepositoryRegistry;
pub use workspace::WorkspaceManager;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Write `value` to `path` atomically: serialize to a sibling `.tmp` file,
/// then rename over the destination. A crash mid-write leaves the previous
/// file (or nothing) intact, never a half-written document.
pub(crate) async fn write_atomic<T: Serialize + Sync>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Load a JSON document from `path`, returning `default` if the file does
/// not exist yet (first run).
pub(crate) async fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}
