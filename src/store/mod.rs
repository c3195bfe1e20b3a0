// Vector document store
// One JSON artifact per record identity, written atomically and recovered when corrupt

#[cfg(test)]
mod tests;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, info, warn};

use crate::documents::VectorDocument;
use crate::{MatchError, Result};

const ARTIFACT_SUFFIX: &str = ".vector.json";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory of vector document artifacts, one JSON file per record identity
#[derive(Debug, Clone)]
pub struct VectorStore {
    root: PathBuf,
}

impl VectorStore {
    /// Open a store rooted at `root`, creating the directory if needed
    #[inline]
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            MatchError::Store(format!(
                "Failed to create vector store directory {}: {}",
                root.display(),
                e
            ))
        })?;

        debug!("Opened vector store at {}", root.display());
        Ok(Self { root })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn artifact_path(&self, identity: &str) -> PathBuf {
        self.root.join(format!("{identity}{ARTIFACT_SUFFIX}"))
    }

    /// Load a cached document.
    ///
    /// Missing and unreadable artifacts are both cache misses. A corrupt
    /// artifact is moved aside so the next save starts clean.
    #[inline]
    pub fn load(&self, identity: &str) -> Option<VectorDocument> {
        let path = self.artifact_path(identity);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read vector artifact {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<VectorDocument>(&content) {
            Ok(document) => Some(document),
            Err(e) => {
                warn!(
                    "Corrupt vector artifact {}, treating as cache miss: {}",
                    path.display(),
                    e
                );
                Self::back_up_corrupt(&path);
                None
            }
        }
    }

    /// Write a document atomically, replacing any previous artifact
    #[inline]
    pub fn save(&self, identity: &str, document: &VectorDocument) -> Result<PathBuf> {
        let path = self.artifact_path(identity);
        let temp_path = self.root.join(format!(
            ".{identity}{ARTIFACT_SUFFIX}.{}-{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let content = serde_json::to_string_pretty(document).map_err(|e| {
            MatchError::Store(format!("Failed to serialize vector document: {}", e))
        })?;

        fs::write(&temp_path, content).map_err(|e| {
            MatchError::Store(format!(
                "Failed to write vector artifact {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        if let Err(e) = fs::rename(&temp_path, &path) {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                error!(
                    "Failed to remove temporary artifact {}: {}",
                    temp_path.display(),
                    cleanup
                );
            }
            return Err(MatchError::Store(format!(
                "Failed to move vector artifact into place at {}: {}",
                path.display(),
                e
            )));
        }

        debug!("Saved vector document to {}", path.display());
        Ok(path)
    }

    /// Read a document a caller explicitly asked for; corruption is an error here
    #[inline]
    pub fn read_document(path: &Path) -> Result<VectorDocument> {
        let content = fs::read_to_string(path).map_err(|e| {
            MatchError::Store(format!(
                "Failed to read vector document {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            MatchError::Store(format!(
                "Invalid vector document {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Paths of every artifact in the store, sorted
    #[inline]
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            MatchError::Store(format!(
                "Failed to list vector store {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_artifact = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(ARTIFACT_SUFFIX) && !name.starts_with('.'));
            if is_artifact && path.is_file() {
                paths.push(path);
            }
        }

        paths.sort();
        Ok(paths)
    }

    fn back_up_corrupt(path: &Path) {
        let backup_path = path.with_extension("corrupted_backup");
        match fs::rename(path, &backup_path) {
            Ok(()) => info!("Corrupt artifact backed up to {}", backup_path.display()),
            Err(e) => error!("Failed to back up corrupt artifact {}: {}", path.display(), e),
        }
    }
}
