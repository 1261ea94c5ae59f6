//! Persistence of the content document.
//!
//! The store is the only durable copy of a run: the orchestrator saves after
//! the text stages and again after the image stages, and `--resume` loads
//! whatever was saved last. One document per store, overwritten on each save.

use crate::document::ContentDocument;
use crate::error::ScriptError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Load/save of the single document of a run.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self) -> Result<ContentDocument, ScriptError>;
    async fn save(&self, document: &ContentDocument) -> Result<(), ScriptError>;
}

/// Pretty-printed JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load(&self) -> Result<ContentDocument, ScriptError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScriptError::NoSavedDocument {
                    path: Some(self.path.clone()),
                });
            }
            Err(e) => {
                return Err(ScriptError::StoreIo {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let format_err = |detail: String| ScriptError::StoreFormat {
            path: Some(self.path.clone()),
            detail,
        };
        let document: ContentDocument =
            serde_json::from_slice(&bytes).map_err(|e| format_err(e.to_string()))?;
        document.validate().map_err(format_err)?;
        Ok(document)
    }

    async fn save(&self, document: &ContentDocument) -> Result<(), ScriptError> {
        let json = serde_json::to_vec_pretty(document)
            .map_err(|e| ScriptError::Internal(format!("serialise document: {e}")))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| ScriptError::Internal(format!("store task failed: {e}")))??;

        debug!("Saved document at stage '{}' to {}", document.stage(), self.path.display());
        Ok(())
    }
}

/// Write to a temp file in the target directory, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScriptError> {
    let io_err = |source: std::io::Error| ScriptError::StoreIo {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// In-process store, for tests and for embedding the pipeline without disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<ContentDocument>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `document`.
    pub fn with_document(document: ContentDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The last saved document, if any.
    pub fn snapshot(&self) -> Option<ContentDocument> {
        self.document.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self) -> Result<ContentDocument, ScriptError> {
        let document = self
            .snapshot()
            .ok_or(ScriptError::NoSavedDocument { path: None })?;
        document
            .validate()
            .map_err(|detail| ScriptError::StoreFormat { path: None, detail })?;
        Ok(document)
    }

    async fn save(&self, document: &ContentDocument) -> Result<(), ScriptError> {
        let mut guard = self
            .document
            .lock()
            .map_err(|_| ScriptError::Internal("memory store lock poisoned".into()))?;
        *guard = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
