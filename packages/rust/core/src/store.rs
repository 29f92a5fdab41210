//! Directory-backed output store for generated lessons.
//!
//! Every document is written with a temp-file + rename so re-runs overwrite
//! in place and readers never observe a half-written lesson.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use lessonforge_shared::{GeneratedDocument, LessonForgeError, Result, write_atomic};

/// Error log written next to the lessons when a run records failures.
pub const ERROR_LOG_FILE: &str = "generation_errors.log";

const DOCUMENT_EXTENSION: &str = "md";

/// Metadata for a document that has been written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredDocument {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Lessons on disk, keyed by filename.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    /// Open the store, creating the directory if needed.
    ///
    /// Failure here is fatal for a run: nothing can be written.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| LessonForgeError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Attach to an existing store without creating anything.
    pub fn existing(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(LessonForgeError::validation(format!(
                "output directory not found: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a document in the store.
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Write (or overwrite) one document.
    pub fn write_document(&self, doc: &GeneratedDocument) -> Result<StoredDocument> {
        check_filename(&doc.filename)?;

        let target = self.path_of(&doc.filename);
        write_atomic(&target, &doc.content)?;

        let stored = StoredDocument {
            filename: doc.filename.clone(),
            sha256: hex_digest(doc.content.as_bytes()),
            size_bytes: doc.content.len(),
        };
        debug!(filename = %stored.filename, size = stored.size_bytes, "document written");
        Ok(stored)
    }

    /// Read a document back as text.
    pub fn read_document(&self, filename: &str) -> Result<String> {
        let path = self.path_of(filename);
        std::fs::read_to_string(&path).map_err(|e| LessonForgeError::io(&path, e))
    }

    /// Filenames of all `*.md` documents, sorted lexically.
    pub fn list_documents(&self) -> Result<Vec<String>> {
        let entries =
            std::fs::read_dir(&self.root).map_err(|e| LessonForgeError::io(&self.root, e))?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                !name.starts_with('.')
                    && Path::new(name)
                        .extension()
                        .is_some_and(|ext| ext == DOCUMENT_EXTENSION)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Serialize `value` as pretty JSON into the store.
    pub fn write_json_atomic<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.root.join(name);
        write_json(&path, value)?;
        Ok(path)
    }

    /// Replace the error log with `errors`, one per line.
    #[instrument(skip_all, fields(errors = errors.len()))]
    pub fn write_error_log(&self, errors: &[String]) -> Result<PathBuf> {
        let path = self.root.join(ERROR_LOG_FILE);
        let mut body = errors.join("\n");
        body.push('\n');
        write_atomic(&path, body)?;
        info!(path = %path.display(), "error log written");
        Ok(path)
    }

    /// Remove an error log left by an earlier run.
    pub fn clear_error_log(&self) -> Result<()> {
        let path = self.root.join(ERROR_LOG_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LessonForgeError::io(&path, e)),
        }
    }
}

/// Write pretty JSON to `path` atomically, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LessonForgeError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| LessonForgeError::parse(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, json)
}

/// Lowercase hex SHA-256.
pub fn hex_digest(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Filenames are single path components ending in `.md`.
fn check_filename(filename: &str) -> Result<()> {
    let path = Path::new(filename);
    let single_component = path.components().count() == 1
        && path.file_name().is_some_and(|n| n == filename);
    if filename.is_empty() || !single_component || filename.starts_with('.') {
        return Err(LessonForgeError::validation(format!(
            "invalid document filename: {filename:?}"
        )));
    }
    if path.extension().is_none_or(|ext| ext != DOCUMENT_EXTENSION) {
        return Err(LessonForgeError::validation(format!(
            "document filename must end in .md: {filename:?}"
        )));
    }
    Ok(())
}
