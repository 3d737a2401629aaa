use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
    time::SystemTime,
};

use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

pub const ALLOWED_EXTENSIONS: &[&str] = &["json"];

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("static pattern"));

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported file type for {0:?}; only .json files are accepted")]
    InvalidFileType(String),
    #[error("{0:?} does not contain a usable file name")]
    InvalidName(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(name: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound(name.to_string())
        } else {
            StoreError::Io { name: name.to_string(), source }
        }
    }
}

/// Reduce an arbitrary client-supplied name to a flat, portable file name.
///
/// Non-ASCII characters are dropped, path separators and whitespace runs
/// become `_`, anything outside `[A-Za-z0-9_.-]` is removed and leading or
/// trailing dots/underscores are stripped. The result may be empty.
pub fn secure_filename(raw: &str) -> String {
    let ascii: String = raw.chars().filter(char::is_ascii).collect();
    let spaced = ascii.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_CHARS.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    let stem = trimmed.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES.iter().any(|d| d.eq_ignore_ascii_case(stem)) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// True when the text after the last `.` is a recognised extension.
pub fn allowed_file(filename: &str) -> bool {
    filename.rsplit_once('.').is_some_and(|(_, ext)| {
        ALLOWED_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ALLOWED_EXTENSIONS.iter().any(|a| e.eq_ignore_ascii_case(a)))
}

struct CachedDocument {
    modified: Option<SystemTime>,
    len: u64,
    doc: Arc<Value>,
}

/// A flat directory of JSON documents.
pub struct DocumentStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, CachedDocument>>,
}

impl DocumentStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::Io {
            name: root.display().to_string(),
            source: e,
        })?;
        Ok(Self { root, cache: RwLock::new(HashMap::new()) })
    }

    fn resolve(&self, name: &str) -> Result<(String, PathBuf), StoreError> {
        let safe = secure_filename(name);
        if safe.is_empty() {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        let path = self.root.join(&safe);
        Ok((safe, path))
    }

    /// Names of the stored `.json` files, sorted.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| StoreError::io(&self.root.display().to_string(), e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root.display().to_string(), e))?;
            let path = entry.path();
            if !path.is_file() || !has_json_extension(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).map(|(_, path)| path.is_file()).unwrap_or(false)
    }

    /// Load and decode a stored document. Decoded documents are cached until
    /// the file's size or modification time changes. Writes made through
    /// [`DocumentStore::save`] always refresh the cache; an outside rewrite of
    /// the same length within the filesystem's timestamp resolution is not
    /// detected.
    pub fn read(&self, name: &str) -> Result<Arc<Value>, StoreError> {
        let (safe, path) = self.resolve(name)?;
        let meta = std::fs::metadata(&path).map_err(|e| StoreError::io(&safe, e))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(safe));
        }
        let modified = meta.modified().ok();

        if let Some(hit) = self.cache.read().get(&safe) {
            if hit.modified == modified && hit.len == meta.len() {
                tracing::debug!(document = %safe, "decode cache hit");
                return Ok(hit.doc.clone());
            }
        }

        let f = File::open(&path).map_err(|e| StoreError::io(&safe, e))?;
        let doc: Value = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| StoreError::Decode { name: safe.clone(), source: e })?;
        let doc = Arc::new(doc);
        self.cache.write().insert(
            safe,
            CachedDocument { modified, len: meta.len(), doc: doc.clone() },
        );
        Ok(doc)
    }

    /// Validate and persist an uploaded document. Nothing is written unless
    /// the name is acceptable and the bytes decode as JSON.
    pub fn save(&self, raw_name: &str, bytes: &[u8]) -> Result<(String, Arc<Value>), StoreError> {
        if !allowed_file(raw_name) {
            return Err(StoreError::InvalidFileType(raw_name.to_string()));
        }
        let (safe, path) = self.resolve(raw_name)?;
        // sanitising can eat the extension (".json" becomes "json")
        if !allowed_file(&safe) {
            return Err(StoreError::InvalidFileType(raw_name.to_string()));
        }
        let doc: Value = serde_json::from_slice(bytes)
            .map_err(|e| StoreError::Decode { name: safe.clone(), source: e })?;

        self.cache.write().remove(&safe);
        std::fs::write(&path, bytes).map_err(|e| StoreError::io(&safe, e))?;
        let doc = Arc::new(doc);
        if let Ok(meta) = std::fs::metadata(&path) {
            self.cache.write().insert(
                safe.clone(),
                CachedDocument { modified: meta.modified().ok(), len: meta.len(), doc: doc.clone() },
            );
        }
        tracing::info!(document = %safe, bytes = bytes.len(), "stored document");
        Ok((safe, doc))
    }

    /// Remove a stored document, returning its sanitised name.
    pub fn delete(&self, name: &str) -> Result<String, StoreError> {
        let (safe, path) = self.resolve(name)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(safe));
        }
        self.cache.write().remove(&safe);
        std::fs::remove_file(&path).map_err(|e| StoreError::io(&safe, e))?;
        tracing::info!(document = %safe, "deleted document");
        Ok(safe)
    }

    /// Every stored document that decodes. Undecodable files are skipped.
    pub fn read_all(&self) -> Result<Vec<(String, Arc<Value>)>, StoreError> {
        let mut docs = Vec::new();
        for name in self.list()? {
            match self.read(&name) {
                Ok(doc) => docs.push((name, doc)),
                Err(e) => tracing::warn!(document = %name, error = %e, "skipping unreadable document"),
            }
        }
        Ok(docs)
    }
}
