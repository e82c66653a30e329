// Document I/O - one JSON file holding `metadata` and `data`

pub mod hash;

use crate::error::{NosqlliteError, Result};
use crate::validation;
use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub use hash::{canonical_json, content_hash};

/// File suffix that marks a document file inside a database directory.
pub const DOCUMENT_SUFFIX: &str = ".json";

/// Bookkeeping stored next to the data in every document file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Epoch seconds of the last write.
    pub timestamp: f64,
    /// Hex SHA-256 of the canonical data at the last write.
    pub datahash: String,
    /// Any other keys found on disk, kept across rewrites.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    fn for_data(data: &Value) -> Self {
        Metadata {
            timestamp: now_epoch_seconds(),
            datahash: content_hash(data),
            extra: Map::new(),
        }
    }

    /// The timestamp as a UTC datetime, if it is in range.
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros((self.timestamp * 1e6).round() as i64)
    }
}

/// Addresses one entry of a document's top-level data: a field of an object
/// or an element of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Field(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Field(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Field(s.clone())
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, "{name}"),
            Key::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// What a sync did to the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Stored hash matched the in-memory data; nothing was written.
    Unchanged,
    /// The file was rewritten with fresh metadata.
    Written,
}

/// A single JSON document backed by its own file.
///
/// The in-memory `data` is a cache over the file. Mutations stay in memory
/// until [`Document::sync`] notices the content hash no longer matches the
/// one on disk and rewrites the file.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    path: PathBuf,
    data: Value,
    metadata: Metadata,
}

impl Document {
    /// Open the document stored at `path`.
    ///
    /// A missing file, or a JSON object with neither a `metadata` nor a
    /// `data` section, is initialized with empty object data first. A file
    /// with only one of the two sections is `Malformed`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = document_name(path)?;

        if needs_initializing(path)? {
            if path.exists() {
                log::warn!(
                    "{} has no document sections, initializing it",
                    path.display()
                );
            }
            let data = Value::Object(Map::new());
            let metadata = Metadata::for_data(&data);
            write_document(path, &metadata, &data)?;
            log::debug!("Created document {}", path.display());
        }

        let path = fs::canonicalize(path)?;
        let (metadata, data) = read_document(&path)?;

        Ok(Document {
            name,
            path,
            data,
            metadata,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Metadata as of the last read, write or [`Document::refresh_metadata`].
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Look up one top-level entry of the data.
    pub fn get(&self, key: impl Into<Key>) -> Result<&Value> {
        let key = key.into();
        let found = match (&self.data, &key) {
            (Value::Object(map), Key::Field(field)) => map.get(field),
            (Value::Array(items), Key::Index(i)) => items.get(*i),
            _ => return Err(key_kind_mismatch(&self.name, &key, kind_of(&self.data))),
        };
        found.ok_or_else(|| NosqlliteError::KeyNotFound(key.to_string()))
    }

    /// Store `value` under `key` in memory, returning the previous value.
    ///
    /// The value must be representable as JSON. On an object, a field is
    /// inserted or replaced; on an array, only existing indices can be set.
    /// Nothing is written until the next [`Document::sync`].
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<Key>,
        value: &T,
    ) -> Result<Option<Value>> {
        let key = key.into();
        let value = validation::to_json_value(value)?;
        let kind = kind_of(&self.data);

        match (&mut self.data, &key) {
            (Value::Object(map), Key::Field(field)) => Ok(map.insert(field.clone(), value)),
            (Value::Array(items), Key::Index(i)) => match items.get_mut(*i) {
                Some(slot) => Ok(Some(std::mem::replace(slot, value))),
                None => Err(NosqlliteError::KeyNotFound(key.to_string())),
            },
            _ => Err(key_kind_mismatch(&self.name, &key, kind)),
        }
    }

    /// Remove and return one top-level entry. In memory only, like `set`.
    pub fn remove(&mut self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        let kind = kind_of(&self.data);
        let removed = match (&mut self.data, &key) {
            (Value::Object(map), Key::Field(field)) => map.remove(field),
            (Value::Array(items), Key::Index(i)) if *i < items.len() => Some(items.remove(*i)),
            (Value::Array(_), Key::Index(_)) => None,
            _ => return Err(key_kind_mismatch(&self.name, &key, kind)),
        };
        removed.ok_or_else(|| NosqlliteError::KeyNotFound(key.to_string()))
    }

    /// Replace the whole payload, returning the old one. The new data must
    /// be a JSON object or array.
    pub fn replace_data<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<Value> {
        let data = validation::to_json_value(data)?;
        if !is_container(&data) {
            return Err(NosqlliteError::TypeMismatch(format!(
                "document data must be an object or array, got {}",
                kind_of(&data)
            )));
        }
        Ok(std::mem::replace(&mut self.data, data))
    }

    /// Content hash of the current in-memory data.
    pub fn hash(&self) -> String {
        content_hash(&self.data)
    }

    /// True when the in-memory data differs from what was last read or written.
    pub fn is_dirty(&self) -> bool {
        self.metadata.datahash != self.hash()
    }

    /// Stamp the in-memory metadata with the current time and data hash.
    /// Does not touch the file.
    pub fn refresh_metadata(&mut self) -> &Metadata {
        self.metadata.timestamp = now_epoch_seconds();
        self.metadata.datahash = content_hash(&self.data);
        &self.metadata
    }

    /// Persist the in-memory data if it differs from what the file holds.
    ///
    /// Only the stored metadata is read back; when its `datahash` matches the
    /// hash of the in-memory data the file is left untouched, timestamp
    /// included.
    pub fn sync(&mut self) -> Result<SyncOutcome> {
        let stored = read_metadata(&self.path)?;
        if stored.datahash == self.hash() {
            log::debug!("Document '{}' unchanged, skipping write", self.name);
            return Ok(SyncOutcome::Unchanged);
        }

        self.metadata.extra = stored.extra;
        self.refresh_metadata();
        write_document(&self.path, &self.metadata, &self.data)?;
        log::debug!("Wrote document '{}' to {}", self.name, self.path.display());
        Ok(SyncOutcome::Written)
    }

    /// Discard in-memory changes and re-read the file.
    pub fn reload(&mut self) -> Result<()> {
        let (metadata, data) = read_document(&self.path)?;
        self.metadata = metadata;
        self.data = data;
        Ok(())
    }
}

/// Derive a document name from its file path: the file name without the
/// `.json` suffix.
pub fn document_name(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| NosqlliteError::InvalidName(path.display().to_string()))?;

    let name = file_name.strip_suffix(DOCUMENT_SUFFIX).unwrap_or(file_name);
    if name.is_empty() {
        return Err(NosqlliteError::InvalidName(file_name.to_string()));
    }
    Ok(name.to_string())
}

/// True when `path` does not exist yet, or holds a JSON object carrying
/// neither document section.
fn needs_initializing(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }

    let content = fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&content).map_err(|e| malformed(path, e))?;
    Ok(matches!(
        &root,
        Value::Object(map) if !map.contains_key("metadata") && !map.contains_key("data")
    ))
}

/// Read and validate a document file, returning its metadata and data.
pub fn read_document(path: &Path) -> Result<(Metadata, Value)> {
    let content = fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&content).map_err(|e| malformed(path, e))?;

    let Value::Object(mut root) = root else {
        return Err(malformed(path, "top level is not a JSON object"));
    };

    let (Some(metadata), Some(data)) = (root.remove("metadata"), root.remove("data")) else {
        return Err(malformed(path, "missing 'metadata' or 'data' section"));
    };

    let metadata: Metadata = serde_json::from_value(metadata)
        .map_err(|e| malformed(path, format!("invalid metadata: {e}")))?;

    if !is_container(&data) {
        return Err(malformed(
            path,
            format!("data must be an object or array, got {}", kind_of(&data)),
        ));
    }

    Ok((metadata, data))
}

/// Read only the metadata section of a document file.
fn read_metadata(path: &Path) -> Result<Metadata> {
    #[derive(Deserialize)]
    struct MetadataOnly {
        metadata: Metadata,
        #[allow(dead_code)]
        data: IgnoredAny,
    }

    let content = fs::read_to_string(path)?;
    let file: MetadataOnly = serde_json::from_str(&content).map_err(|e| malformed(path, e))?;
    Ok(file.metadata)
}

/// Write a document file, replacing it atomically.
///
/// The content goes to a temporary file in the same directory which is then
/// renamed over `path`, so a failed write never leaves a truncated document.
/// An existing file's permissions carry over to the replacement.
pub fn write_document(path: &Path, metadata: &Metadata, data: &Value) -> Result<()> {
    #[derive(Serialize)]
    struct DocumentFile<'a> {
        metadata: &'a Metadata,
        data: &'a Value,
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    DocumentFile { metadata, data }.serialize(&mut ser)?;

    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Subject to the umask, like a plain file creation
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(dir)?;
    if let Ok(existing) = fs::metadata(path) {
        tmp.as_file().set_permissions(existing.permissions())?;
    }

    tmp.write_all(&buf)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn key_kind_mismatch(document: &str, key: &Key, holds: &str) -> NosqlliteError {
    let expected = match key {
        Key::Field(_) => "an object",
        Key::Index(_) => "an array",
    };
    NosqlliteError::TypeMismatch(format!(
        "key {key} needs {expected} but document '{document}' holds {holds}"
    ))
}

fn malformed(path: &Path, reason: impl fmt::Display) -> NosqlliteError {
    NosqlliteError::Malformed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn now_epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
