use crate::document::{Document, SyncOutcome, DOCUMENT_SUFFIX};
use crate::error::{NosqlliteError, Result, SyncFailure};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Names of the documents touched by a bulk sync, split by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
}

/// A directory of documents, one JSON file each.
#[derive(Debug)]
pub struct Database {
    name: String,
    path: PathBuf,
    documents: BTreeMap<String, Document>,
}

impl Database {
    /// Open an existing database directory and load every `*.json` file in
    /// it as a document.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(NosqlliteError::DirectoryNotFound {
                path: path.display().to_string(),
            });
        }

        let path = std::fs::canonicalize(path)?;
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut db = Database {
            name,
            path,
            documents: BTreeMap::new(),
        };
        db.load()?;

        log::info!(
            "Opened database '{}' with {} document(s)",
            db.name,
            db.documents.len()
        );
        Ok(db)
    }

    /// Create a new database directory and open it.
    /// Fails if a directory already exists at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(NosqlliteError::AlreadyExists {
                path: path.display().to_string(),
            });
        }

        std::fs::create_dir_all(path)?;
        log::info!("Created database directory {}", path.display());
        Self::open(path)
    }

    /// Open the database at `path`, creating the directory first if needed.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Scan the directory and load every document file found in it.
    fn load(&mut self) -> Result<()> {
        for file_path in self.document_files()? {
            let doc = Document::open(&file_path)?;
            self.documents.insert(doc.name().to_string(), doc);
        }
        Ok(())
    }

    /// Regular files directly inside the database directory whose name ends
    /// in `.json`. Hidden files (including one named just `.json`) are skipped.
    fn document_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*{}",
            glob::Pattern::escape(&self.path.to_string_lossy()),
            DOCUMENT_SUFFIX
        );
        let options = glob::MatchOptions {
            require_literal_leading_dot: true,
            ..glob::MatchOptions::new()
        };

        let mut files = Vec::new();
        let entries = glob::glob_with(&pattern, options).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("Glob error: {e}"))
        })?;
        for entry in entries {
            let file_path = entry.map_err(glob::GlobError::into_error)?;
            if file_path.is_file() {
                files.push(file_path);
            }
        }
        Ok(files)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a document named `name`, backed by `<path>/<name>.json`.
    ///
    /// If a document with that name is already registered it is returned
    /// unchanged and a warning is logged.
    pub fn new_document(&mut self, name: &str) -> Result<&mut Document> {
        validate_name(name)?;

        if self.documents.contains_key(name) {
            log::warn!(
                "Document '{}' already exists in database '{}', returning it",
                name,
                self.name
            );
        } else {
            let file_path = self.path.join(format!("{name}{DOCUMENT_SUFFIX}"));
            let doc = Document::open(&file_path)?;
            self.documents.insert(name.to_string(), doc);
        }

        self.get_mut(name)
    }

    pub fn get(&self, name: &str) -> Result<&Document> {
        self.documents
            .get(name)
            .ok_or_else(|| NosqlliteError::DocumentNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Document> {
        self.documents
            .get_mut(name)
            .ok_or_else(|| NosqlliteError::DocumentNotFound(name.to_string()))
    }

    /// Register `doc` under `name`, returning any document it replaces.
    /// The key must match the document's own name.
    pub fn set(&mut self, name: &str, doc: Document) -> Result<Option<Document>> {
        if doc.name() != name {
            return Err(NosqlliteError::NameMismatch {
                key: name.to_string(),
                name: doc.name().to_string(),
            });
        }
        Ok(self.documents.insert(name.to_string(), doc))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.documents.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Sync every document.
    ///
    /// Documents are independent, so a failure on one does not stop the
    /// others from being attempted. If any failed, the error carries both the
    /// failures and the report for the documents that did sync.
    pub fn sync(&mut self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut failures = Vec::new();

        for (name, doc) in self.documents.iter_mut() {
            match doc.sync() {
                Ok(SyncOutcome::Written) => report.written.push(name.clone()),
                Ok(SyncOutcome::Unchanged) => report.unchanged.push(name.clone()),
                Err(error) => {
                    log::warn!("Failed to sync document '{name}': {error}");
                    failures.push(SyncFailure {
                        document: name.clone(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(NosqlliteError::SyncFailed {
                completed: report,
                failures,
            })
        }
    }
}

/// Document names become file names, so they must be a single path segment.
/// A leading dot would make the file hidden from discovery.
fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(NosqlliteError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn setup_test_db() -> (TempDir, Database) {
        let tmp = TempDir::new().unwrap();
        let db = Database::create(tmp.path().join("my-nosql-lite-db")).unwrap();
        (tmp, db)
    }

    #[test]
    fn test_database_name() {
        let (_tmp, db) = setup_test_db();
        assert_eq!(db.name(), "my-nosql-lite-db");
        assert!(db.is_empty());
    }

    #[test]
    fn test_name_ignores_trailing_separator() {
        let (tmp, _db) = setup_test_db();
        let with_slash = format!("{}/", tmp.path().join("my-nosql-lite-db").display());
        let db = Database::open(with_slash).unwrap();
        assert_eq!(db.name(), "my-nosql-lite-db");
    }

    #[test]
    fn test_create_fails_on_existing_directory() {
        let (tmp, _db) = setup_test_db();
        let err = Database::create(tmp.path().join("my-nosql-lite-db")).unwrap_err();
        assert!(matches!(err, NosqlliteError::AlreadyExists { .. }));
    }

    #[test]
    fn test_open_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let err = Database::open(tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, NosqlliteError::DirectoryNotFound { .. }));
    }

    #[test]
    fn test_open_or_create() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db");

        let mut db = Database::open_or_create(&path).unwrap();
        db.new_document("users").unwrap();

        let db = Database::open_or_create(&path).unwrap();
        assert!(db.contains("users"));
    }

    #[test]
    fn test_new_document_creates_file() {
        let (_tmp, mut db) = setup_test_db();
        let doc = db.new_document("users").unwrap();

        assert_eq!(doc.name(), "users");
        assert!(doc.path().ends_with("users.json"));
        assert!(doc.path().exists());
        assert_eq!(db.names().collect::<Vec<_>>(), vec!["users"]);
    }

    #[test]
    fn test_new_document_twice_returns_existing() {
        let (_tmp, mut db) = setup_test_db();

        db.new_document("x")
            .unwrap()
            .set("alice", &json!({ "age": 30 }))
            .unwrap();

        let again = db.new_document("x").unwrap();
        assert_eq!(again.get("alice").unwrap(), &json!({ "age": 30 }));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_new_document_rejects_path_names() {
        let (_tmp, mut db) = setup_test_db();
        for bad in ["", "..", ".hidden", "a/b", "a\\b"] {
            assert!(
                matches!(db.new_document(bad), Err(NosqlliteError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_get_missing_document() {
        let (_tmp, db) = setup_test_db();
        assert!(matches!(
            db.get("ghost").unwrap_err(),
            NosqlliteError::DocumentNotFound(_)
        ));
    }

    #[test]
    fn test_load_discovers_only_json_suffix() {
        let (_tmp, mut db) = setup_test_db();
        db.new_document("users").unwrap();
        db.new_document("posts").unwrap();

        let dir = db.path().to_path_buf();
        fs::write(dir.join("notes.txt"), "hello").unwrap();
        fs::write(dir.join("users.json.bak"), "{}").unwrap();
        fs::create_dir(dir.join("nested.json")).unwrap();

        let db = Database::open(&dir).unwrap();
        assert_eq!(db.names().collect::<Vec<_>>(), vec!["posts", "users"]);
    }

    #[test]
    fn test_load_skips_hidden_json_files() {
        let (_tmp, mut db) = setup_test_db();
        db.new_document("users").unwrap();
        fs::write(db.path().join(".json"), "{}").unwrap();
        fs::write(db.path().join(".draft.json"), "not json").unwrap();

        let db = Database::open(db.path()).unwrap();
        assert_eq!(db.names().collect::<Vec<_>>(), vec!["users"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_open_unreadable_directory_is_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, mut db) = setup_test_db();
        db.new_document("users").unwrap();
        let dir = db.path().to_path_buf();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can still list the directory; nothing to check then
        let listable = fs::read_dir(&dir).is_ok();
        let result = Database::open(&dir);
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
        if listable {
            return;
        }

        assert!(matches!(result.unwrap_err(), NosqlliteError::Io(_)));
    }

    #[test]
    fn test_load_fails_on_malformed_document() {
        let (_tmp, db) = setup_test_db();
        fs::write(db.path().join("broken.json"), r#"{"data": {}}"#).unwrap();

        let err = Database::open(db.path()).unwrap_err();
        assert!(matches!(err, NosqlliteError::Malformed { .. }));
    }

    #[test]
    fn test_set_document() {
        let (tmp, mut db) = setup_test_db();
        let doc = Document::open(tmp.path().join("orders.json")).unwrap();

        assert!(matches!(
            db.set("other", doc.clone()).unwrap_err(),
            NosqlliteError::NameMismatch { .. }
        ));

        assert!(db.set("orders", doc).unwrap().is_none());
        assert!(db.contains("orders"));
    }

    #[test]
    fn test_sync_reports_outcomes() {
        let (_tmp, mut db) = setup_test_db();
        db.new_document("users").unwrap().set("alice", &1).unwrap();
        db.new_document("posts").unwrap();

        let report = db.sync().unwrap();
        assert_eq!(
            report,
            SyncReport {
                written: vec!["users".to_string()],
                unchanged: vec!["posts".to_string()],
            }
        );

        let report = db.sync().unwrap();
        assert!(report.written.is_empty());
        assert_eq!(report.unchanged.len(), 2);
    }

    #[test]
    fn test_sync_continues_after_failure() {
        let (_tmp, mut db) = setup_test_db();
        db.new_document("alpha").unwrap().set("k", &1).unwrap();
        db.new_document("beta").unwrap().set("k", &2).unwrap();

        let alpha_path = db.get("alpha").unwrap().path().to_path_buf();
        fs::remove_file(&alpha_path).unwrap();

        match db.sync().unwrap_err() {
            NosqlliteError::SyncFailed {
                completed,
                failures,
            } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].document, "alpha");
                assert_eq!(completed.written, vec!["beta".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!db.get("beta").unwrap().is_dirty());
    }
}
