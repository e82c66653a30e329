use thiserror::Error;

use crate::database::SyncReport;

#[derive(Error, Debug)]
pub enum NosqlliteError {
    #[error("Malformed document {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Not serializable: {0}")]
    NotSerializable(String),

    #[error("Invalid document name: {0:?}")]
    InvalidName(String),

    #[error("Document registered as '{key}' is named '{name}'")]
    NameMismatch { key: String, name: String },

    #[error("Failed to sync {} document(s): {}", failures.len(), failed_names(failures))]
    SyncFailed {
        completed: SyncReport,
        failures: Vec<SyncFailure>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One document that could not be synced during a bulk sync.
#[derive(Debug)]
pub struct SyncFailure {
    pub document: String,
    pub error: NosqlliteError,
}

fn failed_names(failures: &[SyncFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.document, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, NosqlliteError>;
