pub mod database;
pub mod document;
pub mod error;
pub mod validation;

pub use database::{Database, SyncReport};
pub use document::{content_hash, Document, Key, Metadata, SyncOutcome};
pub use error::{NosqlliteError, Result, SyncFailure};
pub use validation::{is_representable, to_json_value};
