use crate::error::{NosqlliteError, Result};
use serde::Serialize;
use serde_json::Value;

/// Check whether a value can be represented in the JSON data model.
///
/// Returns `(true, "")` when it can, otherwise `(false, reason)` with a
/// diagnostic suitable for showing to whoever supplied the value.
/// Advisory only; [`to_json_value`] is the enforcing form.
pub fn is_representable<T: Serialize + ?Sized>(value: &T) -> (bool, String) {
    match to_json_value(value) {
        Ok(_) => (true, String::new()),
        Err(NosqlliteError::NotSerializable(reason)) => (false, reason),
        Err(e) => (false, e.to_string()),
    }
}

/// Convert a value into the JSON data model, failing with
/// [`NosqlliteError::NotSerializable`] when it has no JSON representation.
pub fn to_json_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| NosqlliteError::NotSerializable(classify(&e)))
}

fn classify(err: &serde_json::Error) -> String {
    let message = err.to_string();
    if message.contains("key must be a string") {
        "Map keys must be strings, integers or booleans to become JSON object keys".to_string()
    } else if message.contains("must have a length") {
        "Sequences and maps must report their length to be serialized".to_string()
    } else {
        message
    }
}
