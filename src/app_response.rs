use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

/// Outcome of a store operation.
///
/// Error variants are what Rust callers receive through [`AppResult`]; the
/// whole enum (including `Ok`) is the JSON envelope handed back across the
/// C ABI, so the front-end can tell the error kinds apart and localize them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppResponse {
    /// Target record id or folder name does not exist.
    NotFound(String),
    /// Caller-supplied data was rejected before any mutation happened.
    ValidationError(String),
    /// Disk read, write or directory failure.
    StorageError(String),
    /// Folder operation collided with an existing name.
    Conflict(String),
    SerializationError(String),
    BadRequest(String),
    Ok(String),
}

pub type AppResult<T> = Result<T, AppResponse>;

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::StorageError(msg) => write!(f, "Storage error: {}", msg),
            AppResponse::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl std::error::Error for AppResponse {}

impl From<std::io::Error> for AppResponse {
    fn from(err: std::io::Error) -> Self {
        AppResponse::StorageError(format!("IO error: {}", err))
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        AppResponse::NotFound(format!("{what} with id {id} not found"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppResponse::NotFound(_))
    }
}
