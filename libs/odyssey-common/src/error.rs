/// Error taxonomy shared by every layer of the platform.
///
/// Only lookup and persistence problems live here. Failures of the code
/// runner are absorbed into test results and never become an `OdysseyError`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OdysseyError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl OdysseyError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound(format!("{} not found with id: {}", kind, id))
    }
}

impl From<redis::RedisError> for OdysseyError {
    fn from(e: redis::RedisError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for OdysseyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Unavailable(format!("corrupt document: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, OdysseyError>;
