use thiserror::Error;

use crate::parse::Rule;

#[derive(Error, Debug)]
pub enum LinkstoreError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Not acceptable: {0}")]
    NotAcceptable(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LinkstoreError>;

// Helper conversions
impl From<rusqlite::Error> for LinkstoreError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for LinkstoreError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for LinkstoreError {
    fn from(e: serde_json::Error) -> Self { Self::BadRequest(e.to_string()) }
}
impl From<pest::error::Error<Rule>> for LinkstoreError {
    fn from(e: pest::error::Error<Rule>) -> Self { Self::BadRequest(e.to_string()) }
}
impl From<base64::DecodeError> for LinkstoreError {
    fn from(e: base64::DecodeError) -> Self { Self::BadRequest(format!("SPKAC is not base64: {e}")) }
}
impl From<rcgen::Error> for LinkstoreError {
    fn from(e: rcgen::Error) -> Self { Self::Internal(e.to_string()) }
}
