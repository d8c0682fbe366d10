use std::fmt;
use rusqlite;

#[derive(Debug)]
pub enum OpenGroupSDKError {
    SqliteError(rusqlite::Error),
    JsonError(String),
    InvalidArgument(String),
    NotFound(String),
    Other(String),
    KvStore(String),
    Serialization(String),
    IO(String),
    Database(String),
    Transport(String),  // 网络传输层错误
    QueueClosed(String),
    InvalidData(String),
    ShuttingDown(String),
}

impl fmt::Display for OpenGroupSDKError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenGroupSDKError::SqliteError(e) => write!(f, "SQLite error: {}", e),
            OpenGroupSDKError::JsonError(e) => write!(f, "JSON error: {}", e),
            OpenGroupSDKError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            OpenGroupSDKError::NotFound(e) => write!(f, "Not found: {}", e),
            OpenGroupSDKError::Other(e) => write!(f, "Other error: {}", e),
            OpenGroupSDKError::KvStore(e) => write!(f, "KV store error: {}", e),
            OpenGroupSDKError::Serialization(e) => write!(f, "Serialization error: {}", e),
            OpenGroupSDKError::IO(e) => write!(f, "IO error: {}", e),
            OpenGroupSDKError::Database(e) => write!(f, "Database error: {}", e),
            OpenGroupSDKError::Transport(e) => write!(f, "Transport error: {}", e),
            OpenGroupSDKError::QueueClosed(e) => write!(f, "Queue closed: {}", e),
            OpenGroupSDKError::InvalidData(e) => write!(f, "Invalid data: {}", e),
            OpenGroupSDKError::ShuttingDown(e) => write!(f, "Shutting down: {}", e),
        }
    }
}

impl std::error::Error for OpenGroupSDKError {}

impl From<rusqlite::Error> for OpenGroupSDKError {
    fn from(error: rusqlite::Error) -> Self {
        OpenGroupSDKError::SqliteError(error)
    }
}

impl From<serde_json::Error> for OpenGroupSDKError {
    fn from(error: serde_json::Error) -> Self {
        OpenGroupSDKError::JsonError(error.to_string())
    }
}

impl From<std::io::Error> for OpenGroupSDKError {
    fn from(error: std::io::Error) -> Self {
        OpenGroupSDKError::IO(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OpenGroupSDKError>;
