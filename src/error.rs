//! Error types shared by the upstream client, the record store and the sync steps.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// No session token, or the upstream refused to hand one out.
    #[error("Auth failed: {0}")]
    Auth(String),

    /// Transport failure, non-200 status, fault envelope or timeout.
    #[error("Upstream call {method} failed: {message}")]
    Call { method: String, message: String },

    #[error("Write to {table} failed: {message}")]
    StoreWrite { table: String, message: String },

    #[error("Read from {table} failed: {message}")]
    StoreRead { table: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn call(method: &str, message: impl Into<String>) -> Self {
        Self::Call {
            method: method.to_string(),
            message: message.into(),
        }
    }

    pub fn store_write(table: &str, message: impl Into<String>) -> Self {
        Self::StoreWrite {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub fn store_read(table: &str, message: impl Into<String>) -> Self {
        Self::StoreRead {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Whether the next trigger can reasonably expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Call { .. } | Self::StoreWrite { .. } | Self::StoreRead { .. } => true,
            Self::Auth(_) | Self::Config(_) => false,
        }
    }
}

/// Cut a diagnostic down to `max` characters without splitting a code point.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
