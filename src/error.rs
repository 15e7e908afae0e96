//! Error types for blocksync.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// No firewall backend is usable on this host. Fatal.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The feed could not be fetched or parsed. Fatal.
    #[error("Feed unavailable: {0}")]
    FeedUnavailable(String),

    /// Empty or malformed address. The entry is skipped.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A backend command failed or produced unusable output. Logged, not fatal.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// Config file values rejected at load time. Fatal.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether this error must abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::UnsupportedPlatform(_) | SyncError::FeedUnavailable(_) | SyncError::Config(_)
        )
    }
}
