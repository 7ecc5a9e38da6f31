//! Error types for remote file operations and vault settings

/// Errors from the Dropbox file API, the path guard, and settings storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The revision presented on update is no longer current. Re-download
    /// and reconcile; never retry the same write blindly.
    #[error("conflict: file was modified remotely ({0})")]
    Conflict(String),

    #[error("{operation} failed with {status}: {body}")]
    Remote {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("path {path:?} is outside the vault root {root:?}")]
    PathOutsideSandbox { path: String, root: String },

    /// The normalised path is longer than the guard allows. Refused rather
    /// than cut, since a shortened path names a different entry.
    #[error("path {path:?} is longer than {max} characters")]
    PathTooLong { path: String, max: usize },

    #[error("no vault folder configured")]
    VaultNotConfigured,

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("settings parse error: {0}")]
    SettingsParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// HTTP status of a remote failure, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            Error::Conflict(_) => Some(409),
            _ => None,
        }
    }
}

/// Result alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;
