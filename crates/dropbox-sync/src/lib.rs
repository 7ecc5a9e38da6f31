//! Dropbox file synchronisation core
//!
//! `DropboxClient` speaks the API v2 file endpoints with optimistic
//! concurrency on revisions. `Vault` confines it to one folder using the
//! path guard, and `SettingsStore` persists which folder that is.

pub mod arg;
pub mod client;
pub mod error;
pub mod guard;
pub mod settings;
pub mod types;
pub mod vault;

#[cfg(test)]
mod test_support;

pub use client::DropboxClient;
pub use error::{Error, Result};
pub use guard::{
    is_contained, normalize_path, note_filename, resolve_root, resolve_within, sanitize_filename,
    sanitize_path,
};
pub use settings::{SettingsStore, VaultSettings};
pub use types::{Account, EntryTag, FileMetadata, ListFolderPage, RemoteEntry, RevisionedFile};
pub use vault::Vault;
