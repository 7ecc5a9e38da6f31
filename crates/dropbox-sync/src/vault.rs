//! Vault: a `DropboxClient` confined to one folder
//!
//! Every path is resolved against the vault root, normalised, and checked
//! for containment and length before a request is built. A rejected path
//! fails the call with `PathOutsideSandbox` or `PathTooLong`; nothing is sent.

use tracing::{debug, warn};

use crate::client::DropboxClient;
use crate::error::{Error, Result};
use crate::guard::{normalize_path, note_filename, resolve_root, resolve_within};
use crate::settings::VaultSettings;
use crate::types::{FileMetadata, RemoteEntry, RevisionedFile};

#[derive(Debug, Clone)]
pub struct Vault {
    client: DropboxClient,
    root: String,
    inbox: Option<String>,
}

impl Vault {
    /// Bind `client` to `root`. A root too long to address is refused, never
    /// cut down to an ancestor.
    pub fn new(client: DropboxClient, root: &str) -> Result<Self> {
        Ok(Self {
            client,
            root: resolve_root(root)?,
            inbox: None,
        })
    }

    /// Place new notes in `inbox`, relative to the root.
    pub fn with_inbox(mut self, inbox: Option<&str>) -> Self {
        self.inbox = inbox
            .map(|raw| normalize_path(raw).trim_start_matches('/').to_string())
            .filter(|relative| !relative.is_empty());
        self
    }

    /// Build from persisted settings. Fails if no vault root was chosen.
    pub fn from_settings(client: DropboxClient, settings: &VaultSettings) -> Result<Self> {
        let root = settings
            .vault_path
            .as_deref()
            .ok_or(Error::VaultNotConfigured)?;
        Ok(Self::new(client, root)?.with_inbox(settings.inbox_path.as_deref()))
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Folder new notes are created in.
    pub fn inbox_dir(&self) -> String {
        match &self.inbox {
            Some(inbox) => normalize_path(&format!("{}/{inbox}", self.root)),
            None => self.root.clone(),
        }
    }

    /// Absolute, normalised path for `path` inside the vault.
    ///
    /// Paths starting with `/` are taken as absolute Dropbox paths (as
    /// listings return them); anything else is relative to the root.
    pub fn resolve(&self, path: &str) -> Result<String> {
        let candidate = if path.trim_start().starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{path}", self.root)
        };
        resolve_within(&self.root, &candidate).inspect_err(|_| {
            warn!(path, root = %self.root, "path rejected by vault guard");
        })
    }

    /// Everything in the vault, recursively, in server order.
    pub async fn list_all(&self, token: &str) -> Result<Vec<RemoteEntry>> {
        self.client.list_all_entries(token, &self.root).await
    }

    pub async fn read(&self, token: &str, path: &str) -> Result<RevisionedFile> {
        let path = self.resolve(path)?;
        self.client.download_with_metadata(token, &path).await
    }

    /// Write over `path` if it is still at `rev`; `Error::Conflict` otherwise.
    pub async fn save(
        &self,
        token: &str,
        path: &str,
        content: Vec<u8>,
        rev: &str,
    ) -> Result<FileMetadata> {
        let path = self.resolve(path)?;
        self.client.update(token, &path, content, rev).await
    }

    /// Create a note in the inbox, named from its title or first line.
    pub async fn create_note(&self, token: &str, title: &str, body: &str) -> Result<FileMetadata> {
        let filename = note_filename(title, body);
        let path = self.resolve(&format!("{}/{filename}", self.inbox_dir()))?;
        debug!(path = %path, "creating note");
        self.client.upload(token, &path, body).await
    }

    pub async fn upload_attachment(
        &self,
        token: &str,
        path: &str,
        bytes: Vec<u8>,
    ) -> Result<FileMetadata> {
        let path = self.resolve(path)?;
        self.client.upload_binary(token, &path, bytes).await
    }

    /// Move within the vault. Both ends must be inside it.
    pub async fn rename(&self, token: &str, from: &str, to: &str) -> Result<RemoteEntry> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        self.client.move_entry(token, &from, &to).await
    }

    pub async fn remove(&self, token: &str, path: &str) -> Result<RemoteEntry> {
        let path = self.resolve(path)?;
        self.client.delete(token, &path).await
    }

    pub async fn temporary_link(&self, token: &str, path: &str) -> Result<String> {
        let path = self.resolve(path)?;
        self.client.get_temporary_link(token, &path).await
    }
}
