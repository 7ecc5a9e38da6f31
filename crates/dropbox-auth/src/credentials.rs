//! Durable storage for the refresh token
//!
//! The session keeps exactly one long-lived secret: the Dropbox refresh
//! token. Access tokens never reach disk. `FileCredentialStore` persists the
//! token as a small JSON document with atomic temp-file + rename writes and
//! 0600 permissions; a tokio Mutex serializes concurrent writers (startup
//! refresh racing a logout, for instance).

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by the storage traits, keeping them dyn-compatible
/// (`Arc<dyn CredentialStore>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable, single-slot persistence for the refresh token.
///
/// `clear` must succeed when nothing is stored.
pub trait CredentialStore: Send + Sync {
    fn store<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<()>>;

    fn load(&self) -> BoxFuture<'_, Result<Option<Secret<String>>>>;

    fn clear(&self) -> BoxFuture<'_, Result<()>>;
}

/// On-disk shape of the credential file.
#[derive(Serialize, Deserialize)]
struct StoredCredential {
    refresh_token: String,
}

/// Credential store backed by a JSON file under the state directory.
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Use `path` as the credential file. Nothing is read or created until
    /// the first operation.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read(&self) -> Result<Option<Secret<String>>> {
        let _guard = self.lock.lock().await;
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored credential");
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
        };
        let stored: StoredCredential = serde_json::from_str(&contents)
            .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
        Ok(Some(Secret::new(stored.refresh_token)))
    }

    async fn write(&self, refresh_token: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let json = serde_json::to_string_pretty(&StoredCredential {
            refresh_token: refresh_token.to_owned(),
        })
        .map_err(|e| Error::CredentialParse(format!("serializing credential: {e}")))?;
        common::write_atomic(&self.path, json.as_bytes())
            .await
            .map_err(|e| Error::Io(format!("writing credential file: {e}")))?;
        info!(path = %self.path.display(), "stored refresh token");
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        common::remove_if_exists(&self.path)
            .await
            .map_err(|e| Error::Io(format!("removing credential file: {e}")))?;
        info!(path = %self.path.display(), "cleared stored credential");
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn store<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.write(refresh_token))
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<Secret<String>>>> {
        Box::pin(self.read())
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.remove())
    }
}

/// Process-local credential store for embedding and tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(refresh_token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(refresh_token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn store<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            *self.slot.lock().await = Some(refresh_token.to_owned());
            Ok(())
        })
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<Secret<String>>>> {
        Box::pin(async move { Ok(self.slot.lock().await.clone().map(Secret::new)) })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.slot.lock().await = None;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn roundtrip_store_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileCredentialStore::new(path.clone());
        store.store("rt_1").await.unwrap();

        // A fresh instance sees the persisted token
        let reopened = FileCredentialStore::new(path);
        let token = reopened.load().await.unwrap().unwrap();
        assert_eq!(token.expose(), "rt_1");
    }

    #[tokio::test]
    async fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_overwrites_single_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        store.store("rt_old").await.unwrap();
        store.store("rt_new").await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().expose(), "rt_new");
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::new(path.clone());

        store.clear().await.unwrap();
        store.store("rt_1").await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert!(!path.exists());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = FileCredentialStore::new(path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::CredentialParse(_)), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn credential_file_is_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        FileCredentialStore::new(path.clone()).store("rt").await.unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_leave_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = Arc::new(FileCredentialStore::new(path.clone()));

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.store(&format!("rt_{i}")).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let token = store.load().await.unwrap().unwrap();
        assert!(token.expose().starts_with("rt_"));
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert!(parsed["refresh_token"].is_string());
    }

    #[tokio::test]
    async fn memory_store_behaves_like_single_slot() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::with_token("rt_a"));
        assert_eq!(store.load().await.unwrap().unwrap().expose(), "rt_a");
        store.store("rt_b").await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().expose(), "rt_b");
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
