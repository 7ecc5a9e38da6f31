//! Durable vault settings
//!
//! Two plain strings survive restarts next to the credential file: the vault
//! root (the sandbox every vault operation is confined to) and the inbox,
//! a subfolder of the vault where new notes land. Both are cleared on logout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{Error, Result};
use crate::guard::resolve_root;

/// Persisted vault configuration. Absent fields mean "not chosen yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSettings {
    /// Absolute, normalised Dropbox path of the vault root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_path: Option<String>,
    /// Inbox folder relative to the vault root, without a leading `/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox_path: Option<String>,
}

/// JSON file store for `VaultSettings`.
pub struct SettingsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings; defaults when the file does not exist.
    pub async fn load(&self) -> Result<VaultSettings> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Set the vault root. The path is normalised before it is stored; one
    /// too long to address is refused and the stored root left as it was.
    pub async fn set_vault_path(&self, raw: &str) -> Result<VaultSettings> {
        let vault_path = resolve_root(raw)?;
        self.update(|settings| settings.vault_path = Some(vault_path))
            .await
    }

    /// Set the inbox subfolder, relative to the vault root. An empty value
    /// unsets it, so new notes go to the vault root.
    pub async fn set_inbox_path(&self, raw: &str) -> Result<VaultSettings> {
        let relative = resolve_root(raw)?.trim_start_matches('/').to_string();
        let inbox = (!relative.is_empty()).then_some(relative);
        self.update(|settings| settings.inbox_path = inbox).await
    }

    /// Forget both paths. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        common::remove_if_exists(&self.path)
            .await
            .map_err(|e| Error::Io(format!("removing settings file: {e}")))?;
        info!(path = %self.path.display(), "cleared vault settings");
        Ok(())
    }

    async fn read(&self) -> Result<VaultSettings> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| Error::SettingsParse(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VaultSettings::default()),
            Err(e) => Err(Error::Io(format!("reading settings file: {e}"))),
        }
    }

    async fn update(&self, apply: impl FnOnce(&mut VaultSettings)) -> Result<VaultSettings> {
        let _guard = self.lock.lock().await;
        let mut settings = self.read().await?;
        apply(&mut settings);

        let json = serde_json::to_string_pretty(&settings)
            .map_err(|e| Error::SettingsParse(format!("serializing settings: {e}")))?;
        common::write_atomic(&self.path, json.as_bytes())
            .await
            .map_err(|e| Error::Io(format!("writing settings file: {e}")))?;
        info!(
            vault_path = ?settings.vault_path,
            inbox_path = ?settings.inbox_path,
            "saved vault settings"
        );
        Ok(settings)
    }
}
