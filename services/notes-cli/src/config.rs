//! Configuration types and loading
//!
//! Precedence: env vars > config file > defaults. The config file itself is
//! found via `--config`, then `CONFIG_PATH`, then `dropbox-notes.toml` in the
//! working directory. Only an explicitly named file has to exist; without
//! one, the app key can come from `DROPBOX_APP_KEY` alone.

use std::path::{Path, PathBuf};

use dropbox_auth::OAuthConfig;
use dropbox_auth::constants::AUTHORIZE_ENDPOINT;
use dropbox_sync::client::{API_URL, CONTENT_URL};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "dropbox-notes.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dropbox: DropboxConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Dropbox app identity and endpoints
#[derive(Debug, Deserialize)]
pub struct DropboxConfig {
    /// Public client id of the Dropbox app (no secret in a PKCE flow)
    #[serde(default)]
    pub app_key: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_content_url")]
    pub content_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

/// Where local state lives
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            redirect_uri: default_redirect_uri(),
            authorize_url: default_authorize_url(),
            api_url: default_api_url(),
            content_url: default_content_url(),
            request_timeout_secs: default_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

fn default_redirect_uri() -> String {
    "http://localhost:5173/callback".into()
}

fn default_authorize_url() -> String {
    AUTHORIZE_ENDPOINT.into()
}

fn default_api_url() -> String {
    API_URL.into()
}

fn default_content_url() -> String {
    CONTENT_URL.into()
}

fn default_timeout() -> u64 {
    30
}

fn default_state_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local/state/dropbox-notes"),
        None => PathBuf::from(".dropbox-notes"),
    }
}

/// Expand a leading `~/` against `$HOME`.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

fn require_http(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}

impl Config {
    /// Load from `path`, overlay env vars, and validate.
    ///
    /// A missing file is an error only when `must_exist` is set.
    pub fn load(path: &Path, must_exist: bool) -> common::Result<Self> {
        let mut config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !must_exist => Config::default(),
            Err(e) => return Err(e.into()),
        };

        if let Ok(key) = std::env::var("DROPBOX_APP_KEY") {
            config.dropbox.app_key = key;
        }
        if let Ok(uri) = std::env::var("DROPBOX_REDIRECT_URI") {
            config.dropbox.redirect_uri = uri;
        }
        config.storage.state_dir = expand_home(&config.storage.state_dir);

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.dropbox.app_key.trim().is_empty() {
            return Err(common::Error::Config(
                "app_key is required (set [dropbox].app_key or DROPBOX_APP_KEY)".into(),
            ));
        }
        require_http("redirect_uri", &self.dropbox.redirect_uri)?;
        require_http("authorize_url", &self.dropbox.authorize_url)?;
        require_http("api_url", &self.dropbox.api_url)?;
        require_http("content_url", &self.dropbox.content_url)?;
        if self.dropbox.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the config file path. The flag is true when the path was
    /// named explicitly (CLI or env) and so must exist.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }

    pub fn oauth(&self) -> OAuthConfig {
        OAuthConfig::dropbox(&self.dropbox.app_key, &self.dropbox.redirect_uri)
            .with_api_base(&self.dropbox.api_url)
            .with_authorize_url(&self.dropbox.authorize_url)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.storage.state_dir.join("credentials.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.storage.state_dir.join("settings.json")
    }
}
