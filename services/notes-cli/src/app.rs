//! Command execution
//!
//! Every command first restores the session from the stored refresh token,
//! then asks the session for an access token right before each remote call.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dropbox_auth::{
    CallbackParams, ExchangeOutcome, FileCredentialStore, MemoryFlowStore, SessionManager,
    SessionStatus,
};
use dropbox_sync::{DropboxClient, SettingsStore, Vault};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::info;

use crate::cli::{Command, FolderCommand};
use crate::config::Config;

pub struct App {
    session: SessionManager,
    client: DropboxClient,
    settings: SettingsStore,
}

async fn read_stdin() -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut buf)
        .await
        .context("reading stdin")?;
    Ok(buf)
}

async fn read_line() -> Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading redirect URL from stdin")?;
    Ok(line.trim().to_string())
}

impl App {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.dropbox.request_timeout_secs))
            .build()
            .context("building HTTP client")?;

        let session = SessionManager::new(
            http.clone(),
            config.oauth(),
            Arc::new(MemoryFlowStore::new()),
            Arc::new(FileCredentialStore::new(config.credentials_path())),
        );
        let client =
            DropboxClient::with_endpoints(http, &config.dropbox.api_url, &config.dropbox.content_url);
        let settings = SettingsStore::new(config.settings_path());

        Ok(Self {
            session,
            client,
            settings,
        })
    }

    async fn token(&self) -> Result<String> {
        let token = self
            .session
            .access_token()
            .await
            .context("not connected to Dropbox; run `dropbox-notes login`")?;
        Ok(token.expose().clone())
    }

    async fn vault(&self) -> Result<Vault> {
        let settings = self.settings.load().await?;
        Vault::from_settings(self.client.clone(), &settings)
            .context("run `dropbox-notes vault set <path>` first")
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        let status = self.session.startup().await;
        info!(?status, "session ready");

        match command {
            Command::Login => self.login(status).await?,
            Command::Logout => {
                self.session.logout().await?;
                self.settings.clear().await?;
                println!("Logged out.");
            }
            Command::Whoami => {
                let account = self.client.current_account(&self.token().await?).await?;
                println!("{} <{}>", account.name.display_name, account.email);
                println!("{}", account.account_id);
            }
            Command::Vault {
                command: FolderCommand::Set { path },
            } => {
                let settings = self.settings.set_vault_path(&path).await?;
                println!("Vault: {}", settings.vault_path.unwrap_or_default());
            }
            Command::Inbox {
                command: FolderCommand::Set { path },
            } => {
                let settings = self.settings.set_inbox_path(&path).await?;
                match settings.inbox_path {
                    Some(inbox) => println!("Inbox: {inbox}"),
                    None => println!("Inbox: vault root"),
                }
            }
            Command::Ls => {
                let vault = self.vault().await?;
                for entry in vault.list_all(&self.token().await?).await? {
                    let marker = if entry.is_folder() { "/" } else { "" };
                    println!("{}{marker}", entry.path_display);
                }
            }
            Command::Cat { path } => {
                let vault = self.vault().await?;
                let file = vault.read(&self.token().await?, &path).await?;
                eprintln!("rev: {}", file.rev);
                print!("{}", String::from_utf8_lossy(&file.content));
            }
            Command::Put { path, rev } => {
                let vault = self.vault().await?;
                let content = read_stdin().await?;
                match vault.save(&self.token().await?, &path, content, &rev).await {
                    Ok(meta) => println!("Saved {} at rev {}", meta.path_display, meta.rev),
                    Err(dropbox_sync::Error::Conflict(_)) => bail!(
                        "{path} changed remotely since rev {rev}; `cat` it again and reapply your edit"
                    ),
                    Err(e) => return Err(e.into()),
                }
            }
            Command::New { title } => {
                let title = title.join(" ");
                let vault = self.vault().await?;
                let body = String::from_utf8(read_stdin().await?).context("note body is not UTF-8")?;
                let meta = vault.create_note(&self.token().await?, &title, &body).await?;
                println!("Created {} at rev {}", meta.path_display, meta.rev);
            }
            Command::Attach { file, path } => {
                let vault = self.vault().await?;
                let bytes = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?;
                let meta = vault
                    .upload_attachment(&self.token().await?, &path, bytes)
                    .await?;
                println!("Uploaded {}", meta.path_display);
            }
            Command::Mv { from, to } => {
                let vault = self.vault().await?;
                let moved = vault.rename(&self.token().await?, &from, &to).await?;
                println!("Moved to {}", moved.path_display);
            }
            Command::Rm { path } => {
                let vault = self.vault().await?;
                let removed = vault.remove(&self.token().await?, &path).await?;
                println!("Deleted {}", removed.path_display);
            }
            Command::Link { path } => {
                let vault = self.vault().await?;
                println!("{}", vault.temporary_link(&self.token().await?, &path).await?);
            }
        }
        Ok(())
    }

    /// Interactive PKCE login: print the authorization URL, then read back
    /// the URL the browser was redirected to.
    async fn login(&self, status: SessionStatus) -> Result<()> {
        if let SessionStatus::Authenticated { account_id } = status {
            println!(
                "Already connected ({}). Run `dropbox-notes logout` first to switch accounts.",
                account_id.as_deref().unwrap_or("unknown account")
            );
            return Ok(());
        }

        let url = self.session.build_authorization_request().await?;
        println!("Open this URL in a browser and approve access:\n\n  {url}\n");
        println!("Then paste the full URL you were redirected to:");

        let redirect = read_line().await?;
        let params = CallbackParams::from_redirect_url(&redirect)?;
        match self.session.complete_callback(&params).await? {
            ExchangeOutcome::Completed(bundle) => {
                println!(
                    "Connected{}.",
                    bundle
                        .account_id
                        .map(|id| format!(" as {id}"))
                        .unwrap_or_default()
                );
            }
            ExchangeOutcome::InProgress => println!("Authorization already in progress."),
        }
        Ok(())
    }
}
