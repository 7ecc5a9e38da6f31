//! Dropbox API v2 file client
//!
//! Stateless: every call takes the access token it should present, so the
//! caller decides when a token is fresh enough to use. RPC endpoints take a
//! JSON body; content endpoints (download/upload) carry their argument in
//! the `Dropbox-API-Arg` header and raw bytes in the body.
//!
//! Transport errors are terminal for the call. Retries, if any, belong to
//! the caller.

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::arg::encode_api_arg;
use crate::error::{Error, Result};
use crate::types::{Account, FileMetadata, ListFolderPage, RemoteEntry, RevisionedFile};

/// Production RPC host
pub const API_URL: &str = "https://api.dropboxapi.com";

/// Production content host (uploads and downloads)
pub const CONTENT_URL: &str = "https://content.dropboxapi.com";

const API_ARG_HEADER: &str = "Dropbox-API-Arg";
const API_RESULT_HEADER: &str = "Dropbox-API-Result";

/// Envelope of `move_v2` / `delete_v2` responses.
#[derive(Deserialize)]
struct MetadataEnvelope {
    metadata: RemoteEntry,
}

#[derive(Deserialize)]
struct TemporaryLink {
    link: String,
}

/// Upload write modes.
enum WriteMode<'a> {
    /// Create; fail if something already exists at the path
    Add,
    /// Overwrite only if the current revision is `rev`
    Update(&'a str),
}

impl WriteMode<'_> {
    fn to_json(&self) -> Value {
        match self {
            WriteMode::Add => json!("add"),
            WriteMode::Update(rev) => json!({ ".tag": "update", "update": rev }),
        }
    }
}

/// The remote API treats a bare `/` as an error; the root is `""`.
fn listing_path(path: &str) -> &str {
    if path == "/" { "" } else { path }
}

/// Pass 2xx responses through; turn anything else into `Error::Remote`
/// carrying the server's body.
async fn ensure_success(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    warn!(operation, status = status.as_u16(), "Dropbox API call failed");
    Err(Error::Remote {
        operation,
        status: status.as_u16(),
        body,
    })
}

async fn parse_json<T: DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("{operation}: {e}")))
}

/// Client for the Dropbox file and user endpoints.
#[derive(Debug, Clone)]
pub struct DropboxClient {
    http: reqwest::Client,
    api_url: String,
    content_url: String,
}

impl DropboxClient {
    /// Client against the production hosts.
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_endpoints(http, API_URL, CONTENT_URL)
    }

    /// Client against other hosts (fakes, egress proxies).
    pub fn with_endpoints(
        http: reqwest::Client,
        api_url: impl Into<String>,
        content_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            content_url: content_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn rpc(&self, token: &str, operation: &'static str, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/2/{operation}", self.api_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{operation}: {e}")))?;
        ensure_success(operation, response).await
    }

    /// Send a content-endpoint request; status is left for the caller to check.
    async fn content(
        &self,
        token: &str,
        operation: &'static str,
        arg: &Value,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .post(format!("{}/2/{operation}", self.content_url))
            .bearer_auth(token)
            .header(API_ARG_HEADER, encode_api_arg(arg)?);
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body);
        }
        request
            .send()
            .await
            .map_err(|e| Error::Http(format!("{operation}: {e}")))
    }

    async fn upload_with_mode(
        &self,
        token: &str,
        path: &str,
        content: Vec<u8>,
        mode: WriteMode<'_>,
    ) -> Result<FileMetadata> {
        let operation = "files/upload";
        let arg = json!({ "path": path, "mode": mode.to_json() });
        let bytes = content.len();
        let response = self.content(token, operation, &arg, Some(content)).await?;

        if let WriteMode::Update(rev) = mode {
            if response.status() == StatusCode::CONFLICT {
                let body = response.text().await.unwrap_or_default();
                warn!(path, rev, "update rejected, remote revision has moved on");
                return Err(Error::Conflict(body));
            }
        }

        let response = ensure_success(operation, response).await?;
        let metadata: FileMetadata = parse_json(operation, response).await?;
        debug!(path = %metadata.path_display, rev = %metadata.rev, bytes, "uploaded");
        Ok(metadata)
    }

    /// The account the token belongs to.
    pub async fn current_account(&self, token: &str) -> Result<Account> {
        let operation = "users/get_current_account";
        let response = self
            .http
            .post(format!("{}/2/{operation}", self.api_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{operation}: {e}")))?;
        let response = ensure_success(operation, response).await?;
        parse_json(operation, response).await
    }

    /// One page of entries under `path` (`""` or `/` for the root).
    pub async fn list_folder(
        &self,
        token: &str,
        path: &str,
        recursive: bool,
    ) -> Result<ListFolderPage> {
        let operation = "files/list_folder";
        let body = json!({
            "path": listing_path(path),
            "recursive": recursive,
            "include_media_info": false,
        });
        let response = self.rpc(token, operation, &body).await?;
        parse_json(operation, response).await
    }

    /// The page after `cursor`. The cursor is passed through unmodified.
    pub async fn list_folder_continue(&self, token: &str, cursor: &str) -> Result<ListFolderPage> {
        let operation = "files/list_folder/continue";
        let response = self.rpc(token, operation, &json!({ "cursor": cursor })).await?;
        parse_json(operation, response).await
    }

    /// Every entry under `path`, recursively, in the order the server
    /// returned them. Pages are fetched one after another.
    pub async fn list_all_entries(&self, token: &str, path: &str) -> Result<Vec<RemoteEntry>> {
        let mut page = self.list_folder(token, path, true).await?;
        let mut entries = std::mem::take(&mut page.entries);
        let mut pages = 1usize;

        while page.has_more {
            page = self.list_folder_continue(token, &page.cursor).await?;
            entries.append(&mut page.entries);
            pages += 1;
        }

        debug!(path, pages, entries = entries.len(), "listing complete");
        Ok(entries)
    }

    /// File content only.
    pub async fn download(&self, token: &str, path: &str) -> Result<Vec<u8>> {
        let operation = "files/download";
        let response = self
            .content(token, operation, &json!({ "path": path }), None)
            .await?;
        let response = ensure_success(operation, response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("{operation}: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// File content plus the revision it was read at, in one round trip.
    ///
    /// Metadata comes from the `Dropbox-API-Result` response header.
    pub async fn download_with_metadata(&self, token: &str, path: &str) -> Result<RevisionedFile> {
        let operation = "files/download";
        let response = self
            .content(token, operation, &json!({ "path": path }), None)
            .await?;
        let response = ensure_success(operation, response).await?;

        let header = response
            .headers()
            .get(API_RESULT_HEADER)
            .ok_or_else(|| Error::InvalidResponse(format!("{operation}: missing {API_RESULT_HEADER} header")))?;
        let header = header
            .to_str()
            .map_err(|e| Error::InvalidResponse(format!("{operation}: {API_RESULT_HEADER}: {e}")))?;
        let metadata: FileMetadata = serde_json::from_str(header)
            .map_err(|e| Error::InvalidResponse(format!("{operation}: {API_RESULT_HEADER}: {e}")))?;

        let content = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("{operation}: {e}")))?
            .to_vec();
        debug!(path = %metadata.path_display, rev = %metadata.rev, bytes = content.len(), "downloaded");

        Ok(RevisionedFile {
            content,
            rev: metadata.rev,
            name: metadata.name,
            path_display: metadata.path_display,
        })
    }

    /// Create a new text file. Fails if the path is taken.
    pub async fn upload(&self, token: &str, path: &str, content: &str) -> Result<FileMetadata> {
        self.upload_with_mode(token, path, content.as_bytes().to_vec(), WriteMode::Add)
            .await
    }

    /// Create a new binary file (attachments). Fails if the path is taken.
    pub async fn upload_binary(&self, token: &str, path: &str, bytes: Vec<u8>) -> Result<FileMetadata> {
        self.upload_with_mode(token, path, bytes, WriteMode::Add).await
    }

    /// Overwrite `path` only if its current revision is `expected_rev`.
    ///
    /// A stale revision yields `Error::Conflict`; the remote file is left
    /// untouched.
    pub async fn update(
        &self,
        token: &str,
        path: &str,
        content: Vec<u8>,
        expected_rev: &str,
    ) -> Result<FileMetadata> {
        self.upload_with_mode(token, path, content, WriteMode::Update(expected_rev))
            .await
    }

    /// Move or rename a file or folder.
    pub async fn move_entry(&self, token: &str, from: &str, to: &str) -> Result<RemoteEntry> {
        let operation = "files/move_v2";
        let body = json!({ "from_path": from, "to_path": to });
        let response = self.rpc(token, operation, &body).await?;
        let envelope: MetadataEnvelope = parse_json(operation, response).await?;
        debug!(from, to, "moved");
        Ok(envelope.metadata)
    }

    /// Delete a file or folder (folders recursively).
    pub async fn delete(&self, token: &str, path: &str) -> Result<RemoteEntry> {
        let operation = "files/delete_v2";
        let response = self.rpc(token, operation, &json!({ "path": path })).await?;
        let envelope: MetadataEnvelope = parse_json(operation, response).await?;
        debug!(path, "deleted");
        Ok(envelope.metadata)
    }

    /// Short-lived direct download URL for a file.
    pub async fn get_temporary_link(&self, token: &str, path: &str) -> Result<String> {
        let operation = "files/get_temporary_link";
        let response = self.rpc(token, operation, &json!({ "path": path })).await?;
        let link: TemporaryLink = parse_json(operation, response).await?;
        Ok(link.link)
    }
}
