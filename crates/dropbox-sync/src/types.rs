//! Remote data model for the Dropbox file API

use serde::{Deserialize, Serialize};

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryTag {
    File,
    Folder,
}

/// One entry from a listing, move, or delete. A snapshot: a changed remote
/// state needs a fresh listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    #[serde(rename = ".tag")]
    pub tag: EntryTag,
    pub name: String,
    pub path_lower: String,
    pub path_display: String,
    pub id: String,
    /// Files only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl RemoteEntry {
    pub fn is_file(&self) -> bool {
        self.tag == EntryTag::File
    }

    pub fn is_folder(&self) -> bool {
        self.tag == EntryTag::Folder
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListFolderPage {
    pub entries: Vec<RemoteEntry>,
    /// Opaque; pass back unmodified to `list_folder_continue`
    pub cursor: String,
    pub has_more: bool,
}

/// File metadata as returned by uploads and the `Dropbox-API-Result` header.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileMetadata {
    pub name: String,
    #[serde(default)]
    pub path_lower: Option<String>,
    pub path_display: String,
    #[serde(default)]
    pub id: Option<String>,
    pub rev: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub server_modified: Option<String>,
}

/// File content together with the revision it was read at.
///
/// Pass `rev` back to `update` to write over exactly this version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionedFile {
    pub content: Vec<u8>,
    pub rev: String,
    pub name: String,
    pub path_display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccountName {
    pub display_name: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
}

/// The connected Dropbox account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Account {
    pub account_id: String,
    pub email: String,
    pub name: AccountName,
}
