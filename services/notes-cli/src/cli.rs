//! Command-line surface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Read and write a Dropbox-hosted notes vault.
#[derive(Debug, Parser)]
#[command(name = "dropbox-notes")]
#[command(version, arg_required_else_help = true)]
pub struct Cli {
    /// Config file (default: config.toml, or $CONFIG_PATH)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Connect a Dropbox account
    Login,

    /// Revoke and forget the stored credential
    Logout,

    /// Show the connected account
    Whoami,

    /// Choose the vault folder
    Vault {
        #[command(subcommand)]
        command: FolderCommand,
    },

    /// Choose the inbox folder, relative to the vault
    Inbox {
        #[command(subcommand)]
        command: FolderCommand,
    },

    /// List everything in the vault
    Ls,

    /// Print a note (revision goes to stderr)
    Cat { path: String },

    /// Replace a note with stdin, if it is still at the given revision
    Put {
        path: String,
        /// Revision printed by `cat`
        #[arg(long)]
        rev: String,
    },

    /// Create a note in the inbox from stdin
    New {
        /// Note title; words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },

    /// Upload a local file into the vault
    Attach { file: PathBuf, path: String },

    /// Move within the vault
    Mv { from: String, to: String },

    /// Delete from the vault
    Rm { path: String },

    /// Print a temporary download link
    Link { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum FolderCommand {
    /// Set the folder path
    Set { path: String },
}
