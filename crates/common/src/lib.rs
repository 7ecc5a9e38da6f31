//! Shared building blocks for the Dropbox notes workspace
//!
//! Holds the pieces every crate needs but none owns: the redacting
//! `Secret` wrapper for tokens, owner-only atomic file writes for
//! anything persisted under the state directory, and the config/I-O
//! error type used by the binary.

mod error;
mod fs;
mod secret;

pub use error::{Error, Result};
pub use fs::{remove_if_exists, write_atomic};
pub use secret::Secret;
