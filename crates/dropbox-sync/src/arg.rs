//! `Dropbox-API-Arg` header encoding
//!
//! Content endpoints take their JSON argument in a header instead of the
//! body. Header values must be ASCII, so every character outside the
//! printable ASCII range is written as a JSON `\uXXXX` escape, using a
//! UTF-16 surrogate pair above the BMP.

use serde::Serialize;

use crate::error::{Error, Result};

/// Serialize `arg` to JSON that is safe to place in an HTTP header.
pub fn encode_api_arg<T: Serialize + ?Sized>(arg: &T) -> Result<String> {
    let json = serde_json::to_string(arg)
        .map_err(|e| Error::InvalidResponse(format!("encoding API argument: {e}")))?;
    Ok(escape_non_ascii(&json))
}

/// Escape everything outside `0x20..=0x7E`.
///
/// Only valid on serialized JSON: serde_json already escapes control
/// characters, so any remaining non-ASCII character sits inside a string.
fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut units = [0u16; 2];
    for c in json.chars() {
        if (' '..='~').contains(&c) {
            out.push(c);
            continue;
        }
        for unit in c.encode_utf16(&mut units) {
            out.push_str(&format!("\\u{unit:04x}"));
        }
    }
    out
}
