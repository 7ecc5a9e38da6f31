//! Path guard: normalisation and vault containment
//!
//! Every path that reaches the file API from the vault goes through
//! `resolve_within` (or `resolve_root` for the root itself), and
//! containment is only ever checked on the normalised form. Traversal
//! segments are resolved (`..` pops the previous segment) rather than left
//! for the server to interpret.
//!
//! Paths used for I/O are never shortened: a path over `MAX_PATH_LEN` is
//! refused with `PathTooLong`. `sanitize_path` cuts to the limit and is
//! for display and naming only.

use crate::error::{Error, Result};

/// Longest path the guard accepts, in characters.
pub const MAX_PATH_LEN: usize = 200;

/// Longest filename `sanitize_filename` will produce, in characters.
pub const MAX_FILENAME_LEN: usize = 200;

/// Longest note stem `note_filename` will produce, before the extension.
pub const MAX_NOTE_STEM_LEN: usize = 100;

/// Characters Dropbox (or the desktop clients syncing it) refuse in names.
const ILLEGAL: &[char] = &[':', '*', '?', '"', '<', '>', '|'];

fn replace_illegal(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if ILLEGAL.contains(&c) { '-' } else { c })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Normalise a raw path into absolute, separator-clean form, without
/// limiting its length.
///
/// Both `/` and `\` separate segments. Segments are trimmed, illegal
/// characters become `-`, empty and `.` segments are dropped, and `..`
/// removes the previous segment (never climbing above the root). The
/// result starts with `/` and never ends with one, except the root itself.
pub fn normalize_path(raw: &str) -> String {
    let mut segments: Vec<String> = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment.trim() {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(replace_illegal(other)),
        }
    }
    format!("/{}", segments.join("/"))
}

/// `normalize_path`, then cut to at most `MAX_PATH_LEN` characters.
///
/// Lossy: a cut path may name a different entry, so this is never used to
/// address the file API.
pub fn sanitize_path(raw: &str) -> String {
    let normalized = normalize_path(raw);
    let mut truncated = truncate_chars(&normalized, MAX_PATH_LEN).trim_end_matches('/');
    // A cut can leave a dangling dot segment
    if let Some((parent, last)) = truncated.rsplit_once('/') {
        if last.trim() == "." || last.trim() == ".." {
            truncated = parent;
        }
    }

    if truncated.is_empty() {
        "/".to_string()
    } else {
        truncated.trim_end().to_string()
    }
}

fn within_limit(raw: &str, normalized: String) -> Result<String> {
    if normalized.chars().count() > MAX_PATH_LEN {
        return Err(Error::PathTooLong {
            path: raw.to_string(),
            max: MAX_PATH_LEN,
        });
    }
    Ok(normalized)
}

/// Case-insensitive containment of `candidate` in `root`, on normalised forms.
///
/// Matches on whole segments: `/Notes-old` is not inside `/Notes`. An empty
/// or `/` root contains everything.
pub fn is_contained(candidate: &str, root: &str) -> bool {
    let candidate = normalize_path(candidate).to_lowercase();
    let root = normalize_path(root).to_lowercase();
    if root == "/" {
        return true;
    }
    candidate == root
        || candidate
            .strip_prefix(&root)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Normalise a vault root, refusing one longer than `MAX_PATH_LEN`.
pub fn resolve_root(raw: &str) -> Result<String> {
    within_limit(raw, normalize_path(raw))
}

/// Normalise `candidate` and confirm it lies inside `root`.
///
/// Returns the normalised path; the raw form is never handed back. Fails
/// with `PathTooLong` instead of shortening the path.
pub fn resolve_within(root: &str, candidate: &str) -> Result<String> {
    let normalized = within_limit(candidate, normalize_path(candidate))?;
    if is_contained(&normalized, root) {
        Ok(normalized)
    } else {
        Err(Error::PathOutsideSandbox {
            path: candidate.to_string(),
            root: root.to_string(),
        })
    }
}

/// Make a single filename safe: no separators, no `..`, no illegal characters.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .replace("..", "")
        .chars()
        .map(|c| if c == '/' || c == '\\' || ILLEGAL.contains(&c) { '-' } else { c })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    for c in replaced.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.trim_matches(|c: char| c == '-' || c.is_whitespace());
    truncate_chars(trimmed, MAX_FILENAME_LEN).trim_end().to_string()
}

/// Filename for a new note: the title, else the first line of the body,
/// else `Untitled`, with a `.md` extension.
pub fn note_filename(title: &str, body: &str) -> String {
    let source = [title.trim(), body.lines().next().unwrap_or("").trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("");

    let stem = sanitize_filename(source);
    let stem = truncate_chars(&stem, MAX_NOTE_STEM_LEN).trim_end();
    if stem.is_empty() {
        "Untitled.md".to_string()
    } else {
        format!("{stem}.md")
    }
}
