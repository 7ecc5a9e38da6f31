//! Parsing the OAuth redirect
//!
//! Dropbox sends the browser back to the redirect URI with either
//! `code` + `state`, or `error` + `error_description` (+ `state`).

use url::{Url, form_urlencoded};

use crate::error::{Error, Result};

/// Query parameters of an authorization redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse from the full redirect URL the browser landed on.
    pub fn from_redirect_url(redirect: &str) -> Result<Self> {
        let url = Url::parse(redirect.trim())
            .map_err(|e| Error::InvalidCallback(format!("{e}")))?;
        Ok(Self::from_query(url.query().unwrap_or("")))
    }

    /// Parse from a raw query string (without the leading `?`).
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }
}
