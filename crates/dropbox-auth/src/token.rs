//! OAuth token exchange, refresh, and revocation
//!
//! Three endpoint interactions:
//! 1. Authorization code exchange (completes the PKCE flow)
//! 2. Refresh (startup and inline, before the access token expires)
//! 3. Revocation (logout, best effort)
//!
//! Exchange and refresh POST form bodies to the token endpoint with
//! different grant types. Any non-2xx body is carried verbatim in the error.

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::OAuthConfig;
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// Dropbox omits `refresh_token` and `account_id` on refresh responses,
/// so both are optional here and filled in by `into_bundle`.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Tokens produced by one exchange or refresh.
///
/// Only trustworthy at the moment it is returned. Callers keep the access
/// token in memory and hand the refresh token to the credential store.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    pub expires_in: u64,
    pub account_id: Option<String>,
}

impl TokenResponse {
    /// Convert into a bundle, reusing `presented_refresh` when the endpoint
    /// did not rotate the refresh token.
    pub fn into_bundle(self, presented_refresh: Option<&str>) -> Option<CredentialBundle> {
        let refresh = self
            .refresh_token
            .or_else(|| presented_refresh.map(str::to_owned))?;
        Some(CredentialBundle {
            access_token: Secret::new(self.access_token),
            refresh_token: Secret::new(refresh),
            expires_in: self.expires_in,
            account_id: self.account_id,
        })
    }
}

/// Exchange an authorization code for tokens (initial OAuth flow).
///
/// Sends the code together with the PKCE verifier that proves this client
/// started the flow. The endpoint must return a refresh token since the
/// authorization URL asked for offline access.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
    verifier: &str,
) -> Result<CredentialBundle> {
    let response = client
        .post(&config.token_url)
        .form(&[
            ("code", code),
            ("grant_type", "authorization_code"),
            ("code_verifier", verifier),
            ("client_id", config.app_key.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::ExchangeFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::ExchangeFailed(format!("invalid token response: {e}")))?;
    debug!(account_id = ?token.account_id, expires_in = token.expires_in, "authorization code exchanged");

    token
        .into_bundle(None)
        .ok_or_else(|| Error::ExchangeFailed("token response carried no refresh_token".into()))
}

/// Refresh an access token using a refresh token.
///
/// Any rejection (expired, revoked, malformed) is `RefreshFailed`; the
/// caller decides whether that invalidates the stored credential.
pub async fn refresh_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    refresh: &str,
) -> Result<CredentialBundle> {
    let response = client
        .post(&config.token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", config.app_key.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::RefreshFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::RefreshFailed(format!("invalid refresh response: {e}")))?;
    debug!(expires_in = token.expires_in, "access token refreshed");

    token
        .into_bundle(Some(refresh))
        .ok_or_else(|| Error::RefreshFailed("refresh response carried no token".into()))
}

/// Ask Dropbox to revoke an access token.
///
/// The status code is not meaningful to callers (logout proceeds either
/// way), so only transport failures surface as errors.
pub async fn revoke_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    access: &str,
) -> Result<()> {
    let response = client
        .post(&config.revoke_url)
        .bearer_auth(access)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token revoke request failed: {e}")))?;
    debug!(status = %response.status(), "revoke endpoint responded");
    Ok(())
}
