//! RFC 7636 PKCE values and the Dropbox authorization URL
//!
//! Produces the code verifier and its S256 challenge, plus the independent
//! `state` value that binds the callback to the session that started it.
//! The verifier stays in the flow store until the token exchange; only the
//! challenge travels in the authorization URL.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use url::form_urlencoded;

use crate::constants::{OAuthConfig, TOKEN_ACCESS_TYPE};

/// Length of the CSRF `state` value in characters.
pub const STATE_LEN: usize = 32;

/// Generate a cryptographically random PKCE code verifier.
///
/// 64 random bytes encoded as URL-safe base64 without padding give 86
/// characters, inside the 43-128 range RFC 7636 allows.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate the opaque CSRF `state` parameter.
///
/// 24 random bytes encode to exactly `STATE_LEN` URL-safe characters.
/// Drawn separately from the verifier so neither can be derived from the other.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_LEN / 4 * 3];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the full authorization URL with all required OAuth parameters.
///
/// Requests `token_access_type=offline` so the exchange returns a refresh
/// token that can be persisted.
pub fn build_authorization_url(config: &OAuthConfig, state: &str, challenge: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", &config.app_key)
        .append_pair("response_type", "code")
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("token_access_type", TOKEN_ACCESS_TYPE)
        .append_pair("state", state)
        .finish();
    format!("{}?{query}", config.authorize_url)
}
