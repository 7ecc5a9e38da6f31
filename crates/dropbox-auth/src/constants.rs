//! Dropbox OAuth endpoints and client configuration
//!
//! The app key is a public client identifier (PKCE flows carry no client
//! secret). Tokens themselves live in the credential store and in memory.

/// Authorization page the user is sent to
pub const AUTHORIZE_ENDPOINT: &str = "https://www.dropbox.com/oauth2/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://api.dropboxapi.com/oauth2/token";

/// Revokes the bearer token presented in the Authorization header
pub const REVOKE_ENDPOINT: &str = "https://api.dropboxapi.com/2/auth/token/revoke";

/// Requests a long-lived refresh token alongside the access token.
pub const TOKEN_ACCESS_TYPE: &str = "offline";

/// Client identity and endpoints for one Dropbox app.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub app_key: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: String,
}

impl OAuthConfig {
    /// Configuration against the production Dropbox endpoints.
    pub fn dropbox(app_key: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            redirect_uri: redirect_uri.into(),
            authorize_url: AUTHORIZE_ENDPOINT.to_string(),
            token_url: TOKEN_ENDPOINT.to_string(),
            revoke_url: REVOKE_ENDPOINT.to_string(),
        }
    }

    /// Point the token and revoke endpoints at another API host, keeping the
    /// Dropbox paths. Used for local fakes and egress proxies.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        let base = api_base.trim_end_matches('/');
        self.token_url = format!("{base}/oauth2/token");
        self.revoke_url = format!("{base}/2/auth/token/revoke");
        self
    }

    pub fn with_authorize_url(mut self, authorize_url: impl Into<String>) -> Self {
        self.authorize_url = authorize_url.into();
        self
    }
}
