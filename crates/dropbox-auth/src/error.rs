//! Error types for the OAuth session

/// Errors from the authorization flow, token endpoint, and credential storage.
///
/// `InvalidState`: the callback does not match the pending flow, or none is
/// pending. `MissingVerifier`: the flow store was empty when the code arrived.
/// Both end the current attempt; the user restarts authorization.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("OAuth state mismatch or no authorization in progress")]
    InvalidState,

    #[error("no PKCE code verifier stored for this authorization")]
    MissingVerifier,

    #[error("authorization callback carried no code")]
    MissingCode,

    #[error("authorization denied: {error}{}", .description.as_deref().map(|d| format!(" - {d}")).unwrap_or_default())]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("invalid callback URL: {0}")]
    InvalidCallback(String),

    #[error("a code exchange is in progress")]
    ExchangeInProgress,

    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
