//! Dropbox OAuth session for a single-user client
//!
//! Authorization Code with PKCE (S256), CSRF `state` binding, refresh-token
//! persistence, and token lifecycle (startup refresh, inline refresh,
//! revocation on logout). `SessionManager` is the entry point.

pub mod callback;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod pkce;
pub mod session;
pub mod state;
pub mod token;

#[cfg(test)]
mod test_support;

pub use callback::CallbackParams;
pub use constants::OAuthConfig;
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{Error, Result};
pub use flow::{FlowState, FlowStore, MemoryFlowStore};
pub use session::{ExchangeOutcome, SessionManager, SessionStatus};
pub use token::CredentialBundle;
