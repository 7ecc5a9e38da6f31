//! Session state machine
//!
//! Pure state machine: receives events, returns the new state. The
//! `SessionManager` performs the I/O and feeds the outcome back in as an
//! event, so every reachable transition is visible in one match.
//!
//! Interactive path:
//! `Idle → AuthorizationRequested → AwaitingCallback → Exchanging → Authenticated`
//! with `Failed` on a rejected callback or exchange.
//!
//! Startup path (runs once):
//! `Idle → RefreshingFromStorage → Authenticated | Unauthenticated`

use std::time::Duration;

use common::Secret;
use tokio::time::Instant;

use crate::token::CredentialBundle;

/// Live, in-memory session. The access token never leaves this struct
/// except as a clone handed to a caller for one request.
#[derive(Debug, Clone)]
pub struct Session {
    pub account_id: Option<String>,
    pub access_token: Secret<String>,
    pub expires_at: Instant,
}

impl Session {
    /// Build from a freshly issued bundle. `account_id` falls back to the
    /// previous session's id because refresh responses omit it.
    pub fn from_bundle(bundle: &CredentialBundle, previous_account: Option<String>) -> Self {
        Self {
            account_id: bundle.account_id.clone().or(previous_account),
            access_token: bundle.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(bundle.expires_in),
        }
    }

    pub fn expires_within(&self, margin: Duration) -> bool {
        Instant::now() + margin >= self.expires_at
    }
}

/// Session states.
#[derive(Debug)]
pub enum SessionState {
    /// Nothing has happened yet
    Idle,
    /// Startup: loading and refreshing the stored credential
    RefreshingFromStorage,
    /// PKCE values generated, flow state being written
    AuthorizationRequested,
    /// Authorization URL handed out, waiting for the redirect
    AwaitingCallback,
    /// Code exchange in flight
    Exchanging,
    /// Access token held in memory
    Authenticated(Session),
    /// No usable credential; the user must connect
    Unauthenticated,
    /// The current authorization attempt is dead; restart it
    Failed { reason: String },
}

impl SessionState {
    /// State label for logging and status output.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::RefreshingFromStorage => "refreshing_from_storage",
            SessionState::AuthorizationRequested => "authorization_requested",
            SessionState::AwaitingCallback => "awaiting_callback",
            SessionState::Exchanging => "exchanging",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Failed { .. } => "failed",
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

/// Events that drive state transitions.
#[derive(Debug)]
pub enum SessionEvent {
    /// Startup began reading the credential store
    StartupBegun,
    /// Credential store was empty (or unreadable)
    NoStoredCredential,
    /// Refresh (startup or inline) produced a new access token
    RefreshSucceeded(Session),
    /// Refresh was rejected; the stored credential has been cleared
    RefreshFailed(String),
    /// Verifier, challenge, and state generated
    AuthorizationBuilt,
    /// Flow state written to the ephemeral store
    FlowPersisted,
    /// Callback state did not match, or the provider reported an error
    CallbackRejected(String),
    /// Token exchange request sent
    ExchangeStarted,
    /// Token exchange returned tokens
    ExchangeSucceeded(Session),
    /// Token exchange failed (missing verifier, remote rejection, transport)
    ExchangeFailed(String),
    /// Local credentials cleared
    LoggedOut,
}

/// Handle a state transition. Pure function: no I/O.
pub fn transition(state: SessionState, event: SessionEvent) -> SessionState {
    match (state, event) {
        // --- Startup ---
        (SessionState::Idle, SessionEvent::StartupBegun) => SessionState::RefreshingFromStorage,

        (SessionState::RefreshingFromStorage, SessionEvent::NoStoredCredential) => {
            SessionState::Unauthenticated
        }

        // Inline refresh also lands here from Authenticated
        (
            SessionState::RefreshingFromStorage | SessionState::Authenticated(_),
            SessionEvent::RefreshSucceeded(session),
        ) => SessionState::Authenticated(session),

        (
            SessionState::RefreshingFromStorage | SessionState::Authenticated(_),
            SessionEvent::RefreshFailed(_),
        ) => SessionState::Unauthenticated,

        // --- Authorization request ---
        // A new request replaces whatever flow was pending, but never one
        // whose code is already being exchanged.
        (state, SessionEvent::AuthorizationBuilt)
            if !matches!(
                state,
                SessionState::Exchanging | SessionState::RefreshingFromStorage
            ) =>
        {
            SessionState::AuthorizationRequested
        }

        (SessionState::AuthorizationRequested, SessionEvent::FlowPersisted) => {
            SessionState::AwaitingCallback
        }

        // --- Callback ---
        (SessionState::AwaitingCallback, SessionEvent::CallbackRejected(reason)) => {
            SessionState::Failed { reason }
        }

        (state, SessionEvent::ExchangeStarted)
            if !matches!(
                state,
                SessionState::Exchanging | SessionState::RefreshingFromStorage
            ) =>
        {
            SessionState::Exchanging
        }

        (SessionState::Exchanging, SessionEvent::ExchangeSucceeded(session)) => {
            SessionState::Authenticated(session)
        }

        (SessionState::Exchanging, SessionEvent::ExchangeFailed(reason)) => {
            SessionState::Failed { reason }
        }

        // A missing verifier fails the flow before any exchange starts
        (
            SessionState::AwaitingCallback
            | SessionState::AuthorizationRequested
            | SessionState::Idle
            | SessionState::Unauthenticated,
            SessionEvent::ExchangeFailed(reason),
        ) => SessionState::Failed { reason },

        // --- Logout from anywhere ---
        (_, SessionEvent::LoggedOut) => SessionState::Unauthenticated,

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => state,
    }
}
