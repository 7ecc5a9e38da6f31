//! Session manager: drives the PKCE flow and owns the live access token
//!
//! Wraps the pure `state::transition` machine with the I/O each step needs:
//! the ephemeral flow store, the durable credential store, and the token
//! endpoint. The current `SessionState` sits behind a tokio `RwLock`.
//! Startup refresh, inline refresh, and logout hold the write lock across
//! their network round trip, so `access_token()` cannot hand out a token
//! while one of them is still in flight.
//!
//! Code exchange is guarded separately by a `Mutex<()>` taken with
//! `try_lock`: authorization codes are single-use, so a second exchange
//! attempted while one is outstanding is suppressed instead of queued.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::callback::CallbackParams;
use crate::constants::OAuthConfig;
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::flow::{FlowState, FlowStore};
use crate::pkce;
use crate::state::{Session, SessionEvent, SessionState, transition};
use crate::token::{self, CredentialBundle};

/// Refresh the access token inline when it expires within this window.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Coarse session status reported to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Authenticated { account_id: Option<String> },
    Unauthenticated,
}

/// Result of `exchange_code`.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// Tokens issued; the refresh token is persisted and the access token
    /// is live in memory.
    Completed(CredentialBundle),
    /// Another exchange for this flow is already running; nothing was sent.
    InProgress,
}

/// Owns one user's OAuth session against one Dropbox app.
pub struct SessionManager {
    http: reqwest::Client,
    config: OAuthConfig,
    flow_store: Arc<dyn FlowStore>,
    credential_store: Arc<dyn CredentialStore>,
    state: RwLock<SessionState>,
    exchange_guard: Mutex<()>,
}

/// Apply one event to the locked state in place.
fn advance(slot: &mut SessionState, event: SessionEvent) {
    let current = std::mem::replace(slot, SessionState::Idle);
    let from = current.label();
    *slot = transition(current, event);
    debug!(from, to = slot.label(), "session transition");
}

/// Compare without early exit on the first differing byte.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

impl SessionManager {
    pub fn new(
        http: reqwest::Client,
        config: OAuthConfig,
        flow_store: Arc<dyn FlowStore>,
        credential_store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            http,
            config,
            flow_store,
            credential_store,
            state: RwLock::new(SessionState::Idle),
            exchange_guard: Mutex::new(()),
        }
    }

    /// Current state label (`idle`, `authenticated`, ...).
    pub async fn state_label(&self) -> &'static str {
        self.state.read().await.label()
    }

    pub async fn status(&self) -> SessionStatus {
        match &*self.state.read().await {
            SessionState::Authenticated(session) => SessionStatus::Authenticated {
                account_id: session.account_id.clone(),
            },
            _ => SessionStatus::Unauthenticated,
        }
    }

    /// Restore the session from the stored refresh token.
    ///
    /// Runs once, from `Idle`. Never fails: a missing, unreadable, or
    /// rejected credential ends in `Unauthenticated`, and a rejected one is
    /// cleared from durable storage. With no stored token, no request is made.
    pub async fn startup(&self) -> SessionStatus {
        let mut state = self.state.write().await;
        if !matches!(*state, SessionState::Idle) {
            debug!(state = state.label(), "startup already ran");
            drop(state);
            return self.status().await;
        }
        advance(&mut state, SessionEvent::StartupBegun);

        let stored = match self.credential_store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "credential store unreadable, starting unauthenticated");
                None
            }
        };
        let Some(refresh) = stored else {
            info!("no stored credential, session unauthenticated");
            advance(&mut state, SessionEvent::NoStoredCredential);
            return SessionStatus::Unauthenticated;
        };

        match self.refresh(refresh.expose()).await {
            Ok(bundle) => {
                if let Err(e) = self.credential_store.store(bundle.refresh_token.expose()).await {
                    warn!(error = %e, "failed to persist refreshed credential");
                }
                let session = Session::from_bundle(&bundle, None);
                let account_id = session.account_id.clone();
                advance(&mut state, SessionEvent::RefreshSucceeded(session));
                info!(account_id = ?account_id, "session restored from stored credential");
                SessionStatus::Authenticated { account_id }
            }
            Err(e) => {
                warn!(error = %e, "stored credential rejected, clearing it");
                if let Err(e) = self.credential_store.clear().await {
                    warn!(error = %e, "failed to clear rejected credential");
                }
                advance(&mut state, SessionEvent::RefreshFailed(e.to_string()));
                SessionStatus::Unauthenticated
            }
        }
    }

    /// Start an authorization: generate PKCE values and CSRF state, store
    /// them (replacing any stale flow), and return the URL to send the user to.
    ///
    /// Refused with `ExchangeInProgress` while a code exchange runs: the
    /// exchange clears the flow store when it finishes, which would strand
    /// the new flow.
    pub async fn build_authorization_request(&self) -> Result<String> {
        let Ok(_exchange) = self.exchange_guard.try_lock() else {
            warn!("authorization requested during code exchange, refusing");
            return Err(Error::ExchangeInProgress);
        };

        let verifier = pkce::generate_verifier();
        let challenge = pkce::compute_challenge(&verifier);
        let csrf_state = pkce::generate_state();
        let url = pkce::build_authorization_url(&self.config, &csrf_state, &challenge);

        let mut state = self.state.write().await;
        advance(&mut state, SessionEvent::AuthorizationBuilt);

        let flow = FlowState {
            state: csrf_state,
            code_verifier: Secret::new(verifier),
        };
        if let Err(e) = self.flow_store.store(flow).await {
            advance(&mut state, SessionEvent::CallbackRejected(e.to_string()));
            return Err(e);
        }
        advance(&mut state, SessionEvent::FlowPersisted);
        info!("authorization flow started");
        Ok(url)
    }

    /// Check the callback's `state` against the pending flow.
    ///
    /// The pending state is consumed by the first call, match or not, so a
    /// value validates at most once; the verifier is kept for
    /// `exchange_code`. `false` when no state is pending or the values
    /// differ in any way. A mismatch is fatal to the flow: the pending flow
    /// is discarded.
    pub async fn validate_callback(&self, received_state: &str) -> Result<bool> {
        let expected = self.flow_store.take_state().await?;
        let valid = expected
            .as_deref()
            .is_some_and(|expected| constant_time_eq(expected, received_state));
        if valid {
            debug!("callback state matches pending flow");
            return Ok(true);
        }

        let reason = if expected.is_none() {
            "no authorization state pending"
        } else {
            "state mismatch"
        };
        warn!(reason, "rejecting authorization callback");
        self.flow_store.clear().await?;
        let mut state = self.state.write().await;
        advance(&mut state, SessionEvent::CallbackRejected(reason.into()));
        Ok(false)
    }

    /// Exchange an authorization code for tokens using the pending verifier.
    ///
    /// On success the flow state is cleared, the refresh token persisted,
    /// and the access token held in memory. On failure the flow state and
    /// any durable credential are cleared. Returns `InProgress` without
    /// touching the network if another exchange is already running.
    pub async fn exchange_code(&self, code: &str) -> Result<ExchangeOutcome> {
        let Ok(_exchange) = self.exchange_guard.try_lock() else {
            info!("code exchange already in flight, suppressing duplicate");
            return Ok(ExchangeOutcome::InProgress);
        };

        let Some(flow) = self.flow_store.load().await? else {
            warn!("no code verifier pending at exchange time");
            let mut state = self.state.write().await;
            advance(&mut state, SessionEvent::ExchangeFailed(Error::MissingVerifier.to_string()));
            return Err(Error::MissingVerifier);
        };

        {
            let mut state = self.state.write().await;
            advance(&mut state, SessionEvent::ExchangeStarted);
        }

        let result =
            token::exchange_code(&self.http, &self.config, code, flow.code_verifier.expose()).await;

        let cleared = self.flow_store.clear().await;
        let mut state = self.state.write().await;
        match result {
            Ok(bundle) => {
                cleared?;
                if let Err(e) = self.credential_store.store(bundle.refresh_token.expose()).await {
                    advance(&mut state, SessionEvent::ExchangeFailed(e.to_string()));
                    return Err(e);
                }
                let session = Session::from_bundle(&bundle, None);
                info!(account_id = ?session.account_id, "authorization completed");
                advance(&mut state, SessionEvent::ExchangeSucceeded(session));
                Ok(ExchangeOutcome::Completed(bundle))
            }
            Err(e) => {
                warn!(error = %e, "code exchange failed");
                if let Err(clear_err) = self.credential_store.clear().await {
                    warn!(error = %clear_err, "failed to clear credential after exchange failure");
                }
                if let Err(clear_err) = cleared {
                    warn!(error = %clear_err, "failed to clear flow state after exchange failure");
                }
                advance(&mut state, SessionEvent::ExchangeFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Handle a redirect end to end: provider errors, CSRF check, exchange.
    pub async fn complete_callback(&self, params: &CallbackParams) -> Result<ExchangeOutcome> {
        if let Some(error) = &params.error {
            warn!(error = %error, description = ?params.error_description, "provider returned an authorization error");
            self.flow_store.clear().await?;
            let mut state = self.state.write().await;
            advance(&mut state, SessionEvent::CallbackRejected(error.clone()));
            return Err(Error::AuthorizationDenied {
                error: error.clone(),
                description: params.error_description.clone(),
            });
        }

        let Some(code) = params.code.as_deref() else {
            self.flow_store.clear().await?;
            let mut state = self.state.write().await;
            advance(&mut state, SessionEvent::CallbackRejected(Error::MissingCode.to_string()));
            return Err(Error::MissingCode);
        };

        let received_state = params.state.as_deref().unwrap_or_default();
        if !self.validate_callback(received_state).await? {
            return Err(Error::InvalidState);
        }

        self.exchange_code(code).await
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// Does not touch session state or storage; callers decide what a
    /// failure means for the stored credential.
    pub async fn refresh(&self, stored_refresh_token: &str) -> Result<CredentialBundle> {
        token::refresh_token(&self.http, &self.config, stored_refresh_token).await
    }

    /// Best-effort remote revocation. Failures are logged and dropped.
    pub async fn revoke(&self, access_token: &str) {
        match token::revoke_token(&self.http, &self.config, access_token).await {
            Ok(()) => debug!("access token revoked"),
            Err(e) => warn!(error = %e, "token revocation failed, continuing with local logout"),
        }
    }

    /// Revoke remotely (best effort) and clear all local credential state.
    ///
    /// Local clearing always happens; a storage error is returned only
    /// after every store has been cleared.
    pub async fn logout(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(session) = state.session() {
            let access = session.access_token.clone();
            self.revoke(access.expose()).await;
        }
        advance(&mut state, SessionEvent::LoggedOut);

        let flow = self.flow_store.clear().await;
        let credential = self.credential_store.clear().await;
        info!("logged out");
        flow.and(credential)
    }

    /// The live access token, refreshed first if it expires within
    /// `REFRESH_MARGIN`.
    ///
    /// A rejected inline refresh clears the stored credential and leaves the
    /// session `Unauthenticated`. A transport failure leaves it as it was.
    pub async fn access_token(&self) -> Result<Secret<String>> {
        {
            let state = self.state.read().await;
            match state.session() {
                Some(session) if !session.expires_within(REFRESH_MARGIN) => {
                    return Ok(session.access_token.clone());
                }
                Some(_) => {}
                None => return Err(Error::NotAuthenticated),
            }
        }

        let mut state = self.state.write().await;
        // Re-check: another caller may have refreshed while we waited
        let previous_account = match state.session() {
            Some(session) if !session.expires_within(REFRESH_MARGIN) => {
                return Ok(session.access_token.clone());
            }
            Some(session) => session.account_id.clone(),
            None => return Err(Error::NotAuthenticated),
        };

        let Some(refresh) = self.credential_store.load().await? else {
            advance(&mut state, SessionEvent::RefreshFailed("no stored credential".into()));
            return Err(Error::NotAuthenticated);
        };

        debug!("access token expiring, refreshing inline");
        match self.refresh(refresh.expose()).await {
            Ok(bundle) => {
                self.credential_store.store(bundle.refresh_token.expose()).await?;
                let session = Session::from_bundle(&bundle, previous_account);
                let access = session.access_token.clone();
                advance(&mut state, SessionEvent::RefreshSucceeded(session));
                Ok(access)
            }
            Err(e @ Error::RefreshFailed(_)) => {
                warn!(error = %e, "inline refresh rejected, clearing credential");
                if let Err(clear_err) = self.credential_store.clear().await {
                    warn!(error = %clear_err, "failed to clear rejected credential");
                }
                advance(&mut state, SessionEvent::RefreshFailed(e.to_string()));
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
