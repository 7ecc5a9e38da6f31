//! In-process fake of the Dropbox token and revoke endpoints
//!
//! Codes and tokens with fixed meanings:
//! - `good-code` exchanges to `sl.exchanged` / `rt-valid`
//! - `slow-code` does the same after 200ms (duplicate-exchange tests)
//! - `short-code` exchanges to a token that expires in 30s
//! - refresh token `rt-valid` refreshes to `sl.refreshed`; `rt-slow` does the
//!   same after 200ms; anything else is 400
//! - revoking `sl.revoke-fails` answers 500

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Form, Router};
use tokio::net::TcpListener;

#[derive(Clone)]
pub(crate) struct MockAuth {
    pub base_url: String,
    pub exchanges: Arc<AtomicUsize>,
    pub refreshes: Arc<AtomicUsize>,
    pub revokes: Arc<AtomicUsize>,
    verifiers: Arc<Mutex<Vec<String>>>,
    bearers: Arc<Mutex<Vec<String>>>,
}

impl MockAuth {
    pub fn total_calls(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
            + self.refreshes.load(Ordering::SeqCst)
            + self.revokes.load(Ordering::SeqCst)
    }

    pub fn last_verifier(&self) -> Option<String> {
        self.verifiers.lock().unwrap().last().cloned()
    }

    pub fn last_bearer(&self) -> Option<String> {
        self.bearers.lock().unwrap().last().cloned()
    }
}

fn exchanged_body(expires_in: u64) -> String {
    serde_json::json!({
        "access_token": "sl.exchanged",
        "refresh_token": "rt-valid",
        "expires_in": expires_in,
        "token_type": "bearer",
        "account_id": "dbid:AAH4f99",
        "uid": "12345",
    })
    .to_string()
}

fn field<'a>(form: &'a HashMap<String, String>, name: &str) -> &'a str {
    form.get(name).map(String::as_str).unwrap_or("")
}

async fn token_handler(
    State(mock): State<MockAuth>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, String) {
    match field(&form, "grant_type") {
        "authorization_code" => {
            mock.exchanges.fetch_add(1, Ordering::SeqCst);
            if let Some(verifier) = form.get("code_verifier") {
                mock.verifiers.lock().unwrap().push(verifier.clone());
            }
            if field(&form, "code_verifier").is_empty() {
                return (
                    StatusCode::BAD_REQUEST,
                    r#"{"error":"invalid_request","error_description":"missing code_verifier"}"#
                        .into(),
                );
            }
            match field(&form, "code") {
                "good-code" => (StatusCode::OK, exchanged_body(14400)),
                "short-code" => (StatusCode::OK, exchanged_body(30)),
                "slow-code" => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    (StatusCode::OK, exchanged_body(14400))
                }
                _ => (
                    StatusCode::BAD_REQUEST,
                    r#"{"error":"invalid_grant","error_description":"code doesn't exist or has expired"}"#
                        .into(),
                ),
            }
        }
        "refresh_token" => {
            mock.refreshes.fetch_add(1, Ordering::SeqCst);
            let presented = field(&form, "refresh_token");
            if presented == "rt-slow" {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            if presented == "rt-valid" || presented == "rt-slow" {
                (
                    StatusCode::OK,
                    r#"{"access_token":"sl.refreshed","expires_in":14400,"token_type":"bearer"}"#
                        .into(),
                )
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    r#"{"error":"invalid_grant","error_description":"refresh token is invalid or revoked"}"#
                        .into(),
                )
            }
        }
        other => (
            StatusCode::BAD_REQUEST,
            format!(r#"{{"error":"unsupported_grant_type","grant_type":"{other}"}}"#),
        ),
    }
}

async fn revoke_handler(State(mock): State<MockAuth>, headers: HeaderMap) -> (StatusCode, String) {
    mock.revokes.fetch_add(1, Ordering::SeqCst);
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
        .to_string();
    let fails = bearer == "sl.revoke-fails";
    mock.bearers.lock().unwrap().push(bearer);
    if fails {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
    } else {
        (StatusCode::OK, "null".into())
    }
}

/// Start the fake on an ephemeral localhost port.
pub(crate) async fn spawn_auth_server() -> MockAuth {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mock = MockAuth {
        base_url: format!("http://{addr}"),
        exchanges: Arc::new(AtomicUsize::new(0)),
        refreshes: Arc::new(AtomicUsize::new(0)),
        revokes: Arc::new(AtomicUsize::new(0)),
        verifiers: Arc::new(Mutex::new(Vec::new())),
        bearers: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/oauth2/token", post(token_handler))
        .route("/2/auth/token/revoke", post(revoke_handler))
        .with_state(mock.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    mock
}
