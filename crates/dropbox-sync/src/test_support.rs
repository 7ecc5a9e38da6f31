//! In-process fake of the Dropbox file API
//!
//! Serves both the RPC (`api`) and content endpoints from one address.
//! Files are keyed by lowercased path and carry `rev-N` revisions from a
//! shared counter, so a seeded file is `rev-1` and the next write is `rev-2`.
//!
//! Listings ignore the stored files and serve a fixed three-page fixture
//! (`cursor-1`, `cursor-2`, then `has_more: false`). Only the bearer token
//! `TEST_TOKEN` is accepted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::arg::encode_api_arg;

pub(crate) const TEST_TOKEN: &str = "sl.test-token";

#[derive(Clone)]
struct MockFile {
    path_display: String,
    content: Vec<u8>,
    rev: String,
}

#[derive(Clone)]
pub(crate) struct MockDropbox {
    pub base_url: String,
    pub page_calls: Arc<AtomicUsize>,
    files: Arc<Mutex<HashMap<String, MockFile>>>,
    revisions: Arc<AtomicUsize>,
    list_bodies: Arc<Mutex<Vec<Value>>>,
    api_args: Arc<Mutex<Vec<String>>>,
}

impl MockDropbox {
    fn next_rev(&self) -> String {
        format!("rev-{}", self.revisions.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Place a file directly in the fake store, returning its revision.
    pub fn seed(&self, path: &str, content: &str) -> String {
        let rev = self.next_rev();
        self.files.lock().unwrap().insert(
            path.to_lowercase(),
            MockFile {
                path_display: path.to_string(),
                content: content.as_bytes().to_vec(),
                rev: rev.clone(),
            },
        );
        rev
    }

    /// Content and revision currently stored at `path`.
    pub fn file(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.files
            .lock()
            .unwrap()
            .get(&path.to_lowercase())
            .map(|f| (f.content.clone(), f.rev.clone()))
    }

    pub fn last_list_body(&self) -> Option<Value> {
        self.list_bodies.lock().unwrap().last().cloned()
    }

    /// Raw `Dropbox-API-Arg` header of the last content request.
    pub fn last_api_arg(&self) -> Option<String> {
        self.api_args.lock().unwrap().last().cloned()
    }

    fn api_arg(&self, headers: &HeaderMap) -> Option<Value> {
        let raw = headers.get("dropbox-api-arg")?.to_str().ok()?.to_string();
        self.api_args.lock().unwrap().push(raw.clone());
        serde_json::from_str(&raw).ok()
    }
}

fn error(status: StatusCode, summary: &str) -> Response {
    (status, Json(json!({ "error_summary": summary }))).into_response()
}

fn check_auth(headers: &HeaderMap) -> Option<Response> {
    let presented = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if presented == Some(format!("Bearer {TEST_TOKEN}").as_str()) {
        None
    } else {
        Some(error(StatusCode::UNAUTHORIZED, "invalid_access_token/"))
    }
}

fn metadata(file: &MockFile) -> Value {
    let name = file.path_display.rsplit('/').next().unwrap_or_default();
    let path_lower = file.path_display.to_lowercase();
    json!({
        ".tag": "file",
        "name": name,
        "path_lower": path_lower,
        "path_display": file.path_display,
        "id": format!("id:{path_lower}"),
        "rev": file.rev,
        "size": file.content.len(),
        "server_modified": "2024-05-01T10:00:00Z",
    })
}

fn fixture_page(n: usize) -> Value {
    let entries: Vec<Value> = ["a", "b"]
        .iter()
        .map(|letter| {
            let name = format!("p{n}-{letter}.md");
            json!({
                ".tag": "file",
                "name": name,
                "path_lower": format!("/notes/{name}"),
                "path_display": format!("/Notes/{name}"),
                "id": format!("id:p{n}{letter}"),
                "rev": "rev-0",
            })
        })
        .collect();
    json!({
        "entries": entries,
        "cursor": format!("cursor-{n}"),
        "has_more": n < 3,
    })
}

async fn list_folder(
    State(mock): State<MockDropbox>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(denied) = check_auth(&headers) {
        return denied;
    }
    mock.page_calls.fetch_add(1, Ordering::SeqCst);
    mock.list_bodies.lock().unwrap().push(body.clone());
    // The real API rejects "/" for the root; only "" is accepted
    if body["path"] == "/" {
        return (
            StatusCode::BAD_REQUEST,
            "Error in call to API function \"files/list_folder\": request body: path: \
             Specify the root folder as an empty string rather than as \"/\".",
        )
            .into_response();
    }
    Json(fixture_page(1)).into_response()
}

async fn list_folder_continue(
    State(mock): State<MockDropbox>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(denied) = check_auth(&headers) {
        return denied;
    }
    mock.page_calls.fetch_add(1, Ordering::SeqCst);
    match body["cursor"].as_str() {
        Some("cursor-1") => Json(fixture_page(2)).into_response(),
        Some("cursor-2") => Json(fixture_page(3)).into_response(),
        _ => error(StatusCode::CONFLICT, "reset/"),
    }
}

async fn download(State(mock): State<MockDropbox>, headers: HeaderMap) -> Response {
    if let Some(denied) = check_auth(&headers) {
        return denied;
    }
    let Some(arg) = mock.api_arg(&headers) else {
        return error(StatusCode::BAD_REQUEST, "missing Dropbox-API-Arg");
    };
    let key = arg["path"].as_str().unwrap_or_default().to_lowercase();
    let Some(file) = mock.files.lock().unwrap().get(&key).cloned() else {
        return error(StatusCode::CONFLICT, "path/not_found/");
    };
    let result = encode_api_arg(&metadata(&file)).unwrap();
    ([("dropbox-api-result", result)], file.content).into_response()
}

async fn upload(State(mock): State<MockDropbox>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(denied) = check_auth(&headers) {
        return denied;
    }
    let Some(arg) = mock.api_arg(&headers) else {
        return error(StatusCode::BAD_REQUEST, "missing Dropbox-API-Arg");
    };
    let path = arg["path"].as_str().unwrap_or_default().to_string();
    let key = path.to_lowercase();
    let mode = &arg["mode"];

    let mut files = mock.files.lock().unwrap();
    let current = files.get(&key).map(|f| f.rev.clone());
    if *mode == "add" {
        if current.is_some() {
            return error(StatusCode::CONFLICT, "path/conflict/file/");
        }
    } else if mode[".tag"] == "update" {
        match current {
            Some(rev) if mode["update"] == rev.as_str() => {}
            _ => return error(StatusCode::CONFLICT, "path/conflict/file/"),
        }
    } else {
        return error(StatusCode::BAD_REQUEST, "unsupported write mode");
    }

    let file = MockFile {
        path_display: path,
        content: body.to_vec(),
        rev: mock.next_rev(),
    };
    let meta = metadata(&file);
    files.insert(key, file);
    Json(meta).into_response()
}

async fn move_v2(
    State(mock): State<MockDropbox>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(denied) = check_auth(&headers) {
        return denied;
    }
    let from = body["from_path"].as_str().unwrap_or_default().to_lowercase();
    let to = body["to_path"].as_str().unwrap_or_default().to_string();

    let mut files = mock.files.lock().unwrap();
    if files.contains_key(&to.to_lowercase()) {
        return error(StatusCode::CONFLICT, "to/conflict/file/");
    }
    let Some(mut file) = files.remove(&from) else {
        return error(StatusCode::CONFLICT, "from_lookup/not_found/");
    };
    file.path_display = to.clone();
    let meta = metadata(&file);
    files.insert(to.to_lowercase(), file);
    Json(json!({ "metadata": meta })).into_response()
}

async fn delete_v2(
    State(mock): State<MockDropbox>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(denied) = check_auth(&headers) {
        return denied;
    }
    let key = body["path"].as_str().unwrap_or_default().to_lowercase();
    match mock.files.lock().unwrap().remove(&key) {
        Some(file) => Json(json!({ "metadata": metadata(&file) })).into_response(),
        None => error(StatusCode::CONFLICT, "path_lookup/not_found/"),
    }
}

async fn temporary_link(
    State(mock): State<MockDropbox>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(denied) = check_auth(&headers) {
        return denied;
    }
    let key = body["path"].as_str().unwrap_or_default().to_lowercase();
    match mock.files.lock().unwrap().get(&key) {
        Some(file) => {
            let meta = metadata(file);
            let link = format!("https://dl.example.test/{}", meta["name"].as_str().unwrap_or_default());
            Json(json!({ "metadata": meta, "link": link })).into_response()
        }
        None => error(StatusCode::CONFLICT, "path/not_found/"),
    }
}

async fn current_account(headers: HeaderMap) -> Response {
    if let Some(denied) = check_auth(&headers) {
        return denied;
    }
    Json(json!({
        "account_id": "dbid:AAH4f99",
        "email": "ada@example.com",
        "name": {
            "display_name": "Ada Lovelace",
            "given_name": "Ada",
            "surname": "Lovelace",
            "familiar_name": "Ada",
            "abbreviated_name": "AL",
        },
        "email_verified": true,
        "disabled": false,
    }))
    .into_response()
}

/// Start the fake on an ephemeral localhost port.
pub(crate) async fn spawn_dropbox() -> MockDropbox {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mock = MockDropbox {
        base_url: format!("http://{addr}"),
        page_calls: Arc::new(AtomicUsize::new(0)),
        files: Arc::new(Mutex::new(HashMap::new())),
        revisions: Arc::new(AtomicUsize::new(0)),
        list_bodies: Arc::new(Mutex::new(Vec::new())),
        api_args: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/2/files/list_folder", post(list_folder))
        .route("/2/files/list_folder/continue", post(list_folder_continue))
        .route("/2/files/download", post(download))
        .route("/2/files/upload", post(upload))
        .route("/2/files/move_v2", post(move_v2))
        .route("/2/files/delete_v2", post(delete_v2))
        .route("/2/files/get_temporary_link", post(temporary_link))
        .route("/2/users/get_current_account", post(current_account))
        .with_state(mock.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    mock
}
