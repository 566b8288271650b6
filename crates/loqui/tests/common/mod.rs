//! Shared test harness for API integration tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, header};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use tempfile::TempDir;

use loqui::api::{AppState, create_router};
use loqui::auth::AuthState;
use loqui::chat::{ChatService, QuotaLedger};
use loqui::completion::{CompletionBackend, ScriptedBackend};
use loqui::db::Database;
use loqui::storage::LocalObjectStore;
use loqui::store::{EphemeralStore, PersistenceGateway, SqliteStore};

pub const JWT_SECRET: &str = "test-secret";

/// Base URL uploads are served under in tests; path-only requests against
/// the router drop this prefix.
pub const FILES_BASE_URL: &str = "http://localhost:8080/files";

/// A router plus the tempdir its object store writes into.
pub struct TestApp {
    pub router: Router,
    _storage: TempDir,
}

/// App with the default scripted reply ("Hola mundo!").
pub async fn test_app() -> TestApp {
    test_app_with(Arc::new(ScriptedBackend::new(["Hola ", "mundo!"]))).await
}

/// App with a specific completion backend.
pub async fn test_app_with(completion: Arc<dyn CompletionBackend>) -> TestApp {
    let storage = TempDir::new().unwrap();
    let objects = Arc::new(LocalObjectStore::new(storage.path(), FILES_BASE_URL));

    let gateway = Arc::new(PersistenceGateway::new(
        Arc::new(SqliteStore::new(Database::in_memory().await.unwrap())),
        Arc::new(EphemeralStore::new()),
        objects.clone(),
    ));
    let ledger = Arc::new(QuotaLedger::new(gateway.clone()));
    let chat = Arc::new(ChatService::new(gateway.clone(), ledger.clone(), completion));
    let auth = AuthState::new(JWT_SECRET);

    let state = AppState::new(gateway, ledger, chat, objects, auth);
    TestApp {
        router: create_router(state, &["*".to_string()]),
        _storage: storage,
    }
}

/// Issue a bearer token for `sub` signed with the test secret.
pub fn bearer_token(sub: &str) -> String {
    #[derive(serde::Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        exp: i64,
    }

    let claims = TestClaims {
        sub,
        exp: 4102444800, // 2100-01-01
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Identity headers for requests.
pub enum Caller<'a> {
    User(&'a str),
    Device(&'a str),
}

/// Build a JSON request with identity headers applied.
pub fn request(method: Method, uri: &str, caller: &Caller<'_>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    builder = match caller {
        Caller::User(sub) => builder.header(
            header::AUTHORIZATION,
            format!("Bearer {}", bearer_token(sub)),
        ),
        Caller::Device(device) => builder.header("x-device-id", *device),
    };

    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
