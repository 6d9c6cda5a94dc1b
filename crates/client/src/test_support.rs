//! Scripted transport shared by unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};

use crate::error::TransportError;
use crate::http::{ApiRequest, ApiResponse, Transport};

type Handler =
    dyn Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, TransportError> + Send + Sync;

/// One request seen by [`FakeTransport`].
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// Transport answering every request with a test-supplied closure.
pub struct FakeTransport {
    handler: Box<Handler>,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Arc<Self> {
        Self::with_latency(Duration::ZERO, handler)
    }

    /// Like [`Self::new`], but each call sleeps first so concurrent callers overlap.
    pub fn with_latency(
        latency: Duration,
        handler: impl Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            latency,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == *method && call.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&SecretString>,
    ) -> Result<ApiResponse, TransportError> {
        let bearer = bearer.map(|token| token.expose_secret().to_string());
        self.calls.lock().unwrap().push(Call {
            method: request.method.clone(),
            path: request.path.clone(),
            bearer: bearer.clone(),
            body: request.body.clone(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.handler)(request, bearer.as_deref())
    }
}

/// A JSON response with the given status.
pub fn json(status: u16, body: serde_json::Value) -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse::new(
        StatusCode::from_u16(status).unwrap(),
        body.to_string(),
    ))
}

/// Profile body for user 1.
pub fn profile_body() -> serde_json::Value {
    serde_json::json!({
        "id": 1,
        "username": "ada",
        "email": "ada@example.com",
        "first_name": "Ada",
        "last_name": "Lovelace"
    })
}

/// A session restored from stored `access`/`refresh` tokens.
///
/// The transport must answer the profile request made during restore.
pub async fn signed_in(
    transport: Arc<FakeTransport>,
    access: &str,
    refresh: &str,
) -> (crate::auth::AuthSession, Arc<crate::storage::MemoryStorage>) {
    use crate::storage::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, Storage};

    let storage = Arc::new(crate::storage::MemoryStorage::new());
    storage.set(ACCESS_TOKEN_KEY, access).unwrap();
    storage.set(REFRESH_TOKEN_KEY, refresh).unwrap();
    let session = crate::auth::AuthSession::new(transport, storage.clone());
    session.restore().await;
    (session, storage)
}
