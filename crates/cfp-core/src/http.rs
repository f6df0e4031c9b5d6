//! HTTP client wrapper for the proposals API.
//!
//! Adds the base URL, JSON headers, the persisted bearer token and a fixed
//! request deadline to every call. A `401` is surfaced twice: as the returned
//! [`ApiError`] and as a [`SessionSignal::Unauthenticated`] broadcast, so a
//! single coordinator can clear the session and navigate away. This layer
//! never touches token storage except to read from it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::ApiError;
use crate::storage::TokenStorage;

/// Standard User-Agent header for cfp API requests.
pub const USER_AGENT: &str = concat!("cfp/", env!("CARGO_PKG_VERSION"));

/// Default request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

const SIGNAL_CAPACITY: usize = 16;

/// Session-level events raised by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// The server rejected the bearer token.
    Unauthenticated,
}

/// Raw body of a binary download.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// Shared API client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    storage: Arc<dyn TokenStorage>,
    signals: broadcast::Sender<SessionSignal>,
}

impl ApiClient {
    /// Creates a client for `base_url` reading its bearer token from `storage`.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        storage: Arc<dyn TokenStorage>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage,
            signals,
        })
    }

    /// Creates a client from resolved settings.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn from_settings(settings: &Settings, storage: Arc<dyn TokenStorage>) -> Result<Self> {
        Self::new(settings.api_base_url.clone(), settings.timeout, storage)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn storage(&self) -> &Arc<dyn TokenStorage> {
        &self.storage
    }

    /// The configured reqwest client, for collaborators that talk to
    /// non-API endpoints (e.g. channel authorization).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Subscribes to session signals raised by this client and its clones.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    /// Current bearer token, read from storage on every call.
    pub fn bearer_token(&self) -> Option<String> {
        match self.storage.load() {
            Ok(token) => token,
            Err(err) => {
                warn!("failed to read stored token: {err:#}");
                None
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request and turns non-2xx responses into [`ApiError`].
    async fn send(&self, method: &Method, path: &str, builder: RequestBuilder) -> Result<Response> {
        debug!(%method, path, "api request");

        let response = builder
            .send()
            .await
            .map_err(|err| ApiError::transport(&err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_response(status.as_u16(), &body);

        if error.is_unauthorized() {
            warn!(path, "server rejected session token");
            // No receivers is fine: nobody is coordinating this session.
            let _ = self.signals.send(SessionSignal::Unauthenticated);
        } else {
            debug!(path, status = status.as_u16(), message = %error.message, "api error");
        }

        Err(error.into())
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T> {
        let body = response
            .text()
            .await
            .map_err(|err| ApiError::transport(&err))?;
        let body = if body.trim().is_empty() { "null" } else { &body };
        serde_json::from_str(body).map_err(|err| {
            debug!(path, "failed to decode response: {err}");
            ApiError::malformed(path).into()
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        customize: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<T> {
        let builder = customize(self.request(method.clone(), path));
        let response = self.send(&method, path, builder).await?;
        Self::decode(path, response).await
    }

    /// # Errors
    /// Returns an error on transport failure, non-2xx status or undecodable body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call(Method::GET, path, |b| b).await
    }

    /// # Errors
    /// Returns an error on transport failure, non-2xx status or undecodable body.
    pub async fn get_json_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.call(Method::GET, path, |b| b.query(query)).await
    }

    /// # Errors
    /// Returns an error on transport failure, non-2xx status or undecodable body.
    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(Method::POST, path, |b| b.json(body)).await
    }

    /// POST without a request body.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status or undecodable body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call(Method::POST, path, |b| {
            b.header(CONTENT_TYPE, "application/json")
        })
        .await
    }

    /// # Errors
    /// Returns an error on transport failure, non-2xx status or undecodable body.
    pub async fn patch_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(Method::PATCH, path, |b| b.json(body)).await
    }

    /// # Errors
    /// Returns an error on transport failure, non-2xx status or undecodable body.
    pub async fn put_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(Method::PUT, path, |b| b.json(body)).await
    }

    /// # Errors
    /// Returns an error on transport failure, non-2xx status or undecodable body.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T> {
        self.call(Method::POST, path, |b| b.multipart(form)).await
    }

    /// Fetches a binary body along with its content headers.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-2xx status.
    pub async fn get_bytes(&self, path: &str) -> Result<Download> {
        let builder = self.request(Method::GET, path);
        let response = self.send(&Method::GET, path, builder).await?;

        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let content_disposition = header(CONTENT_DISPOSITION);

        let bytes = response
            .bytes()
            .await
            .map_err(|err| ApiError::transport(&err))?;

        Ok(Download {
            bytes: bytes.to_vec(),
            content_type,
            content_disposition,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::storage::MemoryTokenStorage;

    fn client(server: &MockServer, token: Option<&str>) -> ApiClient {
        let storage: Arc<dyn TokenStorage> = match token {
            Some(t) => Arc::new(MemoryTokenStorage::with_token(t)),
            None => Arc::new(MemoryTokenStorage::new()),
        };
        ApiClient::new(server.uri(), DEFAULT_TIMEOUT, storage).unwrap()
    }

    #[tokio::test]
    async fn test_injects_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .and(header("authorization", "Bearer T"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let value: Value = client(&server, Some("T")).get_json("/api/ping").await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_401_emits_signal_and_keeps_storage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthenticated."})),
            )
            .mount(&server)
            .await;

        let client = client(&server, Some("stale"));
        let mut signals = client.subscribe();

        let err = client.get_json::<Value>("/api/auth/me").await.unwrap_err();
        let api = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api.status, Some(401));
        assert_eq!(api.message, "Unauthenticated.");

        assert_eq!(signals.try_recv().unwrap(), SessionSignal::Unauthenticated);
        assert_eq!(client.bearer_token().as_deref(), Some("stale"));
    }

    #[tokio::test]
    async fn test_empty_body_decodes_as_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let value: Value = client(&server, Some("T"))
            .post_empty("/api/auth/logout")
            .await
            .unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_malformed_body_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .get_json::<Vec<Value>>("/api/tags")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ApiError>().is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_has_no_status() {
        let storage: Arc<dyn TokenStorage> = Arc::new(MemoryTokenStorage::new());
        // Port 9 (discard) on localhost is not expected to accept connections.
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(2), storage).unwrap();
        let err = client.get_json::<Value>("/api/ping").await.unwrap_err();
        let api = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api.status, None);
    }
}
