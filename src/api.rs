//! HTTP collaborator for the dashboard backend.
//!
//! DESIGN
//! ======
//! One cloneable [`ApiClient`] wraps a `reqwest::Client` with the base URL,
//! bearer token, timeout and read-retry budget from [`ClientConfig`]. List
//! controllers reach it through [`CollectionEndpoint`] and forms through
//! [`CommandEndpoint`], so neither depends on `reqwest` directly.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx responses become [`ApiError::Status`] carrying the backend's
//! `detail` message when the body has one. Reads retry transport failures
//! and 5xx responses with exponential backoff; commands are sent once.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::source::{CollectionSource, CommandSink, PageQuery};

/// Versioned path prefix shared by every endpoint.
pub const API_PREFIX: &str = "/api/v1";

const RETRY_BASE_MS: u64 = 1000;
const RETRY_CAP_MS: u64 = 30_000;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Transport failures and 5xx responses may succeed on a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Status { status, .. } => *status >= 500,
            Self::Transport(_) => true,
            Self::Decode(_) => false,
        }
    }
}

// =============================================================================
// ENDPOINTS
// =============================================================================

/// Collection endpoints backing the list screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Clients,
    ClientGroups,
    MyClientGroups,
    Plans,
    AvailablePlans,
    PlanInstances,
    Payments,
    Reservations,
    Visits,
    ActiveVisits,
    Organizations,
    Notifications,
}

impl Collection {
    pub const ALL: [Self; 12] = [
        Self::Clients,
        Self::ClientGroups,
        Self::MyClientGroups,
        Self::Plans,
        Self::AvailablePlans,
        Self::PlanInstances,
        Self::Payments,
        Self::Reservations,
        Self::Visits,
        Self::ActiveVisits,
        Self::Organizations,
        Self::Notifications,
    ];

    /// Path below [`API_PREFIX`].
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Clients => "/admin/clients",
            Self::ClientGroups => "/admin/client-groups",
            Self::MyClientGroups => "/clients/groups/my-groups",
            Self::Plans => "/admin/plans",
            Self::AvailablePlans => "/clients/plans/available-plans",
            Self::PlanInstances => "/clients/plans/plan-instances",
            Self::Payments => "/admin/all-payments",
            Self::Reservations => "/admin/all-reservations",
            Self::Visits => "/admin/all-visits",
            Self::ActiveVisits => "/admin/all-active-visits",
            Self::Organizations => "/organizations/",
            Self::Notifications => "/admin/notifications",
        }
    }

    /// First segment of this collection's cache keys.
    #[must_use]
    pub fn cache_name(self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::ClientGroups => "client_groups",
            Self::MyClientGroups => "my_client_groups",
            Self::Plans => "plans",
            Self::AvailablePlans => "available_plans",
            Self::PlanInstances => "client_plans",
            Self::Payments => "payments",
            Self::Reservations => "reservations",
            Self::Visits => "visits",
            Self::ActiveVisits => "active_visits",
            Self::Organizations => "organizations",
            Self::Notifications => "notifications",
        }
    }

    /// Lookup by cache name or by the kebab/snake spelling used on the CLI.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().replace('-', "_");
        Self::ALL.into_iter().find(|collection| {
            collection.cache_name() == name || format!("{collection:?}").eq_ignore_ascii_case(&name.replace('_', ""))
        })
    }
}

/// Command endpoint paths below [`API_PREFIX`].
pub mod commands {
    use super::Uuid;

    pub const REGISTER_CLIENT: &str = "/clients/management/register";
    pub const REGISTER_CHILD: &str = "/clients/management/register/child";
    pub const CREATE_PLAN: &str = "/admin/plans";
    pub const CREATE_PAYMENT: &str = "/clients/plans/payments";
    pub const CREATE_RESERVATION: &str = "/clients/plans/reservations";
    pub const CREATE_PLAN_INSTANCE: &str = "/clients/plans/plan-instances";
    /// Query parameters `client_id`, `check_in`.
    pub const CHECK_IN: &str = "/admin/visits/check-in";
    /// `GET` with query parameters `client_id`, `qr_code_id`.
    pub const CHECK_QR: &str = "/admin/check-qr";
    pub const CREATE_NOTIFICATION: &str = "/admin/notifications";
    pub const START_CHAT: &str = "/processing/chats/project_starter";
    pub const PARK_ENTRY: &str = "/clients/park-entries";

    #[must_use]
    pub fn update_plan(plan_id: Uuid) -> String {
        format!("/admin/plans/{plan_id}")
    }

    #[must_use]
    pub fn resend_notification(notification_id: Uuid) -> String {
        format!("/admin/notifications/{notification_id}/resend")
    }
}

/// How a command's payload travels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadEncoding {
    #[default]
    Json,
    /// URL query parameters.
    Query,
    /// No body; the path carries everything.
    Empty,
}

const HEALTH_CHECK: &str = "/utils/health-check/";

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    fetch_retries: u32,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| ApiError::Transport(format!("invalid API token: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            fetch_retries: config.fetch_retries,
        })
    }

    /// Absolute URL for an endpoint path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    /// `GET path?skip=&limit=&filters...` for one page, with read retries.
    ///
    /// # Errors
    ///
    /// Returns the last [`ApiError`] once retries are exhausted.
    pub async fn list<T: DeserializeOwned>(&self, collection: Collection, query: &PageQuery) -> Result<Vec<T>, ApiError> {
        let pairs = query.pairs();
        tracing::debug!(collection = collection.cache_name(), skip = query.skip, limit = query.limit, "fetching page");
        with_retries(self.fetch_retries, collection.path(), || self.get_once(collection.path(), &pairs)).await
    }

    /// JSON command, sent once.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] for non-2xx responses and transport or
    /// decode errors otherwise.
    pub async fn send<P, R>(&self, method: Method, path: &str, payload: &P) -> Result<R, ApiError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send_encoded(method, path, payload, PayloadEncoding::Json).await
    }

    /// Command with the payload carried as `encoding` says, sent once.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_encoded<P, R>(&self, method: Method, path: &str, payload: &P, encoding: PayloadEncoding) -> Result<R, ApiError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tracing::debug!(%method, %path, ?encoding, "sending command");
        let request = self.http.request(method, self.url(path));
        let request = match encoding {
            PayloadEncoding::Json => request.json(payload),
            PayloadEncoding::Query => request.query(payload),
            PayloadEncoding::Empty => request,
        };
        let response = request.send().await?;
        decode_response(response).await
    }

    /// `GET /utils/health-check/`.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unreachable or unhealthy.
    pub async fn health_check(&self) -> Result<Value, ApiError> {
        let response = self.http.get(self.url(HEALTH_CHECK)).send().await?;
        decode_response(response).await
    }

    /// [`CollectionSource`] over `collection`.
    #[must_use]
    pub fn collection<T>(&self, collection: Collection) -> CollectionEndpoint<T> {
        CollectionEndpoint { client: self.clone(), collection, _record: PhantomData }
    }

    /// [`CommandSink`] sending `method path`.
    #[must_use]
    pub fn command<P, R>(&self, method: Method, path: impl Into<String>) -> CommandEndpoint<P, R> {
        CommandEndpoint {
            client: self.clone(),
            method,
            path: path.into(),
            encoding: PayloadEncoding::Json,
            _types: PhantomData,
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, path: &str, pairs: &[(String, String)]) -> Result<T, ApiError> {
        let response = self.http.get(self.url(path)).query(pairs).send().await?;
        decode_response(response).await
    }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let fallback = status.canonical_reason().unwrap_or("request failed");
        return Err(ApiError::Status { status: status.as_u16(), message: error_message(&body, fallback) });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Message from a `{"detail": ...}` error body: a string as-is, a validation
/// list as `loc: msg` pairs, anything else as compact JSON. Bodies without
/// `detail` fall back to their trimmed text, then to `fallback`.
#[must_use]
pub fn error_message(body: &str, fallback: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        return if trimmed.is_empty() { fallback.to_owned() } else { trimmed.to_owned() };
    };
    match value.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        Some(Value::Array(items)) => items.iter().map(validation_item).collect::<Vec<_>>().join("; "),
        Some(other) => other.to_string(),
        None => value.to_string(),
    }
}

fn validation_item(item: &Value) -> String {
    let msg = item.get("msg").and_then(Value::as_str).map_or_else(|| item.to_string(), str::to_owned);
    let field = item
        .get("loc")
        .and_then(Value::as_array)
        .and_then(|loc| loc.last())
        .map(|last| match last {
            Value::String(name) => name.clone(),
            other => other.to_string(),
        });
    match field {
        Some(field) => format!("{field}: {msg}"),
        None => msg,
    }
}

/// Delay before retry number `attempt` (zero-based): `min(1s * 2^attempt, 30s)`.
#[must_use]
pub fn retry_delay(attempt: u32) -> Duration {
    let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(RETRY_BASE_MS.saturating_mul(factor).min(RETRY_CAP_MS))
}

/// Run `op` until it succeeds, fails with a non-retryable error, or has been
/// retried `retries` times.
pub(crate) async fn with_retries<T, F, Fut>(retries: u32, path: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < retries => {
                let delay = retry_delay(attempt);
                tracing::warn!(%path, attempt, delay_ms = delay.as_millis(), error = %err, "read failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

// =============================================================================
// SOURCE / SINK ADAPTERS
// =============================================================================

/// One collection endpoint as a [`CollectionSource`].
#[derive(Debug)]
pub struct CollectionEndpoint<T> {
    client: ApiClient,
    collection: Collection,
    _record: PhantomData<fn() -> T>,
}

impl<T> CollectionEndpoint<T> {
    #[must_use]
    pub fn collection(&self) -> Collection {
        self.collection
    }
}

impl<T> Clone for CollectionEndpoint<T> {
    fn clone(&self) -> Self {
        Self { client: self.client.clone(), collection: self.collection, _record: PhantomData }
    }
}

#[async_trait::async_trait]
impl<T> CollectionSource<T> for CollectionEndpoint<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<T>, ApiError> {
        self.client.list(self.collection, query).await
    }
}

/// One command endpoint as a [`CommandSink`].
#[derive(Debug)]
pub struct CommandEndpoint<P, R> {
    client: ApiClient,
    method: Method,
    path: String,
    encoding: PayloadEncoding,
    _types: PhantomData<fn(P) -> R>,
}

impl<P, R> CommandEndpoint<P, R> {
    /// Send the payload as query parameters or not at all.
    #[must_use]
    pub fn with_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn encoding(&self) -> PayloadEncoding {
        self.encoding
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl<P, R> Clone for CommandEndpoint<P, R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            method: self.method.clone(),
            path: self.path.clone(),
            encoding: self.encoding,
            _types: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<P, R> CommandSink<P, R> for CommandEndpoint<P, R>
where
    P: Serialize + Send + Sync + 'static,
    R: DeserializeOwned + Send + 'static,
{
    async fn submit(&self, payload: &P) -> Result<R, ApiError> {
        self.client.send_encoded(self.method.clone(), &self.path, payload, self.encoding).await
    }
}
