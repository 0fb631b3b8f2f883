//! admin api transport: digest auth, error mapping, paging and retry.

use crate::digest::{Challenge, DigestSession};
use matlas_core::{Error, Result, Secret};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::{Position, Url};

pub const DEFAULT_BASE_URL: &str = "https://cloud.mongodb.com";
/// versioned media type sent with every request.
pub const API_MEDIA_TYPE: &str = "application/vnd.atlas.2023-02-01+json";
/// the search index endpoints only exist in a later api version.
pub const SEARCH_MEDIA_TYPE: &str = "application/vnd.atlas.2024-05-30+json";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(250);
const PAGE_SIZE: usize = 500;

/// connection settings for the admin api.
#[derive(Debug, Clone)]
pub struct AtlasConfig {
    pub base_url: String,
    pub public_key: String,
    pub private_key: Secret,
    pub max_attempts: u32,
    /// first retry delay, doubled on every further attempt.
    pub backoff: Duration,
    pub request_timeout: Duration,
}

impl AtlasConfig {
    pub fn new(public_key: impl Into<String>, private_key: Secret) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            public_key: public_key.into(),
            private_key,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// one admin api call, rebuilt for every attempt.
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    method: Method,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<Value>,
    media_type: &'static str,
}

impl ApiRequest {
    pub(crate) fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|segment| segment.to_string()).collect(),
            query: Vec::new(),
            body: None,
            media_type: API_MEDIA_TYPE,
        }
    }

    pub(crate) fn get(segments: &[&str]) -> Self {
        Self::new(Method::GET, segments)
    }

    pub(crate) fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub(crate) fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub(crate) fn media_type(mut self, media_type: &'static str) -> Self {
        self.media_type = media_type;
        self
    }

    fn label(&self) -> String {
        format!("{} /{}", self.method, self.segments.join("/"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// shared admin api client. cheap to share behind an `Arc`.
pub struct AtlasClient {
    http: reqwest::Client,
    base: Url,
    config: AtlasConfig,
    session: Mutex<Option<DigestSession>>,
}

impl AtlasClient {
    pub fn new(config: AtlasConfig) -> Result<Self> {
        if config.public_key.trim().is_empty() || config.private_key.expose().is_none() {
            return Err(Error::Unauthorized(
                "an api public and private key are required".to_string(),
            ));
        }
        let base = Url::parse(&config.base_url)
            .map_err(|err| Error::Validation(format!("invalid base url {}: {err}", config.base_url)))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("matlas/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| Error::Other(format!("build http client: {err}")))?;
        Ok(Self {
            http,
            base,
            config,
            session: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// run `op` with retry: only transient errors are retried, with
    /// exponential backoff; cancellation aborts at once.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.backoff;
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled(format!("{label}: cancelled"))),
                result = op() => result,
            };
            match result {
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(label, attempt, error = %err, "retrying admin api call");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(Error::Cancelled(format!("{label}: cancelled during backoff")))
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay *= 2;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// send a request with retry; `None` for empty responses.
    pub(crate) async fn call(
        &self,
        cancel: &CancellationToken,
        request: ApiRequest,
    ) -> Result<Option<Value>> {
        let label = request.label();
        self.execute(cancel, &label, || self.send(&request)).await
    }

    /// like [`call`](Self::call) but requires a response body.
    pub(crate) async fn fetch(&self, cancel: &CancellationToken, request: ApiRequest) -> Result<Value> {
        let label = request.label();
        self.call(cancel, request)
            .await?
            .ok_or_else(|| Error::Http(format!("{label}: empty response")))
    }

    /// every item of a paginated list endpoint.
    pub(crate) async fn list_all(
        &self,
        cancel: &CancellationToken,
        request: ApiRequest,
    ) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let paged = request
                .clone()
                .query("itemsPerPage", PAGE_SIZE)
                .query("pageNum", page);
            let body = self.call(cancel, paged).await?.unwrap_or(Value::Null);
            if let Value::Array(results) = body {
                items.extend(results);
                break;
            }
            let results = body
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let total = body.get("totalCount").and_then(Value::as_u64);
            let count = results.len();
            items.extend(results);
            match total {
                Some(total) if count > 0 && (items.len() as u64) < total => page += 1,
                _ => break,
            }
        }
        Ok(items)
    }

    fn url(&self, request: &ApiRequest) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Validation(format!("base url {} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(["api", "atlas", "v2"])
            .extend(&request.segments);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    fn session(&self) -> Result<MutexGuard<'_, Option<DigestSession>>> {
        self.session
            .lock()
            .map_err(|_| Error::Other("digest session lock poisoned".to_string()))
    }

    fn authorization(&self, method: &Method, url: &Url) -> Result<Option<String>> {
        let mut session = self.session()?;
        let Some(session) = session.as_mut() else {
            return Ok(None);
        };
        let password = self.config.private_key.expose().unwrap_or_default();
        Ok(Some(session.authorization(
            &self.config.public_key,
            password,
            method.as_str(),
            &url[Position::BeforePath..],
        )))
    }

    /// a single attempt, answering one digest challenge if the server
    /// rejects the cached one.
    async fn send(&self, request: &ApiRequest) -> Result<Option<Value>> {
        let url = self.url(request)?;
        let mut response = self
            .dispatch(request, &url, self.authorization(&request.method, &url)?)
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|value| value.to_str().ok())
                .and_then(Challenge::parse);
            if let Some(challenge) = challenge {
                debug!(realm = %challenge.realm, "answering digest challenge");
                *self.session()? = Some(DigestSession::new(challenge));
                response = self
                    .dispatch(request, &url, self.authorization(&request.method, &url)?)
                    .await?;
            }
        }

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| Error::Http(format!("decode response of {}: {err}", request.label())))
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        url: &Url,
        authorization: Option<String>,
    ) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .header(ACCEPT, request.media_type);
        if let Some(authorization) = authorization {
            let mut value = HeaderValue::from_str(&authorization)
                .map_err(|err| Error::Other(format!("invalid authorization header: {err}")))?;
            value.set_sensitive(true);
            builder = builder.header(AUTHORIZATION, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        debug!(method = %request.method, path = url.path(), "admin api request");
        builder.send().await.map_err(transport_error)
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::Transient(format!("admin api unreachable: {err}"))
    } else {
        Error::Http(format!("admin api request failed: {err}"))
    }
}

/// map an error response to the error taxonomy; `errorCode` wins over status.
pub(crate) fn classify(status: StatusCode, body: &str) -> Error {
    let parsed: Option<ApiError> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|err| err.error_code.clone())
        .unwrap_or_default();
    let detail = parsed
        .and_then(|err| err.detail.or(err.reason))
        .unwrap_or_else(|| body.trim().to_string());
    let message = if code.is_empty() {
        format!("HTTP {}: {detail}", status.as_u16())
    } else {
        format!("{code}: {detail}")
    };

    match code.as_str() {
        "TOO_MANY_REQUESTS" | "INTERNAL" | "UNEXPECTED_ERROR" => return Error::Transient(message),
        code if code.ends_with("NOT_FOUND") => return Error::NotFound(message),
        code if code.starts_with("DUPLICATE") || code.ends_with("ALREADY_EXISTS") => {
            return Error::Conflict(message)
        }
        _ => {}
    }
    match status.as_u16() {
        401 | 403 => Error::Unauthorized(message),
        404 => Error::NotFound(message),
        409 => Error::Conflict(message),
        429 | 500..=599 => Error::Transient(message),
        _ => Error::Http(message),
    }
}
