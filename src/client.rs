//! The resilient API client.
//!
//! [`ApiClient`] turns a logical "GET/POST/PUT/DELETE resource X" call into a
//! correctly authenticated, rate-limited, retried and (for collections)
//! paginated HTTP exchange. Every resource service goes through
//! [`ApiClient::execute`] or [`ApiClient::paginate`]; nothing else in the
//! crate touches the wire.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION, LINK, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::ApiError;
use crate::pagination::{parse_link_header, Page, PageStream};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = "lmcli";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 10.0;

/// Query parameter the server interprets as "act on behalf of this user".
/// Masquerading is privileged and audited server-side; the client's only job
/// is to attach the parameter whenever a target is configured.
pub const MASQUERADE_PARAMETER: &str = "as_user_id";

/// One logical request, built by a resource service and consumed once.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    headers: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter. Parameters keep their insertion order and
    /// may repeat (the API uses `include[]`-style repeated keys).
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
    as_user_id: Option<u64>,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

/// Builder for [`ApiClient`]. One client is constructed per process
/// invocation; the credential store is consulted by the factory, never here.
pub struct ClientBuilder {
    base_url: Url,
    access_token: String,
    requests_per_second: f64,
    as_user_id: Option<u64>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ClientBuilder {
    pub fn new(base_url: Url, access_token: impl Into<String>) -> Self {
        Self {
            base_url,
            access_token: access_token.into(),
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            as_user_id: None,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sustained request rate; zero or negative disables limiting.
    pub fn requests_per_second(mut self, rate: f64) -> Self {
        self.requests_per_second = rate;
        self
    }

    /// Masquerade as this user on every request. Only positive identifiers
    /// are meaningful.
    pub fn as_user_id(mut self, user_id: Option<u64>) -> Self {
        self.as_user_id = user_id.filter(|id| *id > 0);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(ApiError::network)?;

        // `Url::join` treats the last segment of a slashless path as a file
        // and replaces it; a base URL is always a directory.
        let mut base_url = self.base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                access_token: self.access_token,
                as_user_id: self.as_user_id,
                limiter: RateLimiter::new(self.requests_per_second),
                retry: self.retry,
            }),
        })
    }
}

/// The API client. Cloning is cheap; all clones share the same rate limiter.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn builder(base_url: Url, access_token: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url, access_token)
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Resolve a spec path against the base URL and attach query parameters.
    ///
    /// An absolute URL (a server-provided pagination link) is used verbatim
    /// apart from the masquerade parameter, which is appended whenever it is
    /// configured and not already present.
    fn build_url(&self, spec: &RequestSpec) -> Result<Url, ApiError> {
        let mut url = if spec.path.starts_with("http://") || spec.path.starts_with("https://") {
            Url::parse(&spec.path)
                .map_err(|e| ApiError::new(crate::error::ErrorKind::Unknown, e.to_string()))?
        } else {
            self.inner
                .base_url
                .join(spec.path.trim_start_matches('/'))
                .map_err(|e| ApiError::new(crate::error::ErrorKind::Unknown, e.to_string()))?
        };

        if !spec.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &spec.query {
                pairs.append_pair(name, value);
            }
        }

        if let Some(user_id) = self.inner.as_user_id {
            let already_present = url
                .query_pairs()
                .any(|(name, _)| name == MASQUERADE_PARAMETER);
            if !already_present {
                url.query_pairs_mut()
                    .append_pair(MASQUERADE_PARAMETER, &user_id.to_string());
            }
        }

        Ok(url)
    }

    /// Perform a single attempt: one token from the limiter, one send.
    async fn send_once(
        &self,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ApiError> {
        self.inner.limiter.acquire(cancel).await?;

        let url = self.build_url(spec)?;
        trace!(method = %spec.method, url = %url, "sending request");

        let mut request = self
            .inner
            .http
            .request(spec.method.clone(), url)
            .header(
                AUTHORIZATION,
                bearer_header(&self.inner.access_token)?,
            )
            .header(USER_AGENT, DEFAULT_USER_AGENT);

        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        let send = request.send();
        tokio::select! {
            _ = cancel.cancelled() => Err(ApiError::cancelled()),
            response = send => response.map_err(ApiError::network),
        }
    }

    /// Execute a request with rate limiting, classification and retry.
    ///
    /// Each attempt, including retries, consumes a fresh rate-limiter token.
    /// On exhaustion the caller receives the last classified error.
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ApiError> {
        let mut attempt: u32 = 1;

        loop {
            let error = match self.send_once(spec, cancel).await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => classify_response(response).await,
                Err(error) => error,
            };

            match self.inner.retry.next_delay(attempt, &error) {
                Some(delay) => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "request failed, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ApiError::cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                None => {
                    debug!(attempt, error = %error, "request failed");
                    return Err(error);
                }
            }
        }
    }

    /// Execute and decode the JSON response body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<T, ApiError> {
        let response = self.execute(spec, cancel).await?;
        response.json().await.map_err(ApiError::decode)
    }

    /// Execute a request where the response body is irrelevant.
    pub async fn execute_empty(
        &self,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        self.execute(spec, cancel).await.map(|_| ())
    }

    /// Fetch one collection page and the URL of the page after it.
    async fn fetch_page<T: DeserializeOwned>(
        &self,
        spec: &RequestSpec,
        cursor: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<Page<T>, ApiError> {
        // The first page uses the caller's spec; later pages follow the
        // server's own next link, which already carries the original query
        // (page size included). Extra headers do not travel in the link and
        // are re-applied to every page.
        let page_spec = match cursor {
            None => spec.clone(),
            Some(next_url) => {
                let mut next = RequestSpec::get(next_url);
                next.headers = spec.headers.clone();
                next
            }
        };

        let response = self.execute(&page_spec, cancel).await?;
        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(parse_link_header)
            .and_then(|relations| relations.next);

        let items: Vec<T> = response.json().await.map_err(ApiError::decode)?;
        Ok(Page { items, next })
    }

    /// Lazily iterate a collection across server-driven pages.
    ///
    /// Pages are fetched on demand, at most one ahead of consumption; each
    /// page fetch applies the same rate-limit/retry logic as [`execute`].
    ///
    /// [`execute`]: ApiClient::execute
    pub fn paginate<T>(&self, spec: RequestSpec, cancel: CancellationToken) -> PageStream<T>
    where
        T: DeserializeOwned + Unpin + Send + 'static,
    {
        let client = self.clone();
        PageStream::new(move |cursor| {
            let client = client.clone();
            let spec = spec.clone();
            let cancel = cancel.clone();
            Box::pin(async move { client.fetch_page(&spec, cursor, &cancel).await })
        })
    }
}

fn bearer_header(token: &str) -> Result<HeaderValue, ApiError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
        ApiError::new(
            crate::error::ErrorKind::Auth,
            "access token contains invalid header characters",
        )
    })?;
    value.set_sensitive(true);
    Ok(value)
}

/// Read the rate-limit hint and body of a failed response and classify it.
async fn classify_response(response: reqwest::Response) -> ApiError {
    let status = response.status();
    let retry_after = retry_after_hint(&response, status);
    let body = response.text().await.unwrap_or_default();
    ApiError::classify(status, &body, retry_after)
}

/// The server signals back-pressure with a `Retry-After` header carrying a
/// wait in integer seconds. Only honored where a retry is meaningful.
fn retry_after_hint(response: &reqwest::Response, status: StatusCode) -> Option<Duration> {
    if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
        return None;
    }
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
