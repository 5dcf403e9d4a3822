//! Upstream REST client shared by all SaaS adapters.
//!
//! One [`RestClient`] per adapter owns the base URL, auth and default headers. Each tool method
//! builds an [`ApiRequest`], which issues exactly one HTTP request. The exception is
//! [`Auth::OAuth`], where a 401 triggers a single refresh-and-retry.

use crate::error::{AdapterError, Result};
use crate::token::TokenGuard;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// How requests authenticate against the upstream.
#[derive(Clone)]
pub enum Auth {
    None,
    Bearer(String),
    /// Static API-key header, e.g. `X-Figma-Token: <key>`.
    Header { name: String, value: String },
    Basic {
        username: String,
        password: String,
    },
    /// Dynamically refreshed bearer token.
    OAuth(Arc<TokenGuard>),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::Header { name, .. } => write!(f, "Header({name})"),
            Self::Basic { username, .. } => write!(f, "Basic({username})"),
            Self::OAuth(_) => f.write_str("OAuth"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

#[derive(Debug)]
struct RestClientInner {
    base_url: Url,
    http: Client,
    auth: Auth,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

pub struct RestClientBuilder {
    base_url: String,
    http: Option<Client>,
    auth: Auth,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl RestClientBuilder {
    #[must_use]
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reuse an existing `reqwest::Client` (e.g. one shared with a token fetcher).
    #[must_use]
    pub fn client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the base URL does not parse or the HTTP client cannot
    /// be built.
    pub fn build(self) -> Result<RestClient> {
        let base_url = Url::parse(&self.base_url).map_err(|e| {
            AdapterError::Config(format!("Invalid base URL '{}': {e}", self.base_url))
        })?;
        let http = match self.http {
            Some(c) => c,
            None => default_http_client()?,
        };
        Ok(RestClient {
            inner: Arc::new(RestClientInner {
                base_url,
                http,
                auth: self.auth,
                headers: self.headers,
                timeout: self.timeout,
            }),
        })
    }
}

/// A `reqwest::Client` with the adapters' user agent.
///
/// # Errors
///
/// Returns [`AdapterError::Config`] if the TLS backend cannot be initialized.
pub fn default_http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("toolbridge/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AdapterError::Config(format!("failed to build HTTP client: {e}")))
}

impl RestClient {
    pub fn builder(base_url: impl Into<String>) -> RestClientBuilder {
        RestClientBuilder {
            base_url: base_url.into(),
            http: None,
            auth: Auth::None,
            headers: Vec::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    #[must_use]
    pub fn http(&self) -> &Client {
        &self.inner.http
    }

    pub fn request(&self, method: Method, path: impl Into<String>) -> ApiRequest<'_> {
        ApiRequest {
            client: self,
            method,
            base: None,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::None,
            bearer: None,
        }
    }

    /// Like [`RestClient::request`], but against a different base URL (e.g. a per-login
    /// instance URL).
    pub fn request_at(
        &self,
        base: impl Into<String>,
        method: Method,
        path: impl Into<String>,
    ) -> ApiRequest<'_> {
        let mut req = self.request(method, path);
        req.base = Some(base.into());
        req
    }

    pub fn get(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::DELETE, path)
    }
}

enum Body {
    None,
    Json(std::result::Result<Value, serde_json::Error>),
    Form(Vec<(String, String)>),
}

#[must_use = "requests do nothing until `send` is awaited"]
pub struct ApiRequest<'a> {
    client: &'a RestClient,
    method: Method,
    base: Option<String>,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Body,
    bearer: Option<String>,
}

impl ApiRequest<'_> {
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a query parameter only when a value is present.
    pub fn query_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// JSON body. Serialization errors surface from [`ApiRequest::send`].
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.body = Body::Json(serde_json::to_value(body));
        self
    }

    /// `application/x-www-form-urlencoded` body.
    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = Body::Form(pairs);
        self
    }

    /// Override the client's auth with a specific bearer token for this request.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn url(&self) -> Result<Url> {
        let base = self
            .base
            .as_deref()
            .unwrap_or_else(|| self.client.inner.base_url.as_str());
        let path = if self.path.starts_with('/') || self.path.is_empty() {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        let mut url = Url::parse(&format!("{}{}", base.trim_end_matches('/'), path))
            .map_err(|e| AdapterError::Internal(format!("Invalid URL: {e}")))?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// Send the request and decode the response body.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::Upstream`] for non-2xx responses
    /// - [`AdapterError::Transport`] for network failures
    /// - [`AdapterError::Authentication`] if an OAuth token cannot be acquired
    pub async fn send(self) -> Result<Value> {
        let url = self.url()?;
        let json_body = match &self.body {
            Body::Json(Ok(v)) => Some(v),
            Body::Json(Err(e)) => {
                return Err(AdapterError::Internal(format!(
                    "failed to serialize request body: {e}"
                )));
            }
            _ => None,
        };
        let inner = &self.client.inner;
        let mut retried = false;

        loop {
            let oauth = match (&inner.auth, &self.bearer) {
                (Auth::OAuth(guard), None) => Some((guard, guard.bearer().await?)),
                _ => None,
            };

            let mut request = inner.http.request(self.method.clone(), url.clone());
            request = match (&self.bearer, &oauth) {
                (Some(token), _) | (None, Some((_, token))) => request.bearer_auth(token),
                (None, None) => apply_auth(&inner.auth, request),
            };
            for (k, v) in inner.headers.iter().chain(&self.headers) {
                request = request.header(k, v);
            }
            request = match (&self.body, json_body) {
                (_, Some(v)) => request.json(v),
                (Body::Form(pairs), _) => request.form(pairs),
                _ => request,
            };
            if let Some(t) = inner.timeout {
                request = request.timeout(t);
            }

            debug!(method = %self.method, url = %redact_url(&url), "upstream request");
            let response = request
                .send()
                .await
                .map_err(|e| AdapterError::Transport(sanitize_reqwest_error(&e)))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED
                && !retried
                && let Some((guard, token)) = &oauth
            {
                info!(url = %redact_url(&url), "upstream rejected access token; refreshing and retrying once");
                guard.invalidate(token).await;
                retried = true;
                continue;
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| AdapterError::Transport(sanitize_reqwest_error(&e)))?;
            return decode_response(status, &bytes);
        }
    }
}

fn apply_auth(auth: &Auth, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match auth {
        Auth::Bearer(token) => request.bearer_auth(token),
        Auth::Header { name, value } => request.header(name, value),
        Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
        Auth::None | Auth::OAuth(_) => request,
    }
}

fn decode_response(status: StatusCode, bytes: &[u8]) -> Result<Value> {
    let body = parse_body(bytes);
    if status.is_success() {
        Ok(body)
    } else {
        Err(AdapterError::Upstream {
            status: status.as_u16(),
            message: upstream_message(&body),
        })
    }
}

/// Empty → `null`, JSON → parsed value, anything else → a JSON string.
#[must_use]
pub fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Pull a human-readable message out of an upstream error body.
///
/// Understands the shapes used by the supported APIs (`message`, `error_description`,
/// Jira's `errorMessages`/`errors`, `error.message`, `err`, Salesforce's `[{message}]`), and
/// falls back to the serialized body.
#[must_use]
pub fn upstream_message(body: &Value) -> String {
    match body {
        Value::Null => "empty response body".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let joined = join_messages(items);
            if joined.is_empty() {
                body.to_string()
            } else {
                joined
            }
        }
        Value::Object(obj) => {
            for key in ["message", "error_description", "err"] {
                if let Some(s) = obj.get(key).and_then(Value::as_str)
                    && !s.is_empty()
                {
                    return s.to_string();
                }
            }

            let mut parts: Vec<String> = obj
                .get("errorMessages")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if let Some(errors) = obj.get("errors").and_then(Value::as_object) {
                parts.extend(errors.iter().map(|(k, v)| match v.as_str() {
                    Some(s) => format!("{k}: {s}"),
                    None => format!("{k}: {v}"),
                }));
            }
            if !parts.is_empty() {
                return parts.join("; ");
            }

            match obj.get("error") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Object(e)) => e
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| body.to_string(), str::to_string),
                _ => body.to_string(),
            }
        }
        other => other.to_string(),
    }
}

fn join_messages(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|i| i.get("message").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Percent-encode a caller-supplied identifier for use as one URL path segment.
#[must_use]
pub fn path_segment(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    // A bare `.` or `..` would be collapsed by URL normalization.
    if s == "." || s == ".." {
        return s.replace('.', "%2E");
    }
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b':' | b'@') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    // Best-effort: drop credentials + query + fragment.
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}
