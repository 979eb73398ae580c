//! reqwest-backed accessor. Injects the Slurm JWT headers; no retries.

use std::time::{Duration, Instant};

use slurmrest_core::{SlurmError, SlurmResult};
use tracing::debug;

use crate::{Method, WireAccessor, WireRequest, WireResponse};

pub const USER_HEADER: &str = "X-SLURM-USER-NAME";
pub const TOKEN_HEADER: &str = "X-SLURM-USER-TOKEN";

#[derive(Clone)]
pub struct HttpAccessor {
    client: reqwest::Client,
    base_url: String,
    user: Option<String>,
    token: Option<String>,
}

impl std::fmt::Debug for HttpAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAccessor")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpAccessor {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> SlurmResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SlurmError::Validation(format!("base URL must be http(s): {base_url:?}")));
        }
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().map_err(|e| SlurmError::transport(None, e.to_string()))?;
        Ok(Self { client, base_url, user: None, token: None })
    }

    pub fn with_auth(mut self, user: Option<String>, token: Option<String>) -> Self {
        self.user = user.filter(|s| !s.is_empty());
        self.token = token.filter(|s| !s.is_empty());
        self
    }

    pub fn base_url(&self) -> &str { &self.base_url }
}

fn transport(e: reqwest::Error) -> SlurmError {
    if e.is_timeout() {
        return SlurmError::transport(None, format!("request timed out: {e}"));
    }
    SlurmError::transport(e.status().map(|s| s.as_u16()), e.to_string())
}

#[async_trait::async_trait]
impl WireAccessor for HttpAccessor {
    async fn call(&self, req: WireRequest) -> SlurmResult<WireResponse> {
        let t0 = Instant::now();
        let url = format!("{}{}", self.base_url, req.path);
        let method = match req.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut rb = self.client.request(method, &url).query(&req.query);
        if let Some(user) = &self.user {
            rb = rb.header(USER_HEADER, user);
        }
        if let Some(token) = &self.token {
            rb = rb.header(TOKEN_HEADER, token);
        }
        if let Some(body) = &req.body {
            rb = rb.json(body);
        }
        let resp = rb.send().await.map_err(transport)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(transport)?;
        debug!(method = %req.method, url = %url, status, bytes = body.len(), took_ms = %t0.elapsed().as_millis(), "http: response");
        Ok(WireResponse { status, body })
    }
}
