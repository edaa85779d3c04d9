//! HTTP transport used by the token manager and the endpoint layer.
//!
//! - `HttpTransport` is the seam: one request in, one response out.
//! - Every HTTP answer comes back as an `HttpResponse`, whatever its status, so callers can
//!   read headers off error responses too. `error_for_status` then turns non-2xx into
//!   `TadoClientError::Http`; connection failures are `TadoClientError::Transport`.
//! - `UreqTransport` is the production implementation. `ureq` is blocking, so each request
//!   runs on tokio's blocking pool.

use async_trait::async_trait;
use http::{HeaderMap, Method};
use std::time::Duration;

use crate::error::TadoClientError;

const USER_AGENT: &str = concat!("tado-client/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

impl RequestBody {
    fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Form(_) => "application/x-www-form-urlencoded",
            RequestBody::Json(_) => "application/json",
        }
    }

    fn encode(&self) -> Result<Vec<u8>, TadoClientError> {
        match self {
            RequestBody::Form(pairs) => Ok(pairs
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&")
                .into_bytes()),
            RequestBody::Json(value) => Ok(serde_json::to_vec(value)?),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        HttpRequest {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn form<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let pairs = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.body = Some(RequestBody::Form(pairs));
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    /// Look up a form field, if the body is a form.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        match &self.body {
            Some(RequestBody::Form(pairs)) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    /// Turn a non-2xx response into `TadoClientError::Http`.
    pub fn error_for_status(self) -> Result<Self, TadoClientError> {
        if (200..300).contains(&self.status) {
            Ok(self)
        } else {
            let message = if self.body.trim().is_empty() {
                String::from("<no body>")
            } else {
                self.body
            };
            Err(TadoClientError::Http {
                status: self.status,
                message,
            })
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform exactly one request. No retries at this layer.
    ///
    /// `Err` only when no response was received; non-2xx statuses are returned as `Ok`.
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, TadoClientError>;
}

#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        UreqTransport {
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn execute(agent: &ureq::Agent, req: HttpRequest) -> Result<HttpResponse, TadoClientError> {
        let mut builder = http::Request::builder()
            .method(req.method.clone())
            .uri(req.url.as_str())
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let sent = match &req.body {
            Some(body) => {
                let request = builder
                    .header("Content-Type", body.content_type())
                    .body(body.encode()?)
                    .map_err(|e| TadoClientError::Transport(format!("invalid request: {}", e)))?;
                agent.run(request)
            }
            None => {
                let request = builder
                    .body(())
                    .map_err(|e| TadoClientError::Transport(format!("invalid request: {}", e)))?;
                agent.run(request)
            }
        };

        let mut resp = sent.map_err(|e| TadoClientError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| TadoClientError::Transport(format!("reading body failed: {}", e)))?;

        log::debug!("{} {} -> {}", req.method, req.url, status);
        Ok(HttpResponse { status, headers, body })
    }
}

#[async_trait]
impl HttpTransport for UreqTransport {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, TadoClientError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || Self::execute(&agent, req))
            .await
            .map_err(|e| TadoClientError::Transport(format!("request task failed: {}", e)))?
    }
}
