//! In-memory transport for unit tests: records every request and answers from a closure.

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TadoClientError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, TadoClientError> + Send + Sync;

pub(crate) struct ScriptedTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub(crate) fn new(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, TadoClientError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_latency(Duration::ZERO, handler)
    }

    /// Every request sleeps `latency` (tokio time) before answering.
    pub(crate) fn with_latency(
        latency: Duration,
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, TadoClientError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(ScriptedTransport {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            latency,
        })
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&HttpRequest) -> bool) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| pred(r)).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, TadoClientError> {
        self.requests.lock().unwrap().push(req.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.handler)(&req)
    }
}

pub(crate) fn json_response(status: u16, body: serde_json::Value) -> Result<HttpResponse, TadoClientError> {
    Ok(HttpResponse {
        status,
        headers: HeaderMap::new(),
        body: body.to_string(),
    })
}

pub(crate) fn json_response_with_headers(
    status: u16,
    body: serde_json::Value,
    headers: &[(&'static str, &'static str)],
) -> Result<HttpResponse, TadoClientError> {
    let mut map = HeaderMap::new();
    for (k, v) in headers {
        map.insert(*k, HeaderValue::from_static(*v));
    }
    Ok(HttpResponse {
        status,
        headers: map,
        body: body.to_string(),
    })
}

pub(crate) fn is_device_authorize(req: &HttpRequest) -> bool {
    req.url.ends_with("/device_authorize")
}

pub(crate) fn is_grant(req: &HttpRequest, grant_type: &str) -> bool {
    req.url.ends_with("/token") && req.form_value("grant_type") == Some(grant_type)
}
