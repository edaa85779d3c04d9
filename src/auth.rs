//! Token lifecycle for the tado° API.
//!
//! - First login uses the OAuth device-code flow: the caller gets a verification URL
//!   right away plus a `PendingLogin` future that resolves once the user approves.
//! - A stored refresh token can skip the device flow entirely.
//! - `get_valid_token` refreshes lazily when the access token expired. It runs inside a
//!   single-permit `Semaphore`, so N concurrent callers cause exactly one refresh and all
//!   observe the same new credential.
//! - A rejected refresh token surfaces as `InvalidRefreshToken`; there is no automatic relogin.

use chrono::{DateTime, TimeDelta, Utc};
use core::fmt;
use http::{HeaderMap, Method};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{TadoClientError, decode_json};
use crate::ratelimit::RateLimit;
use crate::semaphore::Semaphore;
use crate::transport::{HttpRequest, HttpTransport};

pub const DEFAULT_AUTH_BASE_URL: &str = "https://login.tado.com/oauth2";
pub const OAUTH_CLIENT_ID: &str = "1bb50063-6b0c-4d11-bd99-387f4a91cc46";
pub const OAUTH_SCOPE: &str = "offline_access";
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const REFRESH_GRANT_TYPE: &str = "refresh_token";

/// Subtracted from every reported token lifetime so a token never expires mid-request.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(5);
/// RFC 8628 default when the server omits `interval`.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Observer called after every successful login or refresh.
pub type TokenCallback = Arc<dyn Fn(&Credential) + Send + Sync>;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Already includes `EXPIRY_MARGIN`.
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &mask(&self.access_token))
            .field("refresh_token", &mask(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn mask(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("{}***", prefix)
}

/// What the user needs to approve this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceVerification {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub interval: Duration,
    pub expires_in: Duration,
}

#[derive(Deserialize)]
struct DeviceAuthorizeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
    expires_in: u64,
}

impl From<DeviceAuthorizeResponse> for DeviceVerification {
    fn from(r: DeviceAuthorizeResponse) -> Self {
        let verification_uri_complete = r
            .verification_uri_complete
            .unwrap_or_else(|| format!("{}?user_code={}", r.verification_uri, urlencoding::encode(&r.user_code)));
        // a zero interval would hammer the token endpoint
        let interval = r.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS).max(1);
        DeviceVerification {
            device_code: r.device_code,
            user_code: r.user_code,
            verification_uri: r.verification_uri,
            verification_uri_complete,
            interval: Duration::from_secs(interval),
            expires_in: Duration::from_secs(r.expires_in),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u32,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// `previous_refresh` is kept when the server does not rotate the refresh token.
    fn into_credential(self, previous_refresh: Option<&str>) -> Result<Credential, TadoClientError> {
        let refresh_token = match (self.refresh_token, previous_refresh) {
            (Some(new), _) if !new.is_empty() => new,
            (_, Some(old)) => old.to_string(),
            _ => return Err(TadoClientError::Auth("token response without refresh_token".into())),
        };
        let margin = EXPIRY_MARGIN.as_secs() as i64;
        Ok(Credential {
            access_token: self.access_token,
            refresh_token,
            expires_at: Utc::now() + TimeDelta::seconds(i64::from(self.expires_in) - margin),
        })
    }
}

/// Resolves once the login started by `TokenManager::authenticate` completes.
#[must_use = "the login result is only observable by awaiting this"]
pub struct PendingLogin {
    rx: oneshot::Receiver<Result<Credential, TadoClientError>>,
}

impl PendingLogin {
    fn ready(credential: Credential) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(credential));
        PendingLogin { rx }
    }
}

impl Future for PendingLogin {
    type Output = Result<Credential, TadoClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.unwrap_or_else(|_| Err(TadoClientError::Auth("device login task ended without a result".into())))
        })
    }
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    device_authorize_url: String,
    token_url: String,
    lock: Semaphore,
    credential: Mutex<Option<Credential>>,
    callback: Mutex<Option<TokenCallback>>,
    rate_limit: Mutex<Option<RateLimit>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the credential of one authenticated session. Clones share the same state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.inner.token_url)
            .field("credential", &*lock(&self.inner.credential))
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_auth_base_url(transport, DEFAULT_AUTH_BASE_URL)
    }

    /// `auth_base_url` hosts `/device_authorize` and `/token`.
    pub fn with_auth_base_url(transport: Arc<dyn HttpTransport>, auth_base_url: &str) -> Self {
        let base = auth_base_url.trim_end_matches('/');
        TokenManager {
            inner: Arc::new(Inner {
                transport,
                device_authorize_url: format!("{}/device_authorize", base),
                token_url: format!("{}/token", base),
                lock: Semaphore::new(1),
                credential: Mutex::new(None),
                callback: Mutex::new(None),
                rate_limit: Mutex::new(None),
            }),
        }
    }

    /// Log in, silently with `refresh_token` when possible, otherwise via the device flow.
    ///
    /// Returns the verification payload (only for the device flow) and a future resolving to
    /// the new credential. The device login is polled until approved or until
    /// `min(timeout, expires_in)` elapsed, whichever comes first.
    pub async fn authenticate(
        &self,
        refresh_token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<(Option<DeviceVerification>, PendingLogin), TadoClientError> {
        if let Some(refresh) = refresh_token.map(str::trim).filter(|t| !t.is_empty()) {
            match self.inner.exchange_refresh_token(refresh).await {
                Ok(credential) => {
                    self.inner.store(credential.clone()).await?;
                    info!("Authenticated with refresh token");
                    return Ok((None, PendingLogin::ready(credential)));
                }
                Err(e) => warn!("Refresh token login failed, falling back to device login: {}", e),
            }
        }

        let verification = self.inner.request_device_code().await?;
        let budget = match timeout {
            Some(t) => t.min(verification.expires_in),
            None => verification.expires_in,
        };
        info!(
            "Device login started (user_code={}, interval={}s, budget={}s)",
            verification.user_code,
            verification.interval.as_secs(),
            budget.as_secs()
        );

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let polled = verification.clone();
        tokio::spawn(async move {
            let result = inner.poll_device_login(&polled, budget).await;
            // nobody listening is fine; the credential is stored either way
            let _ = tx.send(result);
        });

        Ok((Some(verification), PendingLogin { rx }))
    }

    /// A credential valid right now, refreshing it first if it expired.
    pub async fn get_valid_token(&self) -> Result<Credential, TadoClientError> {
        let _permit = self.inner.lock.acquire().await?;

        let current = lock(&self.inner.credential)
            .clone()
            .ok_or(TadoClientError::NotAuthenticated)?;
        if !current.is_expired() {
            return Ok(current);
        }

        debug!("Access token expired at {}; refreshing", current.expires_at);
        let refreshed = match self.inner.exchange_refresh_token(&current.refresh_token).await {
            Ok(c) => c,
            Err(TadoClientError::Http { status, message }) => {
                warn!("Refresh token rejected (http {}): {}", status, message);
                return Err(TadoClientError::InvalidRefreshToken);
            }
            Err(e) => return Err(e),
        };
        self.inner.commit(refreshed.clone());
        Ok(refreshed)
    }

    /// Replace the observer. `None` disables notifications.
    pub fn set_token_callback(&self, callback: Option<TokenCallback>) {
        *lock(&self.inner.callback) = callback;
    }

    /// Last known credential, valid or not.
    pub fn get_token(&self) -> Option<Credential> {
        lock(&self.inner.credential).clone()
    }

    /// Last rate-limit snapshot seen on an API response.
    pub fn get_rate_limit(&self) -> Option<RateLimit> {
        *lock(&self.inner.rate_limit)
    }

    /// Resume a session from a previously saved credential. Does not notify the callback.
    pub async fn restore(&self, credential: Credential) -> Result<(), TadoClientError> {
        let _permit = self.inner.lock.acquire().await?;
        *lock(&self.inner.credential) = Some(credential);
        Ok(())
    }

    /// Record rate-limit headers from a response. Responses without them leave the snapshot as is.
    pub fn observe_rate_limit(&self, headers: &HeaderMap) {
        if let Some(limit) = RateLimit::from_headers(headers) {
            *lock(&self.inner.rate_limit) = Some(limit);
        }
    }

    /// Reject every caller currently queued in `get_valid_token`. Teardown only.
    pub fn cancel_pending(&self) -> usize {
        self.inner.lock.purge()
    }
}

impl Inner {
    /// Store under the lock and notify.
    async fn store(&self, credential: Credential) -> Result<(), TadoClientError> {
        let _permit = self.lock.acquire().await?;
        self.commit(credential);
        Ok(())
    }

    /// Caller must hold the semaphore permit.
    fn commit(&self, credential: Credential) {
        debug!("New access token valid until {}", credential.expires_at);
        *lock(&self.credential) = Some(credential.clone());
        let callback = lock(&self.callback).clone();
        if let Some(cb) = callback {
            cb(&credential);
        }
    }

    async fn request_device_code(&self) -> Result<DeviceVerification, TadoClientError> {
        let req = HttpRequest::new(Method::POST, self.device_authorize_url.as_str())
            .form([("client_id", OAUTH_CLIENT_ID), ("scope", OAUTH_SCOPE)]);
        let resp = self.transport.request(req).await?.error_for_status()?;
        let payload: DeviceAuthorizeResponse = decode_json(&resp.body)?;
        Ok(payload.into())
    }

    async fn exchange_device_code(&self, device_code: &str) -> Result<Credential, TadoClientError> {
        let req = HttpRequest::new(Method::POST, self.token_url.as_str()).form([
            ("client_id", OAUTH_CLIENT_ID),
            ("device_code", device_code),
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
        ]);
        let resp = self.transport.request(req).await?.error_for_status()?;
        decode_json::<TokenResponse>(&resp.body)?.into_credential(None)
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<Credential, TadoClientError> {
        let req = HttpRequest::new(Method::POST, self.token_url.as_str()).form([
            ("client_id", OAUTH_CLIENT_ID),
            ("grant_type", REFRESH_GRANT_TYPE),
            ("refresh_token", refresh_token),
        ]);
        let resp = self.transport.request(req).await?.error_for_status()?;
        decode_json::<TokenResponse>(&resp.body)?.into_credential(Some(refresh_token))
    }

    async fn poll_device_login(
        &self,
        verification: &DeviceVerification,
        budget: Duration,
    ) -> Result<Credential, TadoClientError> {
        let started = tokio::time::Instant::now();
        loop {
            tokio::time::sleep(verification.interval).await;
            if started.elapsed() >= budget {
                warn!("Device login not approved within {}s", budget.as_secs());
                return Err(TadoClientError::AuthTimeout);
            }
            match self.exchange_device_code(&verification.device_code).await {
                Ok(credential) => {
                    self.store(credential.clone()).await?;
                    info!("Device login approved");
                    return Ok(credential);
                }
                // 2xx with an unusable payload: approved, retrying cannot help
                Err(e @ (TadoClientError::Auth(_) | TadoClientError::Json { .. })) => {
                    warn!("Device login approved but token response unusable: {}", e);
                    return Err(e);
                }
                Err(e) => debug!("Device login still pending: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        ScriptedTransport, is_device_authorize, is_grant, json_response, json_response_with_headers,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const AUTH_BASE: &str = "https://login.example.test/oauth2";

    fn manager(transport: Arc<ScriptedTransport>) -> TokenManager {
        TokenManager::with_auth_base_url(transport, AUTH_BASE)
    }

    fn credential(access: &str, expires_at: DateTime<Utc>) -> Credential {
        Credential {
            access_token: access.to_string(),
            refresh_token: format!("refresh-{access}"),
            expires_at,
        }
    }

    fn token_body(access: &str, refresh: &str, expires_in: u32) -> serde_json::Value {
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": expires_in,
            "token_type": "Bearer",
            "scope": "offline_access",
        })
    }

    fn device_body(interval: u64, expires_in: u64) -> serde_json::Value {
        json!({
            "device_code": "dev-123",
            "user_code": "ABC123",
            "verification_uri": "https://login.example.test/device",
            "verification_uri_complete": "https://login.example.test/device?user_code=ABC123",
            "interval": interval,
            "expires_in": expires_in,
        })
    }

    fn counting_callback(tm: &TokenManager) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        tm.set_token_callback(Some(Arc::new(move |_: &Credential| {
            seen.fetch_add(1, Ordering::SeqCst);
        })));
        calls
    }

    #[tokio::test]
    async fn unauthenticated_manager_refuses() {
        let transport = ScriptedTransport::new(|_| panic!("no request expected"));
        let tm = manager(transport);
        assert!(matches!(tm.get_valid_token().await, Err(TadoClientError::NotAuthenticated)));
        assert!(tm.get_token().is_none());
    }

    #[tokio::test]
    async fn valid_credential_needs_no_network() {
        let transport = ScriptedTransport::new(|_| panic!("no request expected"));
        let tm = manager(Arc::clone(&transport));
        let cred = credential("live", Utc::now() + TimeDelta::minutes(10));
        tm.restore(cred.clone()).await.expect("restore");

        for _ in 0..10 {
            assert_eq!(tm.get_valid_token().await.expect("valid token"), cred);
        }
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_refresh() {
        let transport = ScriptedTransport::with_latency(Duration::from_millis(200), |req| {
            assert!(is_grant(req, "refresh_token"), "unexpected request to {}", req.url);
            assert_eq!(req.form_value("refresh_token"), Some("refresh-stale"));
            json_response(200, token_body("fresh", "refresh-fresh", 600))
        });
        let tm = manager(Arc::clone(&transport));
        let calls = counting_callback(&tm);
        tm.restore(credential("stale", Utc::now() - TimeDelta::seconds(1)))
            .await
            .expect("restore");

        let (a, b, c, d, e) = tokio::join!(
            tm.get_valid_token(),
            tm.get_valid_token(),
            tm.get_valid_token(),
            tm.get_valid_token(),
            tm.get_valid_token(),
        );
        let results = [a, b, c, d, e].map(|r| r.expect("refreshed token"));

        assert_eq!(transport.count(|r| is_grant(r, "refresh_token")), 1);
        assert_eq!(transport.requests().len(), 1);
        for r in &results {
            assert_eq!(r.access_token, "fresh");
            assert_eq!(r, &results[0]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tm.get_token().expect("stored").refresh_token, "refresh-fresh");
    }

    #[tokio::test]
    async fn rejected_refresh_keeps_stale_credential() {
        let transport =
            ScriptedTransport::new(|_| json_response(400, json!({"error": "invalid_grant"})));
        let tm = manager(Arc::clone(&transport));
        let calls = counting_callback(&tm);
        let stale = credential("stale", Utc::now() - TimeDelta::seconds(1));
        tm.restore(stale.clone()).await.expect("restore");

        assert!(matches!(tm.get_valid_token().await, Err(TadoClientError::InvalidRefreshToken)));
        assert_eq!(tm.get_token(), Some(stale));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // no silent retry loop: each call is one attempt
        assert!(matches!(tm.get_valid_token().await, Err(TadoClientError::InvalidRefreshToken)));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_during_refresh_propagates() {
        let transport =
            ScriptedTransport::new(|_| Err(TadoClientError::Transport("connection reset".into())));
        let tm = manager(transport);
        tm.restore(credential("stale", Utc::now() - TimeDelta::seconds(1)))
            .await
            .expect("restore");

        assert!(matches!(tm.get_valid_token().await, Err(TadoClientError::Transport(_))));
    }

    #[tokio::test]
    async fn valid_refresh_token_skips_device_flow() {
        let transport = ScriptedTransport::new(|req| {
            assert!(is_grant(req, "refresh_token"));
            json_response(200, token_body("acc", "rotated", 600))
        });
        let tm = manager(Arc::clone(&transport));
        let calls = counting_callback(&tm);

        let (verification, pending) = tm.authenticate(Some("good"), None).await.expect("authenticate");
        assert!(verification.is_none());
        let cred = pending.await.expect("credential");

        assert_eq!(cred.access_token, "acc");
        assert_eq!(cred.refresh_token, "rotated");
        assert_eq!(transport.count(is_device_authorize), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tm.get_token(), Some(cred));
    }

    #[tokio::test]
    async fn refresh_without_rotation_keeps_old_refresh_token() {
        let transport = ScriptedTransport::new(|_| {
            json_response(200, json!({"access_token": "acc", "expires_in": 600}))
        });
        let tm = manager(transport);
        let (_, pending) = tm.authenticate(Some("keep-me"), None).await.expect("authenticate");
        assert_eq!(pending.await.expect("credential").refresh_token, "keep-me");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_refresh_token_falls_back_to_device_flow() {
        let transport = ScriptedTransport::new(|req| {
            if is_device_authorize(req) {
                assert_eq!(req.form_value("client_id"), Some(OAUTH_CLIENT_ID));
                assert_eq!(req.form_value("scope"), Some(OAUTH_SCOPE));
                json_response(200, device_body(5, 300))
            } else {
                json_response(400, json!({"error": "invalid_grant"}))
            }
        });
        let tm = manager(Arc::clone(&transport));

        let (verification, _pending) = tm.authenticate(Some("bad"), None).await.expect("authenticate");
        let v = verification.expect("device verification");

        assert_eq!(v.user_code, "ABC123");
        assert_eq!(v.device_code, "dev-123");
        assert_eq!(v.verification_uri_complete, "https://login.example.test/device?user_code=ABC123");
        assert_eq!(v.interval, Duration::from_secs(5));
        assert_eq!(v.expires_in, Duration::from_secs(300));
        assert_eq!(transport.count(is_device_authorize), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn device_login_completes_after_approval() {
        let polls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&polls);
        let transport = ScriptedTransport::new(move |req| {
            if is_device_authorize(req) {
                return json_response(200, device_body(2, 60));
            }
            assert!(is_grant(req, DEVICE_CODE_GRANT_TYPE));
            assert_eq!(req.form_value("device_code"), Some("dev-123"));
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                json_response(400, json!({"error": "authorization_pending"}))
            } else {
                json_response(200, token_body("device-acc", "device-refresh", 600))
            }
        });
        let tm = manager(Arc::clone(&transport));
        let calls = counting_callback(&tm);

        let started = tokio::time::Instant::now();
        let (verification, pending) = tm.authenticate(None, None).await.expect("authenticate");
        assert!(verification.is_some());
        let cred = pending.await.expect("approved");

        assert_eq!(cred.access_token, "device-acc");
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7), "{:?}", elapsed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // stored and served without touching the network again
        let before = transport.requests().len();
        assert_eq!(tm.get_valid_token().await.expect("valid"), cred);
        assert_eq!(transport.requests().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn approved_token_without_refresh_token_fails_fast() {
        let transport = ScriptedTransport::new(|req| {
            if is_device_authorize(req) {
                json_response(200, device_body(1, 60))
            } else {
                json_response(200, json!({"access_token": "acc", "expires_in": 600}))
            }
        });
        let tm = manager(Arc::clone(&transport));
        let calls = counting_callback(&tm);

        let started = tokio::time::Instant::now();
        let (_, pending) = tm.authenticate(None, None).await.expect("authenticate");
        let err = pending.await.expect_err("unusable token response");

        assert!(matches!(err, TadoClientError::Auth(_)), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
        assert_eq!(transport.count(|r| is_grant(r, DEVICE_CODE_GRANT_TYPE)), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(tm.get_token().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn device_login_times_out_at_expiry() {
        let transport = ScriptedTransport::new(|req| {
            if is_device_authorize(req) {
                json_response(200, device_body(1, 3))
            } else {
                json_response(400, json!({"error": "authorization_pending"}))
            }
        });
        let tm = manager(Arc::clone(&transport));
        let calls = counting_callback(&tm);

        let started = tokio::time::Instant::now();
        let (_, pending) = tm.authenticate(None, None).await.expect("authenticate");
        let err = pending.await.expect_err("never approved");
        let elapsed = started.elapsed();

        assert!(matches!(err, TadoClientError::AuthTimeout));
        assert!(elapsed >= Duration::from_secs(3), "gave up early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(4), "gave up late: {:?}", elapsed);
        assert_eq!(transport.count(|r| is_grant(r, DEVICE_CODE_GRANT_TYPE)), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(tm.get_token().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn caller_timeout_shortens_polling_budget() {
        let transport = ScriptedTransport::new(|req| {
            if is_device_authorize(req) {
                json_response(200, device_body(1, 600))
            } else {
                Err(TadoClientError::Transport("offline".into()))
            }
        });
        let tm = manager(transport);

        let started = tokio::time::Instant::now();
        let (_, pending) = tm
            .authenticate(None, Some(Duration::from_secs(2)))
            .await
            .expect("authenticate");
        assert!(matches!(pending.await, Err(TadoClientError::AuthTimeout)));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn device_code_request_failure_propagates() {
        let transport = ScriptedTransport::new(|_| Err(TadoClientError::Transport("dns".into())));
        let tm = manager(transport);
        match tm.authenticate(None, None).await {
            Err(TadoClientError::Transport(msg)) => assert_eq!(msg, "dns"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn expiry_includes_safety_margin() {
        let transport = ScriptedTransport::new(|_| json_response(200, token_body("acc", "r", 600)));
        let tm = manager(transport);

        let before = Utc::now();
        let (_, pending) = tm.authenticate(Some("r"), None).await.expect("authenticate");
        let cred = pending.await.expect("credential");
        let after = Utc::now();

        assert!(cred.expires_at >= before + TimeDelta::seconds(595));
        assert!(cred.expires_at <= after + TimeDelta::seconds(595));
    }

    #[tokio::test]
    async fn lifetime_shorter_than_margin_is_already_expired() {
        let transport = ScriptedTransport::new(|_| json_response(200, token_body("acc", "r", 3)));
        let tm = manager(transport);
        let (_, pending) = tm.authenticate(Some("r"), None).await.expect("authenticate");
        assert!(pending.await.expect("credential").is_expired());
    }

    #[tokio::test]
    async fn callback_can_be_replaced_and_disabled() {
        let transport = ScriptedTransport::new(|_| json_response(200, token_body("acc", "r", 600)));
        let tm = manager(transport);

        let first = counting_callback(&tm);
        let second = counting_callback(&tm);
        let (_, pending) = tm.authenticate(Some("r"), None).await.expect("authenticate");
        pending.await.expect("credential");
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        tm.set_token_callback(None);
        let (_, pending) = tm.authenticate(Some("r"), None).await.expect("authenticate");
        pending.await.expect("credential");
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rate_limit_snapshot_is_last_write_wins() {
        let transport = ScriptedTransport::new(|_| panic!("no request expected"));
        let tm = manager(transport);
        assert_eq!(tm.get_rate_limit(), None);

        let first = json_response_with_headers(200, json!({}), &[("ratelimit", "\"perday\";r=10;t=60")])
            .expect("response");
        tm.observe_rate_limit(&first.headers);
        assert_eq!(tm.get_rate_limit().and_then(|r| r.remaining), Some(10));

        tm.observe_rate_limit(&HeaderMap::new());
        assert_eq!(tm.get_rate_limit().and_then(|r| r.remaining), Some(10));

        let second = json_response_with_headers(200, json!({}), &[("ratelimit", "\"perday\";r=9;t=59")])
            .expect("response");
        tm.observe_rate_limit(&second.headers);
        assert_eq!(tm.get_rate_limit().and_then(|r| r.remaining), Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_rejects_queued_callers() {
        let transport = ScriptedTransport::with_latency(Duration::from_secs(1), |_| {
            json_response(200, token_body("fresh", "r2", 600))
        });
        let tm = manager(transport);
        tm.restore(credential("stale", Utc::now() - TimeDelta::seconds(1)))
            .await
            .expect("restore");

        let refreshing = tokio::spawn({
            let tm = tm.clone();
            async move { tm.get_valid_token().await }
        });
        tokio::task::yield_now().await;
        let queued: Vec<_> = (0..2)
            .map(|_| {
                let tm = tm.clone();
                tokio::spawn(async move { tm.get_valid_token().await })
            })
            .collect();
        while tm.inner.lock.waiting() < 2 {
            tokio::task::yield_now().await;
        }

        assert_eq!(tm.cancel_pending(), 2);
        for q in queued {
            assert!(matches!(q.await.expect("task"), Err(TadoClientError::LockPurged)));
        }
        assert_eq!(refreshing.await.expect("task").expect("refreshed").access_token, "fresh");
    }

    #[test]
    fn debug_output_masks_tokens() {
        let cred = credential("supersecretaccess", Utc::now());
        let out = format!("{:?}", cred);
        assert!(!out.contains("supersecretaccess"));
        assert!(out.contains("supe***"));
    }
}
