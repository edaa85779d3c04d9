//! Async HTTP client for the tado° API.
//!
//! - Every request goes through `api_call`, which takes a currently valid access token from
//!   the `TokenManager`, records the rate-limit headers and decodes the JSON body.
//! - Relative paths resolve against the main API host; absolute URLs are used verbatim so the
//!   same path works for secondary hosts (energy insights).
//! - Covers a representative subset of endpoints: account, homes, zones, overlays, devices,
//!   schedules and energy consumption.

use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::auth::{DEFAULT_AUTH_BASE_URL, TokenManager};
use crate::config::Config;
use crate::error::{TadoClientError, decode_json};
use crate::models::tado::*;
use crate::transport::{HttpRequest, HttpTransport, UreqTransport};

pub const BASE_URL: &str = "https://my.tado.com/api/v2";
pub const ENERGY_INSIGHTS_URL: &str = "https://energy-insights.tado.com/api";

pub struct TadoClient {
    auth: TokenManager,
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    energy_insights_url: String,
}

impl TadoClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_urls(transport, BASE_URL, DEFAULT_AUTH_BASE_URL)
    }

    pub fn with_urls(transport: Arc<dyn HttpTransport>, api_base_url: &str, auth_base_url: &str) -> Self {
        TadoClient {
            auth: TokenManager::with_auth_base_url(Arc::clone(&transport), auth_base_url),
            transport,
            base_url: api_base_url.trim_end_matches('/').to_string(),
            energy_insights_url: ENERGY_INSIGHTS_URL.to_string(),
        }
    }

    /// Production client: `ureq` transport with the configured timeout and hosts.
    pub fn from_config(cfg: &Config) -> Self {
        let transport = Arc::new(UreqTransport::new(cfg.http_timeout));
        let mut client = Self::with_urls(transport, &cfg.api_base_url, &cfg.auth_base_url);
        if let Some(url) = &cfg.energy_insights_url {
            client.energy_insights_url = url.trim_end_matches('/').to_string();
        }
        client
    }

    /// Token manager of this session (login, callback, token and rate-limit accessors).
    pub fn auth(&self) -> &TokenManager {
        &self.auth
    }

    fn url(&self, path: &str) -> String {
        if path.contains("://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Authenticated request returning the decoded body.
    pub async fn api_call<R: DeserializeOwned>(
        &self,
        url: &str,
        method: Method,
        body: Option<serde_json::Value>,
    ) -> Result<R, TadoClientError> {
        let token = self.auth.get_valid_token().await?;
        let mut req = HttpRequest::new(method, self.url(url))
            .header("Authorization", format!("Bearer {}", token.access_token));
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = self.transport.request(req).await?;
        self.auth.observe_rate_limit(&resp.headers);
        if resp.status == 429 {
            log::warn!("Rate limit exceeded: {:?}", self.auth.get_rate_limit());
        }
        decode_json(&resp.error_for_status()?.body)
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, TadoClientError> {
        self.api_call(path, Method::GET, None).await
    }

    async fn put<R: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<R, TadoClientError> {
        self.api_call(path, Method::PUT, Some(serde_json::to_value(body)?)).await
    }

    async fn delete(&self, path: &str) -> Result<(), TadoClientError> {
        self.api_call(path, Method::DELETE, None).await
    }

    pub async fn get_me(&self) -> Result<User, TadoClientError> {
        self.get("/me").await
    }

    pub async fn get_home(&self, home_id: HomeId) -> Result<Home, TadoClientError> {
        self.get(&format!("/homes/{}", home_id.0)).await
    }

    pub async fn get_home_state(&self, home_id: HomeId) -> Result<HomeState, TadoClientError> {
        self.get(&format!("/homes/{}/state", home_id.0)).await
    }

    /// Force HOME or AWAY regardless of geofencing.
    pub async fn set_presence_lock(&self, home_id: HomeId, presence: HomePresence) -> Result<(), TadoClientError> {
        let body = PresenceLock {
            home_presence: presence,
        };
        self.put(&format!("/homes/{}/presenceLock", home_id.0), &body).await
    }

    /// Hand presence back to geofencing.
    pub async fn clear_presence_lock(&self, home_id: HomeId) -> Result<(), TadoClientError> {
        self.delete(&format!("/homes/{}/presenceLock", home_id.0)).await
    }

    pub async fn get_weather(&self, home_id: HomeId) -> Result<Weather, TadoClientError> {
        self.get(&format!("/homes/{}/weather", home_id.0)).await
    }

    pub async fn get_zones(&self, home_id: HomeId) -> Result<Vec<Zone>, TadoClientError> {
        self.get(&format!("/homes/{}/zones", home_id.0)).await
    }

    pub async fn get_zone_state(&self, home_id: HomeId, zone_id: ZoneId) -> Result<ZoneState, TadoClientError> {
        self.get(&format!("/homes/{}/zones/{}/state", home_id.0, zone_id.0)).await
    }

    /// Current manual overlay; `None` when the zone follows its schedule (the API answers 404).
    pub async fn get_zone_overlay(
        &self,
        home_id: HomeId,
        zone_id: ZoneId,
    ) -> Result<Option<ZoneOverlay>, TadoClientError> {
        match self.get(&format!("/homes/{}/zones/{}/overlay", home_id.0, zone_id.0)).await {
            Ok(overlay) => Ok(Some(overlay)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn set_zone_overlay(
        &self,
        home_id: HomeId,
        zone_id: ZoneId,
        setting: ZoneSetting,
        termination: OverlayTermination,
    ) -> Result<ZoneOverlay, TadoClientError> {
        let body = ZoneOverlayInput { setting, termination };
        self.put(&format!("/homes/{}/zones/{}/overlay", home_id.0, zone_id.0), &body)
            .await
    }

    /// Return the zone to its schedule.
    pub async fn delete_zone_overlay(&self, home_id: HomeId, zone_id: ZoneId) -> Result<(), TadoClientError> {
        self.delete(&format!("/homes/{}/zones/{}/overlay", home_id.0, zone_id.0)).await
    }

    pub async fn get_devices(&self, home_id: HomeId) -> Result<Vec<Device>, TadoClientError> {
        self.get(&format!("/homes/{}/devices", home_id.0)).await
    }

    pub async fn get_active_timetable(&self, home_id: HomeId, zone_id: ZoneId) -> Result<TimetableType, TadoClientError> {
        self.get(&format!(
            "/homes/{}/zones/{}/schedule/activeTimetable",
            home_id.0, zone_id.0
        ))
        .await
    }

    /// Monthly consumption from the energy insights host.
    pub async fn get_energy_consumption(
        &self,
        home_id: HomeId,
        year: i32,
        month: u32,
    ) -> Result<EnergyConsumptionDetails, TadoClientError> {
        self.get(&format!(
            "{}/homes/{}/consumptionDetails?month={:04}-{:02}",
            self.energy_insights_url, home_id.0, year, month
        ))
        .await
    }
}
