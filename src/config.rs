//! Runtime configuration from environment variables.
//! Defaults point at the production tado° hosts.

use std::path::PathBuf;
use std::time::Duration;

use crate::auth::DEFAULT_AUTH_BASE_URL;
use crate::client::BASE_URL;
use crate::token_file;

pub const DEFAULT_TOKEN_FILE: &str = "token.txt";
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    /// Refresh token from a previous login. `None` means a device login is needed.
    pub refresh_token: Option<String>,
    /// Where the latest refresh token is persisted after every login/refresh.
    pub token_file: PathBuf,
    /// Upper bound on waiting for the user to approve a device login.
    pub auth_timeout: Duration,
    /// Per-request timeout of the HTTP transport.
    pub http_timeout: Duration,
    pub api_base_url: String,
    pub auth_base_url: String,
    pub energy_insights_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token_file = non_empty("TADO_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE));

        // Prefer env var; fallback to the token file
        let refresh_token = match non_empty("TADO_REFRESH_TOKEN") {
            Some(v) => Some(v),
            None => token_file::read_refresh_token(&token_file)
                .map_err(|e| format!("failed to read {}: {}", token_file.display(), e))?,
        };

        let auth_timeout = secs(&non_empty, "TADO_AUTH_TIMEOUT_SECS", DEFAULT_AUTH_TIMEOUT_SECS)?;
        let http_timeout = secs(&non_empty, "TADO_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;

        Ok(Config {
            refresh_token,
            token_file,
            auth_timeout,
            http_timeout,
            api_base_url: non_empty("TADO_API_BASE_URL").unwrap_or_else(|| BASE_URL.to_string()),
            auth_base_url: non_empty("TADO_AUTH_BASE_URL").unwrap_or_else(|| DEFAULT_AUTH_BASE_URL.to_string()),
            energy_insights_url: non_empty("TADO_ENERGY_INSIGHTS_URL"),
        })
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration, String> {
    match lookup(key) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) | Err(_) => Err(format!("{} must be a positive number of seconds", key)),
            Ok(n) => Ok(Duration::from_secs(n)),
        },
    }
}
