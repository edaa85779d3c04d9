use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tado_client::models::tado::{HomeId, ZoneState};
use tado_client::{Config, Credential, TadoClient, token_file};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

async fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (token_file={}, refresh_token={}, auth_timeout={}s, http_timeout={}s)",
        cfg.token_file.display(),
        if cfg.refresh_token.is_some() { "present" } else { "-" },
        cfg.auth_timeout.as_secs(),
        cfg.http_timeout.as_secs()
    );

    // 2) Init client and persist every rotated refresh token
    let client = TadoClient::from_config(&cfg);
    let token_path = cfg.token_file.clone();
    client.auth().set_token_callback(Some(Arc::new(move |credential: &Credential| {
        if let Err(e) = token_file::write_refresh_token(&token_path, &credential.refresh_token) {
            warn!("Failed to persist refresh token to {}: {}", token_path.display(), e);
        }
    })));

    // 3) Authenticate
    let (verification, pending) = client
        .auth()
        .authenticate(cfg.refresh_token.as_deref(), Some(cfg.auth_timeout))
        .await
        .map_err(|e| format!("Tado auth failed: {}", e))?;
    if let Some(v) = verification {
        info!("Open {} to approve this device (code {})", v.verification_uri_complete, v.user_code);
    }
    let credential = pending.await.map_err(|e| format!("Tado login failed: {}", e))?;
    info!("Authenticated to Tado API (token valid until {})", credential.expires_at);

    // 4) Discover homes
    let me = client.get_me().await.map_err(|e| format!("get_me failed: {}", e))?;
    let mut homes = me
        .homes
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .filter_map(|hb| hb.id.map(|id| id.0))
        .collect::<Vec<_>>();
    homes.sort_unstable();
    homes.dedup();
    if homes.is_empty() {
        return Err("No homes found; ensure the account has homes".into());
    }
    info!("Discovered {} home(s)", homes.len());

    // 5) One snapshot of every zone
    for home_id in homes.into_iter().map(HomeId) {
        let zones = client
            .get_zones(home_id)
            .await
            .map_err(|e| format!("get_zones({}) failed: {}", home_id.0, e))?;
        for zone in zones {
            let Some(zone_id) = zone.id else { continue };
            let state = client
                .get_zone_state(home_id, zone_id)
                .await
                .map_err(|e| format!("get_zone_state({}, {}) failed: {}", home_id.0, zone_id.0, e))?;
            let (temperature, humidity) = readings(&state);
            info!(
                "home {} zone {} ({}): {} / {}",
                home_id.0,
                zone_id.0,
                zone.name.as_deref().unwrap_or("-"),
                temperature,
                humidity
            );
        }
    }

    match client.auth().get_rate_limit() {
        Some(rl) => info!(
            "Rate limit: {}/{} requests remaining (resets in {}s)",
            or_dash(rl.remaining),
            or_dash(rl.quota),
            or_dash(rl.resets_in.map(|d| d.as_secs()))
        ),
        None => info!("No rate limit information received"),
    }

    Ok(())
}

fn or_dash(v: Option<u64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "-".into())
}

fn readings(state: &ZoneState) -> (String, String) {
    let sensors = state.sensor_data_points.as_ref();
    let temperature = sensors
        .and_then(|s| s.inside_temperature.as_ref())
        .and_then(|t| t.celsius)
        .map(|c| format!("{:.1}°C", c))
        .unwrap_or_else(|| "-".into());
    let humidity = sensors
        .and_then(|s| s.humidity.as_ref())
        .and_then(|h| h.percentage)
        .map(|p| format!("{:.0}%", p))
        .unwrap_or_else(|| "-".into());
    (temperature, humidity)
}

/// Accepts `--env-file <path>` or `--env-file=<path>` and nothing else.
fn env_file_arg(args: &[String]) -> Result<Option<PathBuf>, String> {
    const USAGE: &str = "usage: tado-client [--env-file <path>]";
    match args {
        [] => Ok(None),
        [flag, path] if flag == "--env-file" => Ok(Some(PathBuf::from(path))),
        [arg] => match arg.strip_prefix("--env-file=") {
            Some(path) if !path.is_empty() => Ok(Some(PathBuf::from(path))),
            _ => Err(format!("unrecognised argument: {}; {}", arg, USAGE)),
        },
        _ => Err(USAGE.to_string()),
    }
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let args = std::env::args_os()
        .skip(1)
        .map(|a| a.into_string().map_err(|_| "argument contains invalid UTF-8".to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    // dotenvy never overrides variables already present in the process environment
    match env_file_arg(&args)? {
        Some(path) => {
            dotenvy::from_path(&path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
            Ok(Some(LoadedEnvFile { path, explicit: true }))
        }
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(LoadedEnvFile { path, explicit: false })),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(format!("failed to load .env: {}", e)),
        },
    }
}

#[tokio::main]
async fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "tado-client {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run().await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
