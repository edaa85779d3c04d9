//! Error taxonomy shared by the token manager, the transport and the endpoint layer.

use core::fmt;
use std::error::Error;

#[derive(Debug)]
pub enum TadoClientError {
    /// No credential exists yet; `authenticate` has to run first.
    NotAuthenticated,
    /// The authorization server rejected the refresh token. A new device login is required.
    InvalidRefreshToken,
    /// The user did not approve the device login within the polling budget.
    AuthTimeout,
    /// The request never produced an HTTP response (DNS, TLS, connection reset, ...).
    Transport(String),
    /// The server answered with a non-2xx status.
    Http { status: u16, message: String },
    /// The response body did not match the expected shape.
    Json { path: String, source: serde_json::Error },
    /// The authorization server answered 2xx but the payload was unusable.
    Auth(String),
    /// A queued token request was cancelled by `Semaphore::purge`.
    LockPurged,
}

impl TadoClientError {
    /// Whether this is an HTTP 404, which some endpoints use to mean "nothing set".
    pub fn is_not_found(&self) -> bool {
        matches!(self, TadoClientError::Http { status: 404, .. })
    }
}

impl fmt::Display for TadoClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TadoClientError::NotAuthenticated => write!(f, "not authenticated; call authenticate first"),
            TadoClientError::InvalidRefreshToken => {
                write!(f, "refresh token rejected; device login required")
            }
            TadoClientError::AuthTimeout => write!(f, "timed out waiting for device login approval"),
            TadoClientError::Transport(s) => write!(f, "transport error: {}", s),
            TadoClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            TadoClientError::Json { path, source } => write!(f, "json error at {}: {}", path, source),
            TadoClientError::Auth(e) => write!(f, "auth error: {}", e),
            TadoClientError::LockPurged => write!(f, "token request cancelled"),
        }
    }
}

impl Error for TadoClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TadoClientError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for TadoClientError {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        TadoClientError::Json {
            path: value.path().to_string(),
            source: value.into_inner(),
        }
    }
}

impl From<serde_json::Error> for TadoClientError {
    fn from(value: serde_json::Error) -> Self {
        TadoClientError::Json {
            path: ".".to_string(),
            source: value,
        }
    }
}

/// Decode a JSON body, reporting the path of the first mismatching field.
///
/// An empty body decodes as `null` so endpoints answering `204 No Content`
/// can be read into `()` or `Option<T>`.
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, TadoClientError> {
    let body = if body.trim().is_empty() { "null" } else { body };
    let de = &mut serde_json::Deserializer::from_str(body);
    Ok(serde_path_to_error::deserialize(de)?)
}
