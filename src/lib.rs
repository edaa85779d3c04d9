//! Async client for the tado° smart thermostat API.
//!
//! Authentication uses the OAuth2 device authorization grant against tado°'s login host,
//! with silent refresh-token login when a token from a previous run is available. All token
//! reads and refreshes are serialized through a FIFO semaphore so concurrent callers never
//! trigger more than one refresh.

pub mod models {
    pub mod tado;
}

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod semaphore;
pub mod token_file;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use auth::{Credential, DeviceVerification, PendingLogin, TokenCallback, TokenManager};
pub use client::TadoClient;
pub use config::Config;
pub use error::TadoClientError;
pub use ratelimit::RateLimit;
pub use semaphore::{AcquireError, Semaphore, SemaphorePermit};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, UreqTransport};
