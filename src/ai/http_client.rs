//! Shared HTTP Client Module
//!
//! Lazily-built HTTP clients with connection pooling, one per remote service.
//! Adapters take a `Client` at construction, so tests and alternative
//! deployments can inject their own instead of these defaults.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

fn build_client(name: &str, timeout: Duration, max_idle: usize) -> Client {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(max_idle)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(client = name, error = %e, "Falling back to default HTTP client");
            Client::new()
        })
}

/// Client for Gemini calls
///
/// Deep-mode analyses with a thinking budget can run for minutes, hence the
/// generous timeout.
pub static GEMINI_CLIENT: Lazy<Client> =
    Lazy::new(|| build_client("gemini", Duration::from_secs(300), 8));

/// Client for OpenAI calls
pub static OPENAI_CLIENT: Lazy<Client> =
    Lazy::new(|| build_client("openai", Duration::from_secs(120), 8));

/// Client for the cloud anchor (sign-in, storage upload, record write)
pub static ANCHOR_CLIENT: Lazy<Client> =
    Lazy::new(|| build_client("anchor", Duration::from_secs(60), 4));

#[inline]
pub fn gemini_client() -> &'static Client {
    &GEMINI_CLIENT
}

#[inline]
pub fn openai_client() -> &'static Client {
    &OPENAI_CLIENT
}

#[inline]
pub fn anchor_client() -> &'static Client {
    &ANCHOR_CLIENT
}
