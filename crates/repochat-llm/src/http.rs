//! Shared HTTP client construction for consistent TLS and user-agent configuration.

use std::time::Duration;

/// Create a shared HTTP client with standard repochat configuration.
///
/// Config: 30s connect timeout, rustls TLS, `repochat/{version}` user-agent,
/// redirect limit 10. No request timeout is set: streamed answers may run
/// for as long as the caller keeps reading.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .user_agent(concat!("repochat/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("default HTTP client construction must not fail")
}
