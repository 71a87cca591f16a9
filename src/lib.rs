//! `uis-http` is an async HTTP client for the PTIT HCM UIS student API.
//!
//! [`UisClient`] wraps `reqwest` with the behavior the backend expects:
//! - bearer token from a [`TokenStore`] on every request
//! - single-flight token refresh on 401 ([`UisClient::refresh_token`])
//! - bounded exponential-backoff retry of 5xx and transport failures
//! - an in-memory cookie jar shared across requests

mod client;
mod credentials;
mod error;
mod options;
mod refresh;
mod request;
mod wire;

pub use client::UisClient;
pub use credentials::{Credentials, FileTokenStore, MemoryTokenStore, TokenStore};
pub use error::{AuthError, UisError};
pub use options::{ClientOptions, RetryPolicy, TimeoutPolicy, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
pub use request::{ApiRequest, ApiResponse, Body};
pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, UisError>;
