use std::time::Duration;

use crate::{Result, UisError};

/// Production UIS backend.
pub const DEFAULT_BASE_URL: &str = "https://uis.ptithcm.edu.vn";

/// User-Agent sent on every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("uis-http/", env!("CARGO_PKG_VERSION"));

/// Bounded retry with exponential backoff.
///
/// Applies to 5xx responses and retryable transport failures only.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base retry backoff in milliseconds, doubled on every attempt.
    /// Values below 1 are treated as 1 so delays always grow.
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = attempt.min(16) as u32;
        let multiplier = 1u64 << exp;
        Duration::from_millis(self.backoff_base_ms.max(1).saturating_mul(multiplier))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 250,
        }
    }
}

/// Transport timeouts, fixed when the client is built.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeoutPolicy {
    /// TCP/TLS connect timeout in milliseconds.
    pub connect_ms: u64,
    /// Whole-request timeout in milliseconds.
    pub request_ms: u64,
    /// Idle read timeout on the socket in milliseconds.
    pub socket_ms: u64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            connect_ms: 15_000,
            request_ms: 30_000,
            socket_ms: 30_000,
        }
    }
}

/// Configures the backend location, identity, timeouts and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Scheme and host of the UIS backend, without a trailing path.
    pub base_url: String,
    pub user_agent: String,
    pub timeouts: TimeoutPolicy,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeouts: TimeoutPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientOptions {
    /// Creates default options pointed at another backend.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Overlays options from environment variables on top of the defaults.
    ///
    /// Reads:
    /// - `UIS_BASE_URL`, `UIS_USER_AGENT`
    /// - `UIS_MAX_RETRIES`, `UIS_RETRY_BACKOFF_MS`
    /// - `UIS_CONNECT_TIMEOUT_MS`, `UIS_REQUEST_TIMEOUT_MS`, `UIS_SOCKET_TIMEOUT_MS`
    ///
    /// Unset variables keep their defaults. A variable that is set but empty
    /// or not a number is a [`UisError::Config`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        if let Some(url) = non_empty(&lookup, "UIS_BASE_URL")? {
            opts.base_url = url;
        }
        if let Some(agent) = non_empty(&lookup, "UIS_USER_AGENT")? {
            opts.user_agent = agent;
        }
        if let Some(value) = parsed(&lookup, "UIS_MAX_RETRIES")? {
            opts.retry.max_retries = value as usize;
        }
        if let Some(value) = parsed(&lookup, "UIS_RETRY_BACKOFF_MS")? {
            opts.retry.backoff_base_ms = value;
        }
        if let Some(value) = parsed(&lookup, "UIS_CONNECT_TIMEOUT_MS")? {
            opts.timeouts.connect_ms = value;
        }
        if let Some(value) = parsed(&lookup, "UIS_REQUEST_TIMEOUT_MS")? {
            opts.timeouts.request_ms = value;
        }
        if let Some(value) = parsed(&lookup, "UIS_SOCKET_TIMEOUT_MS")? {
            opts.timeouts.socket_ms = value;
        }

        Ok(opts)
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Result<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => {
            Err(UisError::Config(format!("{name} is set but empty")))
        }
        Some(value) => Ok(Some(value.trim().to_owned())),
    }
}

fn parsed<F>(lookup: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, name)?
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|err| UisError::Config(format!("{name}={value:?} is not a number: {err}")))
        })
        .transpose()
}
