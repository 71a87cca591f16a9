use std::sync::Arc;

/// Error type returned by this crate.
///
/// `Clone` because one token refresh outcome is handed to every request
/// waiting on it.
#[derive(Clone, Debug, thiserror::Error)]
pub enum UisError {
    /// Connectivity or timeout failure from `reqwest`, after retries.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),
    /// Non-success HTTP status (other than 401) with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// The current credentials are unusable; the caller must log in again.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),
    /// Response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// Request body could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// Token store could not be read or written.
    #[error("token store error: {0}")]
    Store(String),
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The shared token refresh task stopped before producing a result.
    #[error("token refresh did not complete: {0}")]
    Refresh(String),
}

impl UisError {
    pub(crate) fn network(err: reqwest::Error) -> Self {
        Self::Network(Arc::new(err))
    }

    /// True when the caller should send the user back to the login flow.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Auth(AuthError::Rejected { status, .. }) => Some(*status),
            Self::Auth(AuthError::Unauthorized) => Some(401),
            Self::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Authentication failure: the stored tokens cannot be used any more.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No refresh token is stored, so a refresh cannot be attempted.
    #[error("no refresh token available")]
    MissingRefreshToken,
    /// The server answered 401 again after a successful refresh.
    #[error("request unauthorized after token refresh")]
    Unauthorized,
    /// The token endpoint refused the grant with a 4xx status.
    #[error("token endpoint rejected the grant with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
