use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use tokio::time::sleep;

use crate::{
    refresh::{RefreshGate, RefreshOutcome},
    request::Body,
    wire::{Grant, TokenResponse, LOGIN_PATH},
    ApiRequest, ApiResponse, AuthError, ClientOptions, Credentials, Result, TokenStore, UisError,
};

/// HTTP client for the UIS backend.
///
/// Attaches the stored bearer token to every request, refreshes it once on
/// a 401, retries 5xx and transport failures with exponential backoff, and
/// replays cookies for as long as the client (or any clone) lives.
///
/// Clone is cheap: clones share the connection pool, cookie jar, token
/// store and refresh state.
#[derive(Clone)]
pub struct UisClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    jar: Arc<Jar>,
    store: Arc<dyn TokenStore>,
    options: ClientOptions,
    refresh: RefreshGate,
}

impl fmt::Debug for UisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UisClient")
            .field("base_url", &self.inner.options.base_url)
            .field("options", &self.inner.options)
            .field("store", &"<token store>")
            .finish()
    }
}

impl UisClient {
    /// Creates a client for the production backend with default options.
    pub fn new<S: TokenStore + 'static>(store: Arc<S>) -> Result<Self> {
        Self::with_options(ClientOptions::default(), store)
    }

    /// Creates a client with options read from `UIS_*` environment variables.
    ///
    /// See [`ClientOptions::from_env`].
    pub fn from_env<S: TokenStore + 'static>(store: Arc<S>) -> Result<Self> {
        Self::with_options(ClientOptions::from_env()?, store)
    }

    /// Creates a client with explicit options.
    ///
    /// Timeouts, user agent and cookie jar are fixed here for the lifetime
    /// of the client.
    pub fn with_options<S: TokenStore + 'static>(
        options: ClientOptions,
        store: Arc<S>,
    ) -> Result<Self> {
        Url::parse(&options.base_url).map_err(|err| {
            UisError::Config(format!("invalid base url {:?}: {err}", options.base_url))
        })?;

        let jar = Arc::new(Jar::default());
        let timeouts = &options.timeouts;
        let http = reqwest::Client::builder()
            .user_agent(options.user_agent.as_str())
            .connect_timeout(Duration::from_millis(timeouts.connect_ms))
            .timeout(Duration::from_millis(timeouts.request_ms))
            .read_timeout(Duration::from_millis(timeouts.socket_ms))
            .cookie_provider(jar.clone())
            .build()
            .map_err(|err| UisError::Config(format!("could not build HTTP client: {err}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                jar,
                store,
                options,
                refresh: RefreshGate::default(),
            }),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// In-memory cookie jar shared by every request of this client.
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.inner.jar
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    /// Reads the current token pair from the store.
    ///
    /// Both tokens are empty if the user never logged in.
    pub fn load_token(&self) -> Result<Credentials> {
        self.inner.store.load()
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.load_token()?.is_authenticated())
    }

    /// Exchanges username and password for a token pair and persists it.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credentials> {
        let response = self
            .inner
            .token_grant(Grant::Password { username, password })
            .await?;
        let credentials = Credentials::new(
            response.access_token,
            response.refresh_token.unwrap_or_default(),
        );
        self.inner.store.save(&credentials)?;

        #[cfg(feature = "tracing")]
        tracing::info!("logged in");

        Ok(credentials)
    }

    /// Forgets the stored tokens. Cookies stay in the jar.
    pub fn logout(&self) -> Result<()> {
        self.inner.store.clear()?;

        #[cfg(feature = "tracing")]
        tracing::info!("logged out");

        Ok(())
    }

    /// Refreshes the access token using the stored refresh token.
    ///
    /// Joins a refresh that is already running instead of starting another.
    /// Fails with [`AuthError::MissingRefreshToken`] without touching the
    /// network when no refresh token is stored, and with
    /// [`AuthError::Rejected`] when the token endpoint answers 4xx.
    /// Transport failures and 5xx replies keep their own kinds
    /// ([`UisError::Network`], [`UisError::Http`]) so a flaky network is
    /// never mistaken for an expired session.
    pub async fn refresh_token(&self) -> Result<Credentials> {
        let stale = self.load_token()?.access_token;
        self.refresh_after(&stale).await
    }

    /// Sends a request with the current bearer token.
    ///
    /// - 5xx and transport failures are retried up to `retry.max_retries`
    ///   times with exponential backoff.
    /// - A 401 triggers one token refresh and one resend; a second 401 is
    ///   [`AuthError::Unauthorized`].
    /// - Any other non-2xx status is [`UisError::Http`].
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut refreshed = false;
        loop {
            let credentials = self.load_token()?;
            let bearer = credentials
                .is_authenticated()
                .then_some(credentials.access_token.as_str());

            let response = self.inner.send_with_retry(&request, bearer).await?;

            if response.status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(path = %request.path, "still unauthorized after token refresh");

                    return Err(AuthError::Unauthorized.into());
                }
                refreshed = true;
                self.refresh_after(&credentials.access_token).await?;
                continue;
            }

            if !response.status.is_success() {
                return Err(UisError::Http {
                    status: response.status.as_u16(),
                    body: response.body,
                });
            }

            return Ok(response);
        }
    }

    /// Sends a request and decodes the JSON response body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.request(request).await?.json()
    }

    /// `GET`s `path` and decodes the JSON response body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    async fn refresh_after(&self, stale: &str) -> RefreshOutcome {
        let inner = self.inner.clone();
        self.inner
            .refresh
            .refresh(self.inner.store.as_ref(), stale, move || run_refresh(inner))
            .await
    }
}

async fn run_refresh(inner: Arc<Inner>) -> RefreshOutcome {
    let current = inner.store.load()?;
    if !current.has_refresh_token() {
        #[cfg(feature = "tracing")]
        tracing::warn!("token refresh requested without a refresh token");

        return Err(AuthError::MissingRefreshToken.into());
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("refreshing access token");

    let grant = Grant::RefreshToken {
        refresh_token: &current.refresh_token,
    };
    let response = match inner.token_grant(grant).await {
        Ok(response) => response,
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %err, "token refresh failed");

            return Err(err);
        }
    };

    let refresh_token = response
        .refresh_token
        .filter(|token| !token.trim().is_empty())
        .unwrap_or(current.refresh_token);
    let fresh = Credentials::new(response.access_token, refresh_token);
    inner.store.save(&fresh)?;

    #[cfg(feature = "tracing")]
    tracing::info!("access token refreshed");

    Ok(fresh)
}

impl Inner {
    /// Posts a grant to the token endpoint. Never carries `Authorization`.
    async fn token_grant(&self, grant: Grant<'_>) -> Result<TokenResponse> {
        let request = ApiRequest::post(LOGIN_PATH).form(grant.form());
        let response = self.send_with_retry(&request, None).await?;
        let status = response.status;

        if status.is_client_error() {
            #[cfg(feature = "tracing")]
            tracing::warn!(grant = grant.name(), status = status.as_u16(), "token grant rejected");

            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: response.body,
            }
            .into());
        }
        if !status.is_success() {
            return Err(UisError::Http {
                status: status.as_u16(),
                body: response.body,
            });
        }

        response.json::<TokenResponse>().and_then(|token| {
            if token.access_token.trim().is_empty() {
                Err(UisError::Decode(
                    "token endpoint returned an empty accessToken".to_owned(),
                ))
            } else {
                Ok(token)
            }
        })
    }

    /// Sends `request`, retrying 5xx statuses and transport failures.
    ///
    /// Returns the last response whatever its status once retries are used
    /// up; callers classify it.
    async fn send_with_retry(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse> {
        let max_retries = self.options.retry.max_retries;
        let mut attempt = 0usize;
        loop {
            match self.send_once(request, bearer).await {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    let body = response.text().await.map_err(UisError::network)?;

                    if should_retry_status(status) && attempt < max_retries {
                        self.wait_before_retry(request, attempt).await;
                        attempt += 1;
                        continue;
                    }

                    return Ok(ApiResponse {
                        status,
                        headers,
                        body,
                    });
                }
                Err(err) => {
                    if should_retry_transport(&err) && attempt < max_retries {
                        self.wait_before_retry(request, attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(UisError::network(err));
                }
            }
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url(&self.options.base_url));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Form(pairs) => builder.form(pairs),
            Body::Json(value) => builder.json(value),
        };

        builder.send().await
    }

    /// Waits `backoff_base_ms * 2^attempt` before the next attempt.
    async fn wait_before_retry(&self, request: &ApiRequest, attempt: usize) {
        let delay = self.options.retry.delay_for(attempt);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            attempt = attempt + 1,
            "retrying request after {} ms",
            delay.as_millis()
        );
        #[cfg(not(feature = "tracing"))]
        let _ = request;

        sleep(delay).await;
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
}

fn should_retry_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}
