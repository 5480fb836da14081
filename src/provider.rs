// Copyright 2024 Dmitry Tantsur <dtantsur@protonmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Authenticated provider client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use log::{debug, trace, warn};
use reqwest::{Client, Method, StatusCode, Url};
use static_assertions::assert_impl_all;
use tokio_util::sync::CancellationToken;

use super::catalog::{self, CatalogEntry, EndpointOpts};
use super::credentials::{Credentials, Reauthenticate, Token};
use super::request::{self, default_ok_codes, RequestOptions, Response};
use super::retry::{RetryBackoff, RetryPolicy, DEFAULT_MAX_BACKOFF_RETRIES};
use super::{Error, ErrorKind};

/// Default user agent component.
pub const DEFAULT_USER_AGENT: &str = concat!("osprovider/", env!("CARGO_PKG_VERSION"));

static AUTH_TOKEN: HeaderName = HeaderName::from_static("x-auth-token");

/// User agent composed of custom components followed by the default one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgent {
    prepend: Vec<String>,
}

/// Authenticated HTTP client shared by service clients.
///
/// Clones share the token and the reauthentication state.
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    credentials: Arc<Credentials>,
    reauth: Option<Arc<dyn Reauthenticate>>,
    backoff: Option<Arc<dyn RetryBackoff>>,
    retry: Option<Arc<dyn RetryPolicy>>,
    max_backoff_retries: u32,
    user_agent: UserAgent,
    timeout: Option<Duration>,
    throwaway: bool,
}

assert_impl_all!(ProviderClient: Send, Sync);

#[derive(Debug, Default)]
struct RequestState {
    reauthenticated: bool,
    backoff_retries: u32,
    failures: u32,
}

impl UserAgent {
    /// Add components to the beginning of the user agent.
    ///
    /// Components are added in the given order before the ones added previously.
    pub fn prepend<I, S>(&mut self, components: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut new: Vec<String> = components.into_iter().map(Into::into).collect();
        new.append(&mut self.prepend);
        self.prepend = new;
    }

    /// The full user agent string.
    pub fn join(&self) -> String {
        self.prepend
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(DEFAULT_USER_AGENT))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("credentials", &self.credentials)
            .field("reauth", &self.reauth)
            .field("backoff", &self.backoff)
            .field("retry", &self.retry.is_some())
            .field("max_backoff_retries", &self.max_backoff_retries)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .field("throwaway", &self.throwaway)
            .finish()
    }
}

impl Default for ProviderClient {
    fn default() -> ProviderClient {
        ProviderClient::new()
    }
}

impl ProviderClient {
    /// Create a client without a token.
    #[inline]
    pub fn new() -> ProviderClient {
        ProviderClient::new_with_client(Client::new())
    }

    /// Create a client using the provided HTTP client.
    pub fn new_with_client(client: Client) -> ProviderClient {
        ProviderClient {
            client,
            credentials: Arc::new(Credentials::new(None)),
            reauth: None,
            backoff: None,
            retry: None,
            max_backoff_retries: DEFAULT_MAX_BACKOFF_RETRIES,
            user_agent: UserAgent::default(),
            timeout: None,
            throwaway: false,
        }
    }

    /// Use the hook to obtain a new token on HTTP 401.
    #[inline]
    pub fn with_reauthenticate<R: Reauthenticate + 'static>(mut self, reauth: R) -> Self {
        self.reauth = Some(Arc::new(reauth));
        self
    }

    /// Use the hook on HTTP 429.
    #[inline]
    pub fn with_retry_backoff<B: RetryBackoff + 'static>(mut self, backoff: B) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Use the hook on transport errors and unexpected responses.
    #[inline]
    pub fn with_retry_policy<P: RetryPolicy + 'static>(mut self, policy: P) -> Self {
        self.retry = Some(Arc::new(policy));
        self
    }

    /// Limit the number of backoff retries per request.
    #[inline]
    pub fn with_max_backoff_retries(mut self, value: u32) -> Self {
        self.max_backoff_retries = value;
        self
    }

    /// Default timeout for requests.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Start with the given token.
    ///
    /// Does not affect other clients sharing the credentials: the client gets its own state.
    pub fn with_token(mut self, token: Token) -> Self {
        self.credentials = Arc::new(Credentials::new(Some(token)));
        self
    }

    /// Get a reference to the inner (non-authenticated) client.
    #[inline]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Set a new internal client implementation.
    #[inline]
    pub fn set_inner(&mut self, client: Client) {
        self.client = client;
    }

    /// User agent of this client.
    #[inline]
    pub fn user_agent(&self) -> &UserAgent {
        &self.user_agent
    }

    /// Mutable access to the user agent.
    #[inline]
    pub fn user_agent_mut(&mut self) -> &mut UserAgent {
        &mut self.user_agent
    }

    /// Whether this is a throwaway client.
    #[inline]
    pub fn is_throwaway(&self) -> bool {
        self.throwaway
    }

    /// A view of this client that does not use or refresh the token.
    ///
    /// The view holds its own copy of the current token, so it can read the catalog while
    /// another task is reauthenticating.
    pub async fn throwaway(&self) -> ProviderClient {
        self.detached(self.credentials.token().await)
    }

    /// A throwaway client with separate credentials holding `token`.
    fn detached(&self, token: Option<Token>) -> ProviderClient {
        ProviderClient {
            credentials: Arc::new(Credentials::new(token)),
            throwaway: true,
            ..self.clone()
        }
    }

    /// The current token (if any).
    ///
    /// # Warning
    ///
    /// The token is shared with all clones of this client.
    pub async fn token(&self) -> Option<Token> {
        self.credentials.token().await
    }

    /// Replace the current token.
    ///
    /// # Warning
    ///
    /// The token will also be updated for clones of this client, since they share the same
    /// credentials.
    pub async fn set_token(&self, token: Token) {
        self.credentials.set_token(Some(token)).await;
    }

    /// Service catalog of the current token.
    pub async fn catalog(&self) -> Vec<CatalogEntry> {
        self.token()
            .await
            .map(|t| t.catalog().to_vec())
            .unwrap_or_default()
    }

    /// Find an endpoint in the catalog of the current token.
    pub async fn endpoint(&self, opts: &EndpointOpts) -> Result<Url, Error> {
        debug!("Requesting a catalog endpoint for {:?}", opts);
        catalog::locate(&self.catalog().await, opts)
    }

    /// Headers that authenticate a request.
    pub async fn authenticated_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if self.throwaway {
            return headers;
        }
        if let (Some(token), _) = self.credentials.snapshot().await {
            if let Some(value) = sensitive_value(&token) {
                let _ = headers.insert(AUTH_TOKEN.clone(), value);
            }
        }
        headers
    }

    /// Force a reauthentication using the configured hook.
    pub async fn authenticate(&self, cancel: &CancellationToken) -> Result<(), Error> {
        let reauth = self.reauth.as_ref().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidConfig,
                "No reauthentication hook is configured",
            )
        })?;
        let (_, generation) = self.credentials.snapshot().await;
        self.credentials
            .reauthenticate(generation, cancel, |token| {
                let client = self.detached(token);
                async move { reauth.reauthenticate(&client, cancel).await }
            })
            .await
    }

    /// Issue a request.
    ///
    /// Reauthenticates at most once on HTTP 401, backs off on HTTP 429 and consults the retry
    /// policy on other failures. An error occurring after a successful reauthentication is
    /// wrapped into `ErrorAfterReauthentication`.
    pub async fn request(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: Url,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let mut state = RequestState::default();
        let result = self
            .do_request(cancel, &method, &url, &options, &mut state)
            .await;
        result.map_err(|err| {
            if state.reauthenticated
                && !matches!(
                    err.kind(),
                    ErrorKind::Cancelled | ErrorKind::UnableToReauthenticate
                )
            {
                Error::after_reauthentication(err)
            } else {
                err
            }
        })
    }

    async fn do_request(
        &self,
        cancel: &CancellationToken,
        method: &Method,
        url: &Url,
        options: &RequestOptions,
        state: &mut RequestState,
    ) -> Result<Response, Error> {
        let ok_codes = options
            .ok_codes
            .clone()
            .unwrap_or_else(|| default_ok_codes(method));
        let body = options.encoded_body()?;

        loop {
            let (token, generation) = if self.throwaway {
                (None, 0)
            } else {
                self.credentials.snapshot().await
            };

            let mut headers = HeaderMap::new();
            let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
            let _ = headers.insert(USER_AGENT, HeaderValue::from_str(&self.user_agent.join())?);
            if let Some((ref content_type, _)) = body {
                let _ = headers.insert(CONTENT_TYPE, content_type.clone());
            }
            options.apply_headers(&mut headers);
            if let Some(value) = token.as_deref().and_then(sensitive_value) {
                let _ = headers.insert(AUTH_TOKEN.clone(), value);
            }

            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers);
            if let Some((_, ref data)) = body {
                builder = builder.body(data.clone());
            }
            if let Some(timeout) = options.timeout.or(self.timeout) {
                builder = builder.timeout(timeout);
            }

            trace!("Sending HTTP {} request to {}", method, url);
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::cancelled()),
                result = builder.send() => result,
            };

            let response = match sent {
                Ok(response) => response,
                Err(err) => {
                    self.retry_or_fail(cancel, method, url, err.into(), state)
                        .await?;
                    continue;
                }
            };

            let status = response.status();
            trace!("HTTP {} request to {} returned {}", method, url, status);

            if ok_codes.contains(&status.as_u16()) {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::cancelled()),
                    result = Response::read(response, options.response_mode()) => result,
                };
                match result {
                    Ok(response) => return Ok(response),
                    Err(err) => {
                        self.retry_or_fail(cancel, method, url, err, state).await?;
                        continue;
                    }
                }
            }

            if status == StatusCode::UNAUTHORIZED && !self.throwaway && !state.reauthenticated {
                if let Some(ref reauth) = self.reauth {
                    // Drain the body so that the connection can be reused.
                    let _ = response.bytes().await;
                    debug!(
                        "HTTP {} request to {} was not authorized, reauthenticating",
                        method, url
                    );
                    state.reauthenticated = true;
                    self.credentials
                        .reauthenticate(generation, cancel, |token| {
                            let client = self.detached(token);
                            async move { reauth.reauthenticate(&client, cancel).await }
                        })
                        .await?;
                    continue;
                }
            }

            let err = request::unexpected(method, url, &ok_codes, response).await;

            if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 498 {
                if let Some(ref backoff) = self.backoff {
                    if state.backoff_retries < self.max_backoff_retries {
                        let retries = state.backoff_retries;
                        state.backoff_retries += 1;
                        backoff.backoff(cancel, err, retries).await?;
                        continue;
                    }
                    warn!(
                        "Giving up on HTTP {} request to {} after {} backoff retries",
                        method, url, state.backoff_retries
                    );
                    return Err(err);
                }
            }

            self.retry_or_fail(cancel, method, url, err, state).await?;
        }
    }

    async fn retry_or_fail(
        &self,
        cancel: &CancellationToken,
        method: &Method,
        url: &Url,
        err: Error,
        state: &mut RequestState,
    ) -> Result<(), Error> {
        if err.kind() == ErrorKind::Cancelled {
            return Err(err);
        }
        match self.retry {
            Some(ref policy) => {
                state.failures += 1;
                debug!(
                    "HTTP {} request to {} failed ({} time(s)): {}",
                    method, url, state.failures, err
                );
                policy.retry(cancel, method, url, err, state.failures).await
            }
            None => Err(err),
        }
    }
}

fn sensitive_value(token: &str) -> Option<HeaderValue> {
    if token.is_empty() {
        return None;
    }
    HeaderValue::from_str(token).ok().map(|mut value| {
        value.set_sensitive(true);
        value
    })
}
