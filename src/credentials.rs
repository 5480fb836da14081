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

//! Token state shared between clones of a provider client.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use log::debug;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::catalog::CatalogEntry;
use super::{Error, ErrorKind, ProviderClient};

/// An authentication token with its service catalog.
#[derive(Clone, Default)]
pub struct Token {
    id: String,
    catalog: Vec<CatalogEntry>,
    expires_at: Option<DateTime<FixedOffset>>,
}

/// Hook that obtains a fresh token.
///
/// Called by the provider client when a request is rejected with HTTP 401. The `client`
/// argument is a throwaway view of the calling provider: requests made through it do not
/// carry the current token and never trigger another reauthentication. Its `token` and
/// `catalog` return a copy of the token being replaced.
#[async_trait]
pub trait Reauthenticate: fmt::Debug + Send + Sync {
    /// Log in again and return the new token.
    async fn reauthenticate(
        &self,
        client: &ProviderClient,
        cancel: &CancellationToken,
    ) -> Result<Token, Error>;
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<Token>,
    // Incremented after every finished reauthentication attempt.
    generation: u64,
    last_failure: Option<Error>,
}

/// Current token and reauthentication bookkeeping.
#[derive(Debug)]
pub(crate) struct Credentials {
    state: RwLock<TokenState>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut hasher = DefaultHasher::new();
        self.id.hash(&mut hasher);
        write!(
            f,
            "Token {{ id: hash({}), expires_at: {:?}, catalog: {:?} }}",
            hasher.finish(),
            self.expires_at,
            self.catalog
        )
    }
}

impl Token {
    /// Create a token with an empty catalog.
    pub fn new<S: Into<String>>(id: S) -> Token {
        Token {
            id: id.into(),
            ..Token::default()
        }
    }

    /// Add a service catalog.
    #[inline]
    pub fn with_catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Add an expiration time.
    #[inline]
    pub fn with_expires_at(mut self, expires_at: DateTime<FixedOffset>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Token value to pass in `X-Auth-Token`.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Service catalog received with the token.
    #[inline]
    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    /// Expiration time (if known).
    #[inline]
    pub fn expires_at(&self) -> Option<&DateTime<FixedOffset>> {
        self.expires_at.as_ref()
    }
}

impl Credentials {
    pub fn new(token: Option<Token>) -> Credentials {
        Credentials {
            state: RwLock::new(TokenState {
                token,
                ..TokenState::default()
            }),
        }
    }

    /// The current token value and the generation it belongs to.
    pub async fn snapshot(&self) -> (Option<String>, u64) {
        let state = self.state.read().await;
        (state.token.as_ref().map(|t| t.id.clone()), state.generation)
    }

    pub async fn token(&self) -> Option<Token> {
        self.state.read().await.token.clone()
    }

    pub async fn set_token(&self, token: Option<Token>) {
        let mut state = self.state.write().await;
        state.token = token;
        state.generation += 1;
        state.last_failure = None;
    }

    /// Reauthenticate unless another caller has already done it.
    ///
    /// `seen` is the generation the caller observed when sending its request. If an attempt
    /// finished since then, its outcome is returned instead of running `login` again.
    ///
    /// `login` receives a copy of the current token. It runs under the write lock and must not
    /// access these credentials.
    pub async fn reauthenticate<F, Fut>(
        &self,
        seen: u64,
        cancel: &CancellationToken,
        login: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(Option<Token>) -> Fut,
        Fut: Future<Output = Result<Token, Error>>,
    {
        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            guard = self.state.write() => guard,
        };

        // Additional check in case another task has reauthenticated while we were waiting for
        // the write lock.
        if state.generation != seen {
            debug!(
                "Token was already refreshed (generation {} -> {})",
                seen, state.generation
            );
            return match state.last_failure {
                Some(ref err) => Err(err.clone()),
                None => Ok(()),
            };
        }

        debug!("Reauthenticating, current generation {}", state.generation);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled()),
            result = login(state.token.clone()) => result,
        };

        match result {
            Ok(token) => {
                state.token = Some(token);
                state.generation += 1;
                state.last_failure = None;
                debug!("Reauthenticated, new generation {}", state.generation);
                Ok(())
            }
            // A cancelled attempt does not count, the next waiter tries again.
            Err(err) if err.kind() == ErrorKind::Cancelled => Err(err),
            Err(err) => {
                let err = Error::unable_to_reauthenticate(err);
                debug!("{}", err);
                state.generation += 1;
                state.last_failure = Some(err.clone());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::{Credentials, Token};
    use crate::{Error, ErrorKind};

    #[tokio::test]
    async fn test_reauthenticate_replaces_token() {
        let creds = Credentials::new(Some(Token::new("old")));
        let (token, seen) = creds.snapshot().await;
        assert_eq!(token.as_deref(), Some("old"));
        creds
            .reauthenticate(seen, &CancellationToken::new(), |current| async move {
                assert_eq!(current.unwrap().id(), "old");
                Ok(Token::new("new"))
            })
            .await
            .unwrap();
        let (token, generation) = creds.snapshot().await;
        assert_eq!(token.as_deref(), Some("new"));
        assert_eq!(generation, seen + 1);
    }

    #[tokio::test]
    async fn test_stale_generation_skips_login() {
        let creds = Credentials::new(Some(Token::new("old")));
        creds.set_token(Some(Token::new("fresh"))).await;
        creds
            .reauthenticate(0, &CancellationToken::new(), |_| async {
                Err(Error::new(ErrorKind::InvalidInput, "login must not be called"))
            })
            .await
            .unwrap();
        assert_eq!(creds.token().await.unwrap().id(), "fresh");
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let creds = Credentials::new(Some(Token::new("old")));
        let err = creds
            .reauthenticate(0, &CancellationToken::new(), |_| async {
                Err(Error::new(ErrorKind::AuthenticationFailed, "nope"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnableToReauthenticate);

        // A waiter that saw the old generation gets the same failure.
        let err = creds
            .reauthenticate(0, &CancellationToken::new(), |_| async {
                Ok(Token::new("unused"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnableToReauthenticate);
        assert_eq!(creds.token().await.unwrap().id(), "old");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reauthentication_once() {
        let creds = Arc::new(Credentials::new(Some(Token::new("old"))));
        let calls = Arc::new(AtomicUsize::new(0));
        let (_, seen) = creds.snapshot().await;

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let creds = Arc::clone(&creds);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    creds
                        .reauthenticate(seen, &CancellationToken::new(), |_| async {
                            let _ = calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(Token::new("new"))
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(creds.token().await.unwrap().id(), "new");
    }

    #[tokio::test]
    async fn test_cancelled_attempt_does_not_count() {
        let creds = Credentials::new(Some(Token::new("old")));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = creds
            .reauthenticate(0, &cancel, |_| async { Ok(Token::new("new")) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        let (token, generation) = creds.snapshot().await;
        assert_eq!(token.as_deref(), Some("old"));
        assert_eq!(generation, 0);
    }

    #[test]
    fn test_token_debug_hides_value() {
        let token = Token::new("very-secret");
        assert!(!format!("{:?}", token).contains("very-secret"));
    }
}
