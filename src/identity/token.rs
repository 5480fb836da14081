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

//! Token authentication.

use async_trait::async_trait;
use reqwest::{IntoUrl, Url};
use tokio_util::sync::CancellationToken;

use super::internal::Internal;
use super::protocol;
use super::{IdOrName, Scope};
use crate::credentials::{Reauthenticate, Token as IssuedToken};
use crate::{Error, ProviderClient};

/// Token authentication using Identity API V3.
///
/// Exchanges an existing token for a new one, usually with a different scope.
///
/// ```rust,no_run
/// # async fn example() -> Result<(), osprovider::Error> {
/// use osprovider::identity::{IdOrName, Token};
///
/// let cancel = tokio_util::sync::CancellationToken::new();
/// let client = Token::new("https://cloud.local/identity", "<a token>")?
///     .with_project_scope(IdOrName::from_name("project1"), IdOrName::from_id("default"))
///     .authenticated_client(&cancel)
///     .await?;
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct Token {
    inner: Internal,
}

impl Token {
    /// Create a token authentication.
    pub fn new<U, S>(auth_url: U, token: S) -> Result<Token, Error>
    where
        U: IntoUrl,
        S: Into<String>,
    {
        let identity = protocol::Identity::token(token.into());
        Ok(Token {
            inner: Internal::new(auth_url.into_url()?, protocol::AuthRoot::new(identity))?,
        })
    }

    /// Authentication endpoint.
    #[inline]
    pub fn auth_url(&self) -> &Url {
        self.inner.auth_url()
    }

    /// Scope authentication to the given project.
    #[inline]
    pub fn set_project_scope(&mut self, project: IdOrName, domain: impl Into<Option<IdOrName>>) {
        self.set_scope(Scope::Project {
            project,
            domain: domain.into(),
        });
    }

    /// Add a scope to the authentication.
    #[inline]
    pub fn set_scope(&mut self, scope: Scope) {
        self.inner.set_scope(scope);
    }

    /// Scope authentication to the given project.
    #[inline]
    pub fn with_project_scope(
        mut self,
        project: IdOrName,
        domain: impl Into<Option<IdOrName>>,
    ) -> Token {
        self.set_project_scope(project, domain);
        self
    }

    /// Add a scope to the authentication.
    #[inline]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.set_scope(scope);
        self
    }

    /// Create a provider client, log in and keep this authentication for reauthenticating.
    ///
    /// Reauthentication only succeeds while the original token is valid.
    pub async fn authenticated_client(
        self,
        cancel: &CancellationToken,
    ) -> Result<ProviderClient, Error> {
        super::authenticate_client(ProviderClient::new(), self, true, cancel).await
    }

    #[cfg(test)]
    pub(crate) fn internal(&self) -> &Internal {
        &self.inner
    }
}

#[async_trait]
impl Reauthenticate for Token {
    async fn reauthenticate(
        &self,
        client: &ProviderClient,
        cancel: &CancellationToken,
    ) -> Result<IssuedToken, Error> {
        self.inner.issue(client, cancel).await
    }
}
