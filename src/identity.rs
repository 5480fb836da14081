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

//! Authentication using Identity API v3.
//!
//! [Password] and [Token] request a token from the Identity service and implement
//! [Reauthenticate](crate::Reauthenticate), so that a provider client can log in again when its
//! token expires. [AuthOptions] describes either of them, usually loaded from the environment with
//! [from_env](crate::config::from_env).

use std::fmt;

use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::credentials::{Reauthenticate, Token as IssuedToken};
use super::{Error, ErrorKind, ProviderClient};

mod internal;
mod password;
mod protocol;
mod token;

pub use password::Password;
pub use token::Token;

const MISSING_SUBJECT_HEADER: &str = "Missing X-Subject-Token header";
const INVALID_SUBJECT_HEADER: &str = "Invalid X-Subject-Token header";

/// An ID or a name of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdOrName {
    /// Resource ID.
    Id(String),
    /// Resource name.
    Name(String),
}

/// A scope of a token.
///
/// Only project scopes are currently supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// A token scoped to a project.
    Project {
        /// Project ID or name.
        project: IdOrName,
        /// ID or name of the project domain.
        domain: Option<IdOrName>,
    },
}

/// Everything needed to authenticate against the Identity service.
///
/// A token takes precedence over a password.
#[derive(Clone, Default)]
pub struct AuthOptions {
    /// Identity endpoint, e.g. `https://cloud.local/identity`.
    pub endpoint: String,
    /// User ID or name (required for password authentication).
    pub user: Option<IdOrName>,
    /// Domain of the user (needed when the user is given by name).
    pub user_domain: Option<IdOrName>,
    /// User password.
    pub password: Option<String>,
    /// Existing token.
    pub token: Option<String>,
    /// Token scope.
    pub scope: Option<Scope>,
    /// Whether to log in again when the token expires.
    pub allow_reauth: bool,
}

/// An authentication method built from [AuthOptions].
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Password authentication.
    Password(Password),
    /// Token authentication.
    Token(Token),
}

impl IdOrName {
    /// Create an ID.
    #[inline]
    pub fn from_id<T: Into<String>>(id: T) -> IdOrName {
        IdOrName::Id(id.into())
    }

    /// Create a name.
    #[inline]
    pub fn from_name<T: Into<String>>(name: T) -> IdOrName {
        IdOrName::Name(name.into())
    }
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("user_domain", &self.user_domain)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("scope", &self.scope)
            .field("allow_reauth", &self.allow_reauth)
            .finish()
    }
}

impl AuthOptions {
    /// Build the authentication method.
    pub fn auth_method(&self) -> Result<AuthMethod, Error> {
        if self.endpoint.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                "Identity endpoint is required",
            ));
        }

        let mut method = if let Some(ref token) = self.token {
            AuthMethod::Token(Token::new(self.endpoint.as_str(), token.clone())?)
        } else {
            let user = self.user.clone().ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidConfig,
                    "User name or ID is required for password authentication",
                )
            })?;
            let password = self.password.clone().ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidConfig,
                    "Password or token is required",
                )
            })?;
            AuthMethod::Password(Password::new(
                self.endpoint.as_str(),
                user,
                password,
                self.user_domain.clone(),
            )?)
        };

        if let Some(ref scope) = self.scope {
            match method {
                AuthMethod::Password(ref mut pw) => pw.set_scope(scope.clone()),
                AuthMethod::Token(ref mut tok) => tok.set_scope(scope.clone()),
            }
        }

        Ok(method)
    }
}

#[async_trait]
impl Reauthenticate for AuthMethod {
    async fn reauthenticate(
        &self,
        client: &ProviderClient,
        cancel: &CancellationToken,
    ) -> Result<IssuedToken, Error> {
        match self {
            AuthMethod::Password(pw) => pw.reauthenticate(client, cancel).await,
            AuthMethod::Token(tok) => tok.reauthenticate(client, cancel).await,
        }
    }
}

/// Log in with the provided client.
///
/// The method is installed as the reauthentication hook when `allow_reauth` is true.
pub async fn authenticate_client<R>(
    client: ProviderClient,
    method: R,
    allow_reauth: bool,
    cancel: &CancellationToken,
) -> Result<ProviderClient, Error>
where
    R: Reauthenticate + 'static,
{
    if allow_reauth {
        let client = client.with_reauthenticate(method);
        client.authenticate(cancel).await?;
        Ok(client)
    } else {
        let token = method
            .reauthenticate(&client.throwaway().await, cancel)
            .await?;
        client.set_token(token).await;
        debug!("Authenticated without reauthentication support");
        Ok(client)
    }
}

/// Create a provider client and log in using the options.
pub async fn authenticated_client(
    options: &AuthOptions,
    cancel: &CancellationToken,
) -> Result<ProviderClient, Error> {
    authenticate_client(
        ProviderClient::new(),
        options.auth_method()?,
        options.allow_reauth,
        cancel,
    )
    .await
}

#[cfg(test)]
pub mod test {
    #![allow(missing_docs)]
    #![allow(unused_results)]

    use reqwest::Method;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{authenticated_client, AuthMethod, AuthOptions, IdOrName, Password, Scope};
    use crate::{EndpointOpts, ErrorKind, RequestOptions};

    fn token_response(id: &str, server: &MockServer) -> ResponseTemplate {
        ResponseTemplate::new(201)
            .insert_header("x-subject-token", id)
            .set_body_json(json!({
                "token": {
                    "expires_at": "2030-01-01T00:00:00.000000Z",
                    "catalog": [{
                        "type": "compute",
                        "name": "nova",
                        "endpoints": [{
                            "interface": "public",
                            "region": "RegionOne",
                            "url": format!("{}/compute/v2.1", server.uri())
                        }]
                    }]
                }
            }))
    }

    fn options(server: &MockServer) -> AuthOptions {
        AuthOptions {
            endpoint: format!("{}/identity", server.uri()),
            user: Some(IdOrName::from_name("admin")),
            user_domain: Some(IdOrName::from_name("Default")),
            password: Some("pa$$w0rd".into()),
            scope: Some(Scope::Project {
                project: IdOrName::from_name("demo"),
                domain: Some(IdOrName::from_id("default")),
            }),
            allow_reauth: true,
            ..AuthOptions::default()
        }
    }

    #[test]
    fn test_auth_method_selection() {
        let mut opts = AuthOptions {
            endpoint: "http://cloud/identity".into(),
            ..AuthOptions::default()
        };
        assert_eq!(
            opts.auth_method().unwrap_err().kind(),
            ErrorKind::InvalidConfig
        );
        opts.user = Some(IdOrName::from_id("abcd"));
        assert_eq!(
            opts.auth_method().unwrap_err().kind(),
            ErrorKind::InvalidConfig
        );
        opts.password = Some("pass".into());
        assert!(matches!(opts.auth_method().unwrap(), AuthMethod::Password(..)));
        opts.token = Some("tok".into());
        assert!(matches!(opts.auth_method().unwrap(), AuthMethod::Token(..)));
        opts.endpoint = String::new();
        assert_eq!(
            opts.auth_method().unwrap_err().kind(),
            ErrorKind::InvalidConfig
        );
    }

    #[test]
    fn test_auth_options_debug() {
        let opts = AuthOptions {
            password: Some("pa$$w0rd".into()),
            token: Some("secret-token".into()),
            ..AuthOptions::default()
        };
        let s = format!("{:?}", opts);
        assert!(!s.contains("pa$$w0rd"));
        assert!(!s.contains("secret-token"));
    }

    #[tokio::test]
    async fn test_authenticated_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/v3/auth/tokens"))
            .and(body_partial_json(json!({
                "auth": {"scope": {"project": {"name": "demo", "domain": {"id": "default"}}}}
            })))
            .respond_with(token_response("token-1", &server))
            .expect(1)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let client = authenticated_client(&options(&server), &cancel)
            .await
            .unwrap();
        let token = client.token().await.unwrap();
        assert_eq!(token.id(), "token-1");
        assert!(token.expires_at().is_some());
        let url = client.endpoint(&EndpointOpts::new("compute")).await.unwrap();
        assert_eq!(url.as_str(), format!("{}/compute/v2.1/", server.uri()));
    }

    #[tokio::test]
    async fn test_reauthentication_with_password() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/v3/auth/tokens"))
            .respond_with(token_response("token-1", &server))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/identity/v3/auth/tokens"))
            .respond_with(token_response("token-2", &server))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers"))
            .and(header("x-auth-token", "token-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let client = authenticated_client(&options(&server), &cancel)
            .await
            .unwrap();
        let url = client
            .endpoint(&EndpointOpts::new("compute"))
            .await
            .unwrap()
            .join("servers")
            .unwrap();
        let resp = client
            .request(&cancel, Method::GET, url, RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(client.token().await.unwrap().id(), "token-2");
    }

    #[tokio::test]
    async fn test_authenticate_without_reauth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("token-1", &server))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let opts = AuthOptions {
            allow_reauth: false,
            ..options(&server)
        };
        let client = authenticated_client(&opts, &cancel).await.unwrap();
        let url = format!("{}/compute/v2.1/servers", server.uri())
            .parse()
            .unwrap();
        let err = client
            .request(&cancel, Method::GET, url, RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    }

    #[tokio::test]
    async fn test_missing_subject_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"token": {}})))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let opts = AuthOptions {
            allow_reauth: false,
            ..options(&server)
        };
        let err = authenticated_client(&opts, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
        assert_eq!(err.to_string(), super::MISSING_SUBJECT_HEADER);
    }

    #[tokio::test]
    async fn test_wrong_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "The request you have made requires authentication."}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let err = Password::new(
            format!("{}/identity", server.uri()).as_str(),
            IdOrName::from_name("admin"),
            "wrong",
            IdOrName::from_name("Default"),
        )
        .unwrap()
        .authenticated_client(&cancel)
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnableToReauthenticate);
        assert_eq!(
            err.response().unwrap().body,
            "The request you have made requires authentication."
        );
    }
}
