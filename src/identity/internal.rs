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

//! Internal implementation of the identity authentication.

use log::{debug, error, trace};
use reqwest::{Method, Url};
use tokio_util::sync::CancellationToken;

use super::protocol::{self, AuthRoot};
use super::{Scope, INVALID_SUBJECT_HEADER, MISSING_SUBJECT_HEADER};
use crate::credentials::Token;
use crate::request::{RequestOptions, Response, ResponseMode};
use crate::{Error, ErrorKind, ProviderClient};

static SUBJECT_TOKEN: &str = "x-subject-token";

/// Token request shared by all authentication methods.
#[derive(Debug, Clone)]
pub(crate) struct Internal {
    auth_url: Url,
    token_endpoint: Url,
    body: AuthRoot,
}

impl Internal {
    pub fn new(mut auth_url: Url, body: AuthRoot) -> Result<Internal, Error> {
        let _ = auth_url
            .path_segments_mut()
            .map_err(|_| Error::new(ErrorKind::InvalidConfig, "Invalid auth_url: wrong schema?"))?
            .pop_if_empty();

        let mut token_endpoint = auth_url.clone();
        {
            let mut segments = token_endpoint
                .path_segments_mut()
                .map_err(|_| Error::new(ErrorKind::InvalidConfig, "Invalid auth_url"))?;
            if !auth_url.path().ends_with("/v3") {
                let _ = segments.push("v3");
            }
            let _ = segments.extend(["auth", "tokens"]);
        }

        Ok(Internal {
            auth_url,
            token_endpoint,
            body,
        })
    }

    #[inline]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[cfg(test)]
    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    pub fn set_scope(&mut self, scope: Scope) {
        self.body.auth.scope = Some(match scope {
            Scope::Project { project, domain } => {
                protocol::Scope::Project(protocol::Project { project, domain })
            }
        });
    }

    #[cfg(test)]
    pub fn body(&self) -> &AuthRoot {
        &self.body
    }

    /// Request a new token.
    pub async fn issue(
        &self,
        client: &ProviderClient,
        cancel: &CancellationToken,
    ) -> Result<Token, Error> {
        debug!("Requesting a token from {}", self.token_endpoint);
        let options = RequestOptions::new()
            .with_json_body(&self.body)
            .with_ok_codes([201])
            .with_response_mode(ResponseMode::Json);
        let response = client
            .request(cancel, Method::POST, self.token_endpoint.clone(), options)
            .await?;
        token_from_response(response)
    }
}

fn token_from_response(response: Response) -> Result<Token, Error> {
    let value = match response.headers().get(SUBJECT_TOKEN) {
        Some(hdr) => match hdr.to_str() {
            Ok(s) if !s.is_empty() => s.to_string(),
            _ => {
                error!("Invalid X-Subject-Token received from {}", response.url());
                return Err(Error::new(
                    ErrorKind::InvalidResponse,
                    INVALID_SUBJECT_HEADER,
                ));
            }
        },
        None => {
            error!("No X-Subject-Token header received from {}", response.url());
            return Err(Error::new(
                ErrorKind::InvalidResponse,
                MISSING_SUBJECT_HEADER,
            ));
        }
    };

    let body = response.json().ok_or_else(|| {
        error!("Empty token response received from {}", response.url());
        Error::new(ErrorKind::InvalidResponse, "Empty token response")
    })?;
    let root: protocol::TokenRoot = serde_json::from_value(body.clone())?;
    match root.token.expires_at {
        Some(ref expires_at) => debug!("Received a token expiring at {}", expires_at),
        None => debug!("Received a token without expiration"),
    }
    trace!("Received catalog: {:?}", root.token.catalog);

    let token = Token::new(value).with_catalog(root.token.catalog);
    Ok(match root.token.expires_at {
        Some(expires_at) => token.with_expires_at(expires_at),
        None => token,
    })
}
