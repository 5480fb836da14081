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

//! Support for `OS_` environment variables.

use std::env;
use std::str::FromStr;

use log::debug;
use tokio_util::sync::CancellationToken;

use super::identity::{self, AuthOptions, IdOrName, Scope};
use super::{EndpointOpts, Error, ErrorKind, InterfaceType, ProviderClient, RetryAfterBackoff};

/// Configuration loaded from the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// Authentication options.
    pub auth: AuthOptions,
    /// Region of the endpoints (`OS_REGION_NAME`).
    pub region: Option<String>,
    /// Endpoint interface (`OS_INTERFACE`).
    pub interface: InterfaceType,
    /// Maximum number of backoff retries on HTTP 429 (`OS_MAX_BACKOFF_RETRIES`).
    pub max_backoff_retries: Option<u32>,
}

// This is only used for unit testing.
trait Environment {
    fn get(&self, name: &'static str) -> Option<String>;
}

#[derive(Debug, Clone, Copy)]
struct RealEnvironment;

impl Environment for RealEnvironment {
    fn get(&self, name: &'static str) -> Option<String> {
        env::var(name).ok().filter(|value| !value.is_empty())
    }
}

fn id_or_name<E: Environment>(
    env: &E,
    id: &'static str,
    name: &'static str,
) -> Option<IdOrName> {
    env.get(id)
        .map(IdOrName::Id)
        .or_else(|| env.get(name).map(IdOrName::Name))
}

fn required<E: Environment>(env: &E, name: &'static str) -> Result<String, Error> {
    env.get(name).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Required environment variable {} is not provided", name),
        )
    })
}

#[inline]
fn _from_env<E: Environment>(env: E) -> Result<EnvConfig, Error> {
    let endpoint = required(&env, "OS_AUTH_URL")?;
    let token = env.get("OS_TOKEN");
    let password = env.get("OS_PASSWORD");
    if token.is_none() && password.is_none() {
        return Err(Error::new(
            ErrorKind::InvalidConfig,
            "Either OS_PASSWORD or OS_TOKEN must be provided",
        ));
    }

    let user = id_or_name(&env, "OS_USERID", "OS_USERNAME");
    if token.is_none() && user.is_none() {
        return Err(Error::new(
            ErrorKind::InvalidConfig,
            "Either OS_USERNAME or OS_USERID must be provided",
        ));
    }

    let scope = id_or_name(&env, "OS_PROJECT_ID", "OS_PROJECT_NAME").map(|project| {
        Scope::Project {
            project,
            domain: id_or_name(&env, "OS_PROJECT_DOMAIN_ID", "OS_PROJECT_DOMAIN_NAME"),
        }
    });

    let interface = match env.get("OS_INTERFACE") {
        Some(value) => InterfaceType::from_str(&value)?,
        None => InterfaceType::default(),
    };

    let max_backoff_retries = match env.get("OS_MAX_BACKOFF_RETRIES") {
        Some(value) => Some(value.parse().map_err(|e| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("Invalid OS_MAX_BACKOFF_RETRIES {}: {}", value, e),
            )
        })?),
        None => None,
    };

    let config = EnvConfig {
        auth: AuthOptions {
            endpoint,
            user,
            user_domain: id_or_name(&env, "OS_USER_DOMAIN_ID", "OS_USER_DOMAIN_NAME"),
            password,
            token,
            scope,
            allow_reauth: true,
        },
        region: env.get("OS_REGION_NAME"),
        interface,
        max_backoff_retries,
    };
    debug!("Loaded configuration from the environment: {:?}", config);
    Ok(config)
}

/// Load the configuration from the `OS_*` environment variables.
///
/// `OS_AUTH_URL` and either `OS_PASSWORD` (with `OS_USERNAME` or `OS_USERID`) or `OS_TOKEN` are
/// required. IDs take precedence over names.
pub fn from_env() -> Result<EnvConfig, Error> {
    _from_env(RealEnvironment)
}

impl EnvConfig {
    /// Endpoint lookup options for the service with the region and interface applied.
    pub fn endpoint_opts<S: Into<String>>(&self, service_type: S) -> EndpointOpts {
        let opts = EndpointOpts::new(service_type).with_interface(self.interface);
        match self.region {
            Some(ref region) => opts.with_region(region.clone()),
            None => opts,
        }
    }

    /// Create a provider client and log in.
    ///
    /// The client backs off on HTTP 429 according to the `Retry-After` header.
    pub async fn authenticated_client(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ProviderClient, Error> {
        let mut client = ProviderClient::new().with_retry_backoff(RetryAfterBackoff);
        if let Some(value) = self.max_backoff_retries {
            client = client.with_max_backoff_retries(value);
        }
        identity::authenticate_client(
            client,
            self.auth.auth_method()?,
            self.auth.allow_reauth,
            cancel,
        )
        .await
    }
}
