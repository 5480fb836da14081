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

//! API microversions.

use std::fmt;
use std::str::FromStr;

use http::header::{HeaderName, HeaderValue};
use log::debug;
use serde::de::Error as DeserError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Error, ErrorKind};

static OPENSTACK_API_VERSION: HeaderName = HeaderName::from_static("openstack-api-version");

/// API version (major, minor).
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct ApiVersion(pub u16, pub u16);

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.0, self.1)
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<ApiVersion, Error> {
        let invalid = || {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid API version: expected X.Y or X, got {}", s),
            )
        };

        let mut parts = s.strip_prefix('v').unwrap_or(s).split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(ApiVersion(major, minor))
    }
}

impl Serialize for ApiVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<ApiVersion, D::Error> {
        let value = String::deserialize(deserializer)?;
        ApiVersion::from_str(&value).map_err(D::Error::custom)
    }
}

/// One entry of a version discovery document.
#[derive(Debug, Deserialize)]
pub(crate) struct Version {
    #[serde(default)]
    pub id: String,
    #[serde(deserialize_with = "empty_as_none", default)]
    pub status: Option<String>,
    #[serde(deserialize_with = "empty_as_none", default)]
    pub version: Option<ApiVersion>,
    #[serde(deserialize_with = "empty_as_none", default)]
    pub min_version: Option<ApiVersion>,
}

/// Version discovery document of a versioned or an unversioned endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Root {
    OneVersion { version: Version },
    MultipleVersions { versions: Vec<Version> },
}

fn empty_as_none<'de, D, T>(des: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match Option::<String>::deserialize(des)? {
        Some(value) if !value.is_empty() => T::from_str(&value)
            .map(Some)
            .map_err(D::Error::custom),
        _ => Ok(None),
    }
}

impl Root {
    /// Minimum and maximum supported microversions.
    pub fn microversions(self) -> Result<(ApiVersion, ApiVersion), Error> {
        let version = match self {
            Root::OneVersion { version } => version,
            Root::MultipleVersions { mut versions } => {
                if versions.len() > 1 {
                    return Err(Error::new(
                        ErrorKind::InvalidResponse,
                        "Unversioned endpoint with multiple alternatives is not supported",
                    ));
                }
                versions.pop().ok_or_else(|| {
                    Error::new(ErrorKind::InvalidResponse, "No versions in the version document")
                })?
            }
        };
        debug!(
            "Version {} with status {:?} supports microversions {:?} to {:?}",
            version.id, version.status, version.min_version, version.version
        );

        match (version.min_version, version.version) {
            (Some(min), Some(max)) => Ok((min, max)),
            (None, None) => Err(Error::new(
                ErrorKind::IncompatibleApiVersion,
                format!("Microversions are not supported by version {}", version.id),
            )),
            _ => Err(Error::new(
                ErrorKind::InvalidResponse,
                format!(
                    "Version {} reports only one of version and min_version",
                    version.id
                ),
            )),
        }
    }
}

/// Legacy service-specific microversion header.
fn legacy_header(service_type: &str) -> Option<&'static str> {
    Some(match service_type {
        "compute" => "x-openstack-nova-api-version",
        "sharev2" => "x-openstack-manila-api-version",
        "volume" | "volumev3" | "block-storage" => "x-openstack-volume-api-version",
        "baremetal" => "x-openstack-ironic-api-version",
        "baremetal-introspection" => "x-openstack-ironic-inspector-api-version",
        "container" | "container-infra" => "x-openstack-magnum-api-version",
        _ => return None,
    })
}

/// Headers requesting the microversion from the service.
///
/// Always includes `OpenStack-API-Version: <service type> <version>`, plus the legacy
/// header for services that predate it.
pub fn microversion_headers(
    service_type: &str,
    version: ApiVersion,
) -> Result<Vec<(HeaderName, HeaderValue)>, Error> {
    let mut result = Vec::with_capacity(2);
    if let Some(legacy) = legacy_header(service_type) {
        result.push((
            HeaderName::from_static(legacy),
            HeaderValue::from_str(&version.to_string())?,
        ));
    }
    if !service_type.is_empty() {
        result.push((
            OPENSTACK_API_VERSION.clone(),
            HeaderValue::from_str(&format!("{} {}", service_type, version))?,
        ));
    }
    Ok(result)
}
