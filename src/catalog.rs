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

//! Service catalog and endpoint lookup.

use std::fmt;
use std::str::FromStr;

use log::{debug, error};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::utils::normalize_url;
use super::{Error, ErrorKind};

/// Interface type: public, internal or admin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum InterfaceType {
    /// Public interface (used by default).
    #[default]
    Public,
    /// Internal interface.
    Internal,
    /// Administrator interface.
    Admin,
}

/// An endpoint of a service.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Endpoint {
    /// Endpoint ID.
    #[serde(default)]
    pub id: String,
    /// Endpoint interface (public, internal or admin).
    pub interface: String,
    /// Region name.
    #[serde(default)]
    pub region: String,
    /// Region ID.
    #[serde(default)]
    pub region_id: String,
    /// Endpoint URL.
    pub url: String,
}

/// A service catalog record.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Service type (compute, network, ...).
    #[serde(rename = "type")]
    pub service_type: String,
    /// Service name.
    #[serde(default)]
    pub name: String,
    /// Endpoints of this service.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Options for looking up an endpoint in the catalog.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct EndpointOpts {
    /// Service type to look for.
    pub service_type: String,
    /// Service name (optional, any name matches if empty).
    pub name: Option<String>,
    /// Region name or ID (optional, any region matches if empty).
    pub region: Option<String>,
    /// Endpoint interface.
    pub interface: InterfaceType,
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            InterfaceType::Public => "public",
            InterfaceType::Internal => "internal",
            InterfaceType::Admin => "admin",
        })
    }
}

impl FromStr for InterfaceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<InterfaceType, Error> {
        match s {
            "public" | "publicURL" => Ok(InterfaceType::Public),
            "internal" | "internalURL" => Ok(InterfaceType::Internal),
            "admin" | "adminURL" => Ok(InterfaceType::Admin),
            other => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid interface type: {}", other),
            )),
        }
    }
}

impl EndpointOpts {
    /// Options for the given service type with the public interface and no region.
    pub fn new<S: Into<String>>(service_type: S) -> EndpointOpts {
        EndpointOpts {
            service_type: service_type.into(),
            ..EndpointOpts::default()
        }
    }

    /// Require the given service name.
    #[inline]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require the given region.
    #[inline]
    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Require the given interface.
    #[inline]
    pub fn with_interface(mut self, interface: InterfaceType) -> Self {
        self.interface = interface;
        self
    }

    fn matches_entry(&self, entry: &CatalogEntry) -> bool {
        entry.service_type == self.service_type
            && self.name.as_ref().map(|n| *n == entry.name).unwrap_or(true)
    }

    fn matches_endpoint(&self, endpoint: &Endpoint) -> bool {
        InterfaceType::from_str(&endpoint.interface)
            .map(|i| i == self.interface)
            .unwrap_or(false)
            && self
                .region
                .as_ref()
                .map(|r| *r == endpoint.region || *r == endpoint.region_id)
                .unwrap_or(true)
    }
}

/// Find a unique endpoint in the catalog.
///
/// It is an error both when no endpoints match and when more than one does.
pub fn locate(catalog: &[CatalogEntry], opts: &EndpointOpts) -> Result<Url, Error> {
    let found: Vec<&Endpoint> = catalog
        .iter()
        .filter(|entry| opts.matches_entry(entry))
        .flat_map(|entry| entry.endpoints.iter())
        .filter(|endpoint| opts.matches_endpoint(endpoint))
        .collect();

    let endpoint = match found.as_slice() {
        [] => {
            debug!("No endpoint in the catalog matches {:?}", opts);
            return Err(Error::new(
                ErrorKind::EndpointNotFound,
                format!(
                    "Endpoint for service {} with interface {} was not found",
                    opts.service_type, opts.interface
                ),
            ));
        }
        [single] => *single,
        multiple => {
            debug!("Multiple endpoints match {:?}: {:?}", opts, multiple);
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "Discovered {} matching endpoints for service {}, use region or name to disambiguate",
                    multiple.len(),
                    opts.service_type
                ),
            ));
        }
    };

    debug!("Found {:?} for {}", endpoint, opts.service_type);
    Url::parse(&normalize_url(&endpoint.url)).map_err(|e| {
        error!(
            "Invalid URL {} received from service catalog for service '{}': {}",
            endpoint.url, opts.service_type, e
        );
        Error::new(
            ErrorKind::InvalidResponse,
            format!(
                "Invalid URL {} for {} - {}",
                endpoint.url, opts.service_type, e
            ),
        )
    })
}
