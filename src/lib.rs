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

//! Authenticated OpenStack provider client.
//!
//! The [ProviderClient] sends requests on behalf of all API bindings. It keeps one token shared
//! between its clones and logs in again (at most once per request) when the token is rejected
//! with HTTP 401. Backoff on HTTP 429 and retries of other failures are pluggable.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), osprovider::Error> {
//! use osprovider::pagination::{MarkerPage, Pager};
//!
//! let cancel = tokio_util::sync::CancellationToken::new();
//! let config = osprovider::config::from_env()?;
//! let provider = config.authenticated_client(&cancel).await?;
//! let compute =
//!     osprovider::ServiceClient::from_catalog(provider, &config.endpoint_opts("compute")).await?;
//! let url = compute.service_url(&["servers"])?;
//! let servers = Pager::new(compute, url, |result| Ok(MarkerPage::new(result, "servers")))
//!     .all_pages(&cancel)
//!     .await?
//!     .extract_items::<serde_json::Value>()?;
//! # Ok(()) }
//! ```
//!
//! A [ServiceClient] binds the provider to one endpoint and adds microversion headers. Use the
//! [pagination] module to walk collections.

// NOTE: we do not use generic deny(warnings) to avoid breakages with new
// versions of the compiler. Add more warnings here as you discover them.
#![deny(
    improper_ctypes,
    missing_debug_implementations,
    missing_docs,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    trivial_numeric_casts,
    unconditional_recursion,
    unsafe_code,
    unused_allocation,
    unused_comparisons,
    unused_doc_comments,
    unused_import_braces,
    unused_parens,
    while_true
)]
#![allow(
    clippy::new_ret_no_self,
    clippy::should_implement_trait,
    clippy::wrong_self_convention
)]

mod apiversion;
pub mod catalog;
pub mod config;
mod credentials;
mod error;
pub mod identity;
pub mod pagination;
mod provider;
mod query;
mod request;
mod result;
mod retry;
mod service;
#[cfg(feature = "stream")]
mod stream;
mod utils;

pub use crate::apiversion::{microversion_headers, ApiVersion};
pub use crate::catalog::{CatalogEntry, Endpoint, EndpointOpts, InterfaceType};
pub use crate::config::{from_env, EnvConfig};
pub use crate::credentials::{Reauthenticate, Token};
pub use crate::error::{Error, ErrorKind, UnexpectedResponse};
pub use crate::provider::{ProviderClient, UserAgent, DEFAULT_USER_AGENT};
pub use crate::query::{Query, QueryItem};
pub use crate::request::{default_ok_codes, RequestOptions, Response, ResponseBody, ResponseMode};
pub use crate::result::{extract_into_slice, extract_into_struct, ApiResult, Extended};
pub use crate::retry::{
    parse_retry_after, RetryAfterBackoff, RetryBackoff, RetryPolicy, DEFAULT_MAX_BACKOFF_RETRIES,
};
pub use crate::service::ServiceClient;
pub use crate::utils::{normalize_url, wait_for};
