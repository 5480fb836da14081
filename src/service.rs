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

//! Client bound to one service endpoint.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use log::debug;

use super::apiversion::{self, microversion_headers};
use super::catalog::EndpointOpts;
use super::request::{RequestOptions, Response, ResponseMode};
use super::result::ApiResult;
use super::utils::normalize_url;
use super::{ApiVersion, Error, ErrorKind, ProviderClient, Query, QueryItem};

/// A provider client bound to an endpoint of one service.
///
/// ```rust,no_run
/// # async fn example(provider: osprovider::ProviderClient) -> Result<(), osprovider::Error> {
/// use osprovider::{ApiVersion, EndpointOpts, RequestOptions, ServiceClient};
///
/// let cancel = tokio_util::sync::CancellationToken::new();
/// let compute = ServiceClient::from_catalog(provider, &EndpointOpts::new("compute"))
///     .await?
///     .with_microversion(ApiVersion(2, 79));
/// let url = compute.service_url(&["servers", "detail"])?;
/// let result = compute.get(&cancel, url, RequestOptions::new()).await?.into_result();
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct ServiceClient {
    provider: ProviderClient,
    endpoint: Url,
    resource_base: Option<Url>,
    service_type: String,
    microversion: Option<ApiVersion>,
    headers: HeaderMap,
}

impl ServiceClient {
    /// Bind the provider to an endpoint.
    ///
    /// A trailing slash is added to the endpoint if missing.
    pub fn new<S: Into<String>>(
        provider: ProviderClient,
        endpoint: Url,
        service_type: S,
    ) -> Result<ServiceClient, Error> {
        if endpoint.cannot_be_a_base() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Endpoint {} cannot be used as a base URL", endpoint),
            ));
        }
        let endpoint = Url::parse(&normalize_url(endpoint.as_str()))?;
        Ok(ServiceClient {
            provider,
            endpoint,
            resource_base: None,
            service_type: service_type.into(),
            microversion: None,
            headers: HeaderMap::new(),
        })
    }

    /// Bind the provider to an endpoint from its service catalog.
    pub async fn from_catalog(
        provider: ProviderClient,
        opts: &EndpointOpts,
    ) -> Result<ServiceClient, Error> {
        let endpoint = provider.endpoint(opts).await?;
        ServiceClient::new(provider, endpoint, opts.service_type.clone())
    }

    /// Use a different base for resource URLs (e.g. with a version suffix).
    pub fn with_resource_base(mut self, base: Url) -> Result<Self, Error> {
        self.resource_base = Some(Url::parse(&normalize_url(base.as_str()))?);
        Ok(self)
    }

    /// Request the given microversion.
    #[inline]
    pub fn with_microversion(mut self, version: ApiVersion) -> Self {
        self.microversion = Some(version);
        self
    }

    /// Send the header with every request.
    #[inline]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        let _ = self.headers.insert(name, value);
        self
    }

    /// The provider client.
    #[inline]
    pub fn provider(&self) -> &ProviderClient {
        &self.provider
    }

    /// The endpoint of the service.
    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The base for resource URLs (the endpoint unless overridden).
    #[inline]
    pub fn resource_base(&self) -> &Url {
        self.resource_base.as_ref().unwrap_or(&self.endpoint)
    }

    /// Service type.
    #[inline]
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Requested microversion (if any).
    #[inline]
    pub fn microversion(&self) -> Option<ApiVersion> {
        self.microversion
    }

    /// Build a URL from path segments relative to the resource base.
    ///
    /// Segments are percent-encoded.
    pub fn service_url<S: AsRef<str>>(&self, parts: &[S]) -> Result<Url, Error> {
        let mut url = self.resource_base().clone();
        let _ = url
            .path_segments_mut()
            .map_err(|_| Error::new(ErrorKind::InvalidInput, "Invalid base URL"))?
            .pop_if_empty()
            .extend(parts.iter().map(AsRef::as_ref));
        Ok(url)
    }

    /// Minimum and maximum microversions supported by the endpoint.
    ///
    /// Reads the version document at the endpoint. Both the versioned (`version`) and the
    /// unversioned (`versions` with a single entry) forms are accepted. Fails with
    /// `IncompatibleApiVersion` if the endpoint does not support microversions.
    pub async fn supported_microversions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(ApiVersion, ApiVersion), Error> {
        let options = RequestOptions::new()
            .with_headers(self.headers.clone())
            .with_ok_codes([200, 300])
            .with_response_mode(ResponseMode::Json);
        let response = self
            .provider
            .request(cancel, Method::GET, self.endpoint.clone(), options)
            .await?;
        let body = response.json().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidResponse,
                format!("Empty version document received from {}", response.url()),
            )
        })?;
        let root: apiversion::Root = serde_json::from_value(body.clone())?;
        let (min, max) = root.microversions()?;
        debug!(
            "Service {} at {} supports microversions {} to {}",
            self.service_type, self.endpoint, min, max
        );
        Ok((min, max))
    }

    /// Pick the highest of the candidate microversions supported by the endpoint.
    ///
    /// Returns `None` if none of them is supported, including when the endpoint has no
    /// microversions at all.
    pub async fn pick_microversion<I>(
        &self,
        cancel: &CancellationToken,
        candidates: I,
    ) -> Result<Option<ApiVersion>, Error>
    where
        I: IntoIterator<Item = ApiVersion>,
    {
        let (min, max) = match self.supported_microversions(cancel).await {
            Ok(range) => range,
            Err(err) if err.kind() == ErrorKind::IncompatibleApiVersion => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(candidates
            .into_iter()
            .filter(|version| min <= *version && *version <= max)
            .max())
    }

    /// Check if the endpoint supports the microversion.
    pub async fn supports_microversion(
        &self,
        cancel: &CancellationToken,
        version: ApiVersion,
    ) -> Result<bool, Error> {
        self.pick_microversion(cancel, Some(version))
            .await
            .map(|x| x.is_some())
    }

    /// Request the microversion if the endpoint supports it, fail otherwise.
    pub async fn require_microversion(
        self,
        cancel: &CancellationToken,
        version: ApiVersion,
    ) -> Result<Self, Error> {
        let (min, max) = self.supported_microversions(cancel).await?;
        if min <= version && version <= max {
            Ok(self.with_microversion(version))
        } else {
            Err(Error::new(
                ErrorKind::IncompatibleApiVersion,
                format!(
                    "Microversion {} is not supported by {}, supported versions are {} to {}",
                    version, self.service_type, min, max
                ),
            ))
        }
    }

    /// Build a URL from path segments and append the query items.
    pub fn service_url_with_query<S, Q>(
        &self,
        parts: &[S],
        query: &Query<Q>,
    ) -> Result<Url, Error>
    where
        S: AsRef<str>,
        Q: QueryItem,
    {
        let mut url = self.service_url(parts)?;
        query.append_to(&mut url)?;
        Ok(url)
    }

    /// Issue a request with the service headers.
    pub async fn request(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: Url,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let mut options = options.with_headers(self.headers.clone());
        if let Some(version) = self.microversion {
            for (name, value) in microversion_headers(&self.service_type, version)? {
                options = options.with_header(name, value);
            }
        }
        self.provider.request(cancel, method, url, options).await
    }

    /// GET a resource, decoding JSON unless told otherwise.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        url: Url,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let options = options.or_response_mode(ResponseMode::Json);
        self.request(cancel, Method::GET, url, options).await
    }

    /// POST a JSON body, decoding JSON unless told otherwise.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        url: Url,
        body: &B,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let options = options
            .with_json_body(body)
            .or_response_mode(ResponseMode::Json);
        self.request(cancel, Method::POST, url, options).await
    }

    /// PUT a JSON body, decoding JSON unless told otherwise.
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        url: Url,
        body: &B,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let options = options
            .with_json_body(body)
            .or_response_mode(ResponseMode::Json);
        self.request(cancel, Method::PUT, url, options).await
    }

    /// PATCH with a JSON body, decoding JSON unless told otherwise.
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        url: Url,
        body: &B,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let options = options
            .with_json_body(body)
            .or_response_mode(ResponseMode::Json);
        self.request(cancel, Method::PATCH, url, options).await
    }

    /// DELETE a resource.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        url: Url,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        self.request(cancel, Method::DELETE, url, options).await
    }

    /// HEAD a resource.
    pub async fn head(
        &self,
        cancel: &CancellationToken,
        url: Url,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let options = options.or_ok_codes([200, 204]);
        self.request(cancel, Method::HEAD, url, options).await
    }

    /// GET a resource, capturing the outcome for extraction.
    pub async fn get_result(&self, cancel: &CancellationToken, url: Url) -> ApiResult {
        self.get(cancel, url, RequestOptions::new()).await.into()
    }

    /// POST a JSON body, capturing the outcome for extraction.
    pub async fn post_result<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        url: Url,
        body: &B,
    ) -> ApiResult {
        self.post(cancel, url, body, RequestOptions::new())
            .await
            .into()
    }

    /// PUT a JSON body, capturing the outcome for extraction.
    pub async fn put_result<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        url: Url,
        body: &B,
    ) -> ApiResult {
        self.put(cancel, url, body, RequestOptions::new())
            .await
            .into()
    }

    /// PATCH with a JSON body, capturing the outcome for extraction.
    pub async fn patch_result<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        url: Url,
        body: &B,
    ) -> ApiResult {
        self.patch(cancel, url, body, RequestOptions::new())
            .await
            .into()
    }

    /// DELETE a resource, capturing the outcome.
    pub async fn delete_result(&self, cancel: &CancellationToken, url: Url) -> ApiResult {
        self.delete(cancel, url, RequestOptions::new()).await.into()
    }
}
