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

//! Pagination over OpenStack collections.
//!
//! A [Pager] fetches pages one by one and asks each [Page] for the URL of the next one.
//! Three kinds of pages are provided:
//! * [SinglePage] for collections returned in one response,
//! * [MarkerPage] for collections paginated with the `marker` query parameter,
//! * [LinkedPage] for collections that embed a link to the next page.

use std::fmt;
use std::sync::Arc;

use http::header::HeaderMap;
use log::{debug, trace};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::request::{RequestOptions, Response};
use super::{Error, ErrorKind, ServiceClient};

/// Status codes accepted for a page.
const PAGE_OK_CODES: [u16; 3] = [200, 204, 300];

/// Raw content of one fetched page.
#[derive(Debug, Clone)]
pub struct PageResult {
    body: Value,
    headers: HeaderMap,
    url: Url,
}

/// One page of a collection.
pub trait Page {
    /// The raw page.
    fn result(&self) -> &PageResult;

    /// Whether the page has no items; an empty page ends the iteration.
    fn is_empty(&self) -> Result<bool, Error>;

    /// URL of the next page, `None` if this is the last one.
    fn next_page_url(&self) -> Result<Option<Url>, Error>;
}

/// A collection returned in a single response.
#[derive(Debug, Clone)]
pub struct SinglePage {
    result: PageResult,
    items_key: String,
}

/// A page whose successor is requested with the `marker` query parameter.
///
/// The marker is the identifier of the last item on the page.
#[derive(Debug, Clone)]
pub struct MarkerPage {
    result: PageResult,
    items_key: String,
    marker_field: String,
}

/// Where a linked page keeps the URL of the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkLocation {
    /// A path of keys leading to a string (or `null`), e.g. `["links", "next"]`.
    Path(Vec<String>),
    /// A key holding an array of `{"href": ..., "rel": ...}` objects, the `next` relation is
    /// used, e.g. `servers_links`.
    Relations(String),
}

/// A page that embeds the URL of the next page.
#[derive(Debug, Clone)]
pub struct LinkedPage {
    result: PageResult,
    items_key: String,
    location: LinkLocation,
}

type PageFactory<P> = dyn Fn(PageResult) -> Result<P, Error> + Send + Sync;

/// Iterates over pages of a collection.
///
/// ```rust,no_run
/// # async fn example(compute: osprovider::ServiceClient) -> Result<(), osprovider::Error> {
/// use osprovider::pagination::{MarkerPage, Pager};
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Server {
///     id: String,
/// }
///
/// let cancel = tokio_util::sync::CancellationToken::new();
/// let url = compute.service_url(&["servers"])?;
/// let pager = Pager::new(compute, url, |result| Ok(MarkerPage::new(result, "servers")));
/// pager
///     .each_page(&cancel, |page| {
///         for server in page.extract_items::<Server>()? {
///             println!("{}", server.id);
///         }
///         Ok(true)
///     })
///     .await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Pager<P> {
    client: ServiceClient,
    initial_url: Url,
    headers: HeaderMap,
    factory: Arc<PageFactory<P>>,
}

impl PageResult {
    /// Create a page result.
    pub fn new(body: Value, headers: HeaderMap, url: Url) -> PageResult {
        PageResult { body, headers, url }
    }

    fn from_response(url: Url, response: Response) -> PageResult {
        let headers = response.headers().clone();
        let body = response.json().cloned().unwrap_or(Value::Null);
        PageResult { body, headers, url }
    }

    /// Decoded body.
    #[inline]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Response headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// URL this page was fetched from.
    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Items under the key (or the body itself if the key is empty).
    ///
    /// A page without a body has no items.
    pub fn items(&self, key: &str) -> Result<&[Value], Error> {
        let value = if key.is_empty() {
            &self.body
        } else {
            match self.body {
                Value::Null => return Ok(&[]),
                Value::Object(ref obj) => obj.get(key).ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidResponse,
                        format!("Key {} is missing in the page from {}", key, self.url),
                    )
                })?,
                _ => {
                    return Err(Error::new(
                        ErrorKind::InvalidResponse,
                        format!("Expected an object in the page from {}", self.url),
                    ))
                }
            }
        };

        match value {
            Value::Null => Ok(&[]),
            Value::Array(items) => Ok(items),
            _ => Err(Error::new(
                ErrorKind::InvalidResponse,
                format!("Expected an array of items in the page from {}", self.url),
            )),
        }
    }

    /// Decode the items under the key.
    pub fn extract_items<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, Error> {
        self.items(key)?
            .iter()
            .map(|item| T::deserialize(item).map_err(Error::from))
            .collect()
    }
}

impl SinglePage {
    /// Items are under `items_key` (or the body is an array if it is empty).
    pub fn new<S: Into<String>>(result: PageResult, items_key: S) -> SinglePage {
        SinglePage {
            result,
            items_key: items_key.into(),
        }
    }

    /// Decode the items of this page.
    #[inline]
    pub fn extract_items<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        self.result.extract_items(&self.items_key)
    }
}

impl Page for SinglePage {
    fn result(&self) -> &PageResult {
        &self.result
    }

    fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.result.items(&self.items_key)?.is_empty())
    }

    fn next_page_url(&self) -> Result<Option<Url>, Error> {
        Ok(None)
    }
}

impl MarkerPage {
    /// Items are under `items_key`, their `id` field is the marker.
    pub fn new<S: Into<String>>(result: PageResult, items_key: S) -> MarkerPage {
        MarkerPage {
            result,
            items_key: items_key.into(),
            marker_field: "id".into(),
        }
    }

    /// Use another field of the items as the marker.
    #[inline]
    pub fn with_marker_field<S: Into<String>>(mut self, field: S) -> Self {
        self.marker_field = field.into();
        self
    }

    /// Marker of the last item (if any).
    pub fn last_marker(&self) -> Result<Option<String>, Error> {
        let items = self.result.items(&self.items_key)?;
        Ok(items
            .last()
            .and_then(|item| item.get(&self.marker_field))
            .and_then(|marker| match marker {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|marker| !marker.is_empty()))
    }

    /// Decode the items of this page.
    #[inline]
    pub fn extract_items<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        self.result.extract_items(&self.items_key)
    }
}

impl Page for MarkerPage {
    fn result(&self) -> &PageResult {
        &self.result
    }

    fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.result.items(&self.items_key)?.is_empty())
    }

    fn next_page_url(&self) -> Result<Option<Url>, Error> {
        Ok(self
            .last_marker()?
            .map(|marker| with_marker(&self.result.url, &marker)))
    }
}

impl Default for LinkLocation {
    fn default() -> LinkLocation {
        LinkLocation::Path(vec!["links".into(), "next".into()])
    }
}

impl LinkedPage {
    /// Items are under `items_key`, the next link is at `links.next`.
    pub fn new<S: Into<String>>(result: PageResult, items_key: S) -> LinkedPage {
        LinkedPage {
            result,
            items_key: items_key.into(),
            location: LinkLocation::default(),
        }
    }

    /// Use another location of the next link.
    #[inline]
    pub fn with_location(mut self, location: LinkLocation) -> Self {
        self.location = location;
        self
    }

    /// Decode the items of this page.
    #[inline]
    pub fn extract_items<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        self.result.extract_items(&self.items_key)
    }

    fn next_link(&self) -> Result<Option<&str>, Error> {
        match self.location {
            LinkLocation::Path(ref path) => {
                let mut current = &self.result.body;
                for key in path {
                    current = match current {
                        Value::Object(obj) => match obj.get(key) {
                            Some(value) => value,
                            None => return Ok(None),
                        },
                        Value::Null => return Ok(None),
                        _ => {
                            return Err(Error::new(
                                ErrorKind::InvalidResponse,
                                format!("Expected an object at {} when looking for the next link", key),
                            ))
                        }
                    };
                }
                match current {
                    Value::Null => Ok(None),
                    Value::String(s) => Ok(Some(s)),
                    _ => Err(Error::new(
                        ErrorKind::InvalidResponse,
                        format!("Expected a string at {}", path.join(".")),
                    )),
                }
            }
            LinkLocation::Relations(ref key) => {
                let links = match self.result.body.get(key) {
                    Some(Value::Array(links)) => links,
                    Some(Value::Null) | None => return Ok(None),
                    Some(_) => {
                        return Err(Error::new(
                            ErrorKind::InvalidResponse,
                            format!("Expected an array of links at {}", key),
                        ))
                    }
                };
                Ok(links
                    .iter()
                    .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))
                    .and_then(|link| link.get("href"))
                    .and_then(Value::as_str))
            }
        }
    }
}

impl Page for LinkedPage {
    fn result(&self) -> &PageResult {
        &self.result
    }

    fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.result.items(&self.items_key)?.is_empty())
    }

    fn next_page_url(&self) -> Result<Option<Url>, Error> {
        match self.next_link()? {
            Some(link) if !link.is_empty() => Ok(Some(self.result.url.join(link)?)),
            _ => Ok(None),
        }
    }
}

fn with_marker(url: &Url, marker: &str) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "marker")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let mut result = url.clone();
    let _ = result
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("marker", marker);
    result
}

/// Append the arrays of the page body to the accumulated body.
fn merge_into(target: &mut Value, body: &Value) -> Result<(), Error> {
    match (target, body) {
        (Value::Array(all), Value::Array(items)) => {
            all.extend(items.iter().cloned());
        }
        (Value::Object(all), Value::Object(obj)) => {
            for (key, value) in obj {
                if key.ends_with("links") {
                    continue;
                }
                if let Value::Array(items) = value {
                    if let Value::Array(existing) = all
                        .entry(key.clone())
                        .or_insert_with(|| Value::Array(Vec::new()))
                    {
                        existing.extend(items.iter().cloned());
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (target, _) => {
            return Err(Error::new(
                ErrorKind::InvalidResponse,
                format!(
                    "Cannot merge pages: page body does not match {}",
                    if target.is_array() { "an array" } else { "an object" }
                ),
            ))
        }
    }
    Ok(())
}

/// Empty accumulator of the same shape as the body.
fn empty_like(body: &Value) -> Value {
    match body {
        Value::Array(..) => Value::Array(Vec::new()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(key, value)| !key.ends_with("links") && value.is_array())
                .map(|(key, _)| (key.clone(), Value::Array(Vec::new())))
                .collect::<Map<String, Value>>(),
        ),
        _ => Value::Null,
    }
}

impl<P> fmt::Debug for Pager<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pager")
            .field("client", &self.client)
            .field("initial_url", &self.initial_url)
            .field("headers", &self.headers)
            .finish()
    }
}

impl<P: Page> Pager<P> {
    /// Create a pager starting at the URL.
    ///
    /// The factory wraps every fetched page into the page type.
    pub fn new<F>(client: ServiceClient, url: Url, factory: F) -> Pager<P>
    where
        F: Fn(PageResult) -> Result<P, Error> + Send + Sync + 'static,
    {
        Pager {
            client,
            initial_url: url,
            headers: HeaderMap::new(),
            factory: Arc::new(factory),
        }
    }

    /// Send additional headers with every page request.
    #[inline]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// URL of the first page.
    #[inline]
    pub fn initial_url(&self) -> &Url {
        &self.initial_url
    }

    pub(crate) async fn fetch(&self, cancel: &CancellationToken, url: Url) -> Result<P, Error> {
        trace!("Fetching page {}", url);
        let options = RequestOptions::new()
            .with_ok_codes(PAGE_OK_CODES)
            .with_headers(self.headers.clone());
        let response = self.client.get(cancel, url.clone(), options).await?;
        (self.factory)(PageResult::from_response(url, response))
    }

    /// Call `visit` for every page until it returns `false` or an error.
    ///
    /// Iteration also stops on an empty page and after the last page.
    pub async fn each_page<F>(&self, cancel: &CancellationToken, mut visit: F) -> Result<(), Error>
    where
        F: FnMut(&P) -> Result<bool, Error>,
    {
        let mut url = Some(self.initial_url.clone());
        while let Some(current) = url.take() {
            let page = self.fetch(cancel, current).await?;
            if page.is_empty()? {
                debug!("Empty page at {}, stopping", page.result().url());
                break;
            }
            if !visit(&page)? {
                debug!("Iteration stopped by the caller");
                break;
            }
            url = page.next_page_url()?;
        }
        Ok(())
    }

    /// Fetch all pages and combine their items into one page.
    ///
    /// For object bodies, arrays under keys not ending with `links` are concatenated; array
    /// bodies are concatenated as is. The headers of the first page are kept.
    pub async fn all_pages(&self, cancel: &CancellationToken) -> Result<P, Error> {
        let mut combined: Option<(Value, HeaderMap)> = None;
        let mut url = Some(self.initial_url.clone());
        while let Some(current) = url.take() {
            let page = self.fetch(cancel, current).await?;
            let result = page.result();
            let (body, _) = combined.get_or_insert_with(|| {
                (empty_like(result.body()), result.headers().clone())
            });
            if page.is_empty()? {
                break;
            }
            merge_into(body, result.body())?;
            url = page.next_page_url()?;
        }

        let (body, headers) = combined.unwrap_or_default();
        (self.factory)(PageResult::new(body, headers, self.initial_url.clone()))
    }
}

#[cfg(test)]
pub mod test {
    #![allow(missing_docs)]
    #![allow(unused_results)]

    use http::header::{HeaderMap, HeaderName, HeaderValue};
    use reqwest::Url;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{LinkLocation, LinkedPage, MarkerPage, Page, PageResult, Pager, SinglePage};
    use crate::credentials::Token;
    use crate::{Error, ErrorKind, ProviderClient, ServiceClient};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: String,
    }

    fn client(server: &MockServer) -> ServiceClient {
        ServiceClient::new(
            ProviderClient::new().with_token(Token::new("abcd")),
            Url::parse(&server.uri()).unwrap(),
            "compute",
        )
        .unwrap()
    }

    fn page(body: Value) -> PageResult {
        PageResult::new(
            body,
            HeaderMap::new(),
            Url::parse("http://cloud/servers?limit=2").unwrap(),
        )
    }

    async fn marker_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .and(query_param("marker", "b"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"servers": [{"id": "c"}]})),
            )
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .and(query_param("marker", "c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{"id": "a"}, {"id": "b"}]
            })))
            .mount(&server)
            .await;
        server
    }

    fn marker_pager(server: &MockServer) -> Pager<MarkerPage> {
        let client = client(server);
        let url = client.service_url(&["servers"]).unwrap();
        Pager::new(client, url, |result| Ok(MarkerPage::new(result, "servers")))
    }

    #[test]
    fn test_marker_next_url() {
        let p = MarkerPage::new(page(json!({"servers": [{"id": "a"}, {"id": "b"}]})), "servers");
        assert!(!p.is_empty().unwrap());
        assert_eq!(
            p.next_page_url().unwrap().unwrap().as_str(),
            "http://cloud/servers?limit=2&marker=b"
        );
    }

    #[test]
    fn test_marker_replaces_existing() {
        let result = PageResult::new(
            json!({"servers": [{"uuid": 42}]}),
            HeaderMap::new(),
            Url::parse("http://cloud/servers?marker=1&limit=2").unwrap(),
        );
        let p = MarkerPage::new(result, "servers").with_marker_field("uuid");
        assert_eq!(
            p.next_page_url().unwrap().unwrap().as_str(),
            "http://cloud/servers?limit=2&marker=42"
        );
    }

    #[test]
    fn test_marker_empty_or_missing() {
        let p = MarkerPage::new(page(json!({"servers": []})), "servers");
        assert!(p.is_empty().unwrap());
        assert!(p.next_page_url().unwrap().is_none());
        let p = MarkerPage::new(page(json!({"servers": [{"id": ""}]})), "servers");
        assert!(p.next_page_url().unwrap().is_none());
        let p = MarkerPage::new(page(json!({"servers": [{"name": "x"}]})), "servers");
        assert!(p.next_page_url().unwrap().is_none());
        let p = MarkerPage::new(page(json!({"other": []})), "servers");
        assert_eq!(p.is_empty().unwrap_err().kind(), ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_linked_next_url() {
        let p = LinkedPage::new(
            page(json!({"items": [1], "links": {"next": "http://cloud/servers?page=2"}})),
            "items",
        );
        assert_eq!(
            p.next_page_url().unwrap().unwrap().as_str(),
            "http://cloud/servers?page=2"
        );
        let p = LinkedPage::new(page(json!({"items": [1], "links": {"next": null}})), "items");
        assert!(p.next_page_url().unwrap().is_none());
        let p = LinkedPage::new(page(json!({"items": [1]})), "items");
        assert!(p.next_page_url().unwrap().is_none());
        let p = LinkedPage::new(page(json!({"items": [1], "links": {"next": 42}})), "items");
        assert!(p.next_page_url().is_err());
        let p = LinkedPage::new(page(json!({"items": [1], "links": "oops"})), "items");
        assert!(p.next_page_url().is_err());
    }

    #[test]
    fn test_linked_relative_url() {
        let p = LinkedPage::new(page(json!({"items": [1], "links": {"next": "/servers?page=2"}})), "items");
        assert_eq!(
            p.next_page_url().unwrap().unwrap().as_str(),
            "http://cloud/servers?page=2"
        );
    }

    #[test]
    fn test_linked_relations() {
        let location = LinkLocation::Relations("servers_links".into());
        let p = LinkedPage::new(
            page(json!({
                "servers": [{"id": "a"}],
                "servers_links": [
                    {"href": "http://cloud/servers?marker=x", "rel": "self"},
                    {"href": "http://cloud/servers?marker=a", "rel": "next"}
                ]
            })),
            "servers",
        )
        .with_location(location.clone());
        assert_eq!(
            p.next_page_url().unwrap().unwrap().as_str(),
            "http://cloud/servers?marker=a"
        );
        let p = LinkedPage::new(page(json!({"servers": [{"id": "a"}]})), "servers")
            .with_location(location);
        assert!(p.next_page_url().unwrap().is_none());
    }

    #[test]
    fn test_single_page() {
        let p = SinglePage::new(page(json!([{"id": "a"}])), "");
        assert!(!p.is_empty().unwrap());
        assert!(p.next_page_url().unwrap().is_none());
        assert_eq!(p.extract_items::<Item>().unwrap()[0].id, "a");
        let p = SinglePage::new(page(Value::Null), "servers");
        assert!(p.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_each_page_marker() {
        let server = marker_server().await;
        let mut seen = Vec::new();
        let mut pages = 0;
        marker_pager(&server)
            .each_page(&CancellationToken::new(), |page| {
                pages += 1;
                seen.extend(page.extract_items::<Item>()?.into_iter().map(|i| i.id));
                Ok(true)
            })
            .await
            .unwrap();
        assert_eq!(pages, 2);
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_each_page_stop() {
        let server = marker_server().await;
        let mut pages = 0;
        marker_pager(&server)
            .each_page(&CancellationToken::new(), |_| {
                pages += 1;
                Ok(false)
            })
            .await
            .unwrap();
        assert_eq!(pages, 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_each_page_visitor_error() {
        let server = marker_server().await;
        let err = marker_pager(&server)
            .each_page(&CancellationToken::new(), |_| {
                Err(Error::new(ErrorKind::InvalidInput, "stop"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_each_page_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("marker", "a"))
            .respond_with(ResponseTemplate::new(500))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": [{"id": "a"}]})))
            .mount(&server)
            .await;

        let mut pages = 0;
        let err = marker_pager(&server)
            .each_page(&CancellationToken::new(), |_| {
                pages += 1;
                Ok(true)
            })
            .await
            .unwrap_err();
        assert_eq!(pages, 1);
        assert_eq!(err.kind(), ErrorKind::InternalServerError);
    }

    #[tokio::test]
    async fn test_each_page_linked() {
        let server = MockServer::start().await;
        let next = format!("{}/things?page=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/things"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "things": [{"id": "c"}],
                "links": {"next": null}
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/things"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "things": [{"id": "a"}, {"id": "b"}],
                "links": {"next": next}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let url = client.service_url(&["things"]).unwrap();
        let pager = Pager::new(client, url, |result| Ok(LinkedPage::new(result, "things")));
        let mut seen = Vec::new();
        pager
            .each_page(&CancellationToken::new(), |page| {
                seen.extend(page.extract_items::<Item>()?.into_iter().map(|i| i.id));
                Ok(true)
            })
            .await
            .unwrap();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_each_page_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let mut pages = 0;
        marker_pager(&server)
            .each_page(&CancellationToken::new(), |_| {
                pages += 1;
                Ok(true)
            })
            .await
            .unwrap();
        assert_eq!(pages, 0);
    }

    #[tokio::test]
    async fn test_pager_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-custom", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "a"}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let url = client.service_url(&["items"]).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-custom"), HeaderValue::from_static("1"));
        let page = Pager::new(client, url, |result| Ok(SinglePage::new(result, "")))
            .with_headers(headers)
            .all_pages(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(page.extract_items::<Item>().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_pages_marker() {
        let server = marker_server().await;
        let page = marker_pager(&server)
            .all_pages(&CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<String> = page
            .extract_items::<Item>()
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(page.result().body().get("servers_links").is_none());
    }

    #[tokio::test]
    async fn test_all_pages_skips_links() {
        let server = MockServer::start().await;
        let next = format!("{}/servers?marker=a", server.uri());
        Mock::given(method("GET"))
            .and(query_param("marker", "a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{"id": "b"}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{"id": "a"}],
                "servers_links": [{"href": next, "rel": "next"}]
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let url = client.service_url(&["servers"]).unwrap();
        let pager = Pager::new(client, url, |result| {
            Ok(LinkedPage::new(result, "servers")
                .with_location(LinkLocation::Relations("servers_links".into())))
        });
        let page = pager.all_pages(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            page.result().body(),
            &json!({"servers": [{"id": "a"}, {"id": "b"}]})
        );
    }

    #[tokio::test]
    async fn test_all_pages_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
            .mount(&server)
            .await;

        let page = marker_pager(&server)
            .all_pages(&CancellationToken::new())
            .await
            .unwrap();
        assert!(page.is_empty().unwrap());
    }
}
