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

//! Request options and responses.

use std::collections::HashMap;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use log::trace;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::UnexpectedResponse;
use super::result::ApiResult;
use super::{Error, ErrorKind};

/// How to handle the body of a successful response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResponseMode {
    /// Read and drop the body so that the connection can be reused.
    #[default]
    Discard,
    /// Decode the body as one JSON document.
    Json,
    /// Return the body as a stream, the caller is responsible for reading it.
    Raw,
}

#[derive(Debug, Clone)]
pub(crate) enum RequestBody {
    Json(Result<Vec<u8>, Error>),
    Raw {
        content_type: HeaderValue,
        data: Vec<u8>,
    },
}

/// Change to one of the request headers.
#[derive(Debug, Clone)]
pub(crate) enum HeaderChange {
    Set(HeaderValue),
    Append(HeaderValue),
    Remove,
}

/// Options of a single request.
///
/// ```rust
/// use osprovider::{RequestOptions, ResponseMode};
///
/// let options = RequestOptions::new()
///     .with_json_body(&serde_json::json!({"server": {"name": "test"}}))
///     .with_ok_codes([202])
///     .with_response_mode(ResponseMode::Json);
/// ```
#[derive(Debug, Clone, Default)]
#[must_use = "request options do nothing until passed to a request"]
pub struct RequestOptions {
    pub(crate) body: Option<RequestBody>,
    pub(crate) ok_codes: Option<Vec<u16>>,
    pub(crate) headers: Vec<(HeaderName, HeaderChange)>,
    pub(crate) mode: Option<ResponseMode>,
    pub(crate) timeout: Option<Duration>,
}

/// Body of a successful response.
#[derive(Debug)]
pub enum ResponseBody {
    /// No body was requested or the response was 204 No Content.
    Empty,
    /// Decoded JSON body.
    Json(Value),
    /// Unread body stream.
    Raw(reqwest::Response),
}

/// A successful response.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    body: ResponseBody,
}

/// Status codes accepted by default for the given method.
pub fn default_ok_codes(method: &Method) -> Vec<u16> {
    match *method {
        Method::GET | Method::HEAD => vec![200],
        Method::POST | Method::PUT => vec![201, 202],
        Method::PATCH => vec![200, 202, 204],
        Method::DELETE => vec![202, 204],
        _ => Vec::new(),
    }
}

impl RequestOptions {
    /// Empty options: no body, default status codes, discarded response body.
    #[inline]
    pub fn new() -> RequestOptions {
        RequestOptions::default()
    }

    /// Serialize the value as the JSON body of the request.
    ///
    /// Serialization errors are reported when the request is made.
    pub fn with_json_body<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.body = Some(RequestBody::Json(
            serde_json::to_vec(body).map_err(|e| {
                Error::new(
                    ErrorKind::InvalidInput,
                    format!("Cannot serialize request body: {}", e),
                )
                .with_source(e)
            }),
        ));
        self
    }

    /// Use raw bytes with the given content type as the body.
    pub fn with_raw_body<B: Into<Vec<u8>>>(mut self, content_type: HeaderValue, body: B) -> Self {
        self.body = Some(RequestBody::Raw {
            content_type,
            data: body.into(),
        });
        self
    }

    /// Override the accepted status codes.
    pub fn with_ok_codes<I: IntoIterator<Item = u16>>(mut self, codes: I) -> Self {
        self.ok_codes = Some(codes.into_iter().collect());
        self
    }

    /// Set a header, overriding the default value if any.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, HeaderChange::Set(value)));
        self
    }

    /// Remove a header that would otherwise be sent.
    pub fn without_header(mut self, name: HeaderName) -> Self {
        self.headers.push((name, HeaderChange::Remove));
        self
    }

    /// Set all headers from the map.
    ///
    /// Each name replaces the default value, all values of a name are sent.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        let mut last = None;
        for (name, value) in headers {
            match name {
                Some(name) => {
                    self.headers.push((name.clone(), HeaderChange::Set(value)));
                    last = Some(name);
                }
                None => {
                    if let Some(ref name) = last {
                        self.headers.push((name.clone(), HeaderChange::Append(value)));
                    }
                }
            }
        }
        self
    }

    /// How to handle the response body.
    #[inline]
    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Timeout for this request.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Response mode in effect.
    #[inline]
    pub fn response_mode(&self) -> ResponseMode {
        self.mode.unwrap_or_default()
    }

    /// Set the response mode unless it is already set.
    pub(crate) fn or_response_mode(mut self, mode: ResponseMode) -> Self {
        let _ = self.mode.get_or_insert(mode);
        self
    }

    /// Set the accepted codes unless they are already set.
    pub(crate) fn or_ok_codes<I: IntoIterator<Item = u16>>(mut self, codes: I) -> Self {
        if self.ok_codes.is_none() {
            self.ok_codes = Some(codes.into_iter().collect());
        }
        self
    }

    /// Apply extra headers to the map in the order they were added.
    pub(crate) fn apply_headers(&self, headers: &mut HeaderMap) {
        for (name, change) in &self.headers {
            match change {
                HeaderChange::Set(value) => {
                    let _ = headers.insert(name.clone(), value.clone());
                }
                HeaderChange::Append(value) => {
                    let _ = headers.append(name.clone(), value.clone());
                }
                HeaderChange::Remove => {
                    let _ = headers.remove(name);
                }
            }
        }
    }

    /// Encoded body and its content type.
    pub(crate) fn encoded_body(&self) -> Result<Option<(HeaderValue, Vec<u8>)>, Error> {
        Ok(match self.body {
            Some(RequestBody::Json(ref data)) => Some((
                HeaderValue::from_static("application/json"),
                data.clone()?,
            )),
            Some(RequestBody::Raw {
                ref content_type,
                ref data,
            }) => Some((content_type.clone(), data.clone())),
            None => None,
        })
    }
}

impl Response {
    /// Read the body of a successful response according to the mode.
    pub(crate) async fn read(response: reqwest::Response, mode: ResponseMode) -> Result<Response, Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = match mode {
            ResponseMode::Discard => {
                let _ = response.bytes().await?;
                ResponseBody::Empty
            }
            ResponseMode::Json if status == StatusCode::NO_CONTENT => {
                let _ = response.bytes().await?;
                ResponseBody::Empty
            }
            ResponseMode::Json => {
                let data = response.bytes().await?;
                ResponseBody::Json(serde_json::from_slice(&data)?)
            }
            ResponseMode::Raw => ResponseBody::Raw(response),
        };
        Ok(Response {
            status,
            headers,
            url,
            body,
        })
    }

    /// Response status code.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Final URL of the response.
    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Response body.
    #[inline]
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Decoded JSON body (if requested).
    #[inline]
    pub fn json(&self) -> Option<&Value> {
        match self.body {
            ResponseBody::Json(ref value) => Some(value),
            _ => None,
        }
    }

    /// Convert into the raw body stream.
    pub fn into_raw(self) -> Result<reqwest::Response, Error> {
        match self.body {
            ResponseBody::Raw(resp) => Ok(resp),
            _ => Err(Error::new(
                ErrorKind::InvalidInput,
                "The response body was not requested in the raw mode",
            )),
        }
    }

    /// Convert into a result wrapper suitable for extraction.
    pub fn into_result(self) -> ApiResult {
        let body = match self.body {
            ResponseBody::Json(value) => value,
            _ => Value::Null,
        };
        ApiResult::new(body, self.headers)
    }
}

#[derive(Debug, Deserialize)]
struct Message {
    message: Option<String>,
    faultstring: Option<String>,
    title: Option<String>,
    // Ironic legacy format: JSON inside JSON
    error_message: Option<String>,
}

impl Message {
    fn convert(self, recursive: bool) -> Option<String> {
        if let Some(value) = self.message.or(self.faultstring).or(self.title) {
            Some(value)
        } else if recursive {
            self.error_message.and_then(|json| {
                serde_json::from_str::<Message>(&json)
                    .ok()
                    .and_then(|msg| msg.convert(false))
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Map(HashMap<String, Message>),
    Message(Message),
}

/// Extract a human-readable message from an OpenStack error body.
///
/// Falls back to the whole body.
pub(crate) fn extract_message(text: &str) -> String {
    serde_json::from_str::<ErrorResponse>(text)
        .ok()
        .and_then(|body| match body {
            ErrorResponse::Map(map) => map.into_iter().next().and_then(|(_k, v)| v.convert(true)),
            ErrorResponse::Message(msg) => msg.convert(true),
        })
        .unwrap_or_else(|| text.to_string())
}

/// Read a response with an unexpected status code into an error.
pub(crate) async fn unexpected(
    method: &Method,
    url: &Url,
    expected: &[u16],
    response: reqwest::Response,
) -> Error {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    trace!(
        "HTTP {} request to {} returned {}; body: {}",
        method,
        url,
        status,
        body
    );
    Error::unexpected_response(UnexpectedResponse {
        method: method.clone(),
        url: url.clone(),
        expected: expected.to_vec(),
        actual: status.as_u16(),
        body: extract_message(&body),
        headers,
    })
}
