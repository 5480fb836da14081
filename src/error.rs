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

//! Error and result implementations.

use std::fmt;
use std::sync::Arc;

use http::header::{HeaderMap, InvalidHeaderValue};
use reqwest::{Method, StatusCode, Url};

/// Kind of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Response code that has no more specific kind.
    UnexpectedResponseCode,

    /// Request was malformed (HTTP 400).
    BadRequest,

    /// Authentication failed (HTTP 401).
    AuthenticationFailed,

    /// Access to the resource is denied (HTTP 403).
    AccessDenied,

    /// Requested resource was not found (HTTP 404).
    ResourceNotFound,

    /// Method is not allowed for the resource (HTTP 405).
    MethodNotAllowed,

    /// The server timed out waiting for the request (HTTP 408).
    RequestTimeout,

    /// Request cannot be fulfilled due to a conflict (HTTP 409).
    Conflict,

    /// Rate limit exceeded (HTTP 429).
    TooManyRequests,

    /// Internal server error (HTTP 500).
    InternalServerError,

    /// Bad gateway (HTTP 502).
    BadGateway,

    /// Service is temporarily unavailable (HTTP 503).
    ServiceUnavailable,

    /// Gateway timed out (HTTP 504).
    GatewayTimeout,

    /// The reauthentication hook failed.
    ///
    /// The original failure is available via `source`.
    UnableToReauthenticate,

    /// Reauthentication succeeded but the retried request failed.
    ///
    /// The inner error is available via [Error::original].
    ErrorAfterReauthentication,

    /// Invalid value passed to one of the calls.
    InvalidInput,

    /// Invalid or unexpected response body.
    InvalidResponse,

    /// Configuration is invalid or incomplete.
    InvalidConfig,

    /// Requested service endpoint was not found in the catalog.
    EndpointNotFound,

    /// The service does not support the requested API version.
    IncompatibleApiVersion,

    /// The operation was cancelled.
    Cancelled,

    /// Generic protocol (transport) error.
    ProtocolError,

    /// Operation timed out.
    OperationTimedOut,
}

/// Details of a response with an unexpected status code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct UnexpectedResponse {
    /// Method of the request.
    pub method: Method,
    /// URL of the request.
    pub url: Url,
    /// Status codes that were accepted for this request.
    pub expected: Vec<u16>,
    /// The status code actually received.
    pub actual: u16,
    /// Response body, if any.
    pub body: String,
    /// Response headers.
    pub headers: HeaderMap,
}

/// Error from an OpenStack call.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: Option<StatusCode>,
    response: Option<Box<UnexpectedResponse>>,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Create a new error of the provided kind.
    #[inline]
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Error {
        Error {
            kind,
            message: message.into(),
            status: None,
            response: None,
            source: None,
        }
    }

    /// Create an error for a response with an unexpected status code.
    pub fn unexpected_response(response: UnexpectedResponse) -> Error {
        let status = StatusCode::from_u16(response.actual).ok();
        let message = format!(
            "Expected HTTP response code {:?} when accessing [{} {}], but got {} instead: {}",
            response.expected, response.method, response.url, response.actual, response.body
        );
        Error {
            kind: status.map(From::from).unwrap_or(ErrorKind::UnexpectedResponseCode),
            message,
            status,
            response: Some(Box::new(response)),
            source: None,
        }
    }

    /// Create an error signalling that the operation was cancelled.
    #[inline]
    pub fn cancelled() -> Error {
        Error::new(ErrorKind::Cancelled, "The operation was cancelled")
    }

    /// Wrap a failure of the reauthentication hook.
    pub fn unable_to_reauthenticate(cause: Error) -> Error {
        Error::new(
            ErrorKind::UnableToReauthenticate,
            format!("Unable to re-authenticate: {}", cause),
        )
        .with_source(cause)
    }

    /// Wrap a failure of a request retried after a successful reauthentication.
    pub fn after_reauthentication(inner: Error) -> Error {
        let status = inner.status;
        Error {
            kind: ErrorKind::ErrorAfterReauthentication,
            message: format!(
                "Successfully re-authenticated, but got error executing request: {}",
                inner
            ),
            status,
            response: None,
            source: Some(Arc::new(inner)),
        }
    }

    /// Add an HTTP status code to the error.
    #[inline]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Add a source error.
    #[inline]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// HTTP status code (if any).
    #[inline]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Whether the error was caused by the given HTTP status code.
    #[inline]
    pub fn is_status(&self, code: u16) -> bool {
        self.status.map(|s| s.as_u16() == code).unwrap_or(false)
    }

    /// Details of the unexpected response that caused this error.
    ///
    /// Looks through errors received after a reauthentication.
    pub fn response(&self) -> Option<&UnexpectedResponse> {
        match self.response {
            Some(ref resp) => Some(resp),
            None => self.original().and_then(|e| e.response()),
        }
    }

    /// The inner error for errors that wrap another `Error`.
    pub fn original(&self) -> Option<&Error> {
        self.source
            .as_ref()
            .and_then(|src| src.downcast_ref::<Error>())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::UnexpectedResponseCode => "Unexpected response code",
            ErrorKind::BadRequest => "Bad request",
            ErrorKind::AuthenticationFailed => "Failed to authenticate",
            ErrorKind::AccessDenied => "Access to the resource is denied",
            ErrorKind::ResourceNotFound => "Requested resource was not found",
            ErrorKind::MethodNotAllowed => "Method is not allowed",
            ErrorKind::RequestTimeout => "Request timed out",
            ErrorKind::Conflict => "Request cannot be fulfilled due to a conflict",
            ErrorKind::TooManyRequests => "Too many requests",
            ErrorKind::InternalServerError => "Internal server error",
            ErrorKind::BadGateway => "Bad gateway",
            ErrorKind::ServiceUnavailable => "Service is temporarily unavailable",
            ErrorKind::GatewayTimeout => "Gateway timed out",
            ErrorKind::UnableToReauthenticate => "Unable to re-authenticate",
            ErrorKind::ErrorAfterReauthentication => "Request failed after re-authentication",
            ErrorKind::InvalidInput => "Input value(s) are invalid or missing",
            ErrorKind::InvalidResponse => "Received invalid response",
            ErrorKind::InvalidConfig => "Invalid configuration",
            ErrorKind::EndpointNotFound => "Requested endpoint was not found",
            ErrorKind::IncompatibleApiVersion => "Incompatible API version",
            ErrorKind::Cancelled => "Operation was cancelled",
            ErrorKind::ProtocolError => "Error when accessing the server",
            ErrorKind::OperationTimedOut => "Operation timed out",
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.message.is_empty() {
            fmt::Display::fmt(&self.kind, f)
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|src| src.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<StatusCode> for ErrorKind {
    fn from(value: StatusCode) -> ErrorKind {
        match value {
            StatusCode::BAD_REQUEST => ErrorKind::BadRequest,
            StatusCode::UNAUTHORIZED => ErrorKind::AuthenticationFailed,
            StatusCode::FORBIDDEN => ErrorKind::AccessDenied,
            StatusCode::NOT_FOUND => ErrorKind::ResourceNotFound,
            StatusCode::METHOD_NOT_ALLOWED => ErrorKind::MethodNotAllowed,
            StatusCode::REQUEST_TIMEOUT => ErrorKind::RequestTimeout,
            StatusCode::CONFLICT => ErrorKind::Conflict,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::TooManyRequests,
            StatusCode::INTERNAL_SERVER_ERROR => ErrorKind::InternalServerError,
            StatusCode::BAD_GATEWAY => ErrorKind::BadGateway,
            StatusCode::SERVICE_UNAVAILABLE => ErrorKind::ServiceUnavailable,
            StatusCode::GATEWAY_TIMEOUT => ErrorKind::GatewayTimeout,
            _ => ErrorKind::UnexpectedResponseCode,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Error {
        let kind = if value.is_timeout() {
            ErrorKind::OperationTimedOut
        } else if value.is_decode() {
            ErrorKind::InvalidResponse
        } else if let Some(status) = value.status() {
            status.into()
        } else {
            ErrorKind::ProtocolError
        };

        let error = Error::new(kind, value.to_string());
        match value.status() {
            Some(status) => error.with_status(status),
            None => error,
        }
        .with_source(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Error {
        Error::new(
            ErrorKind::InvalidResponse,
            format!("Failed to decode JSON: {}", value),
        )
        .with_source(value)
    }
}

impl From<url::ParseError> for Error {
    fn from(value: url::ParseError) -> Error {
        Error::new(ErrorKind::InvalidInput, format!("Invalid URL: {}", value)).with_source(value)
    }
}

impl From<InvalidHeaderValue> for Error {
    fn from(value: InvalidHeaderValue) -> Error {
        Error::new(
            ErrorKind::InvalidInput,
            format!("Invalid header value: {}", value),
        )
        .with_source(value)
    }
}
