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

//! Generic extraction of typed values from JSON responses.
//!
//! OpenStack responses usually wrap the resource in a top-level key:
//!
//! ```rust
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Server {
//!     id: String,
//! }
//!
//! let body = serde_json::json!({"servers": [{"id": "1"}, {"id": "2"}]});
//! let servers: Vec<Server> = osprovider::extract_into_slice(&body, "servers").unwrap();
//! assert_eq!(servers[1].id, "2");
//! ```

use http::header::HeaderMap;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::request::Response;
use super::{Error, ErrorKind};

/// Raw result of a request: decoded body, headers and a possible error.
#[derive(Debug, Clone, Default)]
pub struct ApiResult {
    body: Value,
    headers: HeaderMap,
    error: Option<Error>,
}

/// Two parts decoded independently from the same JSON object.
///
/// Each part runs its own `Deserialize` implementation against the whole object, which is
/// useful to combine a base resource with an extension:
///
/// ```rust
/// use serde::Deserialize;
/// use osprovider::Extended;
///
/// #[derive(Debug, Deserialize)]
/// struct Server {
///     name: String,
/// }
///
/// #[derive(Debug, Deserialize)]
/// struct Availability {
///     #[serde(rename = "OS-EXT-AZ:availability_zone")]
///     zone: String,
/// }
///
/// let body = serde_json::json!({
///     "server": {"name": "web", "OS-EXT-AZ:availability_zone": "nova"}
/// });
/// let server: Extended<Server, Availability> =
///     osprovider::extract_into_struct(&body, "server").unwrap();
/// assert_eq!(server.base.name, "web");
/// assert_eq!(server.extension.zone, "nova");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extended<B, E> {
    /// The base part.
    pub base: B,
    /// The extension part.
    pub extension: E,
}

impl<'de, B, E> Deserialize<'de> for Extended<B, E>
where
    B: DeserializeOwned,
    E: DeserializeOwned,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;

        let value = Value::deserialize(deserializer)?;
        let base = B::deserialize(&value).map_err(D::Error::custom)?;
        let extension = E::deserialize(&value).map_err(D::Error::custom)?;
        Ok(Extended { base, extension })
    }
}

impl<B, E> Serialize for Extended<B, E>
where
    B: Serialize,
    E: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::Error as _;

        let mut base = serde_json::to_value(&self.base).map_err(S::Error::custom)?;
        let extension = serde_json::to_value(&self.extension).map_err(S::Error::custom)?;
        match (base.as_object_mut(), extension) {
            (Some(target), Value::Object(source)) => target.extend(source),
            _ => return Err(S::Error::custom("both parts must serialize into objects")),
        }
        base.serialize(serializer)
    }
}

fn select<'v>(body: &'v Value, key: &str) -> Result<&'v Value, Error> {
    if body.is_null() {
        return Err(Error::new(
            ErrorKind::InvalidResponse,
            "Cannot extract from an empty body",
        ));
    }

    if key.is_empty() {
        return Ok(body);
    }

    let object = body.as_object().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidResponse,
            format!("Expected a JSON object with key {}, got {}", key, kind_of(body)),
        )
    })?;
    object.get(key).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidResponse,
            format!("Key {} is missing in the response", key),
        )
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(..) => "a boolean",
        Value::Number(..) => "a number",
        Value::String(..) => "a string",
        Value::Array(..) => "an array",
        Value::Object(..) => "an object",
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, Error> {
    T::deserialize(value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidResponse,
            format!("Failed to decode the response: {}", e),
        )
        .with_source(e)
    })
}

/// Decode the object under `key` (or the whole body if `key` is empty).
pub fn extract_into_struct<T: DeserializeOwned>(body: &Value, key: &str) -> Result<T, Error> {
    let value = select(body, key)?;
    if !value.is_object() {
        return Err(Error::new(
            ErrorKind::InvalidResponse,
            format!("Expected an object, got {}", kind_of(value)),
        ));
    }
    decode(value)
}

/// Decode the array under `key` (or the whole body if `key` is empty).
pub fn extract_into_slice<T: DeserializeOwned>(body: &Value, key: &str) -> Result<Vec<T>, Error> {
    let value = select(body, key)?;
    if !value.is_array() {
        return Err(Error::new(
            ErrorKind::InvalidResponse,
            format!("Expected an array, got {}", kind_of(value)),
        ));
    }
    decode(value)
}

impl ApiResult {
    /// Wrap a decoded body.
    pub fn new(body: Value, headers: HeaderMap) -> ApiResult {
        ApiResult {
            body,
            headers,
            error: None,
        }
    }

    /// A result holding only an error.
    pub fn from_error(error: Error) -> ApiResult {
        ApiResult {
            error: Some(error),
            ..ApiResult::default()
        }
    }

    /// The raw body.
    #[inline]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Response headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The error (if any).
    #[inline]
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Convert into the body or the error.
    pub fn into_body(self) -> Result<Value, Error> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.body),
        }
    }

    fn check(&self) -> Result<&Value, Error> {
        match self.error {
            Some(ref err) => Err(err.clone()),
            None => Ok(&self.body),
        }
    }

    /// Decode the body (or its `key` part) into any type.
    pub fn extract_into<T: DeserializeOwned>(&self, key: &str) -> Result<T, Error> {
        decode(select(self.check()?, key)?)
    }

    /// Decode the object under `key` (or the whole body if `key` is empty).
    pub fn extract_into_struct<T: DeserializeOwned>(&self, key: &str) -> Result<T, Error> {
        extract_into_struct(self.check()?, key)
    }

    /// Decode the array under `key` (or the whole body if `key` is empty).
    pub fn extract_into_slice<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, Error> {
        extract_into_slice(self.check()?, key)
    }
}

impl From<Result<Response, Error>> for ApiResult {
    fn from(value: Result<Response, Error>) -> ApiResult {
        match value {
            Ok(resp) => resp.into_result(),
            Err(err) => ApiResult::from_error(err),
        }
    }
}
