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

//! Retry and backoff hooks.

use std::fmt::Debug;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use http::header::RETRY_AFTER;
use log::{debug, warn};
use reqwest::{Method, Url};
use tokio_util::sync::CancellationToken;

use super::Error;

/// Default limit of backoff retries per request.
pub const DEFAULT_MAX_BACKOFF_RETRIES: u32 = 60;

/// Hook called when the server responds with HTTP 429 (or 498).
///
/// Returning `Ok(())` repeats the request, returning an error fails it.
#[async_trait]
pub trait RetryBackoff: Debug + Send + Sync {
    /// Decide whether to retry, possibly after sleeping.
    ///
    /// `error` holds the unexpected response, `retries` is the number of backoff retries
    /// already made for this request.
    async fn backoff(
        &self,
        cancel: &CancellationToken,
        error: Error,
        retries: u32,
    ) -> Result<(), Error>;
}

/// Backoff that sleeps for the duration requested in the `Retry-After` header.
///
/// Gives up with the original error if the header is missing or invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryAfterBackoff;

/// Hook called on transport failures, unexpected status codes and undecodable bodies.
///
/// Returning `Ok(())` repeats the request, returning an error fails it. Implemented for
/// closures:
///
/// ```rust
/// use osprovider::{Error, ProviderClient};
///
/// let client = ProviderClient::new().with_retry_policy(
///     |_method: &reqwest::Method, _url: &reqwest::Url, error: Error, failures: u32| {
///         if failures < 3 && error.is_status(503) {
///             Ok(())
///         } else {
///             Err(error)
///         }
///     },
/// );
/// ```
#[async_trait]
pub trait RetryPolicy: Send + Sync {
    /// Decide whether to retry the request.
    async fn retry(
        &self,
        cancel: &CancellationToken,
        method: &Method,
        url: &Url,
        error: Error,
        failures: u32,
    ) -> Result<(), Error>;
}

#[async_trait]
impl<F> RetryPolicy for F
where
    F: Fn(&Method, &Url, Error, u32) -> Result<(), Error> + Send + Sync,
{
    async fn retry(
        &self,
        _cancel: &CancellationToken,
        method: &Method,
        url: &Url,
        error: Error,
        failures: u32,
    ) -> Result<(), Error> {
        self(method, url, error, failures)
    }
}

/// Parse a `Retry-After` value: either delay-seconds or an HTTP date.
///
/// Dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    httpdate::parse_http_date(value)
        .ok()
        .map(|date| date.duration_since(now).unwrap_or_default())
}

#[async_trait]
impl RetryBackoff for RetryAfterBackoff {
    async fn backoff(
        &self,
        cancel: &CancellationToken,
        error: Error,
        retries: u32,
    ) -> Result<(), Error> {
        let delay = error
            .response()
            .and_then(|resp| resp.headers.get(RETRY_AFTER))
            .and_then(|value| value.to_str().ok())
            .and_then(|value| parse_retry_after(value, SystemTime::now()));

        let delay = match delay {
            Some(delay) => delay,
            None => {
                warn!("No valid Retry-After header, giving up after {} retries", retries);
                return Err(error);
            }
        };

        debug!(
            "Server asked to back off for {:?} (retry {})",
            delay,
            retries + 1
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled()),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
