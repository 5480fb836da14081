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

//! Various utilities.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::{Error, ErrorKind};

const WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// Ensure that the URL ends with a slash.
///
/// Relative paths are joined to such URLs without dropping the last segment.
pub fn normalize_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Poll the predicate once a second until it returns `true`.
///
/// Fails with the predicate's error, with `Cancelled` when the token is cancelled or with
/// `OperationTimedOut` after `timeout`.
///
/// ```rust,no_run
/// # async fn example(client: osprovider::ServiceClient) -> Result<(), osprovider::Error> {
/// use std::time::Duration;
/// use osprovider::RequestOptions;
///
/// let cancel = tokio_util::sync::CancellationToken::new();
/// let url = client.service_url(&["servers", "abcd"])?;
/// osprovider::wait_for(&cancel, Duration::from_secs(600), || async {
///     let server = client.get(&cancel, url.clone(), RequestOptions::new()).await?;
///     let status = server.json().and_then(|v| v.pointer("/server/status"));
///     Ok(status.and_then(|s| s.as_str()) == Some("ACTIVE"))
/// })
/// .await
/// # }
/// ```
pub async fn wait_for<F, Fut>(
    cancel: &CancellationToken,
    timeout: Duration,
    predicate: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    wait_for_with_interval(cancel, timeout, WAIT_INTERVAL, predicate).await
}

pub(crate) async fn wait_for_with_interval<F, Fut>(
    cancel: &CancellationToken,
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            _ = sleep_until(deadline) => {
                return Err(Error::new(
                    ErrorKind::OperationTimedOut,
                    format!("Condition was not met within {:?}", timeout),
                ));
            }
            result = predicate() => {
                if result? {
                    return Ok(());
                }
            }
        }

        debug!("Condition is not met yet, sleeping for {:?}", interval);
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            _ = sleep(interval) => {}
        }
    }
}

#[cfg(test)]
pub mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::{normalize_url, wait_for_with_interval};
    use crate::{Error, ErrorKind};

    const TICK: Duration = Duration::from_millis(10);

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("http://cloud/compute"), "http://cloud/compute/");
        assert_eq!(normalize_url("http://cloud/compute/"), "http://cloud/compute/");
    }

    #[tokio::test]
    async fn test_wait_for_success() {
        let calls = AtomicUsize::new(0);
        wait_for_with_interval(&CancellationToken::new(), Duration::from_secs(5), TICK, || async {
            Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_for_error() {
        let err = wait_for_with_interval(&CancellationToken::new(), Duration::from_secs(5), TICK, || async {
            Err::<bool, _>(Error::new(ErrorKind::ResourceNotFound, "gone"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    }

    #[tokio::test]
    async fn test_wait_for_timeout() {
        let err = wait_for_with_interval(
            &CancellationToken::new(),
            Duration::from_millis(50),
            TICK,
            || async { Ok(false) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationTimedOut);
    }

    #[tokio::test]
    async fn test_wait_for_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for_with_interval(&cancel, Duration::from_secs(5), TICK, || async {
            Ok(false)
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
