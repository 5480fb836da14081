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

//! Streams of pages and items.

use async_stream::try_stream;
use futures::pin_mut;
use futures::stream::{Stream, TryStreamExt};
use tokio_util::sync::CancellationToken;

use super::pagination::{Page, Pager};
use super::Error;

impl<P: Page> Pager<P> {
    /// Turn the pager into a stream of pages.
    ///
    /// The stream ends on an empty page or after the last page.
    pub fn into_stream(self, cancel: CancellationToken) -> impl Stream<Item = Result<P, Error>> {
        try_stream! {
            let mut url = Some(self.initial_url().clone());
            while let Some(current) = url.take() {
                let page = self.fetch(&cancel, current).await?;
                if page.is_empty()? {
                    break;
                }
                url = page.next_page_url()?;
                yield page;
            }
        }
    }

    /// Turn the pager into a stream of items.
    ///
    /// ```rust,no_run
    /// # async fn example(pager: osprovider::pagination::Pager<osprovider::pagination::MarkerPage>) -> Result<(), osprovider::Error> {
    /// use futures::TryStreamExt;
    ///
    /// let cancel = tokio_util::sync::CancellationToken::new();
    /// let ids: Vec<serde_json::Value> = pager
    ///     .into_item_stream(cancel, |page| page.extract_items())
    ///     .try_collect()
    ///     .await?;
    /// # Ok(()) }
    /// ```
    pub fn into_item_stream<T, F>(
        self,
        cancel: CancellationToken,
        extract: F,
    ) -> impl Stream<Item = Result<T, Error>>
    where
        F: Fn(&P) -> Result<Vec<T>, Error>,
    {
        try_stream! {
            let pages = self.into_stream(cancel);
            pin_mut!(pages);
            while let Some(page) = pages.try_next().await? {
                for item in extract(&page)? {
                    yield item;
                }
            }
        }
    }
}
