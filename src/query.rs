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


//! Query string helpers.

use std::borrow::Cow;
use std::fmt;
use std::ops::{Deref, DerefMut};

use reqwest::Url;

use super::Error;

/// An item in a query.
pub trait QueryItem {
    /// Represent the item for a query.
    ///
    /// The first item of the resulting tuple is a key, the second - its value.
    fn query_item(&self) -> Result<(&str, Cow<str>), Error>;
}

impl<K: AsRef<str>, V: fmt::Display> QueryItem for (K, V) {
    fn query_item(&self) -> Result<(&str, Cow<str>), Error> {
        Ok((self.0.as_ref(), Cow::Owned(self.1.to_string())))
    }
}

/// A list of query items, keys may repeat.
///
/// ```rust
/// use std::borrow::Cow;
/// use osprovider::{Error, Query, QueryItem};
///
/// #[derive(Debug)]
/// enum ServerQuery {
///     Limit(usize),
///     Status(String),
/// }
///
/// impl QueryItem for ServerQuery {
///     fn query_item(&self) -> Result<(&str, Cow<str>), Error> {
///         Ok(match self {
///             ServerQuery::Limit(limit) => ("limit", Cow::Owned(limit.to_string())),
///             ServerQuery::Status(status) => ("status", Cow::Borrowed(status)),
///         })
///     }
/// }
///
/// let query = Query::default()
///     .with(ServerQuery::Limit(10))
///     .with(ServerQuery::Status("ACTIVE".into()));
/// let mut url = reqwest::Url::parse("https://compute.example.com/servers").unwrap();
/// query.append_to(&mut url).unwrap();
/// assert_eq!(url.as_str(), "https://compute.example.com/servers?limit=10&status=ACTIVE");
/// ```
#[derive(Debug, Clone)]
pub struct Query<T>(pub Vec<T>);

impl<T> Default for Query<T> {
    fn default() -> Query<T> {
        Query(Vec::new())
    }
}

impl<T> Query<T> {
    /// Add a query item.
    #[inline]
    pub fn with(mut self, item: T) -> Self {
        self.0.push(item);
        self
    }
}

impl<T: QueryItem> Query<T> {
    /// Append the items to the query of the URL, keeping the existing pairs.
    ///
    /// An empty query leaves the URL untouched.
    pub fn append_to(&self, url: &mut Url) -> Result<(), Error> {
        if self.0.is_empty() {
            return Ok(());
        }

        let items = self
            .0
            .iter()
            .map(|item| item.query_item())
            .collect::<Result<Vec<_>, _>>()?;
        let mut pairs = url.query_pairs_mut();
        for (key, value) in items {
            let _ = pairs.append_pair(key, &value);
        }
        Ok(())
    }
}

impl<T> Deref for Query<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.0
    }
}

impl<T> DerefMut for Query<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.0
    }
}

impl<T> From<Vec<T>> for Query<T> {
    fn from(items: Vec<T>) -> Query<T> {
        Query(items)
    }
}
