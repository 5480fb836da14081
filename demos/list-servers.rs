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

use futures::TryStreamExt;
use osprovider::pagination::{MarkerPage, Pager};
use osprovider::{ApiVersion, Query, RequestOptions, ServiceClient};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cancel = CancellationToken::new();
    let config =
        osprovider::from_env().expect("Failed to load the configuration from the environment");
    let provider = config
        .authenticated_client(&cancel)
        .await
        .expect("Failed to authenticate");
    let compute = ServiceClient::from_catalog(provider, &config.endpoint_opts("compute"))
        .await
        .expect("Compute service is not in the catalog")
        .with_microversion(ApiVersion(2, 1));

    let url = compute
        .service_url_with_query(&["servers"], &Query::default().with(("limit", 10)))
        .expect("Invalid compute endpoint");

    let servers: Vec<Server> = Pager::new(compute.clone(), url, |result| {
        Ok(MarkerPage::new(result, "servers"))
    })
    .into_item_stream(cancel.clone(), |page| page.extract_items())
    .try_collect()
    .await
    .expect("Failed to list servers");

    for server in servers {
        println!("{} {} {:?}", server.id, server.name, server.status);
    }

    let limits = compute
        .get(
            &cancel,
            compute.service_url(&["limits"]).expect("Invalid compute endpoint"),
            RequestOptions::new(),
        )
        .await
        .expect("Failed to fetch limits")
        .into_result();
    println!("{:?}", limits.extract_into::<serde_json::Value>("limits"));
}
