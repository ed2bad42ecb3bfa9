// Copyright 2024 tsumugi
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use snafu::OptionExt;
use tracing::debug;
use tsumugi_types::{BlockInfo, DataNodeInfo, TransferResult};

use crate::{
    buffer::RegisteredBuffer,
    err::{Result, UnregisteredEndpointSnafu},
};

/// Endpoint is the client side of one data node.
///
/// [Endpoint::write] must not block the calling thread: the returned future
/// does the transfer and resolves once the data node has acknowledged it.
/// The buffer is held until then and dropped right after.
#[async_trait]
pub trait Endpoint: Send + Sync {
    fn info(&self) -> &DataNodeInfo;

    async fn write(
        &self,
        buf: RegisteredBuffer,
        block: &BlockInfo,
        block_offset: u64,
    ) -> Result<TransferResult>;
}

pub type EndpointRef = Arc<dyn Endpoint>;

pub type EndpointRegistryRef = Arc<EndpointRegistry>;

/// EndpointRegistry maps data nodes to their endpoints.
#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: DashMap<DataNodeInfo, EndpointRef>,
}

impl EndpointRegistry {
    pub fn new() -> EndpointRegistryRef { Arc::new(Self::default()) }

    /// Register an endpoint, replacing the old one of the same data node.
    pub fn register(&self, endpoint: EndpointRef) -> Option<EndpointRef> {
        let datanode = endpoint.info().clone();
        debug!("register endpoint {}", datanode);
        self.endpoints.insert(datanode, endpoint)
    }

    pub fn get(&self, datanode: &DataNodeInfo) -> Result<EndpointRef> {
        self.endpoints
            .get(datanode)
            .map(|e| e.value().clone())
            .context(UnregisteredEndpointSnafu {
                datanode: datanode.clone(),
            })
    }

    pub fn len(&self) -> usize { self.endpoints.len() }

    pub fn is_empty(&self) -> bool { self.endpoints.is_empty() }
}
