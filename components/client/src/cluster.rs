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

use std::{path::Path, sync::Arc};

use snafu::{OptionExt, ResultExt};
use tsumugi_meta::{MemMetaService, MetaService};
use tsumugi_storage::{
    err::UnregisteredEndpointSnafu, Endpoint, EndpointRegistry, EndpointRegistryRef, ObjectEndpoint,
};
use tsumugi_types::DataNodeInfo;

use crate::{
    err::{Result, StorageSnafu},
    node::FileNodeRef,
    Client, Config,
};

/// LocalCluster runs a metadata service and a set of memory backed data
/// nodes inside the process.
pub struct LocalCluster {
    meta: Arc<MemMetaService>,
    datanodes: Vec<Arc<ObjectEndpoint>>,
    registry: EndpointRegistryRef,
}

impl LocalCluster {
    pub async fn start(block_size: u64, datanode_cnt: usize) -> Result<Self> {
        Self::start_with(block_size, datanode_cnt, ObjectEndpoint::in_memory).await
    }

    /// Like [LocalCluster::start], the data nodes keep their blocks under
    /// `dir`.
    pub async fn start_on_disk(block_size: u64, datanode_cnt: usize, dir: &Path) -> Result<Self> {
        Self::start_with(block_size, datanode_cnt, |info| {
            ObjectEndpoint::on_disk(info, dir)
        })
        .await
    }

    async fn start_with<F>(block_size: u64, datanode_cnt: usize, new_endpoint: F) -> Result<Self>
    where
        F: Fn(DataNodeInfo) -> tsumugi_storage::err::Result<ObjectEndpoint>,
    {
        let meta = Arc::new(MemMetaService::new(block_size));
        let registry = EndpointRegistry::new();
        let mut datanodes = Vec::with_capacity(datanode_cnt);
        for i in 0..datanode_cnt {
            let info = DataNodeInfo::new(0, "127.0.0.1", 50020 + i as u16);
            let endpoint = Arc::new(new_endpoint(info.clone()).context(StorageSnafu)?);
            meta.register_datanode(info).await;
            registry.register(endpoint.clone());
            datanodes.push(endpoint);
        }
        Ok(Self {
            meta,
            datanodes,
            registry,
        })
    }

    pub fn client(&self, config: Config) -> Result<Client> {
        Client::new(config, self.meta.clone(), self.registry.clone())
    }

    pub fn meta(&self) -> &Arc<MemMetaService> { &self.meta }

    pub fn registry(&self) -> &EndpointRegistryRef { &self.registry }

    pub fn datanodes(&self) -> &[Arc<ObjectEndpoint>] { &self.datanodes }

    /// Read the first `file.capacity()` bytes of a file back from the data
    /// nodes. Blocks that were never written read as zeros.
    pub async fn read_file(&self, file: &FileNodeRef) -> Result<Vec<u8>> {
        let capacity = file.capacity() as usize;
        let block_size = self.meta.block_size() as usize;
        let mut content = vec![0u8; capacity];
        for block in self.meta.blocks_of(file.fd()) {
            let start = block.index as usize * block_size;
            if start >= capacity {
                break;
            }
            let endpoint = self
                .datanodes
                .iter()
                .find(|d| d.info() == &block.datanode)
                .context(UnregisteredEndpointSnafu {
                    datanode: block.datanode.clone(),
                })
                .context(StorageSnafu)?;
            let data = endpoint
                .read_block(block.block_id)
                .await
                .context(StorageSnafu)?;
            let end = (start + data.len()).min(capacity);
            content[start..end].copy_from_slice(&data[..end - start]);
        }
        Ok(content)
    }
}
