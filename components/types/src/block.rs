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

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tsumugi_common::{BlockId, BlockIndex, Fd};

/// The address of a data node, it identifies the endpoint that
/// owns a block.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataNodeInfo {
    pub storage_class: u32,
    pub host: String,
    pub port: u16,
}

impl DataNodeInfo {
    pub fn new(storage_class: u32, host: impl Into<String>, port: u16) -> Self {
        Self {
            storage_class,
            host: host.into(),
            port,
        }
    }
}

impl Display for DataNodeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.storage_class)
    }
}

/// BlockInfo is what the metadata service hands out for one block of a file.
/// The write path treats it as read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// The cluster wide id of the block.
    pub block_id: BlockId,
    /// The file owning the block.
    pub fd: Fd,
    /// Which block of the file this is.
    pub index: BlockIndex,
    /// The data node storing the block.
    pub datanode: DataNodeInfo,
    /// The size of the block.
    pub length: u64,
    /// Access token the endpoint checks on transfer.
    pub token: u32,
}

impl Display for BlockInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Block[{}] fd: {}, index: {}, on {}",
            self.block_id, self.fd, self.index, self.datanode
        )
    }
}
