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

//! The metadata service ("namenode") as the client sees it.

pub mod err;
mod mem;

use std::sync::Arc;

use async_trait::async_trait;
pub use err::{Error, Result};
pub use mem::MemMetaService;
use tsumugi_common::{Fd, FileOffset};
use tsumugi_types::{BlockInfo, FileInfo, FileType};

#[async_trait]
pub trait MetaService: Send + Sync {
    /// The size of the blocks this service allocates.
    fn block_size(&self) -> u64;

    async fn create(&self, path: &str, file_type: FileType) -> Result<FileInfo>;

    async fn lookup(&self, path: &str) -> Result<FileInfo>;

    /// The block holding `position` of file `fd`. A block that does not
    /// exist yet is allocated, and concurrent callers asking for the same
    /// block get the same answer.
    async fn get_block(&self, fd: Fd, token: u64, position: FileOffset) -> Result<BlockInfo>;

    /// Publish the capacity of `info`. The stored capacity never shrinks.
    async fn set_file(&self, info: &FileInfo, close: bool) -> Result<()>;
}

pub type MetaServiceRef = Arc<dyn MetaService>;
