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

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use snafu::{ensure, OptionExt};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use tsumugi_common::{cal_block_idx, BlockIndex, Fd, FileOffset};
use tsumugi_types::{BlockInfo, DataNodeInfo, FileInfo, FileType};

use crate::{
    err::{
        AlreadyExistsSnafu, InvalidPathSnafu, InvalidTokenSnafu, NoDataNodeSnafu, NotFoundSnafu,
        UnknownFileSnafu,
    },
    MetaService, Result,
};

/// MemMetaService keeps the whole namespace in process memory.
///
/// Blocks are placed round-robin over the registered data nodes.
pub struct MemMetaService {
    block_size: u64,
    datanodes: RwLock<Vec<DataNodeInfo>>,
    // path -> file
    files: DashMap<String, FileInfo>,
    // fd -> path
    fds: DashMap<Fd, String>,
    blocks: DashMap<(Fd, BlockIndex), BlockInfo>,

    next_fd: AtomicU64,
    next_block_id: AtomicU64,
    next_placement: AtomicUsize,
    block_lookups: AtomicU64,
}

impl MemMetaService {
    pub fn new(block_size: u64) -> Self {
        Self {
            block_size,
            datanodes: Default::default(),
            files: DashMap::new(),
            fds: DashMap::new(),
            blocks: DashMap::new(),
            next_fd: AtomicU64::new(1),
            next_block_id: AtomicU64::new(1),
            next_placement: AtomicUsize::new(0),
            block_lookups: AtomicU64::new(0),
        }
    }

    pub async fn register_datanode(&self, datanode: DataNodeInfo) {
        debug!("register data node {}", datanode);
        self.datanodes.write().await.push(datanode);
    }

    /// How many times [MetaService::get_block] has been served.
    pub fn block_lookups(&self) -> u64 { self.block_lookups.load(Ordering::Acquire) }

    /// Number of blocks allocated for `fd`.
    pub fn block_count(&self, fd: Fd) -> usize {
        self.blocks.iter().filter(|e| e.key().0 == fd).count()
    }

    /// The blocks allocated for `fd`, ordered by index.
    pub fn blocks_of(&self, fd: Fd) -> Vec<BlockInfo> {
        let mut blocks = self
            .blocks
            .iter()
            .filter(|e| e.key().0 == fd)
            .map(|e| e.value().clone())
            .collect::<Vec<_>>();
        blocks.sort_by_key(|b| b.index);
        blocks
    }

    async fn place(&self, fd: Fd, position: FileOffset) -> Result<DataNodeInfo> {
        let datanodes = self.datanodes.read().await;
        ensure!(!datanodes.is_empty(), NoDataNodeSnafu { fd, position });
        let i = self.next_placement.fetch_add(1, Ordering::Relaxed) % datanodes.len();
        Ok(datanodes[i].clone())
    }
}

#[async_trait]
impl MetaService for MemMetaService {
    fn block_size(&self) -> u64 { self.block_size }

    async fn create(&self, path: &str, file_type: FileType) -> Result<FileInfo> {
        ensure!(
            path.starts_with('/') && path.len() > 1 && !path.ends_with('/'),
            InvalidPathSnafu { path }
        );
        let fd = match self.files.entry(path.to_string()) {
            Entry::Occupied(_) => return AlreadyExistsSnafu { path }.fail(),
            Entry::Vacant(v) => {
                let fd = self.next_fd.fetch_add(1, Ordering::AcqRel);
                v.insert(FileInfo {
                    fd,
                    path: path.to_string(),
                    file_type,
                    capacity: 0,
                    token: fd.wrapping_mul(0x9E37_79B9_7F4A_7C15),
                })
                .fd
            }
        };
        self.fds.insert(fd, path.to_string());
        debug!("create {:?} {}, fd {}", file_type, path, fd);
        self.lookup(path).await
    }

    async fn lookup(&self, path: &str) -> Result<FileInfo> {
        self.files
            .get(path)
            .map(|f| f.value().clone())
            .context(NotFoundSnafu { path })
    }

    #[instrument(skip(self))]
    async fn get_block(&self, fd: Fd, token: u64, position: FileOffset) -> Result<BlockInfo> {
        self.block_lookups.fetch_add(1, Ordering::AcqRel);
        let path = self
            .fds
            .get(&fd)
            .map(|p| p.value().clone())
            .context(UnknownFileSnafu { fd })?;
        let expected = self
            .files
            .get(&path)
            .map(|f| f.token)
            .context(UnknownFileSnafu { fd })?;
        ensure!(expected == token, InvalidTokenSnafu { fd });

        let index = cal_block_idx(position, self.block_size);
        if let Some(block) = self.blocks.get(&(fd, index)) {
            return Ok(block.value().clone());
        }

        let datanode = self.place(fd, position).await?;
        let block = self
            .blocks
            .entry((fd, index))
            .or_insert_with(|| {
                let block = BlockInfo {
                    block_id: self.next_block_id.fetch_add(1, Ordering::AcqRel),
                    fd,
                    index,
                    datanode,
                    length: self.block_size,
                    token: (fd as u32).wrapping_mul(31).wrapping_add(index as u32),
                };
                debug!("allocate {}", block);
                block
            })
            .value()
            .clone();
        Ok(block)
    }

    async fn set_file(&self, info: &FileInfo, close: bool) -> Result<()> {
        let mut file = self
            .files
            .get_mut(&info.path)
            .context(NotFoundSnafu { path: &info.path })?;
        ensure!(file.token == info.token, InvalidTokenSnafu { fd: info.fd });
        file.capacity = file.capacity.max(info.capacity);
        debug!(
            "set file {}, capacity {}, close {}",
            info.path, file.capacity, close
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tsumugi_utils::logger::install_fmt_log;

    use super::*;
    use crate::Error;

    async fn new_meta(nodes: u16) -> MemMetaService {
        let meta = MemMetaService::new(4096);
        for port in 0..nodes {
            meta.register_datanode(DataNodeInfo::new(0, "127.0.0.1", 50020 + port))
                .await;
        }
        meta
    }

    #[tokio::test]
    async fn create_and_lookup() {
        install_fmt_log();
        let meta = new_meta(1).await;

        let f = meta.create("/a", FileType::File).await.unwrap();
        assert_eq!(f.capacity, 0);
        assert!(!f.is_dir());
        assert_eq!(meta.lookup("/a").await.unwrap(), f);

        let err = meta.create("/a", FileType::File).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert!(meta.lookup("/b").await.unwrap_err().is_not_found());
        assert!(matches!(
            meta.create("a", FileType::File).await.unwrap_err(),
            Error::InvalidPath { .. }
        ));
    }

    #[tokio::test]
    async fn blocks_are_allocated_once() {
        install_fmt_log();
        let meta = new_meta(2).await;
        let f = meta.create("/a", FileType::File).await.unwrap();

        let b0 = meta.get_block(f.fd, f.token, 0).await.unwrap();
        let b0_again = meta.get_block(f.fd, f.token, 4095).await.unwrap();
        assert_eq!(b0, b0_again);
        assert_eq!(b0.index, 0);

        let b1 = meta.get_block(f.fd, f.token, 4096).await.unwrap();
        assert_eq!(b1.index, 1);
        assert_ne!(b0.block_id, b1.block_id);
        // round robin
        assert_ne!(b0.datanode, b1.datanode);
        assert_eq!(meta.block_count(f.fd), 2);
        assert_eq!(meta.blocks_of(f.fd), vec![b0.clone(), b1.clone()]);
        assert_eq!(meta.block_lookups(), 3);

        let err = meta.get_block(f.fd, f.token + 1, 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken { .. }));
        let err = meta.get_block(f.fd + 100, f.token, 0).await.unwrap_err();
        assert!(matches!(err, Error::UnknownFile { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocation_agrees() {
        install_fmt_log();
        let meta = Arc::new(new_meta(3).await);
        let f = meta.create("/a", FileType::File).await.unwrap();

        let handles = (0..32)
            .map(|_| {
                let meta = meta.clone();
                let f = f.clone();
                tokio::spawn(async move { meta.get_block(f.fd, f.token, 8192).await.unwrap() })
            })
            .collect::<Vec<_>>();
        let blocks = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect::<Vec<_>>();
        assert!(blocks.iter().all(|b| b == &blocks[0]));
        assert_eq!(meta.block_count(f.fd), 1);
    }

    #[tokio::test]
    async fn no_datanode() {
        let meta = new_meta(0).await;
        let f = meta.create("/a", FileType::File).await.unwrap();
        let err = meta.get_block(f.fd, f.token, 0).await.unwrap_err();
        assert!(matches!(err, Error::NoDataNode { .. }));
    }

    #[tokio::test]
    async fn capacity_never_shrinks() {
        let meta = new_meta(1).await;
        let mut f = meta.create("/a", FileType::File).await.unwrap();

        f.capacity = 100;
        meta.set_file(&f, false).await.unwrap();
        f.capacity = 40;
        meta.set_file(&f, true).await.unwrap();
        assert_eq!(meta.lookup("/a").await.unwrap().capacity, 100);
    }
}
