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

use std::path::Path;

use async_trait::async_trait;
use opendal::Operator;
use snafu::{ensure, ResultExt};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use tsumugi_common::BlockId;
use tsumugi_types::{BlockInfo, DataNodeInfo, TransferResult};

use crate::{
    buffer::RegisteredBuffer,
    endpoint::Endpoint,
    err::{BlockOutOfRangeSnafu, OpenDalSnafu, Result, WrongEndpointSnafu},
};

pub fn new_mem_operator(root: &str) -> Result<Operator> {
    let mut builder = opendal::services::Memory::default();
    builder.root(root);
    let op = Operator::new(builder).context(OpenDalSnafu)?.finish();
    Ok(op)
}

/// An operator keeping objects as files under `root`.
pub fn new_fs_operator(root: &Path) -> Result<Operator> {
    let mut builder = opendal::services::Fs::default();
    builder.root(&root.to_string_lossy());
    let op = Operator::new(builder).context(OpenDalSnafu)?.finish();
    Ok(op)
}

const BLOCK_LOCK_STRIPES: u64 = 64;

fn block_key(block_id: BlockId) -> String { format!("blocks/{}", block_id) }

/// ObjectEndpoint keeps every block as one object of the underlying storage.
pub struct ObjectEndpoint {
    info: DataNodeInfo,
    operator: Operator,
    // serialize the read-modify-write of a block, striped by block id.
    block_locks: Box<[Mutex<()>]>,
}

impl ObjectEndpoint {
    pub fn new(info: DataNodeInfo, operator: Operator) -> Self {
        Self {
            info,
            operator,
            block_locks: (0..BLOCK_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// A data node backed by memory.
    pub fn in_memory(info: DataNodeInfo) -> Result<Self> {
        let root = format!("/{}/{}", info.host, info.port);
        Ok(Self::new(info, new_mem_operator(&root)?))
    }

    /// A data node keeping its blocks under `dir`.
    pub fn on_disk(info: DataNodeInfo, dir: &Path) -> Result<Self> {
        let root = dir.join(format!("{}-{}", info.host, info.port));
        Ok(Self::new(info, new_fs_operator(&root)?))
    }

    fn block_lock(&self, block_id: BlockId) -> &Mutex<()> {
        &self.block_locks[(block_id % BLOCK_LOCK_STRIPES) as usize]
    }

    /// Read back what has been written to a block so far.
    pub async fn read_block(&self, block_id: BlockId) -> Result<Vec<u8>> {
        let r = self
            .operator
            .read(&block_key(block_id))
            .await
            .context(OpenDalSnafu);
        match r {
            Ok(data) => Ok(data),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Endpoint for ObjectEndpoint {
    fn info(&self) -> &DataNodeInfo { &self.info }

    #[instrument(skip_all, fields(block = block.block_id, block_offset, len = buf.remaining()))]
    async fn write(
        &self,
        buf: RegisteredBuffer,
        block: &BlockInfo,
        block_offset: u64,
    ) -> Result<TransferResult> {
        ensure!(
            block.datanode == self.info,
            WrongEndpointSnafu {
                block_id: block.block_id,
                expected: block.datanode.clone(),
                actual: self.info.clone(),
            }
        );
        let len = buf.remaining() as u64;
        ensure!(
            block_offset + len <= block.length,
            BlockOutOfRangeSnafu {
                block_id: block.block_id,
                block_offset,
                len,
                block_size: block.length,
            }
        );

        let lock = self.block_lock(block.block_id);
        let _guard = lock.lock().await;

        let mut data = self.read_block(block.block_id).await?;
        let end = (block_offset + len) as usize;
        if data.len() < end {
            data.resize(end, 0);
        }
        data[block_offset as usize..end].copy_from_slice(buf.as_slice());
        self.operator
            .write(&block_key(block.block_id), data)
            .await
            .context(OpenDalSnafu)?;

        debug!("{} wrote {} bytes to {}", self.info, len, block);
        Ok(TransferResult { len })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tsumugi_utils::logger::install_fmt_log;

    use super::*;
    use crate::{buffer::BufferPool, endpoint::EndpointRegistry};

    fn block_on(datanode: &DataNodeInfo, block_id: BlockId) -> BlockInfo {
        BlockInfo {
            block_id,
            fd: 1,
            index: 0,
            datanode: datanode.clone(),
            length: 16,
            token: 0,
        }
    }

    fn registered(pool: &Arc<BufferPool>, data: &[u8]) -> RegisteredBuffer {
        let mut buf = pool.try_acquire().unwrap();
        buf.put_slice(data);
        buf.freeze()
    }

    #[tokio::test]
    async fn write_at_offsets() {
        install_fmt_log();

        let dn = DataNodeInfo::new(0, "127.0.0.1", 50020);
        let ep = ObjectEndpoint::in_memory(dn.clone()).unwrap();
        let pool = BufferPool::new(16, 64);
        let block = block_on(&dn, 7);

        let r = ep.write(registered(&pool, b"world"), &block, 6).await.unwrap();
        assert_eq!(r.len, 5);
        let r = ep.write(registered(&pool, b"hello "), &block, 0).await.unwrap();
        assert_eq!(r.len, 6);

        assert_eq!(ep.read_block(7).await.unwrap(), b"hello world");
        assert!(ep.read_block(8).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reject_out_of_range_and_foreign_blocks() {
        install_fmt_log();

        let dn = DataNodeInfo::new(0, "127.0.0.1", 50020);
        let other = DataNodeInfo::new(0, "127.0.0.1", 50021);
        let ep = ObjectEndpoint::in_memory(dn.clone()).unwrap();
        let pool = BufferPool::new(16, 64);

        let err = ep
            .write(registered(&pool, b"12345"), &block_on(&dn, 1), 12)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::err::Error::BlockOutOfRange { .. }));

        let err = ep
            .write(registered(&pool, b"1"), &block_on(&other, 1), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::err::Error::WrongEndpoint { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_one_block() {
        install_fmt_log();

        let dn = DataNodeInfo::new(0, "127.0.0.1", 50020);
        let ep = Arc::new(ObjectEndpoint::in_memory(dn.clone()).unwrap());
        let pool = BufferPool::new(16, 256);
        let block = block_on(&dn, 3);

        let handles = (0..16u8)
            .map(|i| {
                let ep = ep.clone();
                let block = block.clone();
                let buf = registered(&pool, &[b'a' + i]);
                tokio::spawn(async move { ep.write(buf, &block, i as u64).await })
            })
            .collect::<Vec<_>>();
        for r in futures::future::join_all(handles).await {
            r.unwrap().unwrap();
        }
        assert_eq!(ep.read_block(3).await.unwrap(), b"abcdefghijklmnop");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn blocks_sharing_a_lock_stripe() {
        install_fmt_log();

        let dn = DataNodeInfo::new(0, "127.0.0.1", 50020);
        let ep = Arc::new(ObjectEndpoint::in_memory(dn.clone()).unwrap());
        let pool = BufferPool::new(16, 256);
        let a = block_on(&dn, 5);
        let b = block_on(&dn, 5 + BLOCK_LOCK_STRIPES);
        assert!(std::ptr::eq(ep.block_lock(a.block_id), ep.block_lock(b.block_id)));

        let handles = (0..8u8)
            .flat_map(|i| [(a.clone(), i), (b.clone(), i)])
            .map(|(block, i)| {
                let ep = ep.clone();
                let buf = registered(&pool, &[b'0' + i]);
                tokio::spawn(async move { ep.write(buf, &block, i as u64).await })
            })
            .collect::<Vec<_>>();
        for r in futures::future::join_all(handles).await {
            r.unwrap().unwrap();
        }
        assert_eq!(ep.read_block(a.block_id).await.unwrap(), b"01234567");
        assert_eq!(ep.read_block(b.block_id).await.unwrap(), b"01234567");
    }

    #[tokio::test]
    async fn blocks_on_disk() {
        install_fmt_log();

        let dir = tempfile::tempdir().unwrap();
        let dn = DataNodeInfo::new(1, "127.0.0.1", 50020);
        let ep = ObjectEndpoint::on_disk(dn.clone(), dir.path()).unwrap();
        let pool = BufferPool::new(16, 64);

        ep.write(registered(&pool, b"on disk"), &block_on(&dn, 2), 0)
            .await
            .unwrap();
        assert_eq!(ep.read_block(2).await.unwrap(), b"on disk");
        assert!(dir.path().join("127.0.0.1-50020/blocks/2").exists());
    }

    #[tokio::test]
    async fn registry_lookup() {
        let dn = DataNodeInfo::new(0, "10.0.0.1", 50020);
        let registry = EndpointRegistry::new();
        assert!(registry.get(&dn).is_err());

        registry.register(Arc::new(ObjectEndpoint::in_memory(dn.clone()).unwrap()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&dn).unwrap().info(), &dn);
    }
}
