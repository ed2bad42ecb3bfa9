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

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::{DashMap, DashSet};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};
use tsumugi_common::{cal_block_idx, BlockIndex, Fd, FileOffset};
use tsumugi_meta::MetaServiceRef;
use tsumugi_types::BlockInfo;

/// BlockLocator resolves the block descriptors of one stream and caches
/// them, it can also look a block up ahead of time.
///
/// Prefetching only hides latency: a failed or unfinished prefetch leaves
/// the cache untouched and the write path asks the metadata service itself.
pub(crate) struct BlockLocator {
    fd: Fd,
    token: u64,
    block_size: u64,

    cache: DashMap<BlockIndex, BlockInfo>,
    // blocks with a prefetch on the way.
    prefetching: DashSet<BlockIndex>,
    prefetched: AtomicU64,
    cancel_token: CancellationToken,

    /* dependencies */
    meta: MetaServiceRef,
    runtime: Handle,
}

impl BlockLocator {
    pub(crate) fn new(
        fd: Fd,
        token: u64,
        block_size: u64,
        meta: MetaServiceRef,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            fd,
            token,
            block_size,
            cache: DashMap::new(),
            prefetching: DashSet::new(),
            prefetched: AtomicU64::new(0),
            cancel_token: CancellationToken::new(),
            meta,
            runtime,
        })
    }

    /// The block holding `position`.
    pub(crate) async fn lookup(&self, position: FileOffset) -> tsumugi_meta::Result<BlockInfo> {
        let index = cal_block_idx(position, self.block_size);
        if let Some(block) = self.cache.get(&index) {
            return Ok(block.value().clone());
        }
        let block = self.meta.get_block(self.fd, self.token, position).await?;
        self.cache.insert(index, block.clone());
        Ok(block)
    }

    /// Start looking up the block holding `position` in the background,
    /// unless it is known or already being looked up.
    pub(crate) fn prefetch(self: &Arc<Self>, position: FileOffset) -> bool {
        let index = cal_block_idx(position, self.block_size);
        if self.cache.contains_key(&index) || !self.prefetching.insert(index) {
            return false;
        }
        self.prefetched.fetch_add(1, Ordering::AcqRel);

        let this = self.clone();
        let span = tracing::debug_span!("prefetch", fd = self.fd, index);
        self.runtime.spawn(
            async move {
                tokio::select! {
                    _ = this.cancel_token.cancelled() => {
                        debug!("prefetch is cancelled");
                    }
                    r = this.meta.get_block(this.fd, this.token, position) => match r {
                        Ok(block) => {
                            debug!("prefetched {}", block);
                            this.cache.insert(index, block);
                        }
                        Err(e) => debug!("prefetch failed, ignore it: {}", e),
                    }
                }
                this.prefetching.remove(&index);
            }
            .instrument(span),
        );
        true
    }

    /// How many prefetches were started.
    pub(crate) fn prefetched(&self) -> u64 { self.prefetched.load(Ordering::Acquire) }

    pub(crate) fn is_cached(&self, index: BlockIndex) -> bool { self.cache.contains_key(&index) }

    /// Stop the prefetches still on the way.
    pub(crate) fn cancel(&self) { self.cancel_token.cancel() }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tsumugi_meta::{MemMetaService, MetaService};
    use tsumugi_types::{DataNodeInfo, FileType};
    use tsumugi_utils::logger::install_fmt_log;

    use super::*;

    async fn setup() -> (Arc<MemMetaService>, Arc<BlockLocator>) {
        let meta = Arc::new(MemMetaService::new(4096));
        meta.register_datanode(DataNodeInfo::new(0, "127.0.0.1", 50020))
            .await;
        let f = meta.create("/f", FileType::File).await.unwrap();
        let locator = BlockLocator::new(f.fd, f.token, 4096, meta.clone(), Handle::current());
        (meta, locator)
    }

    async fn wait_cached(locator: &BlockLocator, index: BlockIndex) {
        for _ in 0..100 {
            if locator.is_cached(index) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("block {index} was never prefetched");
    }

    #[tokio::test]
    async fn lookup_is_cached() {
        install_fmt_log();
        let (meta, locator) = setup().await;

        let b = locator.lookup(10).await.unwrap();
        assert_eq!(b.index, 0);
        assert_eq!(locator.lookup(4000).await.unwrap(), b);
        assert_eq!(meta.block_lookups(), 1);
    }

    #[tokio::test]
    async fn prefetch_fills_the_cache() {
        install_fmt_log();
        let (meta, locator) = setup().await;

        assert!(locator.prefetch(8192));
        wait_cached(&locator, 2).await;
        // known now, no second lookup.
        assert!(!locator.prefetch(8192));
        assert_eq!(locator.lookup(8200).await.unwrap().index, 2);
        assert_eq!(meta.block_lookups(), 1);
        assert_eq!(locator.prefetched(), 1);
    }

    #[tokio::test]
    async fn failed_prefetch_is_swallowed() {
        install_fmt_log();
        let meta = Arc::new(MemMetaService::new(4096));
        // no data node, every allocation fails.
        let f = meta.create("/f", FileType::File).await.unwrap();
        let locator = BlockLocator::new(f.fd, f.token, 4096, meta.clone(), Handle::current());

        assert!(locator.prefetch(0));
        for _ in 0..100 {
            if !locator.prefetching.contains(&0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!locator.is_cached(0));
        // the real lookup reports the error itself.
        assert!(locator.lookup(0).await.is_err());
    }
}
