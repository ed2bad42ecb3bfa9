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
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use snafu::ResultExt;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use tsumugi_common::{FileOffset, StreamId};
use tsumugi_meta::MetaServiceRef;

use crate::{
    client::OpenStreamsRef,
    err::{JoinErrSnafu, MetaSnafu, Result},
    future::PendingSync,
    locator::BlockLocator,
    node::FileNodeRef,
};

/// Stream is the part every stream of a file shares: the cursor, the
/// open/closed state and the way capacity gets published to the metadata
/// service.
pub(crate) struct Stream {
    stream_id: StreamId,
    file: FileNodeRef,
    position: AtomicU64,
    open: AtomicBool,
    locator: Arc<BlockLocator>,

    /* dependencies */
    meta: MetaServiceRef,
    runtime: Handle,
    open_streams: OpenStreamsRef,
}

impl Stream {
    pub(crate) fn new(
        stream_id: StreamId,
        file: FileNodeRef,
        block_size: u64,
        meta: MetaServiceRef,
        runtime: Handle,
        open_streams: OpenStreamsRef,
    ) -> Self {
        let locator = BlockLocator::new(
            file.fd(),
            file.token(),
            block_size,
            meta.clone(),
            runtime.clone(),
        );
        open_streams.insert(stream_id, file.fd());
        Self {
            stream_id,
            position: AtomicU64::new(file.capacity()),
            file,
            open: AtomicBool::new(true),
            locator,
            meta,
            runtime,
            open_streams,
        }
    }

    pub(crate) fn stream_id(&self) -> StreamId { self.stream_id }

    pub(crate) fn file(&self) -> &FileNodeRef { &self.file }

    pub(crate) fn locator(&self) -> &Arc<BlockLocator> { &self.locator }

    pub(crate) fn runtime(&self) -> &Handle { &self.runtime }

    pub(crate) fn position(&self) -> FileOffset { self.position.load(Ordering::Acquire) }

    pub(crate) fn is_open(&self) -> bool { self.open.load(Ordering::Acquire) }

    /// Move the cursor past `len` bytes, returns where they start.
    pub(crate) fn advance(&self, len: u64) -> FileOffset {
        self.position.fetch_add(len, Ordering::AcqRel)
    }

    /// Publish the current capacity.
    pub(crate) fn sync_base(&self) -> PendingSync {
        let meta = self.meta.clone();
        let info = self.file.snapshot();
        let handle = self.runtime.spawn(async move { meta.set_file(&info, false).await });
        PendingSync::new(async move {
            handle.await.context(JoinErrSnafu)?.context(MetaSnafu)?;
            Ok(())
        })
    }

    /// Move to closed and publish the final capacity. Returns false when
    /// someone else closed the stream first.
    pub(crate) async fn close_base(&self) -> Result<bool> {
        if self
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        self.locator.cancel();
        self.open_streams.remove(self.stream_id);

        let info = self.file.snapshot();
        self.meta.set_file(&info, true).await.context(MetaSnafu)?;
        Ok(true)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(
                "stream {} of {} dropped without close, capacity {} is not published",
                self.stream_id,
                self.file.path(),
                self.file.capacity()
            );
            self.locator.cancel();
            self.open_streams.remove(self.stream_id);
        } else {
            debug!("stream {} dropped", self.stream_id);
        }
    }
}
