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

use snafu::{ensure, OptionExt, ResultExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tsumugi_common::{next_block_address, FileOffset, StreamId};
use tsumugi_storage::DataBuffer;
use tsumugi_types::TransferResult;

use crate::{
    dispatcher::Dispatcher,
    err::{
        InvalidBufferKindSnafu, JoinErrSnafu, PartialWriteSnafu, PendingOperationsSnafu, Result,
        StreamClosedSnafu,
    },
    future::{OpFuture, PendingSync, PendingWrite, WriteResult},
    node::FileNodeRef,
    stream::Stream,
    translator::locate_blocks,
    tracker::InFlightTracker,
};

/// OutputStream appends to a file without waiting for the data nodes.
///
/// Every [OutputStream::write] is split into per-block fragments that are
/// transferred in the background. The file's capacity only moves once the
/// bytes have landed, and [OutputStream::sync] and [OutputStream::close]
/// refuse to run while fragments are still in flight.
///
/// Sequencing `write` against `sync` or `close` from different tasks is up
/// to the caller: the in-flight check is a snapshot.
pub struct OutputStream {
    stream: Stream,
    write_hint: u64,
    block_size: u64,
    prefetch: bool,
    tracker: Arc<InFlightTracker>,
    dispatcher: Dispatcher,
}

impl OutputStream {
    pub(crate) fn new(
        stream: Stream,
        write_hint: i64,
        block_size: u64,
        prefetch: bool,
        endpoints: tsumugi_storage::EndpointRegistryRef,
    ) -> Self {
        let tracker = Arc::new(InFlightTracker::new(stream.file().clone()));
        let dispatcher = Dispatcher::new(
            tracker.clone(),
            stream.locator().clone(),
            endpoints,
            stream.runtime().clone(),
        );
        // a negative hint never prefetches.
        let write_hint = write_hint.max(0) as u64;
        debug!(
            "open output stream {} on {}, position {}, write hint {}",
            stream.stream_id(),
            stream.file().path(),
            stream.position(),
            write_hint
        );
        Self {
            stream,
            write_hint,
            block_size,
            prefetch,
            tracker,
            dispatcher,
        }
    }

    /// Append `buf` at the cursor.
    ///
    /// Fails right away when the stream is closed or the buffer is not a
    /// registered one. Otherwise the returned future resolves once every
    /// fragment of the write has settled.
    pub fn write(&self, buf: impl Into<DataBuffer>) -> Result<PendingWrite> {
        let stream_id = self.stream.stream_id();
        ensure!(self.stream.is_open(), StreamClosedSnafu { stream_id });
        let buf: DataBuffer = buf.into();
        let buf = buf
            .as_registered()
            .context(InvalidBufferKindSnafu { stream_id })?;
        if buf.is_empty() {
            return Ok(OpFuture::ready(WriteResult { len: 0 }));
        }

        let len = buf.remaining() as u64;
        let offset = self.stream.advance(len);
        let ops = locate_blocks(self.stream.file().fd(), offset, len, self.block_size);
        debug!(
            "stream {} write {} bytes at {} in {} fragments",
            stream_id,
            len,
            offset,
            ops.len()
        );
        let handles = ops
            .into_iter()
            .map(|op| {
                let fragment = buf.slice(op.buf_range());
                self.dispatcher.dispatch(op, fragment)
            })
            .collect::<Vec<_>>();

        self.maybe_prefetch(offset + len);
        Ok(OpFuture::new(collect_fragments(handles, len)))
    }

    fn maybe_prefetch(&self, position: FileOffset) {
        if !self.prefetch {
            return;
        }
        let next = next_block_address(position, self.block_size);
        if next < self.write_hint {
            self.stream.locator().prefetch(next);
        }
    }

    /// Publish the capacity, refused while fragments are in flight.
    pub fn sync(&self) -> Result<PendingSync> {
        let stream_id = self.stream.stream_id();
        ensure!(self.stream.is_open(), StreamClosedSnafu { stream_id });
        let in_flight = self.tracker.in_flight();
        if in_flight != 0 {
            info!("stream {} sync with {} pending operations", stream_id, in_flight);
            return PendingOperationsSnafu {
                stream_id,
                in_flight,
            }
            .fail();
        }
        Ok(self.stream.sync_base())
    }

    /// Close the stream and publish the final capacity. Closing a closed
    /// stream does nothing.
    pub async fn close(&self) -> Result<()> {
        let stream_id = self.stream.stream_id();
        if !self.stream.is_open() {
            debug!("stream {} is already closed", stream_id);
            return Ok(());
        }
        let in_flight = self.tracker.in_flight();
        ensure!(
            in_flight == 0,
            PendingOperationsSnafu {
                stream_id,
                in_flight
            }
        );
        if self.stream.close_base().await? {
            let holes = self.tracker.holes();
            if holes.is_empty() {
                debug!("stream {} closed, capacity {}", stream_id, self.capacity());
            } else {
                warn!(
                    "stream {} closed, capacity {}, failed writes left holes at {:?}",
                    stream_id,
                    self.capacity(),
                    holes
                );
            }
        }
        Ok(())
    }

    pub fn write_hint(&self) -> u64 { self.write_hint }

    /// Fragments dispatched and not settled yet.
    pub fn in_flight(&self) -> u64 { self.tracker.in_flight() }

    pub fn capacity(&self) -> u64 { self.stream.file().capacity() }

    pub fn position(&self) -> FileOffset { self.stream.position() }

    pub fn stream_id(&self) -> StreamId { self.stream.stream_id() }

    pub fn is_open(&self) -> bool { self.stream.is_open() }

    pub fn file(&self) -> &FileNodeRef { self.stream.file() }

    /// How many block lookups were started ahead of the cursor.
    pub fn prefetched_blocks(&self) -> u64 { self.stream.locator().prefetched() }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("stream_id", &self.stream.stream_id())
            .field("path", &self.stream.file().path())
            .field("position", &self.stream.position())
            .field("in_flight", &self.tracker.in_flight())
            .finish()
    }
}

/// Wait for every fragment of one write.
///
/// A write of a single fragment fails with that fragment's error, a write
/// of several reports how much of it landed.
async fn collect_fragments(
    handles: Vec<JoinHandle<Result<TransferResult>>>,
    total: u64,
) -> Result<WriteResult> {
    let fragments = handles.len();
    let mut landed = 0;
    let mut first_err = None;
    for handle in handles {
        match handle.await.context(JoinErrSnafu).and_then(|r| r) {
            Ok(r) => landed += r.len,
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }

    match first_err {
        None => Ok(WriteResult { len: landed }),
        Some(e) if fragments == 1 => Err(e),
        Some(e) => Err(e).context(PartialWriteSnafu { landed, total }),
    }
}
