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

use std::{
    fmt::{Debug, Display, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use snafu::{ensure, ResultExt};
use tokio::runtime::Handle;
use tracing::{debug, info};
use tsumugi_common::{Fd, StreamId};
use tsumugi_meta::MetaServiceRef;
use tsumugi_storage::{BufferMut, BufferPool, EndpointRegistryRef};
use tsumugi_types::FileType;
use tsumugi_utils::{readable_size::ReadableSize, runtime};

use crate::{
    config::Config,
    err::{InvalidConfigSnafu, IsDirectorySnafu, MetaSnafu, Result},
    node::{FileNode, FileNodeRef},
    output::OutputStream,
    stream::Stream,
};

pub(crate) type OpenStreamsRef = Arc<OpenStreams>;

/// OpenStreams tracks the streams that are not closed yet.
#[derive(Debug, Default)]
pub(crate) struct OpenStreams {
    streams: DashMap<StreamId, Fd>,
    next_id: AtomicU64,
}

impl OpenStreams {
    fn next_stream_id(&self) -> StreamId { self.next_id.fetch_add(1, Ordering::AcqRel) + 1 }

    pub(crate) fn insert(&self, stream_id: StreamId, fd: Fd) { self.streams.insert(stream_id, fd); }

    pub(crate) fn remove(&self, stream_id: StreamId) { self.streams.remove(&stream_id); }

    fn len(&self) -> usize { self.streams.len() }
}

/// Client is the entry of the write path: it resolves files through the
/// metadata service and opens output streams on them.
pub struct Client {
    config: Config,
    buffer_pool: Arc<BufferPool>,
    open_streams: OpenStreamsRef,

    /* dependencies */
    meta: MetaServiceRef,
    endpoints: EndpointRegistryRef,
    runtime: Handle,
}

impl Client {
    /// Build a client running its transfers on the current runtime, or on
    /// the global one outside of a runtime.
    pub fn new(config: Config, meta: MetaServiceRef, endpoints: EndpointRegistryRef) -> Result<Self> {
        Self::with_runtime(config, meta, endpoints, runtime::current_or_global())
    }

    pub fn with_runtime(
        config: Config,
        meta: MetaServiceRef,
        endpoints: EndpointRegistryRef,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;
        ensure!(
            config.block_size == meta.block_size(),
            InvalidConfigSnafu {
                reason: format!(
                    "block size {} differs from {} used by the metadata service",
                    config.block_size,
                    meta.block_size()
                ),
            }
        );
        let buffer_pool = BufferPool::new(config.page_size, config.buffer_pool_capacity);
        info!(
            "client started, block size {}, buffer pool {}, {} endpoints",
            ReadableSize(config.block_size),
            buffer_pool,
            endpoints.len()
        );
        Ok(Self {
            config,
            buffer_pool,
            open_streams: Arc::new(OpenStreams::default()),
            meta,
            endpoints,
            runtime,
        })
    }

    pub async fn create(&self, path: &str) -> Result<FileNodeRef> {
        let info = self
            .meta
            .create(path, FileType::File)
            .await
            .context(MetaSnafu)?;
        Ok(FileNode::new(info))
    }

    pub async fn mkdir(&self, path: &str) -> Result<FileNodeRef> {
        let info = self
            .meta
            .create(path, FileType::Directory)
            .await
            .context(MetaSnafu)?;
        Ok(FileNode::new(info))
    }

    pub async fn lookup(&self, path: &str) -> Result<FileNodeRef> {
        let info = self.meta.lookup(path).await.context(MetaSnafu)?;
        Ok(FileNode::new(info))
    }

    /// Open a stream appending to `file`. Blocks below `write_hint` are
    /// looked up ahead of the cursor.
    pub fn output_stream(&self, file: &FileNodeRef, write_hint: i64) -> Result<OutputStream> {
        ensure!(
            !file.is_dir(),
            IsDirectorySnafu {
                path: file.path().to_string()
            }
        );
        let stream_id = self.open_streams.next_stream_id();
        let stream = Stream::new(
            stream_id,
            file.clone(),
            self.config.block_size,
            self.meta.clone(),
            self.runtime.clone(),
            self.open_streams.clone(),
        );
        Ok(OutputStream::new(
            stream,
            write_hint,
            self.config.block_size,
            self.config.prefetch,
            self.endpoints.clone(),
        ))
    }

    /// Open a stream with the configured default write hint.
    pub fn open_output_stream(&self, file: &FileNodeRef) -> Result<OutputStream> {
        self.output_stream(file, self.config.default_write_hint)
    }

    /// A registered buffer, waits while the pool is exhausted.
    pub async fn allocate_buffer(&self) -> BufferMut {
        debug!("allocate buffer, {} pages left", self.buffer_pool.remain_page_cnt());
        self.buffer_pool.acquire().await
    }

    pub fn try_allocate_buffer(&self) -> Option<BufferMut> { self.buffer_pool.try_acquire() }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> { &self.buffer_pool }

    /// Number of output streams that are not closed.
    pub fn open_output_streams(&self) -> usize { self.open_streams.len() }

    pub fn config(&self) -> &Config { &self.config }
}

impl Debug for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("buffer_pool", &self.buffer_pool.key())
            .field("open_streams", &self.open_streams.len())
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

impl Display for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Client {{ block_size: {}, open streams: {}, pool: {} }}",
            ReadableSize(self.config.block_size),
            self.open_streams.len(),
            self.buffer_pool
        )
    }
}
