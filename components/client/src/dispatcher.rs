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

use futures::future::BoxFuture;
use scopeguard::ScopeGuard;
use snafu::{ensure, ResultExt};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, warn, Instrument};
use tsumugi_storage::{EndpointRef, EndpointRegistryRef, RegisteredBuffer};
use tsumugi_types::{BlockInfo, SubOperation, TransferResult};

use crate::{
    err::{MetaSnafu, Result, ShortTransferSnafu, TransferFailureSnafu},
    locator::BlockLocator,
    tracker::InFlightTracker,
};

/// Issue the transfer of one fragment on its endpoint.
pub(crate) fn trigger<'a>(
    endpoint: &'a EndpointRef,
    op: &SubOperation,
    buf: RegisteredBuffer,
    block: &'a BlockInfo,
) -> BoxFuture<'a, tsumugi_storage::err::Result<TransferResult>> {
    endpoint.write(buf, block, op.block_offset)
}

/// Dispatcher runs the fragments of the writes of one stream.
pub(crate) struct Dispatcher {
    tracker: Arc<InFlightTracker>,
    locator: Arc<BlockLocator>,
    endpoints: EndpointRegistryRef,
    runtime: Handle,
}

impl Dispatcher {
    pub(crate) fn new(
        tracker: Arc<InFlightTracker>,
        locator: Arc<BlockLocator>,
        endpoints: EndpointRegistryRef,
        runtime: Handle,
    ) -> Self {
        Self {
            tracker,
            locator,
            endpoints,
            runtime,
        }
    }

    /// Count the fragment as in flight, then hand it to the runtime.
    ///
    /// The fragment settles the tracker exactly once: on success, on
    /// failure, and also when its task panics or is dropped before it ran.
    pub(crate) fn dispatch(
        &self,
        op: SubOperation,
        buf: RegisteredBuffer,
    ) -> JoinHandle<Result<TransferResult>> {
        self.tracker.increment();
        let extent = op.extent();
        let settle = scopeguard::guard(self.tracker.clone(), move |tracker| {
            warn!("fragment {:?} dropped before it settled", extent);
            tracker.fail(extent);
        });

        let locator = self.locator.clone();
        let endpoints = self.endpoints.clone();
        let span = tracing::debug_span!(
            "fragment",
            fd = op.fd,
            block = op.block_index,
            offset = op.file_offset,
            len = op.len
        );
        self.runtime.spawn(
            async move {
                let r = transfer(&locator, &endpoints, &op, buf).await;
                let tracker = ScopeGuard::into_inner(settle);
                match &r {
                    Ok(_) => tracker.complete(op.extent()),
                    Err(e) => {
                        debug!("fragment failed: {}", e);
                        tracker.fail(op.extent());
                    }
                }
                r
            }
            .instrument(span),
        )
    }
}

async fn transfer(
    locator: &BlockLocator,
    endpoints: &EndpointRegistryRef,
    op: &SubOperation,
    buf: RegisteredBuffer,
) -> Result<TransferResult> {
    let block = locator.lookup(op.file_offset).await.context(MetaSnafu)?;
    let endpoint = endpoints.get(&block.datanode).context(TransferFailureSnafu)?;
    let r = trigger(&endpoint, op, buf, &block)
        .await
        .context(TransferFailureSnafu)?;
    ensure!(
        r.len == op.len,
        ShortTransferSnafu {
            expected: op.len,
            actual: r.len,
        }
    );
    Ok(r)
}
