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
    fmt::{Debug, Formatter},
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{future::BoxFuture, FutureExt};

use crate::err::Result;

/// OpFuture is the pending result of an operation that runs on its own.
///
/// Dropping it does not stop the operation, the stream still accounts for
/// it when it finishes.
#[must_use = "an OpFuture only reports the result, the operation runs anyway"]
pub struct OpFuture<T> {
    inner: BoxFuture<'static, Result<T>>,
    ready: bool,
}

impl<T: Send + 'static> OpFuture<T> {
    pub(crate) fn new(fut: impl Future<Output = Result<T>> + Send + 'static) -> Self {
        Self {
            inner: fut.boxed(),
            ready: false,
        }
    }

    /// An operation that finished before it was returned.
    pub(crate) fn ready(value: T) -> Self {
        Self {
            inner: futures::future::ready(Ok(value)).boxed(),
            ready: true,
        }
    }

    /// Whether the result was known when the future was created.
    pub fn is_immediate(&self) -> bool { self.ready }
}

impl<T> Future for OpFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<T> Debug for OpFuture<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpFuture").field("immediate", &self.ready).finish()
    }
}

/// The outcome of one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// Bytes that landed on the data nodes.
    pub len: u64,
}

pub type PendingWrite = OpFuture<WriteResult>;

pub type PendingSync = OpFuture<()>;
