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

//! Registered memory for zero-copy transfers.
//!
//! Endpoints only accept memory that belongs to a [BufferPool]: the pool
//! registers its pages once, and every [RegisteredBuffer] carries the
//! [RegionToken] of the page it views. Ordinary heap memory is represented by
//! [DataBuffer::Heap] and is never handed to an endpoint.

use std::{
    fmt::{Display, Formatter},
    ops::{Bound, Range, RangeBounds},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use crossbeam_queue::ArrayQueue;
use tokio::{sync::Notify, time::Instant};
use tracing::debug;
use tsumugi_utils::readable_size::ReadableSize;

static NEXT_POOL_KEY: AtomicU32 = AtomicU32::new(1);

/// Identifies the registered page a buffer lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionToken {
    pub pool_key: u32,
    pub page_id: u64,
}

struct FreePage {
    page_id: u64,
    data: Box<[u8]>,
}

pub struct BufferPool {
    key: u32,
    page_size: usize,
    capacity: usize,
    queue: ArrayQueue<FreePage>,
    notify: Notify,
}

impl BufferPool {
    pub fn new(page_size: usize, capacity: usize) -> Arc<Self> {
        let start_at = Instant::now();
        assert!(
            page_size > 0 && capacity >= page_size && capacity % page_size == 0,
            "invalid buffer pool, page_size: {page_size}, capacity: {capacity}"
        );

        let page_cnt = capacity / page_size;
        let pool = Arc::new(Self {
            key: NEXT_POOL_KEY.fetch_add(1, Ordering::Relaxed),
            page_size,
            capacity,
            queue: ArrayQueue::new(page_cnt),
            notify: Default::default(),
        });

        for page_id in 0..page_cnt as u64 {
            let page = FreePage {
                page_id,
                data: vec![0u8; page_size].into_boxed_slice(),
            };
            if pool.queue.push(page).is_err() {
                unreachable!("the queue is sized to hold every page");
            }
        }

        debug!(
            "{} initialize finished, cost: {:?}",
            &pool,
            start_at.elapsed(),
        );
        pool
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<BufferMut> {
        let FreePage { page_id, data } = self.queue.pop()?;
        Some(BufferMut {
            page: Page {
                page_id,
                data,
                pool: self.clone(),
            },
            len: 0,
        })
    }

    /// Wait until a page is free.
    pub async fn acquire(self: &Arc<Self>) -> BufferMut {
        loop {
            let notified = self.notify.notified();
            if let Some(buf) = self.try_acquire() {
                return buf;
            }
            notified.await;
        }
    }

    fn recycle(&self, page_id: u64, data: Box<[u8]>) {
        if self.queue.push(FreePage { page_id, data }).is_err() {
            unreachable!("a page is recycled twice");
        }
        self.notify.notify_one();
    }

    pub fn key(&self) -> u32 { self.key }

    pub fn page_size(&self) -> usize { self.page_size }

    pub fn remain_page_cnt(&self) -> usize { self.queue.len() }

    #[inline]
    pub fn total_page_cnt(&self) -> usize { self.capacity / self.page_size }

    #[inline]
    pub fn capacity(&self) -> usize { self.capacity }
}

impl Display for BufferPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BufferPool[{}] {{ page_size: {}, capacity: {}, remain: {}, total_cnt: {} }}",
            self.key,
            ReadableSize(self.page_size as u64),
            ReadableSize(self.capacity as u64),
            self.remain_page_cnt(),
            self.total_page_cnt(),
        )
    }
}

/// A page taken out of the pool. It goes back when dropped, the content is
/// not zeroed.
struct Page {
    page_id: u64,
    data: Box<[u8]>,
    pool: Arc<BufferPool>,
}

impl Page {
    fn region(&self) -> RegionToken {
        RegionToken {
            pool_key: self.pool.key,
            page_id: self.page_id,
        }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.recycle(self.page_id, data);
    }
}

/// A registered page that is still being filled by its owner.
pub struct BufferMut {
    page: Page,
    len: usize,
}

impl BufferMut {
    /// Append as much of `src` as fits, returns the copied length.
    pub fn put_slice(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining_mut());
        self.page.data[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }

    pub fn len(&self) -> usize { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn capacity(&self) -> usize { self.page.data.len() }

    pub fn remaining_mut(&self) -> usize { self.capacity() - self.len }

    pub fn clear(&mut self) { self.len = 0; }

    /// Stop writing and share the filled part.
    pub fn freeze(self) -> RegisteredBuffer {
        RegisteredBuffer {
            range: 0..self.len,
            page: Arc::new(self.page),
        }
    }
}

/// An immutable view over registered memory. Clones share the page, which
/// returns to the pool once the last view is gone.
#[derive(Clone)]
pub struct RegisteredBuffer {
    page: Arc<Page>,
    range: Range<usize>,
}

impl RegisteredBuffer {
    pub fn remaining(&self) -> usize { self.range.len() }

    pub fn is_empty(&self) -> bool { self.range.is_empty() }

    pub fn as_slice(&self) -> &[u8] { &self.page.data[self.range.clone()] }

    pub fn region(&self) -> RegionToken { self.page.region() }

    /// A view of `range`, relative to this view.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> RegisteredBuffer {
        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n + 1,
            Bound::Excluded(&n) => n,
            Bound::Unbounded => self.remaining(),
        };
        assert!(
            start <= end && end <= self.remaining(),
            "range {start}..{end} out of bounds for buffer of {}",
            self.remaining()
        );
        RegisteredBuffer {
            page: self.page.clone(),
            range: self.range.start + start..self.range.start + end,
        }
    }
}

impl std::fmt::Debug for RegisteredBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredBuffer")
            .field("region", &self.region())
            .field("range", &self.range)
            .finish()
    }
}

/// DataBuffer is what callers hand to the write path.
#[derive(Debug, Clone)]
pub enum DataBuffer {
    /// Memory from a [BufferPool], eligible for zero-copy transfers.
    Registered(RegisteredBuffer),
    /// Plain heap memory, endpoints cannot use it.
    Heap(Bytes),
}

impl DataBuffer {
    pub fn remaining(&self) -> usize {
        match self {
            DataBuffer::Registered(buf) => buf.remaining(),
            DataBuffer::Heap(buf) => buf.len(),
        }
    }

    pub fn as_registered(&self) -> Option<&RegisteredBuffer> {
        match self {
            DataBuffer::Registered(buf) => Some(buf),
            DataBuffer::Heap(_) => None,
        }
    }
}

impl From<RegisteredBuffer> for DataBuffer {
    fn from(value: RegisteredBuffer) -> Self { DataBuffer::Registered(value) }
}

impl From<Bytes> for DataBuffer {
    fn from(value: Bytes) -> Self { DataBuffer::Heap(value) }
}

impl From<Vec<u8>> for DataBuffer {
    fn from(value: Vec<u8>) -> Self { DataBuffer::Heap(Bytes::from(value)) }
}
