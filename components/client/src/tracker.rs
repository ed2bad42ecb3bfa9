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
    ops::Range,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use rangemap::RangeSet;
use tsumugi_common::FileOffset;

use crate::node::FileNodeRef;

/// InFlightTracker does the accounting of one output stream.
///
/// The counter is bumped once per dispatched fragment and brought down
/// exactly once when the fragment settles. A fragment that lands moves the
/// file capacity to the end of its extent, whatever order the fragments
/// land in. A fragment that fails leaves a hole behind, the capacity is not
/// touched for it.
///
/// Settling happens under one lock and the capacity is published before the
/// counter drops: whoever sees a zero counter sees the final capacity.
pub(crate) struct InFlightTracker {
    in_flight: AtomicU64,
    file: FileNodeRef,
    // extents whose fragment failed.
    holes: Mutex<RangeSet<FileOffset>>,
}

impl InFlightTracker {
    pub(crate) fn new(file: FileNodeRef) -> Self {
        Self {
            in_flight: AtomicU64::new(0),
            file,
            holes: Mutex::new(RangeSet::new()),
        }
    }

    pub(crate) fn in_flight(&self) -> u64 { self.in_flight.load(Ordering::Acquire) }

    pub(crate) fn increment(&self) -> u64 { self.in_flight.fetch_add(1, Ordering::AcqRel) + 1 }

    /// A fragment covering `extent` has landed.
    pub(crate) fn complete(&self, extent: Range<FileOffset>) {
        let _holes = self.holes.lock();
        self.file.advance_capacity(extent.end);
        self.decrement();
    }

    /// The fragment covering `extent` did not land.
    pub(crate) fn fail(&self, extent: Range<FileOffset>) {
        let mut holes = self.holes.lock();
        if !extent.is_empty() {
            holes.insert(extent);
        }
        self.decrement();
    }

    /// The file ranges whose fragments failed, merged and in order.
    pub(crate) fn holes(&self) -> Vec<Range<FileOffset>> { self.holes.lock().iter().cloned().collect() }

    fn decrement(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "in-flight counter underflow");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tsumugi_types::{FileInfo, FileType};

    use super::*;
    use crate::node::FileNode;

    fn new_file(capacity: u64) -> FileNodeRef {
        FileNode::new(FileInfo {
            fd: 1,
            path: "/f".to_string(),
            file_type: FileType::File,
            capacity,
            token: 0,
        })
    }

    #[test]
    fn counts_dispatches_minus_completions() {
        let file = new_file(0);
        let t = InFlightTracker::new(file.clone());
        for i in 1..=5u64 {
            assert_eq!(t.increment(), i);
        }
        t.complete(0..10);
        t.fail(10..20);
        t.complete(20..30);
        assert_eq!(t.in_flight(), 2);
        assert_eq!(file.capacity(), 30);
    }

    #[test]
    fn out_of_order_completion() {
        let file = new_file(100);
        let t = InFlightTracker::new(file.clone());
        t.increment();
        t.increment();

        t.complete(150..200);
        assert_eq!(t.in_flight(), 1);
        assert_eq!(file.capacity(), 200);

        // an earlier extent never moves the capacity back.
        t.complete(100..150);
        assert_eq!(t.in_flight(), 0);
        assert_eq!(file.capacity(), 200);
    }

    #[test]
    fn failure_does_not_block_later_extents() {
        let file = new_file(0);
        let t = InFlightTracker::new(file.clone());
        (0..4).for_each(|_| {
            t.increment();
        });

        t.complete(0..10);
        t.fail(10..20);
        assert_eq!(file.capacity(), 10);
        t.complete(20..30);
        assert_eq!(file.capacity(), 30);
        t.fail(30..40);
        assert_eq!(t.in_flight(), 0);
        assert_eq!(file.capacity(), 30);
        assert_eq!(t.holes(), vec![10..20, 30..40]);
    }

    #[test]
    fn concurrent_completions() {
        let file = new_file(0);
        let t = Arc::new(InFlightTracker::new(file.clone()));
        for _ in 0..64 {
            t.increment();
        }
        let handles = (0..64u64)
            .rev()
            .map(|i| {
                let t = t.clone();
                std::thread::spawn(move || t.complete(i * 10..(i + 1) * 10))
            })
            .collect::<Vec<_>>();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.in_flight(), 0);
        assert_eq!(file.capacity(), 640);
    }
}
