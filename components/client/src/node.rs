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

use tsumugi_common::Fd;
use tsumugi_types::FileInfo;

pub type FileNodeRef = Arc<FileNode>;

/// FileNode is an opened file. Every stream of the file shares it, and its
/// capacity is the size readers may observe.
#[derive(Debug)]
pub struct FileNode {
    info: FileInfo,
    capacity: AtomicU64,
}

impl FileNode {
    pub(crate) fn new(info: FileInfo) -> FileNodeRef {
        Arc::new(Self {
            capacity: AtomicU64::new(info.capacity),
            info,
        })
    }

    pub fn fd(&self) -> Fd { self.info.fd }

    pub fn path(&self) -> &str { &self.info.path }

    pub fn is_dir(&self) -> bool { self.info.is_dir() }

    pub(crate) fn token(&self) -> u64 { self.info.token }

    pub fn capacity(&self) -> u64 { self.capacity.load(Ordering::Acquire) }

    /// Capacity only grows, a smaller value is ignored.
    pub(crate) fn advance_capacity(&self, new_capacity: u64) {
        self.capacity.fetch_max(new_capacity, Ordering::AcqRel);
    }

    /// The metadata to publish, carrying the current capacity.
    pub(crate) fn snapshot(&self) -> FileInfo {
        FileInfo {
            capacity: self.capacity(),
            ..self.info.clone()
        }
    }
}
