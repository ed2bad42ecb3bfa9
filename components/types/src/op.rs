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

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tsumugi_common::{BlockIndex, BlockOffset, Fd, FileOffset};

/// SubOperation is the part of a write that lands in exactly one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOperation {
    pub fd: Fd,
    // where the fragment starts in the file.
    pub file_offset: FileOffset,
    // which block it goes to.
    pub block_index: BlockIndex,
    // where it starts inside that block.
    pub block_offset: BlockOffset,
    pub len: u64,
    // where it starts inside the caller's buffer.
    pub buf_start_at: usize,
}

impl SubOperation {
    /// The file range this fragment covers.
    pub fn extent(&self) -> Range<FileOffset> { self.file_offset..self.file_offset + self.len }

    /// The range of the caller's buffer this fragment carries.
    pub fn buf_range(&self) -> Range<usize> {
        self.buf_start_at..self.buf_start_at + self.len as usize
    }
}

/// What an endpoint reports back for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    /// Bytes written to the block.
    pub len: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        let op = SubOperation {
            fd: 1,
            file_offset: 4000,
            block_index: 0,
            block_offset: 4000,
            len: 96,
            buf_start_at: 0,
        };
        assert_eq!(op.extent(), 4000..4096);
        assert_eq!(op.buf_range(), 0..96);
    }
}
