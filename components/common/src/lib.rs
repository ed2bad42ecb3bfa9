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

pub const TSUMUGI: &str = "tsumugi";

// The size of one registered buffer page.
pub const PAGE_SIZE: usize = 128 << 10; // 128 KiB

// The total memory registered for write buffers.
pub const BUFFER_POOL_CAPACITY: usize = 64 << 20; // 64 MiB

// The size of a block on the data nodes, a write never crosses it.
pub const BLOCK_SIZE: u64 = 1 << 20; // 1 MiB

pub const MIN_BLOCK_SIZE: u64 = 4 << 10; // 4 KiB

pub const MAX_BLOCK_SIZE: u64 = 1 << 30; // 1 GiB

pub type BlockIndex = u64;
pub type BlockOffset = u64;
pub type BlockId = u64;
pub type FileOffset = u64;
pub type StreamId = u64;
pub type Fd = u64;

pub fn cal_block_idx(offset: FileOffset, block_size: u64) -> BlockIndex { offset / block_size }

pub fn cal_block_offset(offset: FileOffset, block_size: u64) -> BlockOffset { offset % block_size }

/// The first block boundary at or after `offset`.
///
/// A cursor sitting exactly on a boundary is about to enter the block that
/// starts there, so the boundary itself is returned.
pub fn next_block_address(offset: FileOffset, block_size: u64) -> FileOffset {
    debug_assert!(block_size > 0);
    offset.div_ceil(block_size) * block_size
}
