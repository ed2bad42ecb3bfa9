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

use std::cmp::min;

use tsumugi_common::{cal_block_idx, cal_block_offset, Fd, FileOffset};
use tsumugi_types::SubOperation;

/// Split the write of `len` bytes at `offset` into per-block fragments.
///
/// The fragments are in ascending order, contiguous, and cover exactly
/// `offset..offset + len`.
pub(crate) fn locate_blocks(fd: Fd, offset: FileOffset, len: u64, block_size: u64) -> Vec<SubOperation> {
    if len == 0 {
        return Vec::new();
    }

    let start_block_idx = cal_block_idx(offset, block_size);
    let end_block_idx = cal_block_idx(offset + len - 1, block_size);

    let mut block_offset = cal_block_offset(offset, block_size);
    let mut buf_start_at = 0u64;
    let mut left = len;

    (start_block_idx..=end_block_idx)
        .map(|block_index| {
            let max_can_write = min(block_size - block_offset, left);
            let op = SubOperation {
                fd,
                file_offset: offset + buf_start_at,
                block_index,
                block_offset,
                len: max_can_write,
                buf_start_at: buf_start_at as usize,
            };
            // only the first fragment may start inside a block.
            block_offset = 0;
            buf_start_at += max_can_write;
            left -= max_can_write;
            op
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_one_block() {
        let ops = locate_blocks(1, 0, 4096, 4096);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].extent(), 0..4096);
        assert_eq!(ops[0].block_index, 0);
        assert_eq!(ops[0].block_offset, 0);

        let ops = locate_blocks(1, 4100, 10, 4096);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].block_index, 1);
        assert_eq!(ops[0].block_offset, 4);
    }

    #[test]
    fn across_two_blocks() {
        let ops = locate_blocks(1, 4000, 200, 4096);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].extent(), 4000..4096);
        assert_eq!(ops[0].block_offset, 4000);
        assert_eq!(ops[1].extent(), 4096..4200);
        assert_eq!(ops[1].block_index, 1);
        assert_eq!(ops[1].block_offset, 0);
        assert_eq!(ops[1].buf_range(), 96..200);
        // contiguous, and the union is the original range.
        assert_eq!(ops[0].extent().end, ops[1].extent().start);
    }

    #[test]
    fn covers_exactly() {
        for (offset, len) in [(0u64, 1u64), (1, 8191), (4095, 2), (12288, 4096 * 3 + 7), (3, 40000)] {
            let ops = locate_blocks(7, offset, len, 4096);
            assert_eq!(ops.first().unwrap().file_offset, offset);
            assert_eq!(ops.last().unwrap().extent().end, offset + len);
            assert_eq!(ops.iter().map(|op| op.len).sum::<u64>(), len);
            for w in ops.windows(2) {
                assert_eq!(w[0].extent().end, w[1].file_offset);
                assert_eq!(w[0].block_index + 1, w[1].block_index);
            }
            for op in &ops {
                assert!(op.len > 0);
                assert!(op.block_offset + op.len <= 4096);
                assert_eq!(op.block_index, op.file_offset / 4096);
            }
        }
    }

    #[test]
    fn empty() { assert!(locate_blocks(1, 100, 0, 4096).is_empty()); }
}
