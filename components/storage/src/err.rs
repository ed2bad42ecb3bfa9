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

use snafu::{Location, Snafu};
use tsumugi_common::BlockId;
use tsumugi_types::DataNodeInfo;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("OpenDAL operator failed"))]
    OpenDal {
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        error: opendal::Error,
    },

    #[snafu(display("no endpoint registered for data node {}", datanode))]
    UnregisteredEndpoint {
        datanode: DataNodeInfo,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("block {} is stored on {}, not on {}", block_id, expected, actual))]
    WrongEndpoint {
        block_id: BlockId,
        expected: DataNodeInfo,
        actual: DataNodeInfo,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "write of {} bytes at {} exceeds block {} of size {}",
        len,
        block_offset,
        block_id,
        block_size
    ))]
    BlockOutOfRange {
        block_id: BlockId,
        block_offset: u64,
        len: u64,
        block_size: u64,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("endpoint {} is unavailable: {}", datanode, reason))]
    EndpointUnavailable {
        datanode: DataNodeInfo,
        reason: String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::OpenDal { error, .. } if error.kind() == opendal::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
