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
use tsumugi_common::StreamId;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("stream {} is closed", stream_id))]
    StreamClosed {
        stream_id: StreamId,
        #[snafu(implicit)]
        location:  Location,
    },

    #[snafu(display("stream {} only writes registered buffers", stream_id))]
    InvalidBufferKind {
        stream_id: StreamId,
        #[snafu(implicit)]
        location:  Location,
    },

    #[snafu(display("stream {} has {} pending operations", stream_id, in_flight))]
    PendingOperations {
        stream_id: StreamId,
        in_flight: u64,
        #[snafu(implicit)]
        location:  Location,
    },

    #[snafu(display("{} is a directory", path))]
    IsDirectory {
        path:     String,
        #[snafu(implicit)]
        location: Location,
    },

    TransferFailure {
        #[snafu(implicit)]
        location: Location,
        source:   tsumugi_storage::err::Error,
    },

    StorageError {
        #[snafu(implicit)]
        location: Location,
        source:   tsumugi_storage::err::Error,
    },

    #[snafu(display("endpoint acknowledged {} of {} bytes", actual, expected))]
    ShortTransfer {
        expected: u64,
        actual:   u64,
        #[snafu(implicit)]
        location: Location,
    },

    MetaError {
        #[snafu(implicit)]
        location: Location,
        source:   tsumugi_meta::Error,
    },

    #[snafu(display("write landed {} of {} bytes", landed, total))]
    PartialWrite {
        landed:   u64,
        total:    u64,
        #[snafu(source(from(Error, Box::new)))]
        source:   Box<Error>,
        #[snafu(implicit)]
        location: Location,
    },

    JoinErr {
        #[snafu(implicit)]
        location: Location,
        source:   tokio::task::JoinError,
    },

    #[snafu(display("invalid config: {}", reason))]
    InvalidConfig {
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("bad environment variable {}: {}", key, reason))]
    EnvError {
        key:      String,
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Error {
    /// Whether waiting for outstanding writes and retrying can succeed.
    pub fn is_pending_operations(&self) -> bool {
        matches!(self, Error::PendingOperations { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

