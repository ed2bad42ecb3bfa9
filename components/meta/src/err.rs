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
use tsumugi_common::{Fd, FileOffset};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{} not found", path))]
    NotFound {
        #[snafu(implicit)]
        location: Location,
        path:     String,
    },

    #[snafu(display("{} already exists", path))]
    AlreadyExists {
        #[snafu(implicit)]
        location: Location,
        path:     String,
    },

    #[snafu(display("invalid path {:?}", path))]
    InvalidPath {
        #[snafu(implicit)]
        location: Location,
        path:     String,
    },

    #[snafu(display("{} is a directory", path))]
    IsDirectory {
        #[snafu(implicit)]
        location: Location,
        path:     String,
    },

    #[snafu(display("unknown file descriptor {}", fd))]
    UnknownFile {
        #[snafu(implicit)]
        location: Location,
        fd:       Fd,
    },

    #[snafu(display("token mismatch for file descriptor {}", fd))]
    InvalidToken {
        #[snafu(implicit)]
        location: Location,
        fd:       Fd,
    },

    #[snafu(display("no data node to place block at {} of {}", position, fd))]
    NoDataNode {
        #[snafu(implicit)]
        location: Location,
        fd:       Fd,
        position: FileOffset,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool { matches!(self, Error::NotFound { .. }) }
}
