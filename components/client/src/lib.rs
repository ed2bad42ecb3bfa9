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

//! The client side write path: output streams that split writes into
//! per-block transfers, run them in the background and only publish bytes
//! that have landed.

mod client;
mod cluster;
pub mod config;
mod dispatcher;
pub mod err;
mod future;
mod locator;
mod node;
mod output;
mod stream;
mod tracker;
mod translator;

pub use client::Client;
pub use cluster::LocalCluster;
pub use config::Config;
pub use err::{Error, Result};
pub use future::{OpFuture, PendingSync, PendingWrite, WriteResult};
pub use node::{FileNode, FileNodeRef};
pub use output::OutputStream;
pub use tsumugi_storage::{BufferMut, DataBuffer, RegisteredBuffer};
