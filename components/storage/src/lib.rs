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

pub mod buffer;
pub mod endpoint;
pub mod err;
pub mod object_endpoint;

pub use buffer::{BufferMut, BufferPool, DataBuffer, RegionToken, RegisteredBuffer};
pub use endpoint::{Endpoint, EndpointRef, EndpointRegistry, EndpointRegistryRef};
pub use object_endpoint::ObjectEndpoint;
