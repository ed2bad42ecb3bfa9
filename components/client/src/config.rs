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

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;
use tsumugi_common::{BLOCK_SIZE, BUFFER_POOL_CAPACITY, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, PAGE_SIZE};
use tsumugi_utils::env::var_parsed;

use crate::err::{EnvSnafu, InvalidConfigSnafu, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// block_size is the unit the data nodes store, a single transfer
    /// never crosses a block boundary.
    pub block_size: u64,
    /// The size of one registered buffer.
    pub page_size: usize,
    /// The total registered memory for write buffers.
    pub buffer_pool_capacity: usize,
    /// The write hint for streams opened without one.
    pub default_write_hint: i64,
    // look up block metadata ahead of the write cursor
    pub prefetch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,                       // 1MB
            page_size: PAGE_SIZE,                         // 128KB
            buffer_pool_capacity: BUFFER_POOL_CAPACITY,   // 64MB
            default_write_hint: 0,
            prefetch: true,
        }
    }
}

impl Config {
    /// The default config overlaid with the `TSUMUGI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = env_var("TSUMUGI_BLOCK_SIZE")? {
            cfg.block_size = v;
        }
        if let Some(v) = env_var("TSUMUGI_PAGE_SIZE")? {
            cfg.page_size = v;
        }
        if let Some(v) = env_var("TSUMUGI_BUFFER_POOL_CAPACITY")? {
            cfg.buffer_pool_capacity = v;
        }
        if let Some(v) = env_var("TSUMUGI_WRITE_HINT")? {
            cfg.default_write_hint = v;
        }
        if let Some(v) = env_var("TSUMUGI_PREFETCH")? {
            cfg.prefetch = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.block_size.is_power_of_two()
                && (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size),
            InvalidConfigSnafu {
                reason: format!(
                    "block size {} must be a power of two in [{}, {}]",
                    self.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
                ),
            }
        );
        ensure!(
            self.page_size > 0
                && self.buffer_pool_capacity >= self.page_size
                && self.buffer_pool_capacity % self.page_size == 0,
            InvalidConfigSnafu {
                reason: format!(
                    "buffer pool capacity {} must be a non-zero multiple of page size {}",
                    self.buffer_pool_capacity, self.page_size
                ),
            }
        );
        Ok(())
    }
}

fn env_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_parsed(key).map_err(|e| {
        EnvSnafu {
            key,
            reason: e.to_string(),
        }
        .build()
    })
}
