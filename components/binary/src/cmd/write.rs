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

use std::{path::PathBuf, time::Instant};

use clap::Args;
use snafu::{ensure_whatever, ResultExt, Whatever};
use tracing::{debug, info};
use tsumugi_client::{Client, Config, LocalCluster};
use tsumugi_common::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, TSUMUGI};
use tsumugi_utils::{logger::LoggingConfig, readable_size::ReadableSize};

const WRITE_OPTIONS_HEADER: &str = "Write options";
const CLUSTER_OPTIONS_HEADER: &str = "Cluster options";
const LOGGING_OPTIONS_HEADER: &str = "Logging options";

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Start an in-process cluster and write a file through an output stream.
Examples:

# Write 64MiB over 3 data nodes in 1MiB blocks
tsumugi write --size 67108864 --block-size 1048576 --data-nodes 3
")]
pub struct WriteArgs {
    #[arg(
        long,
        help = "Path of the file to write",
        help_heading = WRITE_OPTIONS_HEADER,
        default_value = "/tsumugi-write"
    )]
    pub path: String,

    #[arg(
        long,
        help = "Bytes to write",
        help_heading = WRITE_OPTIONS_HEADER,
        default_value = "16777216"
    )]
    pub size: u64,

    #[arg(
        long,
        help = "Block size in bytes, a power of two",
        help_heading = WRITE_OPTIONS_HEADER,
        default_value = "1048576",
        value_parser = validate_block_size,
    )]
    pub block_size: u64,

    #[arg(
        long,
        help = "Look up blocks ahead of the cursor while it is below this offset",
        help_heading = WRITE_OPTIONS_HEADER,
        default_value = "0",
        allow_negative_numbers = true
    )]
    pub write_hint: i64,

    #[arg(
        long,
        help = "Read the file back and compare it with what was written",
        help_heading = WRITE_OPTIONS_HEADER
    )]
    pub verify: bool,

    #[arg(
        long,
        help = "Number of data nodes",
        help_heading = CLUSTER_OPTIONS_HEADER,
        default_value = "3",
        value_parser = validate_data_nodes,
    )]
    pub data_nodes: usize,

    #[arg(
        long,
        help = "Keep blocks under this directory instead of memory",
        help_heading = CLUSTER_OPTIONS_HEADER,
        value_name = "DIRECTORY"
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(
        long,
        help = "Number of threads to use for tokio async runtime",
        help_heading = CLUSTER_OPTIONS_HEADER,
        default_value = "4"
    )]
    pub async_work_threads: usize,

    #[clap(
        long,
        help = "Write log files to a directory",
        help_heading = LOGGING_OPTIONS_HEADER,
        value_name = "DIRECTORY"
    )]
    pub log_directory: Option<PathBuf>,

    #[clap(
        short,
        long,
        help = "Log level",
        help_heading = LOGGING_OPTIONS_HEADER,
        value_name = "LEVEL",
        default_value = "info"
    )]
    pub level: String,
}

impl WriteArgs {
    fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            log_directory: self.log_directory.clone(),
            log_to_stdout: true,
            default_filter: self.level.clone(),
        }
    }

    fn client_config(&self) -> Result<Config, Whatever> {
        let mut config = Config::from_env().whatever_context("failed to load client config")?;
        config.block_size = self.block_size;
        config.default_write_hint = self.write_hint;
        Ok(config)
    }

    pub fn run(self) -> Result<(), Whatever> {
        self.logging_config().init_tracing_subscriber()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.async_work_threads)
            .thread_name(format!("{}-worker", TSUMUGI))
            .enable_all()
            .build()
            .whatever_context("failed to build the tokio runtime")?;
        runtime.block_on(self.write())
    }

    async fn write(&self) -> Result<(), Whatever> {
        let cluster = match &self.data_dir {
            Some(dir) => LocalCluster::start_on_disk(self.block_size, self.data_nodes, dir).await,
            None => LocalCluster::start(self.block_size, self.data_nodes).await,
        }
        .whatever_context("failed to start the cluster")?;
        let client = cluster
            .client(self.client_config()?)
            .whatever_context("failed to create the client")?;
        info!("{}", client);

        let file = client
            .create(&self.path)
            .await
            .with_whatever_context(|_| format!("failed to create {}", self.path))?;
        let out = client
            .open_output_stream(&file)
            .whatever_context("failed to open the output stream")?;

        let start = Instant::now();
        let mut pending = Vec::new();
        let mut written = 0u64;
        while written < self.size {
            let buf = fill(&client, written, self.size - written).await;
            written += buf.remaining() as u64;
            pending.push(out.write(buf).whatever_context("write rejected")?);
        }
        let mut landed = 0;
        for fut in pending {
            landed += fut.await.whatever_context("write failed")?.len;
        }
        out.sync()
            .whatever_context("sync rejected")?
            .await
            .whatever_context("sync failed")?;
        out.close().await.whatever_context("close failed")?;
        let elapsed = start.elapsed();

        debug!("{} blocks prefetched", out.prefetched_blocks());
        ensure_whatever!(
            landed == self.size,
            "{} of {} bytes landed",
            landed,
            self.size
        );
        if self.verify {
            let content = cluster
                .read_file(&file)
                .await
                .whatever_context("failed to read the file back")?;
            ensure_whatever!(
                content.len() as u64 == self.size
                    && content.iter().enumerate().all(|(i, b)| *b == pattern(i as u64)),
                "{} does not read back what was written",
                self.path
            );
            info!("{} verified", self.path);
        }

        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        println!(
            "wrote {} to {} in {:.3}s ({}/s), capacity {}",
            ReadableSize(landed),
            self.path,
            secs,
            ReadableSize((landed as f64 / secs) as u64),
            ReadableSize(out.capacity()),
        );
        Ok(())
    }
}

fn pattern(offset: u64) -> u8 { (offset % 251) as u8 }

/// A registered buffer holding the next `left` bytes of the file at most.
async fn fill(client: &Client, offset: u64, left: u64) -> tsumugi_client::RegisteredBuffer {
    let mut buf = client.allocate_buffer().await;
    let n = buf.capacity().min(left as usize);
    let data = (offset..offset + n as u64).map(pattern).collect::<Vec<_>>();
    buf.put_slice(&data);
    buf.freeze()
}

fn validate_block_size(s: &str) -> Result<u64, String> {
    let n = clap_num::number_range(s, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)?;
    if !n.is_power_of_two() {
        return Err(format!("block size {} is not a power of two", n));
    }
    Ok(n)
}

fn validate_data_nodes(s: &str) -> Result<usize, String> { clap_num::number_range(s, 1, 64) }
