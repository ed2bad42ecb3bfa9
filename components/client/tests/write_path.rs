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

use std::{sync::Arc, time::Duration};

use tsumugi_client::{Config, LocalCluster, OutputStream};
use tsumugi_meta::MetaService;
use tsumugi_utils::logger::install_fmt_log;

fn config(block_size: u64) -> Config {
    Config {
        block_size,
        page_size: 64 << 10,
        buffer_pool_capacity: 64 << 10 << 4,
        default_write_hint: 0,
        prefetch: true,
    }
}

async fn drain(out: &OutputStream) {
    for _ in 0..200 {
        if out.in_flight() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} fragments never settled", out.in_flight());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn write_across_blocks_and_read_back() {
    install_fmt_log();
    let cluster = LocalCluster::start(4096, 3).await.unwrap();
    let client = cluster.client(config(4096)).unwrap();
    let file = client.create("/a").await.unwrap();
    let out = client.output_stream(&file, 0).unwrap();

    let mut expected = Vec::new();
    let mut pending = Vec::new();
    for i in 0..5u8 {
        // 3000 bytes each, so most writes straddle a block boundary.
        let data = vec![i + 1; 3000];
        let mut buf = client.allocate_buffer().await;
        buf.put_slice(&data);
        expected.extend_from_slice(&data);
        pending.push(out.write(buf.freeze()).unwrap());
    }
    assert_eq!(out.position(), 15000);

    let mut written = 0;
    for fut in pending {
        written += fut.await.unwrap().len;
    }
    assert_eq!(written, 15000);
    assert_eq!(out.in_flight(), 0);
    assert_eq!(out.capacity(), 15000);

    out.sync().unwrap().await.unwrap();
    assert_eq!(cluster.meta().lookup("/a").await.unwrap().capacity, 15000);
    out.close().await.unwrap();

    // 15000 bytes over 4K blocks.
    assert_eq!(cluster.meta().block_count(file.fd()), 4);
    assert_eq!(cluster.read_file(&file).await.unwrap(), expected);
}

#[tokio::test]
async fn prefetch_below_write_hint() {
    install_fmt_log();
    let cluster = LocalCluster::start(4096, 1).await.unwrap();
    let client = cluster.client(config(4096)).unwrap();
    let file = client.create("/hint").await.unwrap();
    let out = client.output_stream(&file, 8192).unwrap();
    assert_eq!(out.write_hint(), 8192);

    let mut buf = client.allocate_buffer().await;
    buf.put_slice(&[1u8; 4096]);
    let fut = out.write(buf.freeze()).unwrap();
    assert_eq!(out.in_flight(), 1);
    // the cursor reached 4096, a block boundary below the hint.
    assert_eq!(out.prefetched_blocks(), 1);
    assert_eq!(fut.await.unwrap().len, 4096);
    assert_eq!(out.in_flight(), 0);
    assert_eq!(out.capacity(), 4096);

    // the cursor reached the hint: no more prefetching.
    let mut buf = client.allocate_buffer().await;
    buf.put_slice(&[2u8; 4096]);
    out.write(buf.freeze()).unwrap().await.unwrap();
    assert_eq!(out.prefetched_blocks(), 1);
    out.close().await.unwrap();
    assert_eq!(out.capacity(), 8192);
}

#[tokio::test]
async fn no_prefetch_when_disabled() {
    install_fmt_log();
    let cluster = LocalCluster::start(4096, 1).await.unwrap();
    let client = cluster
        .client(Config {
            prefetch: false,
            ..config(4096)
        })
        .unwrap();
    let file = client.create("/noprefetch").await.unwrap();
    let out = client.output_stream(&file, 1 << 20).unwrap();
    let mut buf = client.allocate_buffer().await;
    buf.put_slice(&[1u8; 100]);
    out.write(buf.freeze()).unwrap().await.unwrap();
    assert_eq!(out.prefetched_blocks(), 0);
    out.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sync_and_close_wait_for_the_caller() {
    install_fmt_log();
    let cluster = LocalCluster::start(4096, 2).await.unwrap();
    let client = cluster.client(config(4096)).unwrap();
    let file = client.create("/drain").await.unwrap();
    let out = client.output_stream(&file, 0).unwrap();

    let mut buf = client.allocate_buffer().await;
    buf.put_slice(&vec![9u8; 60000]);
    let fut = out.write(buf.freeze()).unwrap();
    // neither call waits, they either succeed or ask the caller to retry.
    loop {
        match out.close().await {
            Ok(()) => break,
            Err(e) if e.is_pending_operations() => tokio::task::yield_now().await,
            Err(e) => panic!("close failed: {e}"),
        }
    }
    assert_eq!(out.in_flight(), 0);
    assert_eq!(fut.await.unwrap().len, 60000);
    assert_eq!(cluster.meta().lookup("/drain").await.unwrap().capacity, 60000);
    assert_eq!(client.open_output_streams(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_on_one_stream() {
    install_fmt_log();
    let cluster = LocalCluster::start(4096, 2).await.unwrap();
    let client = Arc::new(cluster.client(config(4096)).unwrap());
    let file = client.create("/shared").await.unwrap();
    let out = Arc::new(client.output_stream(&file, 0).unwrap());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let out = out.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..4 {
                let mut buf = client.allocate_buffer().await;
                buf.put_slice(&[5u8; 1000]);
                out.write(buf.freeze()).unwrap().await.unwrap();
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    drain(&out).await;
    assert_eq!(out.position(), 32000);
    assert_eq!(out.capacity(), 32000);
    out.close().await.unwrap();
    assert_eq!(cluster.read_file(&file).await.unwrap(), vec![5u8; 32000]);
}

#[tokio::test]
async fn reopen_appends_at_capacity() {
    install_fmt_log();
    let cluster = LocalCluster::start(4096, 1).await.unwrap();
    let client = cluster.client(config(4096)).unwrap();
    let file = client.create("/append").await.unwrap();

    let out = client.output_stream(&file, 0).unwrap();
    let mut buf = client.allocate_buffer().await;
    buf.put_slice(&[1u8; 5000]);
    out.write(buf.freeze()).unwrap().await.unwrap();
    out.close().await.unwrap();

    let file = client.lookup("/append").await.unwrap();
    assert_eq!(file.capacity(), 5000);
    let out = client.output_stream(&file, 0).unwrap();
    assert_eq!(out.position(), 5000);
    let mut buf = client.allocate_buffer().await;
    buf.put_slice(&[2u8; 100]);
    out.write(buf.freeze()).unwrap().await.unwrap();
    out.close().await.unwrap();

    let mut expected = vec![1u8; 5000];
    expected.extend_from_slice(&[2u8; 100]);
    assert_eq!(cluster.read_file(&file).await.unwrap(), expected);
}

#[tokio::test]
async fn blocks_on_disk() {
    install_fmt_log();
    let dir = tempfile::tempdir().unwrap();
    let cluster = LocalCluster::start_on_disk(4096, 2, dir.path()).await.unwrap();
    let client = cluster.client(config(4096)).unwrap();
    let file = client.create("/disk").await.unwrap();
    let out = client.output_stream(&file, 0).unwrap();

    let data = (0..10000u32).map(|i| i as u8).collect::<Vec<_>>();
    let mut buf = client.allocate_buffer().await;
    buf.put_slice(&data);
    assert_eq!(out.write(buf.freeze()).unwrap().await.unwrap().len, 10000);
    out.close().await.unwrap();

    assert_eq!(cluster.read_file(&file).await.unwrap(), data);
}
