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

use once_cell::sync::Lazy;
use tracing::debug;

static GLOBAL_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    debug!("start tokio runtime");
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("tsumugi-io")
        .enable_all()
        .build()
        .expect("failed to build the global runtime")
});

pub fn handle() -> tokio::runtime::Handle { GLOBAL_RUNTIME.handle().clone() }

/// The runtime we are called from, falling back to the global one when the
/// caller is not inside a tokio context.
pub fn current_or_global() -> tokio::runtime::Handle {
    tokio::runtime::Handle::try_current().unwrap_or_else(|_| handle())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_global() {
        let h = current_or_global();
        let v = std::thread::spawn(move || h.block_on(async { 7 }))
            .join()
            .unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn uses_current() {
        let h = current_or_global();
        assert_eq!(h.id(), tokio::runtime::Handle::current().id());
    }
}
