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

use std::{path::PathBuf, sync::Once};

use snafu::{ResultExt, Whatever};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// The environment variable that overrides the default filter directive.
pub const LOG_ENV: &str = "TSUMUGI_LOG";

const LOG_FILE_NAME: &str = "tsumugi.log";

/// Configuration for client logging.
#[derive(Debug)]
pub struct LoggingConfig {
    /// A directory to create the log file in. No file is written when unset.
    pub log_directory: Option<PathBuf>,
    /// Whether to write logs to stdout.
    pub log_to_stdout: bool,
    /// The default filter directive (in the sense of
    /// [tracing_subscriber::filter::EnvFilter]) to use for logs. Will be
    /// overridden by the `TSUMUGI_LOG` environment variable if set.
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_directory: None,
            log_to_stdout: true,
            default_filter: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn init_tracing_subscriber(self) -> Result<(), Whatever> {
        let env_filter = create_env_filter(&self.default_filter);
        // Don't create the files or subscribers if we'll never emit any logs
        if env_filter.max_level_hint() == Some(LevelFilter::OFF) {
            return Ok(());
        }

        let console_layer = if self.log_to_stdout {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(supports_color::on(supports_color::Stream::Stdout).is_some())
                .with_filter(create_env_filter(&self.default_filter));
            Some(fmt_layer)
        } else {
            None
        };

        let file_layer = match self.log_directory {
            Some(dir) => {
                std::fs::create_dir_all(&dir).with_whatever_context(|_| {
                    format!("failed to create log directory {}", dir.display())
                })?;
                let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
                let fmt_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(appender)
                    .with_filter(create_env_filter(&self.default_filter));
                Some(fmt_layer)
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .with_whatever_context(|_| "failed to install the tracing subscriber")?;
        Ok(())
    }
}

/// Create the filter from the TSUMUGI_LOG environment variable or the
/// default directive if that variable is unset. [EnvFilter] isn't [Clone], so
/// each [Layer] gets its own.
fn create_env_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(filter))
}

static INSTALL_FMT_LOG: Once = Once::new();

/// Install a fmt subscriber that writes through the test harness.
/// Safe to call from every test.
pub fn install_fmt_log() {
    INSTALL_FMT_LOG.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(create_env_filter("debug"))
            .with_test_writer()
            .try_init();
    });
}
