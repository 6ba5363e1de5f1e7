/*!
 * Process Configuration
 *
 * Runtime configuration for pipe chunking and exit-watch strategy selection
 */

use super::types::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Environment variable overriding the pipe read chunk size
pub const ENV_READ_CHUNK: &str = "PROC_HANDLE_READ_CHUNK";
/// Environment variable overriding the pipe write chunk size
pub const ENV_WRITE_CHUNK: &str = "PROC_HANDLE_WRITE_CHUNK";
/// Environment variable selecting the watch strategy (`dedicated` or `shared`)
pub const ENV_WATCH: &str = "PROC_HANDLE_WATCH";

/// How child termination is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStrategy {
    /// One polling thread per live handle
    #[default]
    Dedicated,
    /// One process-wide reaper thread multiplexing every registered child
    Shared,
}

impl std::str::FromStr for WatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dedicated" => Ok(WatchStrategy::Dedicated),
            "shared" => Ok(WatchStrategy::Shared),
            other => Err(format!("unknown watch strategy '{}'", other)),
        }
    }
}

/// Pacing of the non-blocking status poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Iterations spent on `spin_loop()` hints
    pub spin_iterations: u32,
    /// Further iterations spent on `yield_now()`
    pub yield_iterations: u32,
    /// Upper bound of the exponential sleep phase
    ///
    /// This also bounds how long teardown waits for a watcher to notice the
    /// stop request.
    pub max_sleep: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            spin_iterations: 10,
            yield_iterations: 50,
            max_sleep: Duration::from_millis(1),
        }
    }
}

impl PollConfig {
    /// Configuration for children expected to exit within microseconds
    pub const fn low_latency() -> Self {
        Self {
            spin_iterations: 100,
            yield_iterations: 500,
            max_sleep: Duration::from_micros(100),
        }
    }

    /// Configuration for long-running children
    pub const fn low_cpu() -> Self {
        Self {
            spin_iterations: 1,
            yield_iterations: 10,
            max_sleep: Duration::from_millis(10),
        }
    }
}

/// Per-handle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Bytes requested per `read` on stdout/stderr
    pub read_chunk_size: usize,
    /// Bytes offered per `write` on stdin
    pub write_chunk_size: usize,
    pub watch: WatchStrategy,
    /// Pacing of a dedicated watcher; the shared reaper uses its own
    pub poll: PollConfig,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            write_chunk_size: DEFAULT_CHUNK_SIZE,
            watch: WatchStrategy::default(),
            poll: PollConfig::default(),
        }
    }
}

impl ProcessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `PROC_HANDLE_*` environment variables
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = read_env_usize(ENV_READ_CHUNK) {
            config = config.with_read_chunk_size(size);
        }
        if let Some(size) = read_env_usize(ENV_WRITE_CHUNK) {
            config = config.with_write_chunk_size(size);
        }
        if let Ok(raw) = std::env::var(ENV_WATCH) {
            match raw.parse() {
                Ok(watch) => config.watch = watch,
                Err(e) => warn!(var = ENV_WATCH, value = %raw, "Ignoring invalid value: {}", e),
            }
        }

        config
    }

    /// Set the read chunk size (clamped to at least one byte)
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set the write chunk size (clamped to at least one byte)
    pub fn with_write_chunk_size(mut self, size: usize) -> Self {
        self.write_chunk_size = size.max(1);
        self
    }

    /// Set both chunk sizes
    pub fn with_chunk_size(self, size: usize) -> Self {
        self.with_read_chunk_size(size).with_write_chunk_size(size)
    }

    pub fn with_watch(mut self, watch: WatchStrategy) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Copy with chunk sizes forced into their valid range
    ///
    /// Deserialized configurations bypass the builder clamps.
    pub(crate) fn normalized(&self) -> Self {
        self.clone()
            .with_read_chunk_size(self.read_chunk_size)
            .with_write_chunk_size(self.write_chunk_size)
    }
}

fn read_env_usize(var: &str) -> Option<usize> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(var, value = %raw, "Ignoring invalid value: {}", e);
            None
        }
    }
}
