/*!
 * Process Builder
 * Builder pattern for Process construction with a chosen backend and config
 */

use super::backend::{require, Backend, Capability, Spawned};
use super::executable::Executable;
use super::exit::ExitCell;
use super::handle::Process;
use super::posix::PosixBackend;
use super::watcher::Watcher;
use crate::core::config::{ProcessConfig, WatchStrategy};
use crate::core::errors::ProcessResult;
use std::sync::Arc;
use tracing::{info, instrument};

/// Builder for [`Process`]
pub struct ProcessBuilder {
    backend: Arc<dyn Backend>,
    config: ProcessConfig,
}

impl ProcessBuilder {
    /// POSIX backend, default configuration
    pub fn new() -> Self {
        Self {
            backend: Arc::new(PosixBackend),
            config: ProcessConfig::default(),
        }
    }

    /// Use a different OS backend
    pub fn with_backend(self, backend: impl Backend + 'static) -> Self {
        self.with_shared_backend(Arc::new(backend))
    }

    pub fn with_shared_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_config(mut self, config: ProcessConfig) -> Self {
        self.config = config;
        self
    }

    /// Set both pipe chunk sizes
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.config = self.config.with_chunk_size(size);
        self
    }

    pub fn with_watch(mut self, watch: WatchStrategy) -> Self {
        self.config = self.config.with_watch(watch);
        self
    }

    /// Spawn `executable` and start watching it
    #[instrument(level = "debug", skip_all, fields(binary = %executable.binary.display()))]
    pub fn spawn(self, executable: &Executable) -> ProcessResult<Process> {
        require(
            self.backend.as_ref(),
            &[Capability::Spawn, Capability::ExitStatus],
        )?;
        let config = self.config.normalized();

        let Spawned { pid, stdio } = self.backend.spawn(executable)?;
        // The child exists from here on: no early return may drop it
        let exit = Arc::new(ExitCell::running());
        let watcher = Watcher::start_or_detach(
            pid,
            self.backend.clone(),
            exit.clone(),
            config.watch,
            config.poll,
        );

        info!(
            pid,
            backend = self.backend.name(),
            watch = ?config.watch,
            "Spawned process"
        );
        Ok(Process::from_parts(
            pid,
            exit,
            watcher,
            stdio,
            self.backend,
            config,
        ))
    }

    /// Handle for the calling process
    pub fn current(self) -> ProcessResult<Process> {
        require(self.backend.as_ref(), &[Capability::CurrentProcess])?;
        let pid = self.backend.current_pid()?;

        Ok(Process::from_parts(
            pid,
            Arc::new(ExitCell::detached()),
            None,
            None,
            self.backend,
            self.config.normalized(),
        ))
    }
}

impl Default for ProcessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
