/*!
 * Process Handle
 * Exclusive owner of a process id, its stdio pipes, exit cell and watcher
 */

use super::backend::Backend;
use super::builder::ProcessBuilder;
use super::executable::Executable;
use super::exit::ExitCell;
use super::pipe::{ChildStdio, PipeReader};
use super::posix::PosixBackend;
use super::watcher::Watcher;
use crate::core::config::ProcessConfig;
use crate::core::errors::ProcessResult;
use crate::core::types::{Pid, ProcessState, Termination};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Handle to an operating-system process
///
/// Not `Clone`: the pid and pipe descriptors have exactly one owner. A plain
/// Rust move keeps the watcher running, since the watcher is bound to the
/// shared exit cell rather than to the handle's address. [`transfer`]
/// performs an explicit stop-and-rebind instead.
///
/// Dropping the handle stops and joins the watcher, then closes the pipes.
/// The child itself keeps running; nothing here ever signals it.
///
/// [`transfer`]: Process::transfer
pub struct Process {
    pid: Pid,
    exit: Arc<ExitCell>,
    watcher: Option<Watcher>,
    stdio: Option<ChildStdio>,
    backend: Arc<dyn Backend>,
    config: ProcessConfig,
}

impl Process {
    /// Builder for a custom backend or configuration
    pub fn builder() -> ProcessBuilder {
        ProcessBuilder::new()
    }

    /// Handle for the calling process
    ///
    /// Has no pipes and no watcher (a process cannot reap itself), so
    /// [`exit_code`](Self::exit_code) stays empty and [`wait`](Self::wait)
    /// returns immediately.
    pub fn current() -> Self {
        Self::builder().current().unwrap_or_else(|e| {
            warn!("Cannot identify the current process: {}", e);
            Self::default()
        })
    }

    /// Spawn `executable`; `None` if the child could not be created
    ///
    /// A binary that fails to exec still yields a process: the child exits
    /// with the OS error number of the failure.
    pub fn create(executable: &Executable) -> Option<Self> {
        match Self::spawn(executable) {
            Ok(process) => Some(process),
            Err(e) => {
                error!(binary = %executable.binary.display(), "Process creation failed: {}", e);
                None
            }
        }
    }

    /// Spawn `executable` with the POSIX backend and default configuration
    pub fn spawn(executable: &Executable) -> ProcessResult<Self> {
        Self::builder().spawn(executable)
    }

    pub(crate) fn from_parts(
        pid: Pid,
        exit: Arc<ExitCell>,
        watcher: Option<Watcher>,
        stdio: Option<ChildStdio>,
        backend: Arc<dyn Backend>,
        config: ProcessConfig,
    ) -> Self {
        Self {
            pid,
            exit,
            watcher,
            stdio,
            backend,
            config,
        }
    }

    /// OS process id, `0` for the default handle
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn state(&self) -> ProcessState {
        self.exit.state()
    }

    /// How the child ended, once known
    pub fn termination(&self) -> Option<Termination> {
        match self.exit.state() {
            ProcessState::Terminated(termination) => Some(termination),
            _ => None,
        }
    }

    /// Exit status of a child that exited normally
    ///
    /// Empty while the child runs. Note the ambiguity inherited from the
    /// exec protocol: when the binary cannot be executed the child exits
    /// with the OS error number (for example `ENOENT`), which is
    /// indistinguishable here from a program returning that same number.
    pub fn exit_code(&self) -> Option<i32> {
        self.termination().and_then(|t| t.code())
    }

    pub fn has_exited(&self) -> bool {
        self.termination().is_some()
    }

    /// Block until the child's termination is recorded (or monitoring ends)
    ///
    /// Safe to call repeatedly and from several threads at once. Does not
    /// stop the watcher.
    pub fn wait(&self) -> &Self {
        let state = self.exit.wait();
        debug!(pid = self.pid, ?state, "Wait returned");
        self
    }

    /// [`wait`](Self::wait) bounded by `timeout`; true if the wait completed
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.exit.wait_timeout(timeout).is_some()
    }

    /// Write `bytes` to the child's stdin, returning how many were accepted
    ///
    /// Best effort: a child that closed its stdin gets a short count.
    pub fn stdin(&self, bytes: impl AsRef<[u8]>) -> usize {
        let bytes = bytes.as_ref();
        match self.stdio.as_ref().and_then(|s| s.stdin.as_ref()) {
            Some(writer) => writer.write_all_chunked(bytes, self.config.write_chunk_size),
            None => {
                debug!(pid = self.pid, "No stdin pipe, dropping {} bytes", bytes.len());
                0
            }
        }
    }

    /// Close the child's stdin so it reads end-of-file
    pub fn close_stdin(&mut self) {
        if let Some(stdio) = self.stdio.as_mut() {
            stdio.stdin.take();
        }
    }

    /// Output the child has written to stdout so far, as text
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout_bytes()).into_owned()
    }

    /// Output the child has written to stderr so far, as text
    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr_bytes()).into_owned()
    }

    pub fn stdout_bytes(&self) -> Vec<u8> {
        self.drain(|s| &s.stdout)
    }

    pub fn stderr_bytes(&self) -> Vec<u8> {
        self.drain(|s| &s.stderr)
    }

    fn drain(&self, pick: impl Fn(&ChildStdio) -> &PipeReader) -> Vec<u8> {
        self.stdio
            .as_ref()
            .map(|s| pick(s).read_available(self.config.read_chunk_size))
            .unwrap_or_default()
    }

    /// Move everything this handle owns into a new handle
    ///
    /// Synchronously stops and joins this handle's watcher, then starts a
    /// new one bound to the returned handle before returning. `self` is
    /// left as the pid-0 sentinel.
    pub fn transfer(&mut self) -> Process {
        let was_watched = match self.watcher.take() {
            Some(mut watcher) => {
                watcher.stop();
                true
            }
            None => false,
        };

        let pid = std::mem::take(&mut self.pid);
        let stdio = self.stdio.take();
        let previous = std::mem::replace(&mut self.exit, Arc::new(ExitCell::detached()));
        let backend = self.backend.clone();
        let config = self.config.clone();

        let state = match previous.state() {
            terminated @ ProcessState::Terminated(_) => terminated,
            _ if was_watched => ProcessState::Running,
            other => other,
        };
        let exit = Arc::new(ExitCell::with_state(state));

        let watcher = if state == ProcessState::Running {
            Watcher::start_or_detach(pid, backend.clone(), exit.clone(), config.watch, config.poll)
        } else {
            None
        };

        debug!(pid, ?state, "Process handle transferred");
        Process::from_parts(pid, exit, watcher, stdio, backend, config)
    }
}

impl Default for Process {
    /// Sentinel handle: pid 0, no pipes, no watcher
    fn default() -> Self {
        Self::from_parts(
            0,
            Arc::new(ExitCell::detached()),
            None,
            None,
            Arc::new(PosixBackend),
            ProcessConfig::default(),
        )
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        // Watcher first: it must be gone before the pipes close
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
            debug!(pid = self.pid, "Watcher stopped");
        }
        self.stdio.take();
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("state", &self.exit.state())
            .field("watched", &self.watcher.is_some())
            .field("piped", &self.stdio.is_some())
            .field("backend", &self.backend.name())
            .finish()
    }
}
