/*!
 * Process Backend
 * Capability-gated interface to the OS process model
 */

use super::executable::Executable;
use super::pipe::ChildStdio;
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::types::{Pid, Termination};

/// Optional operations a backend may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Identify the calling process
    CurrentProcess,
    /// Create a child process with piped stdio
    Spawn,
    /// Query a child's termination without blocking
    ExitStatus,
}

/// Result of one non-blocking status query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Running,
    Terminated(Termination),
    /// Not (or no longer) a waitable child of this process
    Gone,
}

/// A freshly spawned child
#[derive(Debug)]
pub struct Spawned {
    pub pid: Pid,
    pub stdio: Option<ChildStdio>,
}

/// OS process model behind a [`Process`](super::Process)
///
/// Every operation has a default that fails with
/// [`ProcessError::Unsupported`]; a backend overrides the operations it
/// lists in [`Backend::supports`].
#[cfg_attr(test, mockall::automock)]
pub trait Backend: Send + Sync {
    /// Short name for logs and errors
    fn name(&self) -> &'static str;

    fn supports(&self, capability: Capability) -> bool;

    fn current_pid(&self) -> ProcessResult<Pid> {
        Err(ProcessError::unsupported(self.name(), "current_pid"))
    }

    fn spawn(&self, executable: &Executable) -> ProcessResult<Spawned> {
        let _ = executable;
        Err(ProcessError::unsupported(self.name(), "spawn"))
    }

    fn try_wait(&self, pid: Pid) -> ProcessResult<ChildStatus> {
        let _ = pid;
        Err(ProcessError::unsupported(self.name(), "try_wait"))
    }
}

/// Fail with `Unsupported` unless `backend` provides every capability
pub(crate) fn require(backend: &dyn Backend, capabilities: &[Capability]) -> ProcessResult<()> {
    match capabilities.iter().find(|c| !backend.supports(**c)) {
        Some(missing) => Err(ProcessError::unsupported(
            backend.name(),
            &format!("{:?}", missing),
        )),
        None => Ok(()),
    }
}
