/*!
 * Core Types
 * Common types used across the process handle
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID type (`0` is the "no OS process" sentinel)
pub type Pid = u32;

/// Default chunk size for pipe reads and writes
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Termination {
    /// Exited normally with the given status
    ///
    /// If the program image could not be replaced, the child exits with the
    /// OS error number of that failure, which lands here too.
    Exited(i32),
    /// Killed by the given signal number
    Signaled(i32),
}

impl Termination {
    /// Exit status, if the child exited normally
    #[inline]
    pub fn code(&self) -> Option<i32> {
        match *self {
            Termination::Exited(code) => Some(code),
            Termination::Signaled(_) => None,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with status {}", code),
            Termination::Signaled(signo) => write!(f, "killed by signal {}", signo),
        }
    }
}

/// Observable monitoring state of a process handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Child has not been seen to terminate yet
    Running,
    /// Child terminated; terminal and never reverts
    Terminated(Termination),
    /// Monitoring ended without observing an exit
    Detached,
}

impl ProcessState {
    /// Whether `wait` may return for this state
    #[inline]
    pub fn is_settled(&self) -> bool {
        !matches!(self, ProcessState::Running)
    }
}
