/*!
 * proc-handle
 * Handles to operating-system processes: spawn, exit monitoring, stdio pipes
 *
 * ```no_run
 * use proc_handle::{Executable, Process};
 *
 * let exe = Executable::new("/bin/cat");
 * if let Some(mut process) = Process::create(&exe) {
 *     process.stdin("hello\n");
 *     process.close_stdin();
 *     let code = process.wait().exit_code();
 *     println!("{:?} {}", code, process.stdout());
 * }
 * ```
 */

pub mod core;
pub mod monitoring;
pub mod process;

// Re-exports
pub use crate::core::{
    Pid, PollConfig, ProcessConfig, ProcessError, ProcessResult, ProcessState, Termination,
    WatchStrategy,
};
pub use monitoring::init_tracing;
pub use process::{
    Backend, Capability, ChildStatus, Executable, PosixBackend, Process, ProcessBuilder, Spawned,
};
