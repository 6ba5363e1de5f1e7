/*!
 * Process Module
 * Process handles: creation, exit monitoring, and stdio exchange
 */

pub mod backend;
mod builder;
pub mod executable;
mod exit;
mod handle;
pub mod marshal;
pub mod pipe;
pub mod posix;
mod watcher;

// Re-export for convenience
pub use backend::{Backend, Capability, ChildStatus, Spawned};
pub use builder::ProcessBuilder;
pub use executable::Executable;
pub use handle::Process;
pub use marshal::ExecImage;
pub use pipe::{read_chunked, write_chunked, ChildStdio, PipeReader, PipeWriter};
pub use posix::PosixBackend;
