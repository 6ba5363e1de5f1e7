/*!
 * POSIX Backend
 * fork/execve with piped stdio, waitpid(WNOHANG) status queries
 */

use super::backend::{Backend, Capability, ChildStatus, Spawned};
use super::executable::Executable;
use super::marshal::ExecImage;
use super::pipe::{ChildStdio, PipePair, PipeReader, PipeWriter};
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::types::{Pid, Termination};
use nix::errno::Errno;
use nix::libc;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, getpid, ForkResult, Pid as NixPid};
use std::os::fd::{AsRawFd, RawFd};
use tracing::{debug, error};

/// Backend for POSIX-like systems
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixBackend;

impl Backend for PosixBackend {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    fn current_pid(&self) -> ProcessResult<Pid> {
        Ok(getpid().as_raw() as Pid)
    }

    fn spawn(&self, executable: &Executable) -> ProcessResult<Spawned> {
        let image = ExecImage::marshal(executable)?;
        let stdin = PipePair::new()?;
        let stdout = PipePair::new()?;
        let stderr = PipePair::new()?;
        // Everything that can fail happens before the fork; past it the
        // child exists and must end up owned by a handle
        let stdout_reader = PipeReader::new(stdout.read)?;
        let stderr_reader = PipeReader::new(stderr.read)?;

        // SAFETY: the child only calls async-signal-safe functions on memory
        // prepared before the fork, then execs or exits.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => unsafe {
                exec_child(
                    &image,
                    stdin.read.as_raw_fd(),
                    stdout.write.as_raw_fd(),
                    stderr.write.as_raw_fd(),
                )
            },
            Ok(ForkResult::Parent { child }) => {
                // Child ends close here; the parent keeps the other three
                drop(stdin.read);
                drop(stdout.write);
                drop(stderr.write);

                let pid = child.as_raw() as Pid;
                debug!(pid, binary = %executable.binary.display(), "Forked child");

                let stdio = ChildStdio {
                    stdin: Some(PipeWriter::new(stdin.write)),
                    stdout: stdout_reader,
                    stderr: stderr_reader,
                };
                Ok(Spawned {
                    pid,
                    stdio: Some(stdio),
                })
            }
            Err(errno) => {
                error!("fork() failed: {}", errno);
                Err(ProcessError::SpawnFailed(errno.desc().to_string()))
            }
        }
    }

    fn try_wait(&self, pid: Pid) -> ProcessResult<ChildStatus> {
        match waitpid(NixPid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => Ok(ChildStatus::Terminated(Termination::Exited(code))),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                Ok(ChildStatus::Terminated(Termination::Signaled(signal as i32)))
            }
            // StillAlive, or a stop/continue report
            Ok(_) => Ok(ChildStatus::Running),
            Err(Errno::EINTR) => Ok(ChildStatus::Running),
            Err(Errno::ECHILD) => Ok(ChildStatus::Gone),
            Err(errno) => Err(ProcessError::WaitFailed {
                pid,
                reason: errno.desc().to_string(),
            }),
        }
    }
}

/// Child side of the fork: wire stdio, then replace the program image
///
/// If anything fails the child exits with the OS error number as its
/// status, which is how exec failures surface to the parent.
unsafe fn exec_child(image: &ExecImage, stdin: RawFd, stdout: RawFd, stderr: RawFd) -> ! {
    for (fd, target) in [
        (stdin, libc::STDIN_FILENO),
        (stdout, libc::STDOUT_FILENO),
        (stderr, libc::STDERR_FILENO),
    ] {
        let wired = if fd == target {
            // dup2 onto itself keeps FD_CLOEXEC set, clear it instead
            libc::fcntl(fd, libc::F_SETFD, 0)
        } else {
            libc::dup2(fd, target)
        };
        if wired < 0 {
            libc::_exit(Errno::last() as i32);
        }
    }

    // The parent may ignore SIGPIPE; the new program starts with the default
    libc::signal(libc::SIGPIPE, libc::SIG_DFL);

    libc::execve(image.path_ptr(), image.argv_ptr(), image.envp_ptr());
    libc::_exit(Errno::last() as i32)
}
