/*!
 * Stdio Pipes
 * Parent-side pipe ends and chunked, best-effort transfer loops
 */

use crate::core::errors::{ProcessError, ProcessResult};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd::pipe2;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use tracing::{trace, warn};

/// Parent-side read end of a child's stdout or stderr (non-blocking)
#[derive(Debug)]
pub struct PipeReader(File);

/// Parent-side write end of a child's stdin
#[derive(Debug)]
pub struct PipeWriter(File);

impl PipeReader {
    /// Take ownership of a read end and make it non-blocking
    pub fn new(fd: OwnedFd) -> ProcessResult<Self> {
        let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags))?;
        Ok(Self(File::from(fd)))
    }

    /// Everything currently readable, in chunks of `chunk_size`
    pub fn read_available(&self, chunk_size: usize) -> Vec<u8> {
        read_chunked(&mut &self.0, chunk_size)
    }
}

impl PipeWriter {
    pub fn new(fd: OwnedFd) -> Self {
        Self(File::from(fd))
    }

    /// Write all of `bytes` in chunks of `chunk_size`, returning the count accepted
    pub fn write_all_chunked(&self, bytes: &[u8], chunk_size: usize) -> usize {
        write_chunked(&mut &self.0, bytes, chunk_size)
    }
}

impl AsRawFd for PipeReader {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl AsRawFd for PipeWriter {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

/// Both ends of one unidirectional pipe, close-on-exec
pub(crate) struct PipePair {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

impl PipePair {
    pub fn new() -> ProcessResult<Self> {
        let (read, write) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| ProcessError::PipeFailed(e.desc().to_string()))?;
        Ok(Self { read, write })
    }
}

/// Parent ends of the three standard streams of a child
#[derive(Debug)]
pub struct ChildStdio {
    pub stdin: Option<PipeWriter>,
    pub stdout: PipeReader,
    pub stderr: PipeReader,
}

/// Read until end-of-stream or until no bytes are currently available
///
/// Interrupted reads are retried; any other error ends the loop with what
/// was collected so far.
pub fn read_chunked<R: Read>(reader: &mut R, chunk_size: usize) -> Vec<u8> {
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut collected = Vec::new();

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => collected.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => {
                warn!("Pipe read stopped after {} bytes: {}", collected.len(), e);
                break;
            }
        }
    }

    trace!(bytes = collected.len(), chunk_size, "pipe read");
    collected
}

/// Write `bytes` in chunks of at most `chunk_size`, resuming after short writes
///
/// Returns the number of bytes the pipe accepted. A closed reader or any
/// other error stops the loop early; the caller gets a short count, not an
/// error.
pub fn write_chunked<W: Write>(writer: &mut W, bytes: &[u8], chunk_size: usize) -> usize {
    let chunk_size = chunk_size.max(1);
    let mut written = 0;

    while written < bytes.len() {
        let end = (written + chunk_size).min(bytes.len());
        match writer.write(&bytes[written..end]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Pipe write stopped after {} of {} bytes: {}", written, bytes.len(), e);
                break;
            }
        }
    }

    trace!(bytes = written, chunk_size, "pipe write");
    written
}
