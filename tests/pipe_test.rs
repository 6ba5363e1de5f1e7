/*!
 * Stdio Pipe Tests
 * Chunk-size independence of stdin/stdout/stderr exchange
 */

use pretty_assertions::assert_eq;
use proc_handle::process::{read_chunked, write_chunked};
use proc_handle::{Executable, Process, ProcessConfig};
use proptest::prelude::*;
use std::io::{self, Read, Write};

const ECHO: &str = env!("CARGO_BIN_EXE_stdio-echo");
const CHUNK_SIZES: [usize; 5] = [2, 3, 4, 1024, 8192];

fn spawn_with_chunks(arg: &str, chunk_size: usize) -> Process {
    Process::builder()
        .with_config(ProcessConfig::new().with_chunk_size(chunk_size))
        .spawn(&Executable::new(ECHO).arg(arg))
        .unwrap()
}

#[test]
fn test_stdin_round_trip_any_chunk_size() {
    for chunk_size in CHUNK_SIZES {
        let process = spawn_with_chunks("64", chunk_size);
        assert_eq!(process.stdin("333\r\n"), 5);

        assert_eq!(process.wait().exit_code(), Some(64), "chunk size {}", chunk_size);
        assert_eq!(process.stdout(), "333", "chunk size {}", chunk_size);
        assert_eq!(process.stderr(), "333333", "chunk size {}", chunk_size);
    }
}

#[test]
fn test_stdin_default_chunk_size() {
    let process = Process::create(&Executable::new(ECHO).arg("64")).unwrap();
    process.stdin("64\r\n");
    assert_eq!(process.wait().exit_code(), Some(64));
    assert_eq!(process.stdout(), "64");
    assert_eq!(process.stderr(), "6464");
}

#[test]
fn test_stdout_any_chunk_size() {
    for chunk_size in CHUNK_SIZES {
        let process = spawn_with_chunks("255", chunk_size);
        assert_eq!(process.wait().exit_code(), Some(255));
        assert_eq!(process.stdout(), "255", "chunk size {}", chunk_size);
    }
}

#[test]
fn test_large_payload_through_drain() {
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();

    for chunk_size in [3, 8192] {
        let mut process = spawn_with_chunks("drain", chunk_size);
        assert_eq!(process.stdin(&payload), payload.len());
        process.close_stdin();

        let mut collected = Vec::new();
        while !process.wait_timeout(std::time::Duration::from_millis(5)) {
            collected.extend(process.stdout_bytes());
        }
        collected.extend(process.stdout_bytes());

        assert_eq!(process.exit_code(), Some(0));
        assert_eq!(collected, payload, "chunk size {}", chunk_size);
    }
}

#[test]
fn test_write_after_exit_is_best_effort() {
    let process = spawn_with_chunks("0", 4);
    process.wait();
    // Reader is gone: no panic, no error, nothing accepted
    assert_eq!(process.stdin("late input"), 0);
    assert_eq!(process.stdout(), "0");
}

/// Accepts a varying number of bytes per call, never more than `max`
struct JitteryWriter {
    max: usize,
    turn: usize,
    out: Vec<u8>,
}

impl Write for JitteryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.turn += 1;
        if self.turn % 3 == 0 {
            return Err(io::ErrorKind::Interrupted.into());
        }
        let n = buf.len().min(1 + self.turn % self.max);
        self.out.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out at most `max` bytes per read
struct TrickleReader<'a> {
    data: &'a [u8],
    max: usize,
}

impl Read for TrickleReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.max).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

proptest! {
    #[test]
    fn prop_write_chunked_is_chunk_size_independent(
        data in proptest::collection::vec(any::<u8>(), 0..512),
        chunk_size in 1usize..64,
        max in 1usize..16,
    ) {
        let mut writer = JitteryWriter { max, turn: 0, out: Vec::new() };
        let written = write_chunked(&mut writer, &data, chunk_size);
        prop_assert_eq!(written, data.len());
        prop_assert_eq!(writer.out, data);
    }

    #[test]
    fn prop_read_chunked_is_chunk_size_independent(
        data in proptest::collection::vec(any::<u8>(), 0..512),
        chunk_size in 1usize..64,
        max in 1usize..16,
    ) {
        let mut reader = TrickleReader { data: &data, max };
        prop_assert_eq!(read_chunked(&mut reader, chunk_size), data);
    }
}
