/*!
 * procwait - run a program through a process handle
 *
 * Usage: procwait [--shared] <binary> [args...]
 *
 * Forwards this program's stdin to the child, waits for it, relays its
 * stdout/stderr and exits with its status. The child inherits the current
 * environment. Pipe chunk sizes and the watch strategy also honour the
 * PROC_HANDLE_* environment variables.
 */

use anyhow::{bail, Context, Result};
use proc_handle::{init_tracing, Executable, Process, ProcessConfig, Termination, WatchStrategy};
use std::io::{Read, Write};
use std::process::ExitCode;
use tracing::info;

fn main() -> Result<ExitCode> {
    init_tracing();

    let mut args = std::env::args().skip(1).peekable();
    let mut config = ProcessConfig::from_env();
    if args.peek().map(String::as_str) == Some("--shared") {
        config = config.with_watch(WatchStrategy::Shared);
        args.next();
    }

    let Some(binary) = args.next() else {
        bail!("usage: procwait [--shared] <binary> [args...]");
    };
    let executable = Executable::new(binary).args(args).inherit_env();

    let mut process = Process::builder()
        .with_config(config)
        .spawn(&executable)
        .with_context(|| format!("failed to spawn {}", executable.binary.display()))?;
    info!(pid = process.pid(), "Child started");

    let mut input = Vec::new();
    std::io::stdin()
        .read_to_end(&mut input)
        .context("failed to read stdin")?;
    process.stdin(&input);
    process.close_stdin();

    // Drain while waiting so a chatty child never blocks on a full pipe
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    while !process.wait_timeout(std::time::Duration::from_millis(10)) {
        stdout.write_all(&process.stdout_bytes())?;
        stderr.write_all(&process.stderr_bytes())?;
    }
    stdout.write_all(&process.stdout_bytes())?;
    stderr.write_all(&process.stderr_bytes())?;
    stdout.flush()?;

    let termination = process.termination();
    info!(pid = process.pid(), ?termination, "Child finished");
    let code = match termination {
        Some(Termination::Exited(code)) => code,
        Some(Termination::Signaled(signo)) => 128 + signo,
        None => bail!("lost track of child {}", process.pid()),
    };
    Ok(ExitCode::from(code.clamp(0, 255) as u8))
}
