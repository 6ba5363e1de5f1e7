/*!
 * Exit Watchers
 *
 * A watcher polls a child's status without blocking and records its
 * termination in the handle's exit cell. Two strategies:
 *
 * - **Dedicated**: one thread per handle, paced by [`Backoff`]
 * - **Shared**: one process-wide [`Reaper`] thread sweeping every
 *   registered child, parked while nothing is registered
 *
 * The reaper paces itself with `PollConfig::default()`; a handle's own
 * `PollConfig` only applies to dedicated watchers.
 *
 * Stopping a watcher only ends monitoring; the child is never signalled.
 */

use super::backend::{Backend, ChildStatus};
use super::exit::ExitCell;
use crate::core::config::{PollConfig, WatchStrategy};
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::sync::Backoff;
use crate::core::types::Pid;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::io;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Monitoring task bound to exactly one live handle
#[derive(Debug)]
pub(crate) enum Watcher {
    Dedicated {
        stop: Arc<AtomicBool>,
        thread: Option<JoinHandle<()>>,
    },
    Shared {
        pid: Pid,
        token: u64,
    },
}

impl Watcher {
    /// Start watching `pid`, settling `cell` when it terminates
    ///
    /// `poll` paces a dedicated watcher and is ignored by the shared reaper.
    pub fn start(
        pid: Pid,
        backend: Arc<dyn Backend>,
        cell: Arc<ExitCell>,
        strategy: WatchStrategy,
        poll: PollConfig,
    ) -> ProcessResult<Self> {
        match strategy {
            WatchStrategy::Dedicated => {
                let stop = Arc::new(AtomicBool::new(false));
                let thread_stop = stop.clone();
                let thread = thread::Builder::new()
                    .name(format!("proc-watch-{}", pid))
                    .spawn(move || watch_loop(pid, backend, cell, thread_stop, poll))
                    .map_err(|e| ProcessError::WatcherFailed {
                        pid,
                        reason: e.to_string(),
                    })?;
                Ok(Watcher::Dedicated {
                    stop,
                    thread: Some(thread),
                })
            }
            WatchStrategy::Shared => {
                let token = Reaper::global()?.register(pid, backend, cell);
                Ok(Watcher::Shared { pid, token })
            }
        }
    }

    /// Start watching an already-forked child, never losing it
    ///
    /// Falls back to the other strategy when `strategy` cannot start. If
    /// neither can, `cell` is detached and `None` returned; the handle still
    /// owns the pid and pipes.
    pub fn start_or_detach(
        pid: Pid,
        backend: Arc<dyn Backend>,
        cell: Arc<ExitCell>,
        strategy: WatchStrategy,
        poll: PollConfig,
    ) -> Option<Self> {
        start_with_fallback(pid, &cell, strategy, |strategy| {
            Watcher::start(pid, backend.clone(), cell.clone(), strategy, poll)
        })
    }

    /// Request stop and wait until the watcher no longer touches the child
    ///
    /// Idempotent.
    pub fn stop(&mut self) {
        match self {
            Watcher::Dedicated { stop, thread } => {
                stop.store(true, Ordering::Release);
                if let Some(handle) = thread.take() {
                    if handle.join().is_err() {
                        warn!("Watcher thread panicked");
                    }
                }
            }
            Watcher::Shared { pid, token } => {
                if let Some(reaper) = REAPER.get() {
                    reaper.deregister(*pid, *token);
                }
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn start_with_fallback(
    pid: Pid,
    cell: &ExitCell,
    strategy: WatchStrategy,
    mut start: impl FnMut(WatchStrategy) -> ProcessResult<Watcher>,
) -> Option<Watcher> {
    let first = match start(strategy) {
        Ok(watcher) => return Some(watcher),
        Err(e) => e,
    };

    let fallback = match strategy {
        WatchStrategy::Dedicated => WatchStrategy::Shared,
        WatchStrategy::Shared => WatchStrategy::Dedicated,
    };
    warn!(pid, ?strategy, ?fallback, "Watcher failed to start, falling back: {}", first);

    match start(fallback) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            error!(pid, "No watcher could be started, exit status will not be observed: {}", e);
            cell.detach();
            None
        }
    }
}

fn watch_loop(
    pid: Pid,
    backend: Arc<dyn Backend>,
    cell: Arc<ExitCell>,
    stop: Arc<AtomicBool>,
    poll: PollConfig,
) {
    let mut backoff = Backoff::new(poll);

    loop {
        if stop.load(Ordering::Acquire) {
            debug!(pid, "Watcher stopped before exit");
            cell.detach();
            return;
        }

        match backend.try_wait(pid) {
            Ok(ChildStatus::Running) => backoff.snooze(),
            Ok(ChildStatus::Terminated(termination)) => {
                info!(pid, %termination, "Process terminated");
                cell.settle(termination);
                return;
            }
            Ok(ChildStatus::Gone) => {
                debug!(pid, "Not a waitable child, watcher halting");
                cell.detach();
                return;
            }
            Err(e) => {
                warn!(pid, "Status query failed, watcher halting: {}", e);
                cell.detach();
                return;
            }
        }
    }
}

static REAPER: OnceLock<Reaper> = OnceLock::new();

/// How long an idle reaper parks before re-checking its registry
const REAPER_IDLE_PARK: Duration = Duration::from_millis(50);

struct ReapEntry {
    token: u64,
    backend: Arc<dyn Backend>,
    cell: Arc<ExitCell>,
}

/// Process-wide watcher multiplexing every child registered with it
pub(crate) struct Reaper {
    entries: DashMap<Pid, ReapEntry>,
    next_token: AtomicU64,
    /// Held for the duration of each sweep; deregistration waits on it
    sweep: Mutex<()>,
    /// Whether the sweeping thread is up; a failed start is retried
    running: Mutex<bool>,
    idle: Mutex<()>,
    wake: Condvar,
}

impl Reaper {
    /// The shared reaper, started on first use
    fn global() -> ProcessResult<&'static Reaper> {
        let reaper = REAPER.get_or_init(Reaper::new);
        reaper.ensure_running()?;
        Ok(reaper)
    }

    fn ensure_running(&'static self) -> ProcessResult<()> {
        self.ensure_running_with(|reaper| {
            thread::Builder::new()
                .name("proc-reaper".to_string())
                .spawn(move || reaper.run(PollConfig::default()))
                .map(drop)
        })
    }

    /// Start the sweeping thread with `start` unless it is already up
    fn ensure_running_with(
        &'static self,
        start: impl FnOnce(&'static Reaper) -> io::Result<()>,
    ) -> ProcessResult<()> {
        let mut running = self.running.lock();
        if *running {
            return Ok(());
        }

        start(self).map_err(|e| ProcessError::WatcherFailed {
            pid: 0,
            reason: e.to_string(),
        })?;
        *running = true;
        info!("Shared reaper started");
        Ok(())
    }

    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_token: AtomicU64::new(1),
            sweep: Mutex::new(()),
            running: Mutex::new(false),
            idle: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    fn register(&self, pid: Pid, backend: Arc<dyn Backend>, cell: Arc<ExitCell>) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            pid,
            ReapEntry {
                token,
                backend,
                cell,
            },
        );
        debug!(pid, token, "Registered with shared reaper");

        let _idle = self.idle.lock();
        self.wake.notify_one();
        token
    }

    /// Remove the registration and wait out any sweep that may still hold it
    fn deregister(&self, pid: Pid, token: u64) {
        if let Some((_, entry)) = self.entries.remove_if(&pid, |_, e| e.token == token) {
            drop(self.sweep.lock());
            entry.cell.detach();
            debug!(pid, token, "Deregistered from shared reaper");
        }
    }

    fn run(&self, poll: PollConfig) {
        let mut backoff = Backoff::new(poll);

        loop {
            if self.entries.is_empty() {
                let mut idle = self.idle.lock();
                if self.entries.is_empty() {
                    self.wake.wait_for(&mut idle, REAPER_IDLE_PARK);
                }
                backoff.reset();
                continue;
            }

            if self.sweep_once() {
                backoff.reset();
            } else {
                backoff.snooze();
            }
        }
    }

    /// Poll every registered child once; true if any left the registry
    fn sweep_once(&self) -> bool {
        let _sweep = self.sweep.lock();

        let snapshot: Vec<(Pid, u64, Arc<dyn Backend>, Arc<ExitCell>)> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.token, e.backend.clone(), e.cell.clone()))
            .collect();

        let mut progressed = false;
        for (pid, token, backend, cell) in snapshot {
            let finished = match backend.try_wait(pid) {
                Ok(ChildStatus::Running) => false,
                Ok(ChildStatus::Terminated(termination)) => {
                    info!(pid, %termination, "Process terminated");
                    cell.settle(termination);
                    true
                }
                Ok(ChildStatus::Gone) => {
                    debug!(pid, "Not a waitable child, dropping registration");
                    cell.detach();
                    true
                }
                Err(e) => {
                    warn!(pid, "Status query failed, dropping registration: {}", e);
                    cell.detach();
                    true
                }
            };

            if finished {
                self.entries.remove_if(&pid, |_, e| e.token == token);
                progressed = true;
            }
        }
        progressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ProcessState, Termination};
    use crate::process::backend::MockBackend;
    use std::sync::atomic::AtomicUsize;

    fn fast_poll() -> PollConfig {
        PollConfig {
            spin_iterations: 1,
            yield_iterations: 1,
            max_sleep: Duration::from_micros(200),
        }
    }

    /// Backend reporting `Running` for the first `polls` queries, then `status`
    fn scripted(polls: usize, status: ChildStatus) -> MockBackend {
        let count = AtomicUsize::new(0);
        let mut backend = MockBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_try_wait().returning(move |_| {
            if count.fetch_add(1, Ordering::SeqCst) < polls {
                Ok(ChildStatus::Running)
            } else {
                Ok(status)
            }
        });
        backend
    }

    #[test]
    fn test_dedicated_settles_after_polling() {
        let backend = Arc::new(scripted(5, ChildStatus::Terminated(Termination::Exited(3))));
        let cell = Arc::new(ExitCell::running());

        let _watcher = Watcher::start(
            4242,
            backend,
            cell.clone(),
            WatchStrategy::Dedicated,
            fast_poll(),
        )
        .unwrap();

        assert_eq!(
            cell.wait(),
            ProcessState::Terminated(Termination::Exited(3))
        );
    }

    #[test]
    fn test_dedicated_stop_detaches() {
        let backend = Arc::new(scripted(usize::MAX, ChildStatus::Gone));
        let cell = Arc::new(ExitCell::running());

        let mut watcher = Watcher::start(
            4243,
            backend,
            cell.clone(),
            WatchStrategy::Dedicated,
            fast_poll(),
        )
        .unwrap();
        watcher.stop();
        watcher.stop();

        assert_eq!(cell.state(), ProcessState::Detached);
    }

    #[test]
    fn test_query_error_detaches() {
        let mut backend = MockBackend::new();
        backend.expect_try_wait().returning(|pid| {
            Err(ProcessError::WaitFailed {
                pid,
                reason: "EINVAL".to_string(),
            })
        });
        let cell = Arc::new(ExitCell::running());

        let _watcher = Watcher::start(
            4244,
            Arc::new(backend),
            cell.clone(),
            WatchStrategy::Dedicated,
            fast_poll(),
        )
        .unwrap();

        assert_eq!(cell.wait(), ProcessState::Detached);
    }

    #[test]
    fn test_shared_reaper_settles() {
        // Pids far outside any real range so tests sharing the reaper never collide
        let backend = Arc::new(scripted(3, ChildStatus::Terminated(Termination::Signaled(15))));
        let cell = Arc::new(ExitCell::running());

        let _watcher = Watcher::start(
            u32::MAX - 1,
            backend,
            cell.clone(),
            WatchStrategy::Shared,
            fast_poll(),
        )
        .unwrap();

        assert_eq!(
            cell.wait(),
            ProcessState::Terminated(Termination::Signaled(15))
        );
    }

    #[test]
    fn test_shared_reaper_ignores_handle_poll() {
        // Dedicated pacing this slow would take days to reach the 50th poll
        let glacial = PollConfig {
            spin_iterations: 0,
            yield_iterations: 0,
            max_sleep: Duration::from_secs(3600),
        };
        let backend = Arc::new(scripted(50, ChildStatus::Terminated(Termination::Exited(0))));
        let cell = Arc::new(ExitCell::running());

        let _watcher = Watcher::start(
            u32::MAX - 3,
            backend,
            cell.clone(),
            WatchStrategy::Shared,
            glacial,
        )
        .unwrap();

        assert!(cell.wait_timeout(Duration::from_secs(10)).is_some());
    }

    #[test]
    fn test_reaper_start_failure_is_retried() {
        let reaper: &'static Reaper = Box::leak(Box::new(Reaper::new()));

        let failed = reaper.ensure_running_with(|_| {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"))
        });
        assert!(matches!(failed, Err(ProcessError::WatcherFailed { .. })));
        assert!(!*reaper.running.lock());

        reaper.ensure_running().unwrap();
        let mut restarted = false;
        reaper
            .ensure_running_with(|_| {
                restarted = true;
                Ok(())
            })
            .unwrap();
        assert!(!restarted);

        let cell = Arc::new(ExitCell::running());
        reaper.register(
            17,
            Arc::new(scripted(2, ChildStatus::Terminated(Termination::Exited(4)))),
            cell.clone(),
        );
        assert_eq!(
            cell.wait(),
            ProcessState::Terminated(Termination::Exited(4))
        );
    }

    #[test]
    fn test_fallback_strategy_used_when_first_fails() {
        let cell = ExitCell::running();
        let mut attempts = Vec::new();

        let watcher = start_with_fallback(4245, &cell, WatchStrategy::Dedicated, |strategy| {
            attempts.push(strategy);
            match strategy {
                WatchStrategy::Dedicated => Err(ProcessError::WatcherFailed {
                    pid: 4245,
                    reason: "thread limit reached".to_string(),
                }),
                WatchStrategy::Shared => Ok(Watcher::Shared {
                    pid: 4245,
                    token: 0,
                }),
            }
        });

        assert!(matches!(watcher, Some(Watcher::Shared { .. })));
        assert_eq!(attempts, [WatchStrategy::Dedicated, WatchStrategy::Shared]);
        assert_eq!(cell.state(), ProcessState::Running);
    }

    #[test]
    fn test_no_watcher_detaches_cell() {
        let cell = ExitCell::running();

        let watcher = start_with_fallback(4246, &cell, WatchStrategy::Shared, |_| {
            Err(ProcessError::WatcherFailed {
                pid: 4246,
                reason: "thread limit reached".to_string(),
            })
        });

        assert!(watcher.is_none());
        assert_eq!(cell.state(), ProcessState::Detached);
    }

    #[test]
    fn test_shared_deregister_detaches() {
        let backend = Arc::new(scripted(usize::MAX, ChildStatus::Gone));
        let cell = Arc::new(ExitCell::running());

        let mut watcher = Watcher::start(
            u32::MAX - 2,
            backend,
            cell.clone(),
            WatchStrategy::Shared,
            fast_poll(),
        )
        .unwrap();
        watcher.stop();

        assert_eq!(cell.state(), ProcessState::Detached);
    }
}
