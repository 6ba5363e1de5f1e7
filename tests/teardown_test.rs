/*!
 * Teardown Tests
 * Dropping handles of running children releases descriptors and threads
 *
 * Kept in its own test binary: the counts below are process-wide and
 * would race with other tests spawning children.
 */

use pretty_assertions::assert_eq;
use proc_handle::{Executable, Process, ProcessState, WatchStrategy};
use std::fs;
use std::thread;
use std::time::{Duration, Instant};

const ECHO: &str = env!("CARGO_BIN_EXE_stdio-echo");
const CHILDREN: usize = 20;

fn open_fds() -> usize {
    fs::read_dir("/proc/self/fd").unwrap().count()
}

fn live_threads() -> usize {
    fs::read_dir("/proc/self/task").unwrap().count()
}

/// Poll `count` until it is back to at most `baseline`; exited threads can
/// linger in /proc for a moment after being joined
fn settles_to(baseline: usize, count: fn() -> usize) -> usize {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let now = count();
        if now <= baseline || Instant::now() > deadline {
            return now;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn spawn_running(watch: WatchStrategy) -> Process {
    let process = Process::builder()
        .with_watch(watch)
        .spawn(&Executable::new(ECHO).arg("drain"))
        .unwrap();
    assert_eq!(process.state(), ProcessState::Running);
    process
}

#[test]
fn test_drop_running_children_releases_resources() {
    // The shared reaper thread lives for the rest of the process; start it
    // before taking the baseline
    drop(spawn_running(WatchStrategy::Shared));

    for watch in [WatchStrategy::Dedicated, WatchStrategy::Shared] {
        let fds_before = open_fds();
        let threads_before = live_threads();

        let processes: Vec<_> = (0..CHILDREN).map(|_| spawn_running(watch)).collect();
        assert!(open_fds() >= fds_before + 3 * CHILDREN);
        drop(processes);

        assert_eq!(settles_to(fds_before, open_fds), fds_before, "{:?} fds", watch);
        assert_eq!(
            settles_to(threads_before, live_threads),
            threads_before,
            "{:?} threads",
            watch
        );
    }
}
