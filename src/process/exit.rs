/*!
 * Exit Cell
 * Write-once termination record shared by a handle, its watcher and waiters
 */

use crate::core::types::{ProcessState, Termination};
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Single-writer, write-once, many-reader exit record
///
/// Leaves `Running` at most once; `Terminated` is never overwritten.
#[derive(Debug)]
pub(crate) struct ExitCell {
    state: Mutex<ProcessState>,
    settled: Condvar,
}

impl ExitCell {
    /// Cell for a child that is being watched
    pub fn running() -> Self {
        Self::with_state(ProcessState::Running)
    }

    /// Cell that nothing will ever settle (self, sentinel handles)
    pub fn detached() -> Self {
        Self::with_state(ProcessState::Detached)
    }

    pub fn with_state(state: ProcessState) -> Self {
        Self {
            state: Mutex::new(state),
            settled: Condvar::new(),
        }
    }

    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    /// Record the termination; returns false if the cell had already left `Running`
    pub fn settle(&self, termination: Termination) -> bool {
        self.transition(ProcessState::Terminated(termination))
    }

    /// Stop monitoring without a termination record
    pub fn detach(&self) -> bool {
        self.transition(ProcessState::Detached)
    }

    fn transition(&self, next: ProcessState) -> bool {
        let mut state = self.state.lock();
        if *state != ProcessState::Running {
            return false;
        }
        *state = next;
        self.settled.notify_all();
        true
    }

    /// Block until the cell leaves `Running`
    pub fn wait(&self) -> ProcessState {
        let mut state = self.state.lock();
        while !state.is_settled() {
            self.settled.wait(&mut state);
        }
        *state
    }

    /// Like [`wait`](Self::wait) with an upper bound; `None` on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ProcessState> {
        let mut state = self.state.lock();
        if !state.is_settled() {
            self.settled
                .wait_while_for(&mut state, |s| !s.is_settled(), timeout);
        }
        state.is_settled().then_some(*state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_once() {
        let cell = ExitCell::running();
        assert!(cell.settle(Termination::Exited(2)));
        assert!(!cell.settle(Termination::Exited(3)));
        assert!(!cell.detach());
        assert_eq!(cell.state(), ProcessState::Terminated(Termination::Exited(2)));
    }

    #[test]
    fn test_detached_never_settles() {
        let cell = ExitCell::detached();
        assert!(!cell.settle(Termination::Exited(0)));
        assert_eq!(cell.wait(), ProcessState::Detached);
    }

    #[test]
    fn test_waiters_all_observe_settlement() {
        let cell = Arc::new(ExitCell::running());

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                thread::spawn(move || cell.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        cell.settle(Termination::Exited(7));

        for waiter in waiters {
            assert_eq!(
                waiter.join().unwrap(),
                ProcessState::Terminated(Termination::Exited(7))
            );
        }
    }

    #[test]
    fn test_wait_timeout() {
        let cell = ExitCell::running();
        assert_eq!(cell.wait_timeout(Duration::from_millis(10)), None);

        cell.settle(Termination::Signaled(9));
        assert_eq!(
            cell.wait_timeout(Duration::from_millis(10)),
            Some(ProcessState::Terminated(Termination::Signaled(9)))
        );
    }
}
