//! Cooperative cancellation for phase collection loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// How long a collection loop waits for a completion before re-checking
/// the cancellation flag.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared cancellation flag.
///
/// Cancelling never interrupts a running task. It only stops the
/// orchestrator from collecting further completions and from starting the
/// next phase.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Result of waiting for the next task completion of a phase.
pub(crate) enum Completion<T> {
    Done(T),
    Cancelled,
    /// Every sender is gone.
    Closed,
}

/// Wait for whichever task of the phase finishes next, checking `cancel`
/// before every wait.
pub(crate) fn next_completion<T>(rx: &Receiver<T>, cancel: &CancellationToken) -> Completion<T> {
    loop {
        if cancel.is_cancelled() {
            return Completion::Cancelled;
        }
        match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(value) => return Completion::Done(value),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Completion::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_token_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_next_completion_delivers_values() {
        let (tx, rx) = mpsc::channel();
        tx.send(5).unwrap();
        drop(tx);
        let cancel = CancellationToken::new();
        assert!(matches!(next_completion(&rx, &cancel), Completion::Done(5)));
        assert!(matches!(next_completion(&rx, &cancel), Completion::Closed));
    }

    #[test]
    fn test_next_completion_observes_cancellation_first() {
        let (tx, rx) = mpsc::channel();
        tx.send(1).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(next_completion(&rx, &cancel), Completion::Cancelled));
    }

    #[test]
    fn test_next_completion_wakes_on_late_cancel() {
        let (_tx, rx) = mpsc::channel::<u32>();
        let cancel = CancellationToken::new();
        let remote = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        assert!(matches!(next_completion(&rx, &cancel), Completion::Cancelled));
        handle.join().unwrap();
    }
}
