//! Completion Rendezvous - one-shot bridge from a callback to a blocking call
//!
//! The underlying secure-transport service completes every operation with a
//! callback on its execution queue, while the consuming framework expects
//! calls that return only once the operation has genuinely finished. A
//! rendezvous pair connects the two: the calling thread parks on the
//! [`Waiter`] while the queue-side [`Completer`] captures the result and
//! wakes it.
//!
//! One pair serves exactly one asynchronous operation. A fresh pair must be
//! constructed per operation; a pair is never reused across two logically
//! distinct completions. The first `complete` wins, later ones are ignored,
//! and `wait` consumes the waiter so the result can be read out only once.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Create a connected waiter/completer pair.
pub fn pair<T>() -> (Waiter<T>, Completer<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending),
        cond: Condvar::new(),
    });
    (
        Waiter {
            shared: Arc::clone(&shared),
        },
        Completer { shared },
    )
}

enum Slot<T> {
    Pending,
    Signaled(T),
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

/// Blocking half of the rendezvous, held by the calling thread.
pub struct Waiter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Waiter<T> {
    /// Block until the completion fires, then read out the captured result.
    ///
    /// The wait is unbounded: the underlying service is responsible for
    /// eventually delivering a terminal notification for every started
    /// operation.
    pub fn wait(self) -> T {
        let mut slot = self.shared.slot.lock();
        loop {
            match std::mem::replace(&mut *slot, Slot::Pending) {
                Slot::Signaled(value) => return value,
                Slot::Pending => self.shared.cond.wait(&mut slot),
            }
        }
    }
}

/// Signaling half of the rendezvous, captured by a queue-side callback.
pub struct Completer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Completer<T> {
    /// Capture the result and wake the waiter.
    ///
    /// Only the first call signals; returns false when the rendezvous was
    /// already completed. A state-change observer that keeps firing after
    /// the terminal notification therefore cannot re-signal a stale pair.
    pub fn complete(&self, value: T) -> bool {
        let mut slot = self.shared.slot.lock();
        match *slot {
            Slot::Pending => {
                *slot = Slot::Signaled(value);
                self.shared.cond.notify_one();
                true
            }
            Slot::Signaled(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_result_crosses_threads() {
        let (waiter, completer) = pair::<u32>();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            completer.complete(42);
        });

        assert_eq!(waiter.wait(), 42);
    }

    #[test]
    fn test_first_signal_wins() {
        let (waiter, completer) = pair::<&str>();

        assert!(completer.complete("first"));
        assert!(!completer.complete("second"));

        assert_eq!(waiter.wait(), "first");
    }

    #[test]
    fn test_signal_before_wait() {
        let (waiter, completer) = pair::<()>();
        completer.complete(());
        waiter.wait();
    }

    #[test]
    fn test_cloned_completers_share_one_shot() {
        let (waiter, completer) = pair::<u8>();
        let other = completer.clone();

        assert!(completer.complete(1));
        assert!(!other.complete(2));
        assert_eq!(waiter.wait(), 1);
    }
}
