//! Counting barrier for plan-change acknowledgement.
//!
//! The one cross-thread synchronization point in the core: the manager
//! blocks until every node has reacted to a plan change. Everything else
//! (heaps, maps, propagator caches) runs on a single logical thread.

use std::sync::{Condvar, Mutex};

use tracing::debug;

/// Counting barrier on a mutex + condition variable.
///
/// `expect(n)` arms the count, `notify()` decrements it (a no-op at zero),
/// and `wait()` blocks until it reaches zero. [`wait_for_zero`] combines
/// arm-and-wait for callers whose notifiers only start working after the
/// wait begins. There is no timeout: a notifier that never calls `notify()`
/// stalls the waiter indefinitely.
#[derive(Debug, Default)]
pub struct CountdownBarrier {
    count: Mutex<u32>,
    zero: Condvar,
}

impl CountdownBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of outstanding acknowledgements.
    pub fn expect(&self, n: u32) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count = n;
    }

    /// Decrement the count, waking the waiter at zero. Calls beyond the
    /// armed count are ignored; the count never goes negative.
    pub fn notify(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    /// Block until the armed count reaches zero. The predicate is
    /// re-checked in a loop, so spurious wakeups are harmless.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count > 0 {
            count = self
                .zero
                .wait(count)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Arm the count to `n` and block until `n` notify calls drain it.
    pub fn wait_for_zero(&self, n: u32) {
        debug!("barrier waiting for {} acknowledgements", n);
        self.expect(n);
        self.wait();
    }

    /// Outstanding acknowledgements right now.
    pub fn pending(&self) -> u32 {
        *self.count.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_returns_after_exactly_n_notifies() {
        let barrier = Arc::new(CountdownBarrier::new());
        let mut handles = Vec::new();
        for i in 0..3u64 {
            let b = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                thread::sleep(Duration::from_millis(10 * (i + 1)));
                b.notify();
            }));
        }
        barrier.wait_for_zero(3);
        assert_eq!(barrier.pending(), 0);
        for h in handles {
            h.join().expect("notifier panicked");
        }
    }

    #[test]
    fn notify_at_zero_is_a_no_op() {
        let barrier = CountdownBarrier::new();
        barrier.notify();
        barrier.notify();
        assert_eq!(barrier.pending(), 0);
        // a fresh arm still behaves normally afterwards
        barrier.expect(1);
        barrier.notify();
        barrier.wait();
    }

    #[test]
    fn armed_count_visible_before_wait() {
        let barrier = CountdownBarrier::new();
        barrier.expect(2);
        assert_eq!(barrier.pending(), 2);
        barrier.notify();
        assert_eq!(barrier.pending(), 1);
        barrier.notify();
        barrier.wait(); // already zero: returns immediately
    }

    #[test]
    fn wait_for_zero_of_zero_does_not_block() {
        let barrier = CountdownBarrier::new();
        barrier.wait_for_zero(0);
    }
}
