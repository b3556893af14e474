//! Per-connection counting semaphores
//!
//! Semaphore waits are a suspension kind that never reaches the host:
//! `post` either hands the permit to the oldest waiter (woken through the
//! ready queue) or banks it in the counter. Waiters are delivered strictly
//! FIFO.

use std::collections::VecDeque;

use sthread_core::id::ThreadId;

/// State of one counting semaphore
#[derive(Debug, Default)]
pub struct SemState {
    count: u32,
    waiters: VecDeque<ThreadId>,
}

impl SemState {
    /// Create a semaphore with an initial permit count
    pub fn new(initial: u32) -> Self {
        Self {
            count: initial,
            waiters: VecDeque::new(),
        }
    }

    /// Take a permit without waiting; false if none are banked
    pub fn try_acquire(&mut self) -> bool {
        if self.count > 0 {
            self.count -= 1;
            true
        } else {
            false
        }
    }

    /// Enqueue a thread at the tail of the waiter list
    pub fn add_waiter(&mut self, thread: ThreadId) {
        self.waiters.push_back(thread);
    }

    /// Post one permit
    ///
    /// Returns the oldest waiter to wake, or `None` if the permit was
    /// banked in the counter.
    pub fn post(&mut self) -> Option<ThreadId> {
        match self.waiters.pop_front() {
            Some(waiter) => Some(waiter),
            None => {
                self.count += 1;
                None
            }
        }
    }

    /// Drop a thread from the waiter list (cancelled wait)
    ///
    /// No-op if the thread is not waiting.
    pub fn remove_waiter(&mut self, thread: ThreadId) {
        self.waiters.retain(|t| *t != thread);
    }

    /// Banked permit count
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Number of blocked threads
    #[inline]
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_acquire_counts() {
        let mut sem = SemState::new(2);
        assert!(sem.try_acquire());
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_post_banks_without_waiters() {
        let mut sem = SemState::new(0);
        assert_eq!(sem.post(), None);
        assert_eq!(sem.count(), 1);
        assert!(sem.try_acquire());
    }

    #[test]
    fn test_fifo_wake_order() {
        let mut sem = SemState::new(0);
        sem.add_waiter(ThreadId::new(1));
        sem.add_waiter(ThreadId::new(2));
        sem.add_waiter(ThreadId::new(3));

        assert_eq!(sem.post(), Some(ThreadId::new(1)));
        assert_eq!(sem.post(), Some(ThreadId::new(2)));
        assert_eq!(sem.post(), Some(ThreadId::new(3)));
        // No waiters left: permit banks
        assert_eq!(sem.post(), None);
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn test_remove_waiter() {
        let mut sem = SemState::new(0);
        sem.add_waiter(ThreadId::new(1));
        sem.add_waiter(ThreadId::new(2));

        sem.remove_waiter(ThreadId::new(1));
        sem.remove_waiter(ThreadId::new(9)); // no-op

        assert_eq!(sem.waiter_count(), 1);
        assert_eq!(sem.post(), Some(ThreadId::new(2)));
    }
}
