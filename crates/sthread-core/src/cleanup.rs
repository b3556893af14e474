//! Scoped-resource cleanup chain
//!
//! Each connection context carries one cleanup chain. A record is pushed
//! whenever a resource is acquired that must be released deterministically
//! (thread references, cosocket handles, semaphore waiters) and removed
//! early when the resource is released before teardown. On finalize the
//! chain runs every remaining record exactly once, in reverse registration
//! order.

use core::fmt;

/// Why the cleanup chain is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    /// Ordinary connection teardown
    Teardown,
    /// Client aborted the connection
    Abort,
}

/// Handle for early removal of a cleanup record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupHandle(usize);

struct CleanupRecord {
    label: &'static str,
    handler: Box<dyn FnOnce(CleanupReason)>,
}

/// Ordered list of scoped-resource release handlers
///
/// Records run in reverse-of-registration order exactly once, exactly on
/// connection teardown or abort. Slots are kept stable so handles stay
/// valid after unrelated removals.
#[derive(Default)]
pub struct CleanupChain {
    records: Vec<Option<CleanupRecord>>,
    ran: bool,
}

impl CleanupChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            ran: false,
        }
    }

    /// Push a cleanup record; returns a handle for early removal
    ///
    /// Pushing after the chain has run is rejected: teardown already
    /// happened and the record would never fire.
    pub fn push<F>(&mut self, label: &'static str, handler: F) -> Option<CleanupHandle>
    where
        F: FnOnce(CleanupReason) + 'static,
    {
        if self.ran {
            return None;
        }
        let idx = self.records.len();
        self.records.push(Some(CleanupRecord {
            label,
            handler: Box::new(handler),
        }));
        Some(CleanupHandle(idx))
    }

    /// Remove a record without running it (resource released early)
    ///
    /// Removing an already-removed or already-run record is a no-op.
    pub fn remove(&mut self, handle: CleanupHandle) -> bool {
        match self.records.get_mut(handle.0) {
            Some(slot) => slot.take().is_some(),
            None => false,
        }
    }

    /// Run all remaining records in reverse registration order
    ///
    /// Subsequent calls are no-ops; each handler fires at most once.
    pub fn run(&mut self, reason: CleanupReason) {
        if self.ran {
            return;
        }
        self.ran = true;
        while let Some(slot) = self.records.pop() {
            if let Some(record) = slot {
                (record.handler)(reason);
            }
        }
    }

    /// Check whether the chain has already run
    #[inline]
    pub fn has_run(&self) -> bool {
        self.ran
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }

    /// Check if no live records remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CleanupChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self
            .records
            .iter()
            .filter_map(|r| r.as_ref().map(|rec| rec.label))
            .collect();
        f.debug_struct("CleanupChain")
            .field("records", &labels)
            .field("ran", &self.ran)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_reverse_order_exactly_once() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut chain = CleanupChain::new();

        for i in 0..3 {
            let order = Rc::clone(&order);
            chain.push("rec", move |_| order.borrow_mut().push(i));
        }

        chain.run(CleanupReason::Teardown);
        assert_eq!(*order.borrow(), vec![2, 1, 0]);

        // Second run is a no-op
        chain.run(CleanupReason::Teardown);
        assert_eq!(order.borrow().len(), 3);
    }

    #[test]
    fn test_remove_skips_handler() {
        let fired = Rc::new(RefCell::new(false));
        let mut chain = CleanupChain::new();

        let f = Rc::clone(&fired);
        let handle = chain.push("sock", move |_| *f.borrow_mut() = true).unwrap();

        assert!(chain.remove(handle));
        assert!(!chain.remove(handle)); // idempotent

        chain.run(CleanupReason::Teardown);
        assert!(!*fired.borrow());
    }

    #[test]
    fn test_push_after_run_rejected() {
        let mut chain = CleanupChain::new();
        chain.run(CleanupReason::Abort);
        assert!(chain.has_run());
        assert!(chain.push("late", |_| {}).is_none());
    }

    #[test]
    fn test_reason_delivery() {
        let seen = Rc::new(RefCell::new(None));
        let mut chain = CleanupChain::new();

        let s = Rc::clone(&seen);
        chain.push("rec", move |r| *s.borrow_mut() = Some(r));

        chain.run(CleanupReason::Abort);
        assert_eq!(*seen.borrow(), Some(CleanupReason::Abort));
    }

    #[test]
    fn test_len() {
        let mut chain = CleanupChain::new();
        assert!(chain.is_empty());
        let h = chain.push("a", |_| {}).unwrap();
        chain.push("b", |_| {}).unwrap();
        assert_eq!(chain.len(), 2);
        chain.remove(h);
        assert_eq!(chain.len(), 1);
    }
}
