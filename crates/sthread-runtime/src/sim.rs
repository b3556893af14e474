//! Simulated host event loop
//!
//! `SimHost` records callback registrations and cancellations instead of
//! touching real sockets or timers. Tests hold a clone of the handle,
//! inspect what the engine registered, and fire events back through
//! `PhaseEngine::event_fired` to drive suspended threads forward.

use std::cell::RefCell;
use std::rc::Rc;

use sthread_core::error::{CoreError, CoreResult};
use sthread_core::id::{ConnId, WaitId};
use sthread_core::traits::{EventKind, HostEvents};

/// One recorded callback registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Connection the callback belongs to
    pub conn: ConnId,
    /// Wait id to hand back when the event fires
    pub wait: WaitId,
    /// What was registered
    pub event: EventKind,
}

#[derive(Default)]
struct SimState {
    registered: Vec<Registration>,
    cancelled: Vec<(ConnId, WaitId)>,
    fail_register: bool,
}

/// Recording host; clones share state
#[derive(Clone, Default)]
pub struct SimHost {
    inner: Rc<RefCell<SimState>>,
}

impl SimHost {
    /// Create an empty recording host
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently registered (not yet cancelled) callbacks
    pub fn registrations(&self) -> Vec<Registration> {
        self.inner.borrow().registered.clone()
    }

    /// Every cancellation seen, in order
    pub fn cancellations(&self) -> Vec<(ConnId, WaitId)> {
        self.inner.borrow().cancelled.clone()
    }

    /// The oldest pending registration for a connection, if any
    pub fn first_pending(&self, conn: ConnId) -> Option<Registration> {
        self.inner
            .borrow()
            .registered
            .iter()
            .find(|r| r.conn == conn)
            .cloned()
    }

    /// Drop a registration from the pending set, as a fired event would
    pub fn consume(&self, wait: WaitId) {
        self.inner.borrow_mut().registered.retain(|r| r.wait != wait);
    }

    /// Make subsequent `register` calls fail
    pub fn fail_register(&self, fail: bool) {
        self.inner.borrow_mut().fail_register = fail;
    }
}

impl HostEvents for SimHost {
    fn register(&mut self, conn: ConnId, wait: WaitId, event: EventKind) -> CoreResult<()> {
        let mut state = self.inner.borrow_mut();
        if state.fail_register {
            return Err(CoreError::HostError(-1));
        }
        state.registered.push(Registration { conn, wait, event });
        Ok(())
    }

    fn cancel(&mut self, conn: ConnId, wait: WaitId, _event: &EventKind) {
        let mut state = self.inner.borrow_mut();
        // Cancelling an unknown wait is a legal no-op; still record it.
        state.registered.retain(|r| r.wait != wait);
        state.cancelled.push((conn, wait));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_register_and_cancel() {
        let host = SimHost::new();
        let mut h = host.clone();
        let conn = ConnId::new(1);

        h.register(conn, WaitId::new(1), EventKind::Abort).unwrap();
        h.register(conn, WaitId::new(2), EventKind::Timer(Duration::from_millis(5)))
            .unwrap();
        assert_eq!(host.registrations().len(), 2);

        h.cancel(conn, WaitId::new(1), &EventKind::Abort);
        assert_eq!(host.registrations().len(), 1);
        assert_eq!(host.cancellations(), vec![(conn, WaitId::new(1))]);

        // Cancel of an unknown wait stays a no-op
        h.cancel(conn, WaitId::new(9), &EventKind::Abort);
        assert_eq!(host.registrations().len(), 1);
    }

    #[test]
    fn test_fail_register() {
        let host = SimHost::new();
        let mut h = host.clone();
        host.fail_register(true);
        assert!(h
            .register(ConnId::new(1), WaitId::new(1), EventKind::Abort)
            .is_err());
        assert!(host.registrations().is_empty());
    }
}
