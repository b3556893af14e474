//! Suspension registry
//!
//! Bookkeeping of pending external waits tied to script threads. Socket,
//! timer and abort waits mirror one callback registration with the host;
//! semaphore and child-join waits resolve inside the engine and never
//! reach the host.
//!
//! Cancellation is idempotent throughout: removing a wait that already
//! fired or was never registered is a no-op, never an error. Racing
//! teardown depends on this.

use std::collections::HashMap;
use std::time::Duration;

use sthread_core::error::{CoreError, CoreResult};
use sthread_core::id::{SemId, SocketHandle, ThreadId, WaitId};
use sthread_core::script::{WaitFor, WakeEvent};
use sthread_core::traits::EventKind;

/// The kind of event one registry entry waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitKind {
    /// Socket readability (host-registered)
    SocketRead(SocketHandle),
    /// Socket writability (host-registered)
    SocketWrite(SocketHandle),
    /// Sleep / timeout (host-registered)
    Timer(Duration),
    /// Semaphore acquire (engine-internal)
    Semaphore(SemId),
    /// Child thread join (engine-internal)
    ChildJoin(ThreadId),
    /// Client abort notification (host-registered)
    AbortWait,
}

impl WaitKind {
    /// The host event this wait mirrors, if any
    ///
    /// Semaphore and child-join waits are internal and return `None`.
    pub fn external_event(&self) -> Option<EventKind> {
        match self {
            WaitKind::SocketRead(h) => Some(EventKind::Readable(*h)),
            WaitKind::SocketWrite(h) => Some(EventKind::Writable(*h)),
            WaitKind::Timer(d) => Some(EventKind::Timer(*d)),
            WaitKind::AbortWait => Some(EventKind::Abort),
            WaitKind::Semaphore(_) | WaitKind::ChildJoin(_) => None,
        }
    }

    /// The wake event delivered to the thread when this wait resolves
    ///
    /// Child-join and abort waits carry their own resume inputs and
    /// return `None` here.
    pub fn wake_event(&self) -> Option<WakeEvent> {
        match self {
            WaitKind::SocketRead(_) => Some(WakeEvent::Readable),
            WaitKind::SocketWrite(_) => Some(WakeEvent::Writable),
            WaitKind::Timer(_) => Some(WakeEvent::TimerExpired),
            WaitKind::Semaphore(_) => Some(WakeEvent::SemAcquired),
            WaitKind::ChildJoin(_) | WaitKind::AbortWait => None,
        }
    }
}

impl From<&WaitFor> for WaitKind {
    fn from(w: &WaitFor) -> Self {
        match w {
            WaitFor::SocketReadable(h) => WaitKind::SocketRead(*h),
            WaitFor::SocketWritable(h) => WaitKind::SocketWrite(*h),
            WaitFor::Timer(d) => WaitKind::Timer(*d),
            WaitFor::Semaphore(id) => WaitKind::Semaphore(*id),
            WaitFor::Join(id) => WaitKind::ChildJoin(*id),
            WaitFor::Abort => WaitKind::AbortWait,
        }
    }
}

/// One pending wait: the blocked thread and what it waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWait {
    /// The waiting script thread
    pub thread: ThreadId,
    /// What it waits for
    pub kind: WaitKind,
}

/// Set of pending waits for one connection
#[derive(Debug, Default)]
pub struct SuspensionRegistry {
    entries: HashMap<WaitId, PendingWait>,
    max: usize,
}

impl SuspensionRegistry {
    /// Create a registry with the given capacity bound
    pub fn new(max: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max,
        }
    }

    /// Insert a pending wait under the given id
    pub fn insert(&mut self, wait: WaitId, thread: ThreadId, kind: WaitKind) -> CoreResult<()> {
        if self.entries.len() >= self.max {
            return Err(CoreError::TooManyWaits);
        }
        self.entries.insert(wait, PendingWait { thread, kind });
        Ok(())
    }

    /// Remove and return a pending wait; `None` if it already resolved
    pub fn remove(&mut self, wait: WaitId) -> Option<PendingWait> {
        self.entries.remove(&wait)
    }

    /// Look up a pending wait without removing it
    pub fn get(&self, wait: WaitId) -> Option<&PendingWait> {
        self.entries.get(&wait)
    }

    /// Remove the wait belonging to a thread, if any
    pub fn remove_for_thread(&mut self, thread: ThreadId) -> Option<(WaitId, PendingWait)> {
        let id = self
            .entries
            .iter()
            .find(|(_, w)| w.thread == thread)
            .map(|(id, _)| *id)?;
        self.entries.remove(&id).map(|w| (id, w))
    }

    /// Remove the wait of a thread blocked joining `child`, if any
    ///
    /// Returns the wait id and the joining thread.
    pub fn remove_join_of(&mut self, child: ThreadId) -> Option<(WaitId, ThreadId)> {
        let id = self
            .entries
            .iter()
            .find(|(_, w)| w.kind == WaitKind::ChildJoin(child))
            .map(|(id, _)| *id)?;
        self.entries.remove(&id).map(|w| (id, w.thread))
    }

    /// Remove every pending wait, returning them for host cancellation
    pub fn drain(&mut self) -> Vec<(WaitId, PendingWait)> {
        self.entries.drain().collect()
    }

    /// Number of pending waits
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no waits are pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
