//! Per-connection context
//!
//! One `ConnContext` exists per logical connection, created lazily on the
//! first phase entry and destroyed synchronously when the connection is
//! finalized. It owns the entry thread, the user-thread table, the ready
//! queue, the suspension registry, the cleanup chain and the phase state
//! flags.

use std::collections::{HashMap, VecDeque};

use sthread_core::id::{ConnId, SemId, ThreadId};
use sthread_core::kwarn;
use sthread_core::phase::Phase;
use sthread_core::script::{FinalStatus, Resume};
use sthread_core::status::ThreadStatus;
use sthread_core::CleanupChain;

use crate::config::EngineConfig;
use crate::registry::SuspensionRegistry;
use crate::semaphore::SemState;
use crate::thread::{Outcome, ThreadTable};

/// Connection lifecycle state
///
/// Exactly one phase state is active at any instant; a phase may be
/// entered, suspended and re-entered multiple times before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Created, no phase active
    Initial,
    /// A phase is active (possibly with threads suspended)
    InPhase(Phase),
    /// Finalize in progress; suspension is forbidden
    Finalizing,
    /// Cleanup chain ran, threads freed; context is about to be dropped
    Destroyed,
}

/// One per logical connection
pub struct ConnContext {
    /// Host-assigned connection handle
    pub id: ConnId,

    /// Lifecycle / phase state
    pub state: ConnState,

    /// Entry thread of the active phase
    pub entry: ThreadId,

    /// Thread currently being resumed
    pub current: ThreadId,

    /// All script threads of this connection
    pub threads: ThreadTable,

    /// Threads runnable in the current scheduler turn (FIFO)
    pub ready: VecDeque<ThreadId>,

    /// Pending external and internal waits
    pub registry: SuspensionRegistry,

    /// Scoped-resource release handlers
    pub cleanup: CleanupChain,

    /// Per-connection semaphores, created on first use
    pub sems: HashMap<SemId, SemState>,

    /// Script-requested termination status
    pub exit_status: Option<FinalStatus>,

    /// Outcome the entry thread finished with
    pub entry_outcome: Option<Outcome>,

    /// Dedicated on-abort thread (at most one)
    pub on_abort: ThreadId,

    /// The on-abort thread already got its one chance to run
    pub abort_delivered: bool,

    /// Preread phase was relocated to the end of its chain
    pub preread_relocated: bool,
}

impl ConnContext {
    /// Create a fresh context for a connection
    pub fn new(id: ConnId, config: &EngineConfig) -> Self {
        Self {
            id,
            state: ConnState::Initial,
            entry: ThreadId::NONE,
            current: ThreadId::NONE,
            threads: ThreadTable::new(config.max_threads),
            ready: VecDeque::new(),
            registry: SuspensionRegistry::new(config.max_waits),
            cleanup: CleanupChain::new(),
            sems: HashMap::new(),
            exit_status: None,
            entry_outcome: None,
            on_abort: ThreadId::NONE,
            abort_delivered: false,
            preread_relocated: false,
        }
    }

    /// The active phase, if any
    #[inline]
    pub fn active_phase(&self) -> Option<Phase> {
        match self.state {
            ConnState::InPhase(p) => Some(p),
            _ => None,
        }
    }

    /// Check whether suspension is currently permitted
    ///
    /// False outside phases, during finalize and in phases whose contract
    /// forbids yielding (balancer, worker-init).
    #[inline]
    pub fn allows_suspend(&self) -> bool {
        match self.state {
            ConnState::InPhase(p) => p.may_suspend(),
            _ => false,
        }
    }

    /// Queue a thread for resumption in the current turn
    ///
    /// Invariant: the ready queue never contains a thread that is also
    /// currently running. A violation is logged and dropped rather than
    /// queued.
    pub fn mark_ready(&mut self, thread: ThreadId, input: Resume) {
        let Some(th) = self.threads.get_mut(thread) else {
            kwarn!("mark_ready: thread {} not found", thread);
            return;
        };
        if th.status == ThreadStatus::Running {
            kwarn!("mark_ready: thread {} is running", thread);
            return;
        }
        if th.status.is_terminal() {
            kwarn!("mark_ready: thread {} is {}", thread, th.status);
            return;
        }
        th.status = ThreadStatus::Suspended;
        th.pending = Some(input);
        if !self.ready.contains(&thread) {
            self.ready.push_back(thread);
        }
    }

    /// Check whether a thread sits in the ready queue
    pub fn ready_contains(&self, thread: ThreadId) -> bool {
        self.ready.contains(&thread)
    }

    /// Get or create a semaphore
    pub fn semaphore(&mut self, id: SemId) -> &mut SemState {
        self.sems.entry(id).or_default()
    }

    /// Reset per-phase state after a phase ran to completion
    ///
    /// Terminal threads (including unreaped zombies, which no one will
    /// reap once the phase is over) are freed. The on-abort thread is
    /// connection-scoped: it stays parked on its registered abort wait so
    /// a later client abort or finalize can still deliver its one turn.
    /// The cleanup chain and semaphores survive until finalize too.
    pub fn phase_completed(&mut self) {
        self.threads.clear_except(self.on_abort);
        self.ready.clear();
        self.entry = ThreadId::NONE;
        self.current = ThreadId::NONE;
        self.entry_outcome = None;
        self.state = ConnState::Initial;
    }
}

impl std::fmt::Debug for ConnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnContext")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("entry", &self.entry)
            .field("threads", &self.threads)
            .field("ready", &self.ready)
            .field("waits", &self.registry.len())
            .finish()
    }
}
