//! The phase engine
//!
//! `PhaseEngine` is the single entry point the host event loop talks to.
//! It owns the connection table, the scripting VM and the host callback
//! registration handle, and drives script threads cooperatively: every
//! public method runs threads to their next suspension point and returns
//! before any external event is waited on.
//!
//! The engine is single-threaded by contract. Methods are never
//! re-entered; the host calls in, the engine runs threads, the engine
//! returns.

use std::collections::HashMap;

use sthread_core::error::CoreResult;
use sthread_core::id::{ConnId, WaitId};
use sthread_core::kprint;
use sthread_core::kinfo;
use sthread_core::phase::PhaseResult;
use sthread_core::script::{FinalStatus, Resume};
use sthread_core::traits::{HostEvents, ScriptVm};
use sthread_core::{kdebug, kwarn, CleanupHandle, CleanupReason};

use crate::balancer::BalancerSlot;
use crate::config::EngineConfig;
use crate::conn::{ConnContext, ConnState};
use crate::registry::WaitKind;

/// Cooperative scheduler over a callback-driven host event loop
pub struct PhaseEngine<V: ScriptVm, H: HostEvents> {
    pub(crate) vm: V,
    pub(crate) host: H,
    pub(crate) config: EngineConfig,
    pub(crate) conns: HashMap<ConnId, ConnContext>,
    pub(crate) balancer: BalancerSlot,
    next_wait: u64,
}

impl<V: ScriptVm, H: HostEvents> PhaseEngine<V, H> {
    /// Create an engine with default configuration
    pub fn new(vm: V, host: H) -> Self {
        Self {
            vm,
            host,
            config: EngineConfig::default(),
            conns: HashMap::new(),
            balancer: BalancerSlot::default(),
            next_wait: 1,
        }
    }

    /// Create an engine with the given configuration
    pub fn with_config(vm: V, host: H, config: EngineConfig) -> Result<Self, &'static str> {
        config.validate()?;
        let mut engine = Self::new(vm, host);
        engine.config = config;
        Ok(engine)
    }

    /// Engine configuration
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of live connection contexts
    pub fn conn_count(&self) -> usize {
        self.conns.len()
    }

    /// Lifecycle state of a connection, if it has a context
    pub fn conn_state(&self, conn: ConnId) -> Option<ConnState> {
        self.conns.get(&conn).map(|c| c.state)
    }

    /// Number of live script threads on a connection
    pub fn live_threads(&self, conn: ConnId) -> usize {
        self.conns.get(&conn).map_or(0, |c| c.threads.live_count())
    }

    /// Number of pending waits on a connection
    pub fn pending_waits(&self, conn: ConnId) -> usize {
        self.conns.get(&conn).map_or(0, |c| c.registry.len())
    }

    /// Allocate a fresh wait id (monotonic across the engine)
    pub(crate) fn alloc_wait(&mut self) -> WaitId {
        let id = WaitId::new(self.next_wait);
        self.next_wait += 1;
        id
    }

    /// Take the context for `conn` out of the table, creating it lazily
    pub(crate) fn take_conn(&mut self, conn: ConnId) -> ConnContext {
        self.conns
            .remove(&conn)
            .unwrap_or_else(|| ConnContext::new(conn, &self.config))
    }

    /// Put a context back unless it was destroyed during the operation
    pub(crate) fn put_conn(&mut self, cx: ConnContext) {
        if cx.state != ConnState::Destroyed {
            self.conns.insert(cx.id, cx);
        }
    }

    /// Register a scoped-resource release handler on a connection
    ///
    /// Returns `None` when the connection has no context or teardown has
    /// already run.
    pub fn push_cleanup<F>(&mut self, conn: ConnId, label: &'static str, handler: F) -> Option<CleanupHandle>
    where
        F: FnOnce(CleanupReason) + 'static,
    {
        self.conns.get_mut(&conn)?.cleanup.push(label, handler)
    }

    /// Remove a cleanup record early (resource released before teardown)
    pub fn remove_cleanup(&mut self, conn: ConnId, handle: CleanupHandle) -> bool {
        match self.conns.get_mut(&conn) {
            Some(cx) => cx.cleanup.remove(handle),
            None => false,
        }
    }

    /// Finalize a connection with the given status
    ///
    /// Idempotent; finalizing a connection that has no context or is
    /// already tearing down is a no-op.
    pub fn finalize(&mut self, conn: ConnId, status: FinalStatus) {
        let Some(mut cx) = self.conns.remove(&conn) else {
            return;
        };
        self.finalize_ctx(&mut cx, status);
    }

    /// Teardown path shared by every finalize entry point
    ///
    /// Ordering contract: on-abort thread first, then callback
    /// cancellation, then the cleanup chain, then thread destruction.
    /// Runs at most once per context; the `Finalizing` state guards
    /// against re-entry and rejects new suspensions.
    pub(crate) fn finalize_ctx(&mut self, cx: &mut ConnContext, status: FinalStatus) {
        if matches!(cx.state, ConnState::Finalizing | ConnState::Destroyed) {
            return;
        }
        cx.state = ConnState::Finalizing;
        kdebug!("finalize {}: status={}", cx.id, status);

        // Give the on-abort thread its single cooperative-cancellation
        // turn. Suspension is rejected while finalizing, so the thread
        // runs to completion or dies.
        if cx.on_abort.is_some() && !cx.abort_delivered {
            cx.abort_delivered = true;
            let tid = cx.on_abort;
            if let Some((wait, entry)) = cx.registry.remove_for_thread(tid) {
                if let Some(ev) = entry.kind.external_event() {
                    self.host.cancel(cx.id, wait, &ev);
                }
            }
            if cx.threads.get(tid).is_some_and(|t| !t.status.is_terminal()) {
                self.step_thread(cx, tid, Resume::Abort);
            }
        }

        self.cancel_all(cx);

        let reason = if status == FinalStatus::Aborted {
            CleanupReason::Abort
        } else {
            CleanupReason::Teardown
        };
        cx.cleanup.run(reason);

        cx.threads.kill_all();
        cx.ready.clear();
        cx.state = ConnState::Destroyed;
        kinfo!("connection {} finalized: {}", cx.id, status);
    }

    /// Cancel every pending wait, mirroring host-registered callbacks
    pub(crate) fn cancel_all(&mut self, cx: &mut ConnContext) {
        for (wait, entry) in cx.registry.drain() {
            if let Some(ev) = entry.kind.external_event() {
                self.host.cancel(cx.id, wait, &ev);
            }
            if let Some(th) = cx.threads.get_mut(entry.thread) {
                th.wait = None;
            }
        }
    }

    /// A registered event fired: resume the waiting thread
    ///
    /// Stale fires are tolerated: an unknown connection or an already
    /// resolved wait id returns `None` and changes nothing.
    pub fn event_fired(&mut self, conn: ConnId, wait: WaitId) -> Option<PhaseResult> {
        kprint::set_conn_id(conn.as_u64());
        let result = self.event_fired_inner(conn, wait);
        kprint::clear_phase();
        kprint::clear_conn_id();
        result
    }

    fn event_fired_inner(&mut self, conn: ConnId, wait: WaitId) -> Option<PhaseResult> {
        let mut cx = self.conns.remove(&conn)?;
        if let Some(phase) = cx.active_phase() {
            kprint::set_phase(phase.name());
        }
        let Some(entry) = cx.registry.remove(wait) else {
            kdebug!("stale event {} on {}", wait, conn);
            self.put_conn(cx);
            return None;
        };

        let tid = entry.thread;
        let alive = cx
            .threads
            .get(tid)
            .is_some_and(|t| !t.status.is_terminal());
        if !alive {
            kwarn!("event {} for finished thread {}", wait, tid);
            self.put_conn(cx);
            return None;
        }

        if let Some(th) = cx.threads.get_mut(tid) {
            th.wait = None;
        }

        match entry.kind {
            WaitKind::AbortWait => {
                // Client abort surfaced through the registered abort wait.
                cx.abort_delivered = true;
                self.step_thread(&mut cx, tid, Resume::Abort);
                self.drain_ready(&mut cx);
                let status = cx.exit_status.unwrap_or(FinalStatus::Aborted);
                self.finalize_ctx(&mut cx, status);
                let result = if status == FinalStatus::Ok {
                    PhaseResult::Done
                } else {
                    PhaseResult::Error
                };
                self.put_conn(cx);
                Some(result)
            }
            ref kind => {
                let Some(ev) = kind.wake_event() else {
                    kwarn!("event {} with internal wait kind", wait);
                    self.put_conn(cx);
                    return None;
                };
                self.step_thread(&mut cx, tid, Resume::Wake(ev));
                self.drain_ready(&mut cx);
                let result = self.phase_outcome(&mut cx);
                self.put_conn(cx);
                Some(result)
            }
        }
    }

    /// The client aborted the connection
    ///
    /// The on-abort thread, if one was registered, gets one cooperative
    /// turn with `Resume::Abort`; it may override the final status by
    /// exiting. Everything else is torn down.
    pub fn client_aborted(&mut self, conn: ConnId) {
        let Some(mut cx) = self.conns.remove(&conn) else {
            return;
        };
        kprint::set_conn_id(conn.as_u64());
        if let Some(phase) = cx.active_phase() {
            kprint::set_phase(phase.name());
        }
        if cx.on_abort.is_some() && !cx.abort_delivered {
            cx.abort_delivered = true;
            let tid = cx.on_abort;
            if let Some((wait, entry)) = cx.registry.remove_for_thread(tid) {
                if let Some(ev) = entry.kind.external_event() {
                    self.host.cancel(cx.id, wait, &ev);
                }
            }
            if cx.threads.get(tid).is_some_and(|t| !t.status.is_terminal()) {
                self.step_thread(&mut cx, tid, Resume::Abort);
                self.drain_ready(&mut cx);
            }
        }
        let status = cx.exit_status.unwrap_or(FinalStatus::Aborted);
        self.finalize_ctx(&mut cx, status);
        kprint::clear_phase();
        kprint::clear_conn_id();
    }

    /// Access the host handle (test hook)
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Access the VM (test hook)
    pub fn vm_mut(&mut self) -> &mut V {
        &mut self.vm
    }
}

/// Convenience alias used by tests and demo binaries
pub type EngineResult<T> = CoreResult<T>;
