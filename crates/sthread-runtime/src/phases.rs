//! Phase handlers
//!
//! One host-facing entry point, `handle_phase`, multiplexed over the
//! phase kinds. Entering a phase creates the entry thread from the VM,
//! runs the turn to quiescence and maps the end state to a
//! `PhaseResult`. Re-invocations of an active phase report progress
//! without creating new threads; the worker-init phase runs on a
//! synthetic connectionless context that is torn down before returning.

use sthread_core::id::{ConnId, ThreadId};
use sthread_core::kprint;
use sthread_core::phase::{Phase, PhaseResult};
use sthread_core::script::{FinalStatus, Resume};
use sthread_core::traits::{HostEvents, ScriptVm};
use sthread_core::{kdebug, kerror, kwarn};

use crate::conn::{ConnContext, ConnState};
use crate::engine::PhaseEngine;
use crate::thread::ScriptThread;

impl<V: ScriptVm, H: HostEvents> PhaseEngine<V, H> {
    /// Run the script bound to `phase` for one connection
    ///
    /// Returns `Declined` when no script is bound, `Continue` while
    /// threads are suspended on registered events, and a final result
    /// once the phase (or the whole connection) is settled.
    pub fn handle_phase(&mut self, conn: ConnId, phase: Phase) -> PhaseResult {
        if phase.is_connectionless() {
            return self.worker_init();
        }
        kprint::set_conn_id(conn.as_u64());
        kprint::set_phase(phase.name());
        let result = self.run_phase(conn, phase);
        kprint::clear_phase();
        kprint::clear_conn_id();
        result
    }

    fn run_phase(&mut self, conn: ConnId, phase: Phase) -> PhaseResult {
        let mut cx = self.take_conn(conn);
        let result = match cx.state {
            ConnState::Finalizing | ConnState::Destroyed => {
                kwarn!("phase {} invoked during teardown", phase);
                PhaseResult::Error
            }
            ConnState::InPhase(active) if active == phase => {
                // Re-invocation while threads are pending.
                self.phase_outcome(&mut cx)
            }
            ConnState::InPhase(active) => {
                kerror!("phase {} invoked while {} is active", phase, active);
                self.finalize_ctx(&mut cx, FinalStatus::Error);
                PhaseResult::Error
            }
            ConnState::Initial => self.enter_phase(&mut cx, phase),
        };
        kdebug!("phase {} -> {}", phase, result);
        self.put_conn(cx);
        result
    }

    /// First entry into a phase: create and run the entry thread
    fn enter_phase(&mut self, cx: &mut ConnContext, phase: Phase) -> PhaseResult {
        if phase == Phase::Preread && self.config.preread_postponed && !cx.preread_relocated {
            // Step aside once so the rest of the preread chain runs
            // before the script.
            cx.preread_relocated = true;
            return PhaseResult::Again;
        }

        let entry_vm = match self.vm.entry_thread(phase) {
            Ok(Some(vm)) => vm,
            Ok(None) => return PhaseResult::Declined,
            Err(e) => {
                kerror!("entry thread creation failed: {}", e);
                self.finalize_ctx(cx, FinalStatus::InternalError);
                return PhaseResult::Error;
            }
        };
        let entry = match cx.threads.alloc(ScriptThread::new(entry_vm, ThreadId::NONE)) {
            Ok(id) => id,
            Err(e) => {
                kerror!("entry thread allocation failed: {}", e);
                self.finalize_ctx(cx, FinalStatus::InternalError);
                return PhaseResult::Error;
            }
        };
        cx.entry = entry;
        cx.state = ConnState::InPhase(phase);

        self.step_thread(cx, entry, Resume::Start);
        self.drain_ready(cx);
        self.phase_outcome(cx)
    }

    /// Map the turn's end state to a handler result
    ///
    /// Exit requests and entry-thread errors end the connection here;
    /// surviving suspended threads report `Continue`; full quiescence
    /// completes the phase and resets per-phase state. A parked on-abort
    /// thread is not phase work: its only wake-up is a client abort, so
    /// counting it would hold the phase open forever.
    pub(crate) fn phase_outcome(&mut self, cx: &mut ConnContext) -> PhaseResult {
        if matches!(cx.state, ConnState::Finalizing | ConnState::Destroyed) {
            return PhaseResult::Error;
        }
        if let Some(status) = cx.exit_status {
            self.finalize_ctx(cx, status);
            return if status == FinalStatus::Ok {
                PhaseResult::Done
            } else {
                PhaseResult::Error
            };
        }
        if let Some(Err(msg)) = &cx.entry_outcome {
            kerror!("entry thread failed: {}", msg);
            self.finalize_ctx(cx, FinalStatus::Error);
            return PhaseResult::Error;
        }
        if cx.threads.any_active_except(cx.on_abort) {
            return PhaseResult::Continue;
        }
        cx.phase_completed();
        PhaseResult::Done
    }

    /// Run the worker-init script on a synthetic connectionless context
    ///
    /// The context never enters the connection table; whatever the script
    /// leaves behind is torn down before this returns.
    pub fn worker_init(&mut self) -> PhaseResult {
        kprint::set_phase(Phase::WorkerInit.name());
        let mut cx = ConnContext::new(ConnId::NONE, &self.config);
        let result = self.enter_phase(&mut cx, Phase::WorkerInit);
        if !matches!(cx.state, ConnState::Destroyed) {
            self.finalize_ctx(&mut cx, FinalStatus::Ok);
        }
        kprint::clear_phase();
        result
    }
}
