//! Thread stepping and the ready-queue drain
//!
//! `step_thread` resumes one VM thread and interprets the step it
//! produces. Spawn, post and fast-path acquires are serviced inline and
//! the thread keeps running within the same call; only a real suspension
//! or termination returns control. `drain_ready` then runs every thread
//! the step made runnable, FIFO, until the turn is quiet.

use sthread_core::error::CoreError;
use sthread_core::id::ThreadId;
use sthread_core::script::{FinalStatus, Resume, Step, Value, WaitFor, WakeEvent};
use sthread_core::status::ThreadStatus;
use sthread_core::traits::{HostEvents, ScriptVm, VmThread};
use sthread_core::{kdebug, kerror, ktrace, kwarn};

use crate::conn::{ConnContext, ConnState};
use crate::engine::PhaseEngine;
use crate::registry::WaitKind;
use crate::thread::{Outcome, ScriptThread};

/// How a yield request resolved
enum Suspended {
    /// Thread parked; the wait is registered
    Parked,
    /// The wait resolved immediately; resume with this input
    Resolved(Resume),
    /// The request was invalid or unsatisfiable; thread finished
    Finished(Outcome),
}

impl<V: ScriptVm, H: HostEvents> PhaseEngine<V, H> {
    /// Resume one thread and service its steps until it suspends or ends
    ///
    /// Terminal threads are never resumed; a stale id is logged and
    /// ignored.
    pub(crate) fn step_thread(&mut self, cx: &mut ConnContext, tid: ThreadId, input: Resume) {
        let mut input = input;
        loop {
            let Some(th) = cx.threads.get_mut(tid) else {
                kwarn!("step: thread {} not found", tid);
                return;
            };
            if th.status.is_terminal() {
                kwarn!(
                    "step: {}",
                    CoreError::InvalidStatus {
                        thread: tid,
                        status: th.status
                    }
                );
                return;
            }
            let Some(mut vm) = th.vm.take() else {
                kerror!("step: thread {} has no vm handle", tid);
                th.kill();
                return;
            };
            th.status = ThreadStatus::Running;
            cx.current = tid;

            let step = vm.resume(input);
            ktrace!("thread {} -> {:?}", tid, step);
            cx.current = ThreadId::NONE;

            match step {
                Step::Yield(wait_for) => match self.suspend_thread(cx, tid, vm, &wait_for) {
                    Suspended::Parked => return,
                    Suspended::Resolved(resume) => input = resume,
                    Suspended::Finished(outcome) => {
                        self.finish_thread(cx, tid, outcome);
                        return;
                    }
                },
                Step::Spawn(child_vm) => match self.spawn_child(cx, tid, child_vm) {
                    Ok(child_id) => {
                        if let Some(parent) = cx.threads.get_mut(tid) {
                            parent.vm = Some(vm);
                        }
                        input = Resume::Spawned(child_id);
                    }
                    Err(e) => {
                        kerror!("spawn failed on {}: {}", cx.id, e);
                        drop(vm);
                        cx.exit_status = Some(FinalStatus::InternalError);
                        self.finish_thread(cx, tid, Err(e.to_string()));
                        return;
                    }
                },
                Step::Post(sem) => {
                    if let Some(waiter) = cx.semaphore(sem).post() {
                        if let Some((_, entry)) = cx.registry.remove_for_thread(waiter) {
                            debug_assert_eq!(entry.kind, WaitKind::Semaphore(sem));
                        }
                        if let Some(w) = cx.threads.get_mut(waiter) {
                            w.wait = None;
                        }
                        cx.mark_ready(waiter, Resume::Wake(WakeEvent::SemAcquired));
                    }
                    if let Some(th) = cx.threads.get_mut(tid) {
                        th.vm = Some(vm);
                    }
                    input = Resume::Posted;
                }
                Step::Exit(status) => {
                    kdebug!("thread {} requested exit: {}", tid, status);
                    cx.exit_status = Some(status);
                    drop(vm);
                    self.finish_thread(cx, tid, Ok(Value::Unit));
                    return;
                }
                Step::Return(value) => {
                    drop(vm);
                    self.finish_thread(cx, tid, Ok(value));
                    return;
                }
                Step::Error(msg) => {
                    kerror!("thread {} error: {}", tid, msg);
                    drop(vm);
                    self.finish_thread(cx, tid, Err(msg));
                    return;
                }
            }
        }
    }

    /// Allocate a child thread and queue it behind the spawner
    fn spawn_child(
        &mut self,
        cx: &mut ConnContext,
        parent: ThreadId,
        vm: Box<dyn VmThread>,
    ) -> Result<ThreadId, CoreError> {
        let child_id = cx.threads.alloc(ScriptThread::new(vm, parent))?;
        if let Some(ch) = cx.threads.get_mut(child_id) {
            ch.pending = Some(Resume::Start);
        }
        if let Some(p) = cx.threads.get_mut(parent) {
            p.children.push(child_id);
        }
        cx.ready.push_back(child_id);
        kdebug!("thread {} spawned {}", parent, child_id);
        Ok(child_id)
    }

    /// Service a yield request
    ///
    /// Parks the thread when the wait must actually be registered,
    /// resolves it inline when possible (banked semaphore permit, already
    /// finished join target), and finishes the thread when the request
    /// violates the context's suspension contract or a resource limit.
    fn suspend_thread(
        &mut self,
        cx: &mut ConnContext,
        tid: ThreadId,
        vm: Box<dyn VmThread>,
        wait_for: &WaitFor,
    ) -> Suspended {
        if !cx.allows_suspend() {
            let e = CoreError::ContractViolation("suspension not allowed in this context");
            kerror!("thread {}: {}", tid, e);
            return Suspended::Finished(Err(e.to_string()));
        }

        let kind = WaitKind::from(wait_for);
        match kind {
            WaitKind::ChildJoin(child) => {
                if child == tid || cx.threads.get(child).is_none() {
                    Self::restore(cx, tid, vm);
                    return Suspended::Resolved(Resume::JoinDone(Err(
                        "join target does not exist".into()
                    )));
                }
                let status = cx.threads.get(child).map(|c| c.status);
                match status {
                    Some(ThreadStatus::Zombie) => {
                        // Reap immediately.
                        let outcome = cx
                            .threads
                            .free(child)
                            .and_then(|c| c.outcome)
                            .unwrap_or(Err("child finished without outcome".into()));
                        Self::forget_child(cx, tid, child);
                        Self::restore(cx, tid, vm);
                        Suspended::Resolved(Resume::JoinDone(outcome))
                    }
                    Some(ThreadStatus::Dead) => {
                        cx.threads.free(child);
                        Self::forget_child(cx, tid, child);
                        Self::restore(cx, tid, vm);
                        Suspended::Resolved(Resume::JoinDone(Err("join target is dead".into())))
                    }
                    _ => {
                        let wait = self.alloc_wait();
                        if let Err(e) = cx.registry.insert(wait, tid, kind.clone()) {
                            cx.exit_status = Some(FinalStatus::InternalError);
                            return Suspended::Finished(Err(e.to_string()));
                        }
                        // A joining parent reads as "normal": alive, not
                        // runnable, not waiting on the host.
                        Self::park(cx, tid, vm, wait, kind, ThreadStatus::Normal);
                        Suspended::Parked
                    }
                }
            }
            WaitKind::Semaphore(sem) => {
                if cx.semaphore(sem).try_acquire() {
                    Self::restore(cx, tid, vm);
                    return Suspended::Resolved(Resume::Wake(WakeEvent::SemAcquired));
                }
                let wait = self.alloc_wait();
                if let Err(e) = cx.registry.insert(wait, tid, kind.clone()) {
                    cx.exit_status = Some(FinalStatus::InternalError);
                    return Suspended::Finished(Err(e.to_string()));
                }
                cx.semaphore(sem).add_waiter(tid);
                Self::park(cx, tid, vm, wait, kind, ThreadStatus::Suspended);
                Suspended::Parked
            }
            WaitKind::AbortWait => {
                if cx.on_abort.is_some() {
                    return Suspended::Finished(Err(
                        "an abort handler is already registered".into()
                    ));
                }
                let wait = self.alloc_wait();
                if let Err(e) = self.register_external(cx, tid, wait, kind.clone()) {
                    cx.exit_status = Some(FinalStatus::InternalError);
                    return Suspended::Finished(Err(e.to_string()));
                }
                cx.on_abort = tid;
                Self::park(cx, tid, vm, wait, kind, ThreadStatus::Suspended);
                Suspended::Parked
            }
            WaitKind::SocketRead(_) | WaitKind::SocketWrite(_) | WaitKind::Timer(_) => {
                let wait = self.alloc_wait();
                if let Err(e) = self.register_external(cx, tid, wait, kind.clone()) {
                    cx.exit_status = Some(FinalStatus::InternalError);
                    return Suspended::Finished(Err(e.to_string()));
                }
                Self::park(cx, tid, vm, wait, kind, ThreadStatus::Suspended);
                Suspended::Parked
            }
        }
    }

    /// Insert a registry entry and mirror it to the host
    fn register_external(
        &mut self,
        cx: &mut ConnContext,
        tid: ThreadId,
        wait: sthread_core::id::WaitId,
        kind: WaitKind,
    ) -> Result<(), CoreError> {
        let event = kind.external_event();
        cx.registry.insert(wait, tid, kind)?;
        if let Some(ev) = event {
            if let Err(e) = self.host.register(cx.id, wait, ev) {
                cx.registry.remove(wait);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Hand the VM handle back to its slot after an inline resolution
    fn restore(cx: &mut ConnContext, tid: ThreadId, vm: Box<dyn VmThread>) {
        if let Some(th) = cx.threads.get_mut(tid) {
            th.vm = Some(vm);
        }
    }

    /// Drop a reaped child from its parent's child list
    ///
    /// Required before the child's slot can be reused: a stale id left in
    /// `children` would alias whatever thread lands in the slot next.
    fn forget_child(cx: &mut ConnContext, parent: ThreadId, child: ThreadId) {
        if let Some(p) = cx.threads.get_mut(parent) {
            p.children.retain(|c| *c != child);
        }
    }

    /// Park a thread on a registered wait
    fn park(
        cx: &mut ConnContext,
        tid: ThreadId,
        vm: Box<dyn VmThread>,
        wait: sthread_core::id::WaitId,
        kind: WaitKind,
        status: ThreadStatus,
    ) {
        if let Some(th) = cx.threads.get_mut(tid) {
            th.vm = Some(vm);
            th.status = status;
            th.wait = Some((wait, kind));
        }
    }

    /// Record a thread's termination and settle its relationships
    ///
    /// Children are orphaned (terminal ones freed). If a parent is
    /// blocked joining this thread it is woken with the outcome and the
    /// thread is reaped on the spot; otherwise the outcome is retained as
    /// a zombie while the parent lives, and discarded when no one is left
    /// to ask for it.
    pub(crate) fn finish_thread(&mut self, cx: &mut ConnContext, tid: ThreadId, outcome: Outcome) {
        if tid == cx.entry {
            cx.entry_outcome = Some(outcome.clone());
        }
        if tid == cx.on_abort {
            cx.on_abort = ThreadId::NONE;
        }

        let children = cx
            .threads
            .get_mut(tid)
            .map(|t| std::mem::take(&mut t.children))
            .unwrap_or_default();
        for child in children {
            match cx.threads.get_mut(child) {
                Some(ch) if ch.status.is_terminal() => {
                    cx.threads.free(child);
                }
                Some(ch) => ch.parent = ThreadId::NONE,
                None => {}
            }
        }

        if let Some((_, parent)) = cx.registry.remove_join_of(tid) {
            if let Some(p) = cx.threads.get_mut(parent) {
                p.wait = None;
                p.children.retain(|c| *c != tid);
            }
            cx.threads.free(tid);
            cx.mark_ready(parent, Resume::JoinDone(outcome));
            return;
        }

        let parent = cx
            .threads
            .get(tid)
            .map(|t| t.parent)
            .unwrap_or(ThreadId::NONE);
        let parent_live = parent.is_some()
            && cx
                .threads
                .get(parent)
                .is_some_and(|p| !p.status.is_terminal());

        if let Some(th) = cx.threads.get_mut(tid) {
            th.vm = None;
            th.wait = None;
            th.pending = None;
            if parent_live {
                th.status = ThreadStatus::Zombie;
                th.outcome = Some(outcome);
            } else {
                th.status = ThreadStatus::Dead;
            }
        }
    }

    /// Run every queued thread until the turn is quiet
    ///
    /// Stops early when a script requested exit or the connection started
    /// tearing down.
    pub(crate) fn drain_ready(&mut self, cx: &mut ConnContext) {
        loop {
            if cx.exit_status.is_some() || cx.state == ConnState::Finalizing {
                break;
            }
            let Some(tid) = cx.ready.pop_front() else {
                break;
            };
            let Some(th) = cx.threads.get_mut(tid) else {
                continue;
            };
            if th.status.is_terminal() || th.status == ThreadStatus::Running {
                continue;
            }
            let input = th.pending.take().unwrap_or(Resume::Start);
            self.step_thread(cx, tid, input);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{stage, ScriptedThread, ScriptedVm};
    use crate::sim::SimHost;
    use sthread_core::id::{ConnId, SemId, SocketHandle};
    use sthread_core::phase::Phase;

    fn engine() -> PhaseEngine<ScriptedVm, SimHost> {
        PhaseEngine::new(ScriptedVm::new(), SimHost::new())
    }

    /// Build a context mid-phase with one entry thread running `stages`
    fn setup(
        eng: &mut PhaseEngine<ScriptedVm, SimHost>,
        phase: Phase,
        thread: ScriptedThread,
    ) -> (ConnContext, ThreadId) {
        let mut cx = eng.take_conn(ConnId::new(1));
        cx.state = ConnState::InPhase(phase);
        let tid = cx
            .threads
            .alloc(ScriptThread::new(Box::new(thread), ThreadId::NONE))
            .unwrap();
        cx.entry = tid;
        (cx, tid)
    }

    #[test]
    fn test_return_finishes_entry_dead() {
        let mut eng = engine();
        let script = ScriptedThread::new(vec![stage(|_| Step::Return(Value::Int(7)))]);
        let (mut cx, tid) = setup(&mut eng, Phase::Content, script);

        eng.step_thread(&mut cx, tid, Resume::Start);

        // Entry has no parent: no zombie retention
        assert_eq!(cx.threads.get(tid).unwrap().status, ThreadStatus::Dead);
        assert_eq!(cx.entry_outcome, Some(Ok(Value::Int(7))));
    }

    #[test]
    fn test_terminal_thread_never_resumed() {
        let mut eng = engine();
        let script = ScriptedThread::new(vec![stage(|_| Step::Return(Value::Unit))]);
        let (mut cx, tid) = setup(&mut eng, Phase::Content, script);

        eng.step_thread(&mut cx, tid, Resume::Start);
        assert!(cx.threads.get(tid).unwrap().status.is_terminal());

        // A second step must be a no-op, not a panic or a resume.
        eng.step_thread(&mut cx, tid, Resume::Start);
        assert_eq!(cx.threads.get(tid).unwrap().status, ThreadStatus::Dead);
    }

    #[test]
    fn test_yield_forbidden_in_balancer() {
        let mut eng = engine();
        let script = ScriptedThread::new(vec![stage(|_| {
            Step::Yield(WaitFor::Timer(std::time::Duration::from_millis(5)))
        })]);
        let (mut cx, tid) = setup(&mut eng, Phase::Balancer, script);

        eng.step_thread(&mut cx, tid, Resume::Start);

        assert!(cx.threads.get(tid).unwrap().status.is_terminal());
        // The outcome names the broken contract, not an anonymous failure
        assert!(matches!(
            &cx.entry_outcome,
            Some(Err(msg)) if msg.contains("contract violation")
        ));
        assert!(cx.registry.is_empty());
        assert!(eng.host().registrations().is_empty());
    }

    #[test]
    fn test_socket_wait_registers_with_host() {
        let mut eng = engine();
        let h = SocketHandle::new(42);
        let script = ScriptedThread::new(vec![
            stage(move |_| Step::Yield(WaitFor::SocketReadable(h))),
            stage(|input| {
                assert_eq!(input, Resume::Wake(WakeEvent::Readable));
                Step::Return(Value::Unit)
            }),
        ]);
        let (mut cx, tid) = setup(&mut eng, Phase::Content, script);

        eng.step_thread(&mut cx, tid, Resume::Start);
        assert_eq!(cx.threads.get(tid).unwrap().status, ThreadStatus::Suspended);
        assert_eq!(cx.registry.len(), 1);
        assert_eq!(eng.host().registrations().len(), 1);

        let _ = cx.registry.remove_for_thread(tid).unwrap();
        cx.threads.get_mut(tid).unwrap().wait = None;
        eng.step_thread(&mut cx, tid, Resume::Wake(WakeEvent::Readable));
        assert!(cx.threads.get(tid).unwrap().status.is_terminal());
    }

    #[test]
    fn test_spawn_then_join() {
        let mut eng = engine();
        let script = ScriptedThread::new(vec![
            stage(|_| {
                let child = ScriptedThread::new(vec![stage(|_| Step::Return(Value::Int(9)))]);
                Step::Spawn(Box::new(child))
            }),
            stage(|input| match input {
                Resume::Spawned(child) => Step::Yield(WaitFor::Join(child)),
                other => Step::Error(format!("unexpected input {:?}", other)),
            }),
            stage(|input| match input {
                Resume::JoinDone(Ok(Value::Int(9))) => Step::Return(Value::Bool(true)),
                other => Step::Error(format!("unexpected join result {:?}", other)),
            }),
        ]);
        let (mut cx, tid) = setup(&mut eng, Phase::Content, script);

        eng.step_thread(&mut cx, tid, Resume::Start);
        // Parent parked joining; child queued
        assert_eq!(cx.threads.get(tid).unwrap().status, ThreadStatus::Normal);
        assert_eq!(cx.ready.len(), 1);

        eng.drain_ready(&mut cx);
        assert_eq!(cx.entry_outcome, Some(Ok(Value::Bool(true))));
        // Child slot was reaped
        assert_eq!(cx.threads.live_count(), 1);
    }

    #[test]
    fn test_join_finished_child_fast_path() {
        let mut eng = engine();
        let script = ScriptedThread::new(vec![
            stage(|_| {
                let child = ScriptedThread::new(vec![stage(|_| Step::Return(Value::Int(3)))]);
                Step::Spawn(Box::new(child))
            }),
            // Let the child run to completion before joining
            stage(|_| Step::Yield(WaitFor::Timer(std::time::Duration::from_millis(1)))),
            stage(|_| Step::Yield(WaitFor::Join(ThreadId::new(1)))),
            stage(|input| match input {
                Resume::JoinDone(Ok(Value::Int(3))) => Step::Return(Value::Unit),
                other => Step::Error(format!("unexpected {:?}", other)),
            }),
        ]);
        let (mut cx, tid) = setup(&mut eng, Phase::Content, script);

        eng.step_thread(&mut cx, tid, Resume::Start);
        eng.drain_ready(&mut cx);
        // Child finished as zombie, outcome retained for the join
        assert_eq!(
            cx.threads.get(ThreadId::new(1)).unwrap().status,
            ThreadStatus::Zombie
        );

        let (_, _) = cx.registry.remove_for_thread(tid).unwrap();
        cx.threads.get_mut(tid).unwrap().wait = None;
        eng.step_thread(&mut cx, tid, Resume::Wake(WakeEvent::TimerExpired));
        assert_eq!(cx.entry_outcome, Some(Ok(Value::Unit)));
    }

    #[test]
    fn test_semaphore_fast_path_and_wake() {
        let mut eng = engine();
        let sem = SemId::new(1);
        let script = ScriptedThread::new(vec![
            stage(move |_| {
                let waiter = ScriptedThread::new(vec![
                    stage(move |_| Step::Yield(WaitFor::Semaphore(sem))),
                    stage(|input| {
                        assert_eq!(input, Resume::Wake(WakeEvent::SemAcquired));
                        Step::Return(Value::Unit)
                    }),
                ]);
                Step::Spawn(Box::new(waiter))
            }),
            // Let the child block on the semaphore first
            stage(|_| Step::Yield(WaitFor::Timer(std::time::Duration::from_millis(1)))),
            stage(move |_| Step::Post(sem)),
            stage(|_| Step::Return(Value::Unit)),
        ]);
        let (mut cx, tid) = setup(&mut eng, Phase::Content, script);

        eng.step_thread(&mut cx, tid, Resume::Start);
        eng.drain_ready(&mut cx);
        let child = ThreadId::new(1);
        assert_eq!(cx.threads.get(child).unwrap().status, ThreadStatus::Suspended);
        assert_eq!(cx.semaphore(sem).waiter_count(), 1);

        let (_, _) = cx.registry.remove_for_thread(tid).unwrap();
        cx.threads.get_mut(tid).unwrap().wait = None;
        eng.step_thread(&mut cx, tid, Resume::Wake(WakeEvent::TimerExpired));
        eng.drain_ready(&mut cx);

        // Waiter was woken through the ready queue and finished
        assert!(cx.threads.get(child).is_none() || cx.threads.get(child).unwrap().status.is_terminal());
        assert_eq!(cx.semaphore(sem).waiter_count(), 0);
    }

    #[test]
    fn test_abort_slot_at_most_one() {
        let mut eng = engine();
        let script = ScriptedThread::new(vec![
            stage(|_| {
                let second = ScriptedThread::new(vec![
                    stage(|_| Step::Yield(WaitFor::Abort)),
                    stage(|_| Step::Return(Value::Unit)),
                ]);
                Step::Spawn(Box::new(second))
            }),
            stage(|_| Step::Yield(WaitFor::Abort)),
            stage(|_| Step::Return(Value::Unit)),
        ]);
        let (mut cx, tid) = setup(&mut eng, Phase::Content, script);

        eng.step_thread(&mut cx, tid, Resume::Start);
        assert_eq!(cx.on_abort, tid);

        // Second registration attempt dies with an error
        eng.drain_ready(&mut cx);
        let second = ThreadId::new(1);
        assert!(cx.threads.get(second).unwrap().status.is_terminal());
        assert_eq!(cx.on_abort, tid);
    }

    #[test]
    fn test_exit_stops_drain() {
        let mut eng = engine();
        let script = ScriptedThread::new(vec![
            stage(|_| {
                let child = ScriptedThread::new(vec![stage(|_| {
                    panic!("must not run after exit");
                })]);
                Step::Spawn(Box::new(child))
            }),
            stage(|_| Step::Exit(FinalStatus::Ok)),
        ]);
        let (mut cx, tid) = setup(&mut eng, Phase::Content, script);

        eng.step_thread(&mut cx, tid, Resume::Start);
        assert_eq!(cx.exit_status, Some(FinalStatus::Ok));

        // Queued child is not run once exit was requested
        eng.drain_ready(&mut cx);
    }

    #[test]
    fn test_thread_cap_is_internal_error() {
        let mut eng = engine();
        let script = ScriptedThread::new(vec![
            stage(|_| {
                let child = ScriptedThread::new(vec![stage(|_| Step::Return(Value::Unit))]);
                Step::Spawn(Box::new(child))
            }),
            stage(|_| {
                let child = ScriptedThread::new(vec![stage(|_| Step::Return(Value::Unit))]);
                Step::Spawn(Box::new(child))
            }),
        ]);
        let mut cx = ConnContext::new(
            ConnId::new(1),
            &crate::config::EngineConfig::default().max_threads(2),
        );
        cx.state = ConnState::InPhase(Phase::Content);
        let tid = cx
            .threads
            .alloc(ScriptThread::new(Box::new(script), ThreadId::NONE))
            .unwrap();
        cx.entry = tid;

        eng.step_thread(&mut cx, tid, Resume::Start);
        assert_eq!(cx.exit_status, Some(FinalStatus::InternalError));
        assert!(matches!(cx.entry_outcome, Some(Err(_))));
    }
}
