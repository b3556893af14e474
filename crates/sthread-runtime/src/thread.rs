//! Script thread representation and per-connection thread table
//!
//! Threads are owned by the connection's table and addressed by index;
//! the parent link is an index only, never a second owner. Freed slots
//! are reused LIFO.

use sthread_core::error::{CoreError, CoreResult};
use sthread_core::id::{ThreadId, WaitId};
use sthread_core::script::{Resume, Value};
use sthread_core::status::ThreadStatus;
use sthread_core::traits::VmThread;

use crate::registry::WaitKind;

/// Outcome a finished thread left behind
pub type Outcome = Result<Value, String>;

/// One resumable unit of script execution
///
/// Wraps the VM-level thread handle plus scheduling metadata. The VM
/// handle is owned exclusively while the thread is alive; dropping it
/// destroys the VM thread.
pub struct ScriptThread {
    /// VM thread handle; taken out for the duration of a resume call
    pub vm: Option<Box<dyn VmThread>>,

    /// Scheduling status
    pub status: ThreadStatus,

    /// Weak back-reference to the spawning thread (never owns it)
    pub parent: ThreadId,

    /// Spawned user threads awaiting reap
    pub children: Vec<ThreadId>,

    /// The suspension this thread is blocked on, if any
    pub wait: Option<(WaitId, WaitKind)>,

    /// Resume input queued for the next scheduling turn
    pub pending: Option<Resume>,

    /// Exit value or error, kept until reaped (Zombie) or discarded
    pub outcome: Option<Outcome>,
}

impl ScriptThread {
    /// Create a fresh thread around a VM handle
    pub fn new(vm: Box<dyn VmThread>, parent: ThreadId) -> Self {
        Self {
            vm: Some(vm),
            status: ThreadStatus::Created,
            parent,
            children: Vec::new(),
            wait: None,
            pending: None,
            outcome: None,
        }
    }

    /// Force the thread dead without running further script code
    ///
    /// Drops the VM handle; any recorded outcome is kept.
    pub fn kill(&mut self) {
        self.vm = None;
        self.wait = None;
        self.pending = None;
        self.status = ThreadStatus::Dead;
    }
}

impl std::fmt::Debug for ScriptThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptThread")
            .field("status", &self.status)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("wait", &self.wait)
            .finish()
    }
}

/// Per-connection thread table with LIFO slot reuse
#[derive(Default)]
pub struct ThreadTable {
    slots: Vec<Option<ScriptThread>>,
    free: Vec<u32>,
    max: usize,
}

impl ThreadTable {
    /// Create a table bounded at `max` live threads
    pub fn new(max: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            max,
        }
    }

    /// Insert a thread, returning its id
    ///
    /// Prefers reusing recently freed slots. Fails with
    /// `NoThreadsAvailable` at capacity.
    pub fn alloc(&mut self, thread: ScriptThread) -> CoreResult<ThreadId> {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(thread);
            return Ok(ThreadId::new(idx));
        }
        if self.slots.len() >= self.max {
            return Err(CoreError::NoThreadsAvailable);
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Some(thread));
        Ok(ThreadId::new(idx))
    }

    /// Look up a thread
    pub fn get(&self, id: ThreadId) -> Option<&ScriptThread> {
        self.slots.get(id.as_usize())?.as_ref()
    }

    /// Look up a thread mutably
    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut ScriptThread> {
        self.slots.get_mut(id.as_usize())?.as_mut()
    }

    /// Remove a thread, releasing its slot for reuse
    pub fn free(&mut self, id: ThreadId) -> Option<ScriptThread> {
        let slot = self.slots.get_mut(id.as_usize())?;
        let thread = slot.take()?;
        self.free.push(id.as_u32());
        Some(thread)
    }

    /// Ids of all live threads
    pub fn live_ids(&self) -> Vec<ThreadId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| ThreadId::new(i as u32)))
            .collect()
    }

    /// Check if any thread is not yet terminal
    pub fn any_active(&self) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|t| !t.status.is_terminal())
    }

    /// Check if any thread other than `skip` is not yet terminal
    ///
    /// Used for phase completion, where a parked on-abort thread does not
    /// count as outstanding work.
    pub fn any_active_except(&self, skip: ThreadId) -> bool {
        self.slots.iter().enumerate().any(|(i, s)| {
            ThreadId::new(i as u32) != skip
                && s.as_ref().is_some_and(|t| !t.status.is_terminal())
        })
    }

    /// Force every live thread dead without running script code
    pub fn kill_all(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.kill();
        }
    }

    /// Remove every thread except `keep`, releasing the freed slots
    ///
    /// `ThreadId::NONE` as `keep` clears the whole table.
    pub fn clear_except(&mut self, keep: ThreadId) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if ThreadId::new(i as u32) == keep {
                continue;
            }
            if slot.take().is_some() {
                self.free.push(i as u32);
            }
        }
    }

    /// Number of live threads
    pub fn live_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

impl std::fmt::Debug for ThreadTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTable")
            .field("live", &self.live_count())
            .field("max", &self.max)
            .finish()
    }
}
