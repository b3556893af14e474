//! Scripted VM threads
//!
//! A `ScriptedThread` plays back a fixed list of stages, one per
//! resumption. Tests and demo binaries use it to stand in for a real
//! scripting VM: each stage receives the resume input and decides the
//! next step, so full spawn/join/wait/post interleavings can be written
//! as plain Rust closures.

use std::collections::{HashMap, VecDeque};

use sthread_core::error::CoreResult;
use sthread_core::phase::Phase;
use sthread_core::script::{Resume, Step};
use sthread_core::traits::{ScriptVm, VmThread};

/// One playback stage: consumes the resume input, produces the next step
pub type Stage = Box<dyn FnOnce(Resume) -> Step>;

/// Wrap a closure as a playback stage
pub fn stage<F>(f: F) -> Stage
where
    F: FnOnce(Resume) -> Step + 'static,
{
    Box::new(f)
}

/// VM thread that plays back a fixed stage list
pub struct ScriptedThread {
    stages: VecDeque<Stage>,
}

impl ScriptedThread {
    /// Build a thread from its stages, consumed front to back
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    /// Single-stage thread
    pub fn once<F>(f: F) -> Self
    where
        F: FnOnce(Resume) -> Step + 'static,
    {
        Self::new(vec![stage(f)])
    }
}

impl VmThread for ScriptedThread {
    fn resume(&mut self, input: Resume) -> Step {
        match self.stages.pop_front() {
            Some(stage) => stage(input),
            None => Step::Error("scripted thread resumed past its last stage".into()),
        }
    }
}

/// Entry-thread factory per phase
type EntryFactory = Box<dyn FnMut() -> Box<dyn VmThread>>;

/// Scripting VM stub mapping phases to entry-thread factories
///
/// Unbound phases decline. A factory is called once per phase entry, so
/// re-invocations (balancer retries, repeated connections) get fresh
/// threads.
#[derive(Default)]
pub struct ScriptedVm {
    factories: HashMap<Phase, EntryFactory>,
    fail_entry: bool,
}

impl ScriptedVm {
    /// VM with no scripts bound
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an entry-thread factory to a phase
    pub fn bind<F>(&mut self, phase: Phase, mut factory: F) -> &mut Self
    where
        F: FnMut() -> ScriptedThread + 'static,
    {
        self.factories
            .insert(phase, Box::new(move || Box::new(factory())));
        self
    }

    /// Make `entry_thread` fail, simulating VM resource exhaustion
    pub fn fail_entry(&mut self, fail: bool) {
        self.fail_entry = fail;
    }
}

impl ScriptVm for ScriptedVm {
    fn entry_thread(&mut self, phase: Phase) -> CoreResult<Option<Box<dyn VmThread>>> {
        if self.fail_entry {
            return Err(sthread_core::error::CoreError::HostError(-1));
        }
        Ok(self.factories.get_mut(&phase).map(|f| f()))
    }
}
