//! Collaborator traits
//!
//! These traits define the boundary between the engine and its two
//! external collaborators: the scripting VM and the host event loop.
//! Every component of the runtime depends on these traits, never on
//! concrete VM or event-loop types.

use std::time::Duration;

use crate::error::CoreResult;
use crate::id::{ConnId, SocketHandle, WaitId};
use crate::phase::Phase;
use crate::script::{Resume, Step};

/// One resumable unit of VM execution
///
/// The engine owns the handle exclusively while the script thread is
/// alive and drops it to destroy the VM-level thread. `resume` runs the
/// thread until it yields, returns or errors; it must not block.
pub trait VmThread {
    /// Resume execution with the given input, running until the next step
    fn resume(&mut self, input: Resume) -> Step;
}

/// The scripting VM, consumed only as a thread factory
pub trait ScriptVm {
    /// Create the entry thread for a phase's top-level chunk
    ///
    /// Returns `Ok(None)` when no script is bound for the phase (the
    /// phase handler reports `Declined`). Errors are treated as resource
    /// exhaustion and finalize the connection with an internal-error
    /// status.
    fn entry_thread(&mut self, phase: Phase) -> CoreResult<Option<Box<dyn VmThread>>>;
}

/// External event a wait registers with the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Socket readability
    Readable(SocketHandle),
    /// Socket writability
    Writable(SocketHandle),
    /// One-shot timer
    Timer(Duration),
    /// Client abort notification
    Abort,
}

/// The host event loop's callback registration primitives
///
/// These are the only primitives the suspension registry uses. When the
/// registered event fires, the host calls back into the engine with the
/// wait id (`PhaseEngine::event_fired`), which resumes the waiting
/// thread and drains the ready queue.
pub trait HostEvents {
    /// Register a callback for `event`; invoked once when the event fires
    fn register(&mut self, conn: ConnId, wait: WaitId, event: EventKind) -> CoreResult<()>;

    /// Cancel a previously registered callback
    ///
    /// Must tolerate waits that already fired or were never registered;
    /// cancelling those is a no-op, not an error.
    fn cancel(&mut self, conn: ConnId, wait: WaitId, event: &EventKind);
}
