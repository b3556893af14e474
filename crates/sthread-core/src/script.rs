//! Values and control messages exchanged with the scripting VM
//!
//! One resumption of a VM thread consumes a [`Resume`] input and produces
//! a [`Step`]. The engine interprets the step: suspensions go through the
//! suspension registry, spawn/post requests are serviced synchronously and
//! the thread is resumed again within the same turn.

use core::fmt;
use std::time::Duration;

use crate::id::{SemId, SocketHandle, ThreadId};
use crate::traits::VmThread;

/// A script-level value crossing the VM boundary
///
/// Deliberately small: the engine never computes with values, it only
/// carries them between threads (join results, phase return values).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value
    Unit,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// String
    Str(String),
    /// Upstream peer choice (balancer phase return value)
    Peer(PeerAddr),
}

/// Upstream peer override produced by a balancer script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    /// Peer address, e.g. "10.0.0.7:8443"
    pub addr: String,
    /// Additional connect attempts the script asks for
    pub more_tries: u32,
}

impl PeerAddr {
    /// Create a peer override with no extra retries
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            more_tries: 0,
        }
    }

    /// Set the requested retry budget
    pub fn with_more_tries(mut self, tries: u32) -> Self {
        self.more_tries = tries;
        self
    }
}

/// Final status a connection is finalized with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStatus {
    /// Clean completion
    Ok,
    /// Script or engine failure
    Error,
    /// Internal resource failure (thread/wait allocation)
    InternalError,
    /// Client aborted the connection
    Aborted,
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalStatus::Ok => write!(f, "ok"),
            FinalStatus::Error => write!(f, "error"),
            FinalStatus::InternalError => write!(f, "internal error"),
            FinalStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// What a yielding thread wants to wait for
///
/// These are exactly the engine's suspension points. Socket, timer and
/// abort waits register a callback with the host; semaphore and join
/// waits resolve inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitFor {
    /// Socket readability
    SocketReadable(SocketHandle),
    /// Socket writability
    SocketWritable(SocketHandle),
    /// Sleep / timeout
    Timer(Duration),
    /// Counting semaphore acquire
    Semaphore(SemId),
    /// Wait for a spawned child to finish
    Join(ThreadId),
    /// Become the connection's on-abort thread, resumed once on client abort
    Abort,
}

/// The event a suspended thread is woken with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeEvent {
    /// The awaited socket became readable
    Readable,
    /// The awaited socket became writable
    Writable,
    /// The timer expired
    TimerExpired,
    /// The semaphore was acquired
    SemAcquired,
}

/// Input delivered to a VM thread on resumption
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// First resumption of a freshly created thread
    Start,
    /// The awaited event fired
    Wake(WakeEvent),
    /// A requested spawn succeeded; the child is in the ready queue
    Spawned(ThreadId),
    /// A semaphore post was delivered
    Posted,
    /// The joined child finished with this outcome
    JoinDone(Result<Value, String>),
    /// Peer re-selection after a failed connect attempt; carries the
    /// failure description the host recorded
    Retry(String),
    /// Cooperative cancellation: the client aborted the connection
    Abort,
}

/// Output of one VM resumption
pub enum Step {
    /// Suspend until the described event
    Yield(WaitFor),
    /// Spawn a child thread, then continue running
    Spawn(Box<dyn VmThread>),
    /// Post a semaphore, then continue running
    Post(SemId),
    /// Request connection termination with the given status
    Exit(FinalStatus),
    /// Thread finished with a value
    Return(Value),
    /// Thread raised an uncaught error
    Error(String),
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Yield(w) => f.debug_tuple("Yield").field(w).finish(),
            Step::Spawn(_) => f.debug_tuple("Spawn").field(&"<vm thread>").finish(),
            Step::Post(id) => f.debug_tuple("Post").field(id).finish(),
            Step::Exit(s) => f.debug_tuple("Exit").field(s).finish(),
            Step::Return(v) => f.debug_tuple("Return").field(v).finish(),
            Step::Error(m) => f.debug_tuple("Error").field(m).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_addr_builder() {
        let peer = PeerAddr::new("127.0.0.1:8080").with_more_tries(3);
        assert_eq!(peer.addr, "127.0.0.1:8080");
        assert_eq!(peer.more_tries, 3);
    }

    #[test]
    fn test_final_status_display() {
        assert_eq!(format!("{}", FinalStatus::Ok), "ok");
        assert_eq!(format!("{}", FinalStatus::Aborted), "aborted");
    }

    #[test]
    fn test_step_debug() {
        let s = Step::Yield(WaitFor::Timer(Duration::from_millis(5)));
        assert!(format!("{:?}", s).contains("Yield"));
    }
}
