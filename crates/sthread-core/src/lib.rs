//! # sthread-core
//!
//! Core types and traits for the SThread (Script Thread) engine: the
//! scripting-concurrency core of a stream (TCP/UDP) proxy module.
//!
//! This crate is collaborator-agnostic and contains no I/O code. The
//! scripting VM and the host event loop are consumed through the traits
//! in `traits`; everything that touches a socket or a timer lives on the
//! other side of those traits.
//!
//! ## Modules
//!
//! - `id` - Thread, connection and wait identifier types
//! - `status` - Script-thread status enum
//! - `phase` - Phase kinds, phase sets and phase handler results
//! - `script` - Value/step/resume types exchanged with the VM
//! - `cleanup` - Scoped-resource cleanup chain
//! - `error` - Error types
//! - `traits` - VM and host event-loop traits
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

#![allow(dead_code)]

pub mod id;
pub mod status;
pub mod phase;
pub mod script;
pub mod cleanup;
pub mod error;
pub mod traits;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::{ConnId, SemId, SocketHandle, ThreadId, WaitId};
pub use status::ThreadStatus;
pub use phase::{Phase, PhaseResult, PhaseSet};
pub use script::{FinalStatus, PeerAddr, Resume, Step, Value, WaitFor, WakeEvent};
pub use cleanup::{CleanupChain, CleanupHandle, CleanupReason};
pub use error::{CoreError, CoreResult};
pub use traits::{EventKind, HostEvents, ScriptVm, VmThread};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

/// Engine-wide constants
pub mod constants {
    /// Default maximum script threads per connection (entry + user threads)
    pub const DEFAULT_MAX_THREADS: usize = 128;

    /// Default maximum pending waits per connection
    pub const DEFAULT_MAX_WAITS: usize = 256;

    /// Default upper bound on balancer retry budget adjustments
    pub const DEFAULT_MAX_BALANCER_TRIES: u32 = 16;

    /// No thread sentinel value
    pub const THREAD_NONE: u32 = u32::MAX;

    /// No connection sentinel value (used by the worker-init phase)
    pub const CONN_NONE: u64 = u64::MAX;
}
