//! # sthread - Script Threads for Stream Proxy Phases
//!
//! Cooperative scheduling of scripting-VM threads inside a stream
//! (TCP/UDP) proxy. The host event loop calls in at named phases
//! (preread, content, log, balancer, TLS callbacks, worker-init); the
//! engine runs script threads until every one of them is parked on a
//! registered event, then returns. No OS threads, no blocking: every
//! wait is a callback registration with the host.
//!
//! ## Quick Start
//!
//! ```ignore
//! use sthread::{PhaseEngine, EngineConfig, Phase, PhaseResult, ConnId};
//!
//! // `vm` implements ScriptVm, `host` implements HostEvents.
//! let mut engine = PhaseEngine::with_config(vm, host, EngineConfig::from_env())?;
//!
//! // Host event loop, on a new connection reaching the content phase:
//! match engine.handle_phase(ConnId::new(raw), Phase::Content) {
//!     PhaseResult::Done => { /* proceed to the next phase */ }
//!     PhaseResult::Continue => { /* threads parked; resume on event_fired */ }
//!     PhaseResult::Declined => { /* no script bound */ }
//!     other => { /* error or re-invocation request */ }
//! }
//!
//! // Later, when a registered callback fires:
//! engine.event_fired(conn, wait);
//!
//! // On connection close:
//! engine.finalize(conn, sthread::FinalStatus::Ok);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Host Event Loop                           │
//! │       handle_phase(), event_fired(), finalize()             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Phase Engine                            │
//! │   phase table, balancer peer slot, wait-id allocation       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌────────────┐
//!    │  Thread   │      │   Ready   │      │ Suspension │
//!    │  Table    │      │   Queue   │      │  Registry  │
//!    └───────────┘      └───────────┘      └────────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │                  Scripting VM                           │
//!    │      resume(input) -> step, behind the VmThread trait   │
//!    └─────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use sthread_core::{
    CleanupChain, CleanupHandle, CleanupReason, ConnId, CoreError, CoreResult, EventKind,
    FinalStatus, HostEvents, PeerAddr, Phase, PhaseResult, PhaseSet, Resume, ScriptVm, SemId,
    SocketHandle, Step, ThreadId, ThreadStatus, Value, VmThread, WaitFor, WaitId, WakeEvent,
};

// Re-export kprint macros for debug logging
pub use sthread_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};
pub use sthread_core::kprint::{init as init_logging, set_flush_enabled, set_log_level, LogLevel};

// Re-export env utilities
pub use sthread_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use sthread_runtime::{
    stage, ConnState, EngineConfig, PeerChoice, PhaseEngine, Registration, ScriptedThread,
    ScriptedVm, SimHost, WaitKind,
};

/// Engine wired to the scripted VM and the recording host
///
/// The configuration demo binaries and integration tests use; real
/// deployments substitute their own `ScriptVm` and `HostEvents`
/// implementations.
pub type SimEngine = PhaseEngine<ScriptedVm, SimHost>;

/// Build a `SimEngine` from `STH_*` environment variables
pub fn sim_engine() -> Result<SimEngine, &'static str> {
    PhaseEngine::with_config(ScriptedVm::new(), SimHost::new(), EngineConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_engine_builds() {
        let eng = sim_engine().unwrap();
        assert_eq!(eng.conn_count(), 0);
    }

    #[test]
    fn test_facade_reexports() {
        // Spot checks that the public surface is wired together
        let _ = Phase::Content.may_suspend();
        let _ = ThreadStatus::Suspended.is_resumable();
        let _ = EngineConfig::new().validate();
    }
}
