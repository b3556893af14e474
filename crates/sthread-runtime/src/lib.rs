//! # sthread-runtime
//!
//! Runtime implementation of the script-thread phase engine.
//!
//! This crate provides:
//! - Connection contexts with cleanup chains and per-phase state
//! - The script-thread table and the FIFO ready queue
//! - The suspension registry mirroring host callback registrations
//! - Phase handlers and the synchronous balancer adapter
//! - Scripted VM threads and a recording host for tests and demos

pub mod balancer;
pub mod config;
pub mod conn;
pub mod engine;
pub mod phases;
pub mod registry;
pub mod scripted;
pub mod semaphore;
pub mod sim;
pub mod thread;

mod sched;

// Re-exports
pub use balancer::{BalancerSlot, PeerChoice};
pub use config::EngineConfig;
pub use conn::{ConnContext, ConnState};
pub use engine::PhaseEngine;
pub use registry::{PendingWait, SuspensionRegistry, WaitKind};
pub use scripted::{stage, ScriptedThread, ScriptedVm, Stage};
pub use semaphore::SemState;
pub use sim::{Registration, SimHost};
pub use thread::{Outcome, ScriptThread, ThreadTable};
