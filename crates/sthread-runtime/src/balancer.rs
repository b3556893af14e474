//! Balancer adapter
//!
//! Upstream peer selection runs a balancer script synchronously: the
//! entry thread must produce its step chain without ever suspending, and
//! the chosen peer is parked in a single engine-wide slot. The slot is
//! safe to share because the engine is single-threaded and peer
//! selection is never re-entered; each `select_peer` call overwrites it
//! before the host reads it back.

use sthread_core::id::{ConnId, ThreadId};
use sthread_core::kprint;
use sthread_core::phase::Phase;
use sthread_core::script::{PeerAddr, Resume, Value};
use sthread_core::traits::{HostEvents, ScriptVm};
use sthread_core::{kdebug, kerror, kwarn};

use crate::conn::ConnState;
use crate::engine::PhaseEngine;
use crate::thread::ScriptThread;

/// The engine-wide peer slot
#[derive(Debug, Default)]
pub struct BalancerSlot {
    peer: Option<PeerAddr>,
    tries_used: u32,
    last_failure: Option<String>,
}

/// What peer selection decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerChoice {
    /// Use this peer instead of the configured upstream
    Override(PeerAddr),
    /// No override; the host falls back to its configured balancing
    Fallthrough,
    /// The balancer script failed
    Failed(String),
}

impl<V: ScriptVm, H: HostEvents> PhaseEngine<V, H> {
    /// Run the balancer script and fill the peer slot
    ///
    /// Synchronous by contract: a script that tries to suspend is killed
    /// and selection fails. A fresh entry thread is created per call, so
    /// retries re-run the script.
    pub fn select_peer(&mut self, conn: ConnId) -> PeerChoice {
        kprint::set_conn_id(conn.as_u64());
        kprint::set_phase(Phase::Balancer.name());
        let choice = self.select_peer_inner(conn);
        kprint::clear_phase();
        kprint::clear_conn_id();
        choice
    }

    fn select_peer_inner(&mut self, conn: ConnId) -> PeerChoice {
        self.balancer.peer = None;
        self.balancer.tries_used = 0;

        let mut cx = self.take_conn(conn);
        if !matches!(cx.state, ConnState::Initial) {
            kerror!("peer selection with connection in state {:?}", cx.state);
            self.put_conn(cx);
            return PeerChoice::Failed("connection is not between phases".into());
        }

        let entry_vm = match self.vm.entry_thread(Phase::Balancer) {
            Ok(Some(vm)) => vm,
            Ok(None) => {
                self.put_conn(cx);
                return PeerChoice::Fallthrough;
            }
            Err(e) => {
                kerror!("balancer entry thread creation failed: {}", e);
                self.put_conn(cx);
                return PeerChoice::Failed(e.to_string());
            }
        };
        let entry = match cx.threads.alloc(ScriptThread::new(entry_vm, ThreadId::NONE)) {
            Ok(id) => id,
            Err(e) => {
                self.put_conn(cx);
                return PeerChoice::Failed(e.to_string());
            }
        };
        cx.entry = entry;
        cx.state = ConnState::InPhase(Phase::Balancer);

        // A re-selection after record_failure starts the script with the
        // recorded failure so it can pick differently.
        let input = match self.balancer.last_failure.take() {
            Some(reason) => Resume::Retry(reason),
            None => Resume::Start,
        };
        self.step_thread(&mut cx, entry, input);
        self.drain_ready(&mut cx);

        if let Some(status) = cx.exit_status {
            // A script-requested exit ends the connection even here.
            self.finalize_ctx(&mut cx, status);
            self.put_conn(cx);
            return PeerChoice::Failed(format!("script exited: {}", status));
        }

        let choice = match cx.entry_outcome.take() {
            Some(Ok(Value::Peer(mut peer))) => {
                if peer.more_tries > self.config.max_balancer_tries {
                    kwarn!(
                        "requested {} retries, capped at {}",
                        peer.more_tries,
                        self.config.max_balancer_tries
                    );
                    peer.more_tries = self.config.max_balancer_tries;
                }
                kdebug!("peer override: {}", peer.addr);
                self.balancer.peer = Some(peer.clone());
                PeerChoice::Override(peer)
            }
            Some(Ok(_)) => PeerChoice::Fallthrough,
            Some(Err(msg)) => {
                kerror!("balancer script failed: {}", msg);
                PeerChoice::Failed(msg)
            }
            None => PeerChoice::Failed("balancer script did not complete".into()),
        };

        cx.phase_completed();
        self.put_conn(cx);
        choice
    }

    /// A connect attempt to the chosen peer failed
    ///
    /// Consumes one retry from the script-requested budget; returns
    /// whether the host should run selection again. `outcome` describes
    /// the failure and is delivered to the script on re-selection.
    pub fn record_failure(&mut self, conn: ConnId, outcome: &str) -> bool {
        let Some(peer) = &self.balancer.peer else {
            return false;
        };
        if self.balancer.tries_used < peer.more_tries {
            self.balancer.tries_used += 1;
            kdebug!(
                "connect to {} failed on {}: {} (retry {}/{})",
                peer.addr,
                conn,
                outcome,
                self.balancer.tries_used,
                peer.more_tries
            );
            self.balancer.last_failure = Some(outcome.to_string());
            true
        } else {
            false
        }
    }

    /// The peer currently parked in the slot
    pub fn current_peer(&self) -> Option<&PeerAddr> {
        self.balancer.peer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::scripted::{stage, ScriptedThread, ScriptedVm};
    use crate::sim::SimHost;
    use sthread_core::script::{Step, WaitFor};
    use std::time::Duration;

    fn engine() -> PhaseEngine<ScriptedVm, SimHost> {
        PhaseEngine::new(ScriptedVm::new(), SimHost::new())
    }

    #[test]
    fn test_fallthrough_when_unbound() {
        let mut eng = engine();
        assert_eq!(eng.select_peer(ConnId::new(1)), PeerChoice::Fallthrough);
        assert!(eng.current_peer().is_none());
    }

    #[test]
    fn test_peer_override() {
        let mut eng = engine();
        eng.vm_mut().bind(Phase::Balancer, || {
            ScriptedThread::once(|_| {
                Step::Return(Value::Peer(PeerAddr::new("10.0.0.7:8443").with_more_tries(1)))
            })
        });
        let choice = eng.select_peer(ConnId::new(1));
        let PeerChoice::Override(peer) = choice else {
            panic!("expected override, got {:?}", choice);
        };
        assert_eq!(peer.addr, "10.0.0.7:8443");
        assert_eq!(eng.current_peer().unwrap().addr, "10.0.0.7:8443");
    }

    #[test]
    fn test_non_peer_return_falls_through() {
        let mut eng = engine();
        eng.vm_mut().bind(Phase::Balancer, || {
            ScriptedThread::once(|_| Step::Return(Value::Unit))
        });
        assert_eq!(eng.select_peer(ConnId::new(1)), PeerChoice::Fallthrough);
    }

    #[test]
    fn test_suspension_rejected() {
        let mut eng = engine();
        eng.vm_mut().bind(Phase::Balancer, || {
            ScriptedThread::new(vec![
                stage(|_| Step::Yield(WaitFor::Timer(Duration::from_millis(1)))),
                stage(|_| Step::Return(Value::Unit)),
            ])
        });
        let choice = eng.select_peer(ConnId::new(1));
        assert!(matches!(choice, PeerChoice::Failed(_)));
        assert!(eng.host().registrations().is_empty());
        // The connection survives a failed selection
        assert_eq!(eng.conn_count(), 1);
    }

    #[test]
    fn test_retry_budget_clamped() {
        let vm = {
            let mut vm = ScriptedVm::new();
            vm.bind(Phase::Balancer, || {
                ScriptedThread::once(|_| {
                    Step::Return(Value::Peer(PeerAddr::new("10.0.0.1:80").with_more_tries(50)))
                })
            });
            vm
        };
        let config = EngineConfig::new().max_balancer_tries(2);
        let mut eng = PhaseEngine::with_config(vm, SimHost::new(), config).unwrap();

        let PeerChoice::Override(peer) = eng.select_peer(ConnId::new(1)) else {
            panic!("expected override");
        };
        assert_eq!(peer.more_tries, 2);

        let cid = ConnId::new(1);
        assert!(eng.record_failure(cid, "connect timed out"));
        assert!(eng.record_failure(cid, "connect timed out"));
        assert!(!eng.record_failure(cid, "connect timed out"));
    }

    #[test]
    fn test_record_failure_without_peer() {
        let mut eng = engine();
        assert!(!eng.record_failure(ConnId::new(1), "connect refused"));
    }

    #[test]
    fn test_retry_carries_failure_reason() {
        // After a recorded failure the script is re-run with the failure
        // description as its input and can pick a different peer.
        let mut eng = engine();
        eng.vm_mut().bind(Phase::Balancer, || {
            ScriptedThread::once(|input| match input {
                Resume::Retry(reason) => {
                    assert_eq!(reason, "connect refused");
                    Step::Return(Value::Peer(PeerAddr::new("10.0.0.2:80")))
                }
                _ => Step::Return(Value::Peer(PeerAddr::new("10.0.0.1:80").with_more_tries(1))),
            })
        });
        let cid = ConnId::new(1);

        let PeerChoice::Override(first) = eng.select_peer(cid) else {
            panic!("expected override");
        };
        assert_eq!(first.addr, "10.0.0.1:80");

        assert!(eng.record_failure(cid, "connect refused"));
        let PeerChoice::Override(second) = eng.select_peer(cid) else {
            panic!("expected override");
        };
        assert_eq!(second.addr, "10.0.0.2:80");
    }

    #[test]
    fn test_slot_overwritten_per_selection() {
        // Selections for different connections never see each other's
        // peer: each call rewrites the slot before the host reads it.
        use std::cell::Cell;
        use std::rc::Rc;

        let counter = Rc::new(Cell::new(0u32));
        let mut eng = engine();
        let c = Rc::clone(&counter);
        eng.vm_mut().bind(Phase::Balancer, move || {
            let n = c.get() + 1;
            c.set(n);
            ScriptedThread::once(move |_| {
                Step::Return(Value::Peer(PeerAddr::new(format!("10.0.0.{}:80", n))))
            })
        });

        let PeerChoice::Override(p1) = eng.select_peer(ConnId::new(1)) else {
            panic!("expected override");
        };
        assert_eq!(p1.addr, "10.0.0.1:80");
        assert_eq!(eng.current_peer().unwrap().addr, "10.0.0.1:80");

        let PeerChoice::Override(p2) = eng.select_peer(ConnId::new(2)) else {
            panic!("expected override");
        };
        assert_eq!(p2.addr, "10.0.0.2:80");
        assert_eq!(eng.current_peer().unwrap().addr, "10.0.0.2:80");
    }
}
