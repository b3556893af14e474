//! Phase simulation example
//!
//! Drives one simulated connection through preread, content (with a
//! spawned helper thread and a socket wait), peer selection and the log
//! phase, firing host events by hand.
//!
//! # Environment Variables
//!
//! - `STH_FLUSH_EPRINT=1` - Flush debug output immediately
//! - `STH_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use sthread::{
    kinfo, sim_engine, stage, ConnId, PeerAddr, Phase, PhaseResult, Resume, ScriptedThread,
    SocketHandle, Step, Value, WaitFor,
};
use std::time::Duration;

// STH_LOG_LEVEL=debug STH_FLUSH_EPRINT=1 cargo run -p sthread-phasesim
fn main() {
    println!("=== SThread Phase Simulation ===\n");

    let mut engine = sim_engine().expect("invalid STH_* configuration");

    engine.vm_mut().bind(Phase::Preread, || {
        ScriptedThread::once(|_| {
            kinfo!("preread script ran");
            Step::Return(Value::Unit)
        })
    });

    engine.vm_mut().bind(Phase::Content, || {
        ScriptedThread::new(vec![
            stage(|_| {
                kinfo!("content script: spawning helper");
                let helper = ScriptedThread::new(vec![
                    stage(|_| Step::Yield(WaitFor::SocketReadable(SocketHandle::new(4)))),
                    stage(|_| {
                        kinfo!("helper: upstream readable, done");
                        Step::Return(Value::Str("payload".into()))
                    }),
                ]);
                Step::Spawn(Box::new(helper))
            }),
            stage(|input| match input {
                Resume::Spawned(child) => {
                    kinfo!("content script: joining helper {}", child);
                    Step::Yield(WaitFor::Join(child))
                }
                other => Step::Error(format!("unexpected input {:?}", other)),
            }),
            stage(|input| match input {
                Resume::JoinDone(Ok(value)) => {
                    kinfo!("content script: helper returned {:?}", value);
                    Step::Yield(WaitFor::Timer(Duration::from_millis(50)))
                }
                other => Step::Error(format!("unexpected join result {:?}", other)),
            }),
            stage(|_| Step::Return(Value::Unit)),
        ])
    });

    engine.vm_mut().bind(Phase::Balancer, || {
        ScriptedThread::once(|_| {
            Step::Return(Value::Peer(PeerAddr::new("10.0.0.7:8443").with_more_tries(2)))
        })
    });

    engine.vm_mut().bind(Phase::Log, || {
        ScriptedThread::once(|_| {
            kinfo!("log script ran");
            Step::Return(Value::Unit)
        })
    });

    let conn = ConnId::new(1);

    println!("preread  -> {}", engine.handle_phase(conn, Phase::Preread));

    let peer = engine.select_peer(conn);
    println!("balancer -> {:?}", peer);
    println!("retry?      {}", engine.record_failure(conn, "connect refused"));

    let mut result = engine.handle_phase(conn, Phase::Content);
    println!("content  -> {}", result);

    // Play the host event loop: fire whatever the engine registered
    // until the phase settles.
    while result == PhaseResult::Continue {
        let reg = engine
            .host()
            .first_pending(conn)
            .expect("continue with no registered events");
        println!("  firing {:?} ({})", reg.event, reg.wait);
        engine.host().consume(reg.wait);
        match engine.event_fired(conn, reg.wait) {
            Some(r) => result = r,
            None => break,
        }
    }
    println!("content  -> {}", result);

    println!("log      -> {}", engine.handle_phase(conn, Phase::Log));

    engine.finalize(conn, sthread::FinalStatus::Ok);
    println!("\nconnections remaining: {}", engine.conn_count());
    println!("\n=== Simulation Complete ===");
}
