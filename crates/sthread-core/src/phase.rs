//! Phase kinds, phase sets and phase handler results
//!
//! A phase is a named point in stream processing where scripted logic may
//! run. Each phase carries one structural capability: whether script
//! threads are allowed to suspend while it is active. The capability is
//! part of the phase table, not scattered checks.

use core::fmt;

/// Named entry points of stream processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Pre-data inspection of the client connection
    Preread = 0,

    /// Content handling (the main body of the proxied session)
    Content = 1,

    /// Post-connection logging
    Log = 2,

    /// Upstream peer override; synchronous, must never suspend
    Balancer = 3,

    /// TLS client-hello callback
    SslClientHello = 4,

    /// TLS certificate callback
    SslCert = 5,

    /// Worker-process startup; no connection, must never suspend
    WorkerInit = 6,
}

impl Phase {
    /// Number of phase kinds
    pub const COUNT: usize = 7;

    /// Human-readable phase name, used in log records
    pub const fn name(&self) -> &'static str {
        match self {
            Phase::Preread => "preread",
            Phase::Content => "content",
            Phase::Log => "log",
            Phase::Balancer => "balancer",
            Phase::SslClientHello => "ssl_client_hello",
            Phase::SslCert => "ssl_certificate",
            Phase::WorkerInit => "worker_init",
        }
    }

    /// Check whether script threads may suspend while this phase is active
    ///
    /// Peer selection and worker startup are synchronous by contract; a
    /// suspension attempt there is an internal-consistency error.
    #[inline]
    pub const fn may_suspend(&self) -> bool {
        SUSPENDABLE.contains(*self)
    }

    /// Check whether this phase runs without a connection
    #[inline]
    pub const fn is_connectionless(&self) -> bool {
        matches!(self, Phase::WorkerInit)
    }

    /// Get phase as index (0 = Preread, 6 = WorkerInit)
    #[inline]
    pub const fn as_index(&self) -> usize {
        *self as usize
    }

    /// Get phase from index
    #[inline]
    pub const fn from_index(idx: usize) -> Option<Phase> {
        match idx {
            0 => Some(Phase::Preread),
            1 => Some(Phase::Content),
            2 => Some(Phase::Log),
            3 => Some(Phase::Balancer),
            4 => Some(Phase::SslClientHello),
            5 => Some(Phase::SslCert),
            6 => Some(Phase::WorkerInit),
            _ => None,
        }
    }

    /// Iterator over all phases in processing order
    pub fn iter() -> impl Iterator<Item = Phase> {
        [
            Phase::Preread,
            Phase::Content,
            Phase::Log,
            Phase::Balancer,
            Phase::SslClientHello,
            Phase::SslCert,
            Phase::WorkerInit,
        ]
        .into_iter()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Set of phases, one bit per kind
///
/// Used for capability tables and context gating ("this operation is
/// valid in phases X|Y").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PhaseSet(u8);

/// Phases whose scripts may suspend
pub const SUSPENDABLE: PhaseSet = PhaseSet::EMPTY
    .with(Phase::Preread)
    .with(Phase::Content)
    .with(Phase::Log)
    .with(Phase::SslClientHello)
    .with(Phase::SslCert);

impl PhaseSet {
    /// The empty set
    pub const EMPTY: PhaseSet = PhaseSet(0);

    /// All phases
    pub const ALL: PhaseSet = PhaseSet((1 << Phase::COUNT) - 1);

    /// Return a copy of this set with `phase` added
    #[inline]
    pub const fn with(self, phase: Phase) -> PhaseSet {
        PhaseSet(self.0 | (1 << phase as u8))
    }

    /// Return a copy of this set with `phase` removed
    #[inline]
    pub const fn without(self, phase: Phase) -> PhaseSet {
        PhaseSet(self.0 & !(1 << phase as u8))
    }

    /// Check membership
    #[inline]
    pub const fn contains(self, phase: Phase) -> bool {
        self.0 & (1 << phase as u8) != 0
    }

    /// Check if the set is empty
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of phases in the set
    #[inline]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }
}

impl Default for PhaseSet {
    fn default() -> Self {
        PhaseSet::EMPTY
    }
}

/// Result of one phase handler invocation, returned to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseResult {
    /// Threads still pending; re-invoke when a registered event fires
    Continue,

    /// Phase completed successfully
    Done,

    /// Phase failed; the connection was finalized with a failure status
    Error,

    /// No script bound for this phase
    Declined,

    /// More external data (or a later slot in the phase chain) is needed
    Again,
}

impl PhaseResult {
    /// Check if this result ends the phase (no re-invocation expected)
    #[inline]
    pub const fn is_final(&self) -> bool {
        matches!(self, PhaseResult::Done | PhaseResult::Error | PhaseResult::Declined)
    }
}

impl fmt::Display for PhaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseResult::Continue => write!(f, "continue"),
            PhaseResult::Done => write!(f, "done"),
            PhaseResult::Error => write!(f, "error"),
            PhaseResult::Declined => write!(f, "declined"),
            PhaseResult::Again => write!(f, "again"),
        }
    }
}
