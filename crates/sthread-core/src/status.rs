//! Script-thread status type

use core::fmt;

/// Status of a script thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadStatus {
    /// Just created, never resumed
    Created = 0,

    /// Currently executing a VM step
    Running = 1,

    /// Yielded, waiting on a suspension-registry entry
    Suspended = 2,

    /// Waiting on a child it resumed via join
    Normal = 3,

    /// Finished; exit value reaped or nobody will reap it
    Dead = 4,

    /// Finished but its exit value / children not yet reaped by a parent
    Zombie = 5,
}

impl ThreadStatus {
    /// Check if this status allows the thread to be resumed
    ///
    /// Resuming a thread in any other status is an internal-consistency
    /// error, never recoverable.
    #[inline]
    pub const fn is_resumable(&self) -> bool {
        matches!(self, ThreadStatus::Created | ThreadStatus::Suspended)
    }

    /// Check if this thread has finished (reaped or not)
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ThreadStatus::Dead | ThreadStatus::Zombie)
    }

    /// Check if this thread is blocked on something external or a child
    #[inline]
    pub const fn is_waiting(&self) -> bool {
        matches!(self, ThreadStatus::Suspended | ThreadStatus::Normal)
    }
}

impl From<u8> for ThreadStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => ThreadStatus::Created,
            1 => ThreadStatus::Running,
            2 => ThreadStatus::Suspended,
            3 => ThreadStatus::Normal,
            4 => ThreadStatus::Dead,
            5 => ThreadStatus::Zombie,
            _ => ThreadStatus::Dead, // Default for invalid values
        }
    }
}

impl From<ThreadStatus> for u8 {
    fn from(s: ThreadStatus) -> u8 {
        s as u8
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadStatus::Created => write!(f, "created"),
            ThreadStatus::Running => write!(f, "running"),
            ThreadStatus::Suspended => write!(f, "suspended"),
            ThreadStatus::Normal => write!(f, "normal"),
            ThreadStatus::Dead => write!(f, "dead"),
            ThreadStatus::Zombie => write!(f, "zombie"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resumable() {
        assert!(ThreadStatus::Created.is_resumable());
        assert!(ThreadStatus::Suspended.is_resumable());
        assert!(!ThreadStatus::Running.is_resumable());
        assert!(!ThreadStatus::Normal.is_resumable());
        assert!(!ThreadStatus::Dead.is_resumable());
        assert!(!ThreadStatus::Zombie.is_resumable());
    }

    #[test]
    fn test_terminal() {
        assert!(ThreadStatus::Dead.is_terminal());
        assert!(ThreadStatus::Zombie.is_terminal());
        assert!(!ThreadStatus::Suspended.is_terminal());
        assert!(!ThreadStatus::Running.is_terminal());
    }

    #[test]
    fn test_waiting() {
        assert!(ThreadStatus::Suspended.is_waiting());
        assert!(ThreadStatus::Normal.is_waiting());
        assert!(!ThreadStatus::Created.is_waiting());
    }

    #[test]
    fn test_u8_round_trip() {
        for s in [
            ThreadStatus::Created,
            ThreadStatus::Running,
            ThreadStatus::Suspended,
            ThreadStatus::Normal,
            ThreadStatus::Dead,
            ThreadStatus::Zombie,
        ] {
            assert_eq!(ThreadStatus::from(u8::from(s)), s);
        }
        assert_eq!(ThreadStatus::from(99u8), ThreadStatus::Dead);
    }
}
