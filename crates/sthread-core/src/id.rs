//! Identifier types for threads, connections, waits and sockets

use core::fmt;

/// Unique identifier for a script thread within one connection
///
/// This is a 32-bit value indexing into the connection's thread table.
/// The maximum value (u32::MAX) is reserved as a sentinel for "no thread".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ThreadId(u32);

impl ThreadId {
    /// Sentinel value indicating no thread
    pub const NONE: ThreadId = ThreadId(u32::MAX);

    /// Create a new ThreadId from a raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        ThreadId(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Check if this is a valid thread ID
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != u32::MAX
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<ThreadId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<u32> for ThreadId {
    #[inline]
    fn from(id: u32) -> Self {
        ThreadId(id)
    }
}

impl From<ThreadId> for u32 {
    #[inline]
    fn from(id: ThreadId) -> Self {
        id.0
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "ThreadId(NONE)")
        } else {
            write!(f, "ThreadId({})", self.0)
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        ThreadId::NONE
    }
}

/// Opaque handle for one proxied connection, assigned by the host
///
/// The engine never interprets the value; it only keys the connection
/// table with it. The maximum value is the sentinel used by the
/// worker-init phase, which has no connection.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ConnId(u64);

impl ConnId {
    /// Sentinel value indicating no connection (worker-init phase)
    pub const NONE: ConnId = ConnId(u64::MAX);

    /// Create a new ConnId from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        ConnId(id)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }
}

impl From<u64> for ConnId {
    #[inline]
    fn from(id: u64) -> Self {
        ConnId(id)
    }
}

impl fmt::Debug for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "ConnId(NONE)")
        } else {
            write!(f, "ConnId({})", self.0)
        }
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Identifier for one pending wait in the suspension registry
///
/// Allocated by the engine, handed to the host when a callback is
/// registered, and handed back when the event fires.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct WaitId(u64);

impl WaitId {
    /// Create a new WaitId from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        WaitId(id)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WaitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Opaque socket handle owned by the host
///
/// Scripts wait on readability/writability of these; the engine only
/// forwards the handle to the host's callback registration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct SocketHandle(u64);

impl SocketHandle {
    /// Create a new SocketHandle from a raw value
    #[inline]
    pub const fn new(raw: u64) -> Self {
        SocketHandle(raw)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Identifier for a per-connection semaphore, chosen by the script
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct SemId(u32);

impl SemId {
    /// Create a new SemId from a raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        SemId(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_basics() {
        let id = ThreadId::new(7);
        assert_eq!(id.as_u32(), 7);
        assert_eq!(id.as_usize(), 7);
        assert!(id.is_some());
        assert!(!id.is_none());
    }

    #[test]
    fn test_thread_id_none() {
        let none = ThreadId::NONE;
        assert!(none.is_none());
        assert!(!none.is_some());
        assert_eq!(none.to_option(), None);
        assert_eq!(ThreadId::default(), ThreadId::NONE);
    }

    #[test]
    fn test_thread_id_conversions() {
        let id: ThreadId = 100u32.into();
        let raw: u32 = id.into();
        assert_eq!(raw, 100);
    }

    #[test]
    fn test_conn_id_sentinel() {
        assert!(ConnId::NONE.is_none());
        assert!(!ConnId::new(0).is_none());
        assert_eq!(format!("{}", ConnId::new(42)), "42");
        assert_eq!(format!("{}", ConnId::NONE), "none");
    }

    #[test]
    fn test_wait_id_display() {
        assert_eq!(format!("{}", WaitId::new(5)), "w5");
    }
}
