//! Correlation-id allocation.
//!
//! The simulator API wants process-unique request ids. Instead of a bare
//! shared static counter, each id category gets its own allocator with an
//! explicit range and an explicit lifetime (owned by whoever hands out the
//! ids, typically the connection manager).

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Diagnostic identifier stamped on each connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(u32);

impl CorrelationId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.0)
    }
}

/// Monotonic id allocator over a fixed range.
///
/// Ids are handed out in order and wrap back to the start of the range when
/// it is exhausted; within one wrap they are unique.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
    start: u32,
    span: u32,
}

impl IdAllocator {
    /// Allocator over `[start, end)`. An empty range degenerates to a
    /// single-id range.
    pub fn new(start: u32, end: u32) -> Self {
        let span = end.saturating_sub(start).max(1);
        Self { next: AtomicU32::new(0), start, span }
    }

    /// Range reserved for connection-attempt correlation ids.
    pub fn connection_attempts() -> Self {
        Self::new(0x0000_0001, 0x1000_0000)
    }

    /// Range reserved for client-defined request ids, disjoint from the
    /// connection range so gateway diagnostics never collide.
    pub fn client_defined() -> Self {
        Self::new(0x1000_0000, 0x2000_0000)
    }

    pub fn allocate(&self) -> CorrelationId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationId(self.start + n % self.span)
    }
}
