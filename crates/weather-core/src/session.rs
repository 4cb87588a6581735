//! Per-connection session storage
//!
//! Every HTTP connection may own one [`Session`] holding the accumulator
//! counter. Sessions are leased from a bounded [`SessionPool`] and handed
//! back when the lease is dropped, whichever way the connection ends.

use core::fmt;

use log::{debug, warn};
use portable_atomic::{AtomicU32, AtomicUsize, Ordering};
use thiserror_no_std::Error;

use crate::config::MAX_SESSIONS;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("session pool exhausted ({capacity} sessions in use)")]
    PoolExhausted { capacity: usize },
}

/// Bounded pool of session slots.
pub struct SessionPool {
    in_use: AtomicUsize,
    capacity: usize,
}

impl SessionPool {
    pub const fn new() -> Self {
        Self::with_capacity(MAX_SESSIONS)
    }

    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            in_use: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Lease one slot. The counter starts at `initial`.
    pub fn acquire(&self, initial: i32) -> Result<Session<'_>, SessionError> {
        let taken = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            });
        match taken {
            Ok(previous) => {
                debug!("session opened ({}/{})", previous + 1, self.capacity);
                Ok(Session {
                    pool: self,
                    counter: initial,
                })
            }
            Err(_) => {
                warn!("no free session slot ({} in use)", self.capacity);
                Err(SessionError::PoolExhausted {
                    capacity: self.capacity,
                })
            }
        }
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulator state of one connection.
pub struct Session<'a> {
    pool: &'a SessionPool,
    counter: i32,
}

impl Session<'_> {
    pub fn counter(&self) -> i32 {
        self.counter
    }

    /// `POST` semantics: add to the counter.
    pub fn accumulate(&mut self, value: i32) -> i32 {
        self.counter = self.counter.saturating_add(value);
        self.counter
    }

    /// `PUT` semantics: replace the counter.
    pub fn set(&mut self, value: i32) -> i32 {
        self.counter = value;
        self.counter
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("counter", &self.counter)
            .finish()
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
        debug!("session closed (counter {})", self.counter);
    }
}

/// Parse a request body the way C `atoi` does.
///
/// Leading ASCII whitespace and one optional sign are skipped, then digits
/// are consumed up to the first non-digit. Anything without digits is 0.
/// Out-of-range values saturate.
pub fn parse_lenient_int(body: &[u8]) -> i32 {
    let mut rest = body;
    while let [first, tail @ ..] = rest {
        if !first.is_ascii_whitespace() {
            break;
        }
        rest = tail;
    }

    let negative = match rest.first() {
        Some(b'-') => {
            rest = &rest[1..];
            true
        }
        Some(b'+') => {
            rest = &rest[1..];
            false
        }
        _ => false,
    };

    let mut value: i32 = 0;
    for digit in rest.iter().take_while(|b| b.is_ascii_digit()) {
        let d = i32::from(digit - b'0');
        value = if negative {
            value.saturating_mul(10).saturating_sub(d)
        } else {
            value.saturating_mul(10).saturating_add(d)
        };
    }
    value
}

/// Number of page views, shared by the page route.
pub struct VisitorCounter(AtomicU32);

impl VisitorCounter {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Count one visit and return the new total.
    pub fn visit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    pub fn total(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for VisitorCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lenient_int() {
        assert_eq!(parse_lenient_int(b"5"), 5);
        assert_eq!(parse_lenient_int(b"  -42"), -42);
        assert_eq!(parse_lenient_int(b"+7"), 7);
        assert_eq!(parse_lenient_int(b"\r\n 12abc"), 12);
        assert_eq!(parse_lenient_int(b"abc"), 0);
        assert_eq!(parse_lenient_int(b""), 0);
        assert_eq!(parse_lenient_int(b"-"), 0);
        assert_eq!(parse_lenient_int(b"- 3"), 0);
        assert_eq!(parse_lenient_int(b"99999999999"), i32::MAX);
        assert_eq!(parse_lenient_int(b"-99999999999"), i32::MIN);
    }

    #[test]
    fn test_session_arithmetic() {
        let pool = SessionPool::with_capacity(1);
        let mut session = pool.acquire(0).unwrap();
        assert_eq!(session.accumulate(5), 5);
        assert_eq!(session.accumulate(3), 8);
        assert_eq!(session.set(2), 2);
        assert_eq!(session.accumulate(-10), -8);

        session.set(i32::MAX);
        assert_eq!(session.accumulate(1), i32::MAX);
    }

    #[test]
    fn test_pool_exhaustion_and_release() {
        let pool = SessionPool::with_capacity(2);
        let a = pool.acquire(0).unwrap();
        let b = pool.acquire(1).unwrap();
        assert_eq!(pool.in_use(), 2);
        assert_eq!(
            pool.acquire(0).unwrap_err(),
            SessionError::PoolExhausted { capacity: 2 }
        );

        drop(a);
        assert_eq!(pool.in_use(), 1);
        let c = pool.acquire(0).unwrap();
        assert_eq!(c.counter(), 0);
        assert_eq!(b.counter(), 1);

        drop(b);
        drop(c);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_visitor_counter() {
        let visitors = VisitorCounter::new();
        assert_eq!(visitors.visit(), 1);
        assert_eq!(visitors.visit(), 2);
        assert_eq!(visitors.total(), 2);
    }
}
