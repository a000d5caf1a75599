//! Thread-safe serial counter for outgoing frames.
//!
//! # What is a serial? (for beginners)
//!
//! Every frame written to an input-context socket carries a 64-bit *serial*
//! in its header. Most calls are fire-and-forget and nobody looks at the
//! serial again. The exception is the preedit-rectangle query: the server
//! remembers the serial of the query it sent, and the input context echoes
//! that serial in its reply header so the server can match the answer to the
//! waiting caller, even if other frames arrived in between.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU64` internally, so a channel can hand out serials
//! from several tasks at once without a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, monotonically increasing counter for frame serials.
///
/// Serials start at 0 and increment by 1 with each call to [`next`].
/// The counter wraps around at `u64::MAX` back to 0 without panicking.
///
/// [`next`]: SequenceCounter::next
///
/// # Examples
///
/// ```rust
/// use imserver_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next serial and atomically increments the counter.
    ///
    /// `Ordering::Relaxed` is enough: serials only need to be unique per
    /// channel, they do not publish any other memory.
    pub fn next(&self) -> u64 {
        // fetch_add returns the previous value and wraps on overflow.
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the serial the next call to [`next`](Self::next) will hand out.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequence_counter_starts_at_zero() {
        // Arrange
        let counter = SequenceCounter::new();

        // Act
        let first = counter.next();

        // Assert
        assert_eq!(first, 0);
    }

    #[test]
    fn test_sequence_counter_wraps_at_u64_max() {
        // Arrange – start the counter one step before overflow
        let counter = SequenceCounter {
            inner: AtomicU64::new(u64::MAX),
        };

        // Act
        let before_wrap = counter.next();
        let after_wrap = counter.next();

        // Assert
        assert_eq!(before_wrap, u64::MAX);
        assert_eq!(after_wrap, 0, "counter must wrap to 0 after u64::MAX");
    }

    #[test]
    fn test_serials_are_unique_across_threads() {
        // Arrange
        let counter = Arc::new(SequenceCounter::new());

        // Act
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..250).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000, "every serial must be unique");
    }

    #[test]
    fn test_current_does_not_increment() {
        // Arrange
        let counter = SequenceCounter::default();
        counter.next();

        // Act / Assert
        assert_eq!(counter.current(), 1);
        assert_eq!(counter.next(), 1);
    }
}
