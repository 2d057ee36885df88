//! Scripted observation sequences
//!
//! A [`Script`] hands out a pre-recorded sequence of values, one per call,
//! and keeps repeating the last one once the sequence is exhausted. This
//! models a state source that converges and then stays put.
//!
//! # Example
//!
//! ```rust
//! use meshcheck_testkit::Script;
//!
//! let cloud = Script::new([None, None, Some("10.0.0.5")]);
//! assert_eq!(cloud.next(), None);
//! assert_eq!(cloud.next(), None);
//! assert_eq!(cloud.next(), Some("10.0.0.5"));
//! assert_eq!(cloud.next(), Some("10.0.0.5"));
//! assert_eq!(cloud.calls(), 4);
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug)]
struct Inner<T> {
    pending: VecDeque<T>,
    current: T,
    calls: usize,
}

/// Thread-safe sequence of canned values
#[derive(Debug)]
pub struct Script<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> Script<T> {
    /// Create a script from a non-empty sequence
    ///
    /// # Panics
    ///
    /// Panics if `steps` is empty.
    pub fn new(steps: impl IntoIterator<Item = T>) -> Self {
        let mut pending: VecDeque<T> = steps.into_iter().collect();
        let current = pending
            .pop_front()
            .expect("a script needs at least one step");
        pending.push_front(current.clone());
        Self {
            inner: Mutex::new(Inner {
                pending,
                current,
                calls: 0,
            }),
        }
    }

    /// A script that always returns `value`
    pub fn constant(value: T) -> Self {
        Self::new([value])
    }

    /// Next value; the last one repeats forever
    pub fn next(&self) -> T {
        let mut inner = self.inner.lock();
        inner.calls += 1;
        if let Some(value) = inner.pending.pop_front() {
            inner.current = value;
        }
        inner.current.clone()
    }

    /// Replace the remaining sequence, e.g. after a simulated reboot
    pub fn reset(&self, steps: impl IntoIterator<Item = T>) {
        let mut inner = self.inner.lock();
        inner.pending = steps.into_iter().collect();
    }

    /// Number of values handed out so far
    pub fn calls(&self) -> usize {
        self.inner.lock().calls
    }
}
