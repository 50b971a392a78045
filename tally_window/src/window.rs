//! The windowed aggregator.
//!
//! A fixed array of millisecond buckets spans the trailing window. Position
//! `W-1` is always the newest aligned millisecond and position `0` the
//! oldest retained one, so bucket addressing is plain subtraction. Keeping
//! the array flat costs an O(W) shift on alignment, but that cost is bounded
//! by the window length no matter how long the aggregator sat idle or how
//! much traffic arrived.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::amount::Amount;
use crate::{Clock, RealClock};

/// Length of the retained window, in milliseconds.
pub const WINDOW_MILLIS: i64 = 60_000;

/// Errors produced by [`Window::record`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The transaction timestamp is older than the retained window.
    #[error("transaction is older than the retained window")]
    ExpiredTransaction,
    /// The transaction timestamp is after the current instant.
    #[error("transaction timestamp is in the future")]
    FutureTransaction,
}

/// Partial aggregates for every transaction in one millisecond slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bucket {
    sum: Amount,
    count: u64,
    min: Amount,
    max: Amount,
}

impl Bucket {
    fn of(amount: Amount) -> Self {
        Self {
            sum: amount,
            count: 1,
            min: amount,
            max: amount,
        }
    }

    fn fold(&mut self, amount: Amount) {
        self.sum += amount;
        self.count += 1;
        self.min = self.min.min(amount);
        self.max = self.max.max(amount);
    }
}

/// Aggregate statistics over the trailing window, produced by
/// [`Window::snapshot`].
///
/// All-zero when no transactions are retained. Field order matches the wire
/// response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Sum of all retained transaction amounts.
    pub sum: Amount,
    /// Average amount, rounded half up at two-digit scale.
    pub avg: Amount,
    /// Largest retained amount.
    pub max: Amount,
    /// Smallest retained amount.
    pub min: Amount,
    /// Number of retained transactions.
    pub count: u64,
}

impl Statistics {
    const EMPTY: Statistics = Statistics {
        sum: Amount::ZERO,
        avg: Amount::ZERO,
        max: Amount::ZERO,
        min: Amount::ZERO,
        count: 0,
    };
}

/// The windowed aggregator.
///
/// Owns the bucket array and the alignment cursor. Not internally
/// synchronized; see [`SharedWindow`] for the handle request handlers share.
#[derive(Debug)]
pub struct Window<C = RealClock> {
    /// One slot per millisecond of the window, oldest first. `None` means no
    /// transaction landed in that millisecond.
    buckets: Box<[Option<Bucket>]>,
    /// Epoch millisecond represented by the newest bucket.
    aligned_at: i64,
    clock: C,
}

impl Window<RealClock> {
    /// Create a new `Window` against the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(RealClock)
    }
}

impl Default for Window<RealClock> {
    fn default() -> Self {
        Self::new()
    }
}

// Casts below are from `i64` values already bounded to `0..WINDOW_MILLIS`.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
impl<C> Window<C>
where
    C: Clock,
{
    /// Create a new `Window` with all buckets empty, aligned to the clock's
    /// current instant.
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        let aligned_at = clock.now_millis();
        Self {
            buckets: vec![None; WINDOW_MILLIS as usize].into_boxed_slice(),
            aligned_at,
            clock,
        }
    }

    /// Fold one transaction into the window.
    ///
    /// The timestamp is the instant of the event, not of the call; any
    /// in-window timestamp is accepted, in or out of arrival order. A write
    /// newer than the last alignment re-aligns the window to the current
    /// instant first, so the right edge tracks wall-clock time under write
    /// traffic alone.
    ///
    /// # Errors
    ///
    /// Returns `Error::ExpiredTransaction` if the timestamp is at least one
    /// window length old and `Error::FutureTransaction` if it is after the
    /// current instant. Rejections leave the window untouched.
    pub fn record(&mut self, amount: Amount, timestamp_millis: i64) -> Result<(), Error> {
        let now = self.clock.now_millis();
        if now - timestamp_millis >= WINDOW_MILLIS {
            return Err(Error::ExpiredTransaction);
        }
        if timestamp_millis > now {
            return Err(Error::FutureTransaction);
        }

        if timestamp_millis > self.aligned_at {
            self.shift_to(now);
        }

        // In-window relative to `now` bounds the offset relative to
        // `aligned_at` as well, except when the clock has stepped backwards
        // across calls. An event older than the aligned window cannot be
        // placed.
        let offset = self.aligned_at - timestamp_millis;
        if offset >= WINDOW_MILLIS {
            return Err(Error::ExpiredTransaction);
        }
        let position = (WINDOW_MILLIS - 1 - offset) as usize;
        let slot = &mut self.buckets[position];
        match slot {
            Some(bucket) => bucket.fold(amount),
            None => *slot = Some(Bucket::of(amount)),
        }
        Ok(())
    }

    /// Aggregate statistics over exactly the trailing window.
    ///
    /// Shifts the window to the current instant first, so buckets that have
    /// aged out are evicted even when no write has arrived since they
    /// expired. Reads participate in window maintenance; there is no
    /// background timer.
    #[must_use]
    pub fn snapshot(&mut self) -> Statistics {
        let now = self.clock.now_millis();
        self.shift_to(now);

        let mut sum = Amount::ZERO;
        let mut count = 0_u64;
        let mut min = Amount::ZERO;
        let mut max = Amount::ZERO;
        for bucket in self.buckets.iter().flatten() {
            if count == 0 {
                min = bucket.min;
                max = bucket.max;
            } else {
                min = min.min(bucket.min);
                max = max.max(bucket.max);
            }
            sum += bucket.sum;
            count += bucket.count;
        }

        if count == 0 {
            Statistics::EMPTY
        } else {
            Statistics {
                sum,
                avg: sum.div_round_half_up(count),
                max,
                min,
                count,
            }
        }
    }

    /// Clear every bucket unconditionally.
    ///
    /// The alignment cursor is left in place; the next `record` or
    /// `snapshot` re-aligns against the current instant transparently.
    pub fn reset(&mut self) {
        self.buckets.fill(None);
    }

    /// Re-align the newest bucket to `now`, evicting buckets that fall out
    /// of the window.
    ///
    /// A shift of zero is a no-op. A shift of a full window or more clears
    /// the whole array at bounded O(W) cost. Anything between moves bucket
    /// contents toward the old end and opens empty slots at the new end.
    fn shift_to(&mut self, now: i64) {
        let shift = now - self.aligned_at;
        if shift <= 0 {
            return;
        }
        if shift >= WINDOW_MILLIS {
            self.buckets.fill(None);
        } else {
            let shift = shift as usize;
            let len = self.buckets.len();
            self.buckets.copy_within(shift..len, 0);
            self.buckets[len - shift..].fill(None);
        }
        self.aligned_at = now;
    }
}

/// Cloneable handle sharing one [`Window`] between request handlers.
///
/// Every operation takes one exclusive lock over the whole bucket array and
/// alignment cursor for its full duration. Bucket boundaries move on every
/// call, so finer-grained locking would buy nothing; operations are bounded
/// at O(W) and never block on anything but the lock itself.
#[derive(Debug)]
pub struct SharedWindow<C = RealClock> {
    inner: Arc<Mutex<Window<C>>>,
}

impl<C> Clone for SharedWindow<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> SharedWindow<C>
where
    C: Clock,
{
    /// Wrap a `Window` for sharing.
    #[must_use]
    pub fn new(window: Window<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(window)),
        }
    }

    /// Fold one transaction into the window. See [`Window::record`].
    ///
    /// # Errors
    ///
    /// See [`Window::record`].
    ///
    /// # Panics
    ///
    /// Function will panic if a previous holder of the lock panicked.
    pub fn record(&self, amount: Amount, timestamp_millis: i64) -> Result<(), Error> {
        self.lock().record(amount, timestamp_millis)
    }

    /// Aggregate statistics over the trailing window. See
    /// [`Window::snapshot`].
    ///
    /// # Panics
    ///
    /// Function will panic if a previous holder of the lock panicked.
    #[must_use]
    pub fn snapshot(&self) -> Statistics {
        self.lock().snapshot()
    }

    /// Clear every bucket. See [`Window::reset`].
    ///
    /// # Panics
    ///
    /// Function will panic if a previous holder of the lock panicked.
    pub fn reset(&self) {
        self.lock().reset();
    }

    fn lock(&self) -> MutexGuard<'_, Window<C>> {
        self.inner.lock().expect("window lock poisoned")
    }
}
