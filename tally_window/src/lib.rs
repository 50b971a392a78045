//! Trailing-window transaction statistics.
//!
//! This library maintains exact aggregate statistics -- sum, count, average,
//! minimum, maximum -- over the trailing sixty seconds of a transaction
//! stream. It supports the tally binary found elsewhere in this project.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

pub mod amount;
pub mod window;

pub use amount::{Amount, ParseAmountError};
pub use window::{Error, SharedWindow, Statistics, WINDOW_MILLIS, Window};

/// The clock used by every window.
///
/// Timestamps arrive from callers as wall-clock instants, so the clock deals
/// in milliseconds since the Unix epoch rather than ticks from an arbitrary
/// origin. Injecting the clock lets tests drive window expiry without
/// sleeping.
pub trait Clock {
    /// The current instant, in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
/// A clock that operates with respect to real wall-clock time.
pub struct RealClock;

impl Clock for RealClock {
    /// Return the current system time in epoch milliseconds.
    ///
    /// # Panics
    ///
    /// Function will panic if the system clock is set before the Unix epoch
    /// or more than `i64::MAX` milliseconds after it.
    fn now_millis(&self) -> i64 {
        let since_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock is set before the Unix epoch");
        i64::try_from(since_epoch.as_millis()).expect("system clock beyond i64 milliseconds")
    }
}
