//! Optional operation counters.
//!
//! With the `stats` feature enabled, every unit counts successful and failed
//! compare-and-swap attempts on shared pointers, successful and failed
//! elimination attempts and reused nodes.
//! Counters are kept per thread, which is per unit for the in-process
//! transport.
//! Without the feature every call compiles to nothing and [`snapshot`]
//! always returns zeroes.

/// A countable event.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum Event {
    /// An operation completed through the shared top/front pointer.
    CasSuccess,
    /// A compare-and-swap on the shared top/front pointer failed.
    CasFailure,
    /// An operation completed by elimination.
    EliminationSuccess,
    /// An elimination attempt failed.
    EliminationFailure,
    /// A released node was handed out again.
    Reused,
}

/// The counters of the calling unit.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct Stats {
    pub cas_success: u64,
    pub cas_failure: u64,
    pub elimination_success: u64,
    pub elimination_failure: u64,
    pub reused: u64,
}

cfg_if::cfg_if! {
    if #[cfg(feature = "stats")] {
        use std::cell::Cell;

        thread_local!(static STATS: Cell<Stats> = Cell::new(Stats::default()));

        /// Counts one occurrence of `event` for the calling unit.
        #[inline]
        pub fn record(event: Event) {
            STATS.with(|stats| {
                let mut curr = stats.get();
                match event {
                    Event::CasSuccess => curr.cas_success += 1,
                    Event::CasFailure => curr.cas_failure += 1,
                    Event::EliminationSuccess => curr.elimination_success += 1,
                    Event::EliminationFailure => curr.elimination_failure += 1,
                    Event::Reused => curr.reused += 1,
                }
                stats.set(curr);
            });
        }

        /// Returns the counters of the calling unit.
        #[inline]
        pub fn snapshot() -> Stats {
            STATS.with(Cell::get)
        }

        /// Resets the counters of the calling unit.
        #[inline]
        pub fn reset() {
            STATS.with(|stats| stats.set(Stats::default()));
        }
    } else {
        #[inline(always)]
        pub fn record(_: Event) {}

        #[inline(always)]
        pub fn snapshot() -> Stats {
            Stats::default()
        }

        #[inline(always)]
        pub fn reset() {}
    }
}

#[cfg(all(test, feature = "stats"))]
mod tests {
    use super::*;

    #[test]
    fn counts_per_thread() {
        reset();
        record(Event::CasSuccess);
        record(Event::CasSuccess);
        record(Event::Reused);
        std::thread::spawn(|| record(Event::CasFailure)).join().unwrap();

        let stats = snapshot();
        assert_eq!(stats.cas_success, 2);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.cas_failure, 0);
    }
}
