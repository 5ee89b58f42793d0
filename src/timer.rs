//! Deadline-ordered one-shot timers. Timers are kept in a `BTreeMap` keyed
//! by `(Instant, id)`, so many timers can share the same deadline while
//! still firing in a well-defined order.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Identifies a scheduled timer, returned by [`Wheel::schedule`] so it can
/// be cancelled with [`Wheel::cancel`] before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// A collection of one-shot timers ordered by deadline.
#[derive(Default)]
pub struct Wheel {
    timers: BTreeMap<(Instant, u64), TimerCallback>,
    next_id: u64,
}

impl Wheel {
    pub fn new() -> Wheel {
        Wheel {
            timers: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Schedules `cb` to fire the next time [`Self::fire_expired`] is
    /// called at or after `now + delay`.
    pub fn schedule(&mut self, delay: Duration, cb: impl FnOnce() + Send + 'static) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.timers
            .insert((Instant::now() + delay, id), Box::new(cb));
        TimerId(id)
    }

    /// Removes a scheduled timer before it fires. Returns `false` if it
    /// already fired or never existed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let key = self
            .timers
            .keys()
            .find(|(_, tid)| *tid == id.0)
            .copied();
        match key {
            Some(key) => {
                self.timers.remove(&key);
                true
            }
            None => false,
        }
    }

    /// How many timers are still pending.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// The deadline of the next timer to fire, if any — useful for
    /// bounding a reactor's wait timeout.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Fires and removes every timer whose deadline has passed. Returns
    /// the number fired.
    pub fn fire_expired(&mut self) -> usize {
        let now = Instant::now();
        // Keys < (now, MAX) are exactly the expired deadlines (deadline
        // <= now, since ids never reach MAX); `split_off` leaves those in
        // `self.timers` and returns the rest, so swap them back in.
        let not_expired = self.timers.split_off(&(now, u64::MAX));
        let due = std::mem::replace(&mut self.timers, not_expired);
        let fired = due.len();
        for (_, cb) in due {
            cb();
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_only_expired_timers() {
        let mut wheel = Wheel::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);

        wheel.schedule(Duration::from_millis(0), move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        let late_id = wheel.schedule(Duration::from_secs(60), || {});

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(wheel.fire_expired(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(wheel.len(), 1);

        assert!(wheel.cancel(late_id));
        assert!(wheel.is_empty());
    }
}
