//! Lock-free-on-the-fast-path MPSC queue of log records: producers claim
//! a slot in the current segment via an atomic fetch-add and write it
//! without taking any lock; only segment rotation (starting a new one,
//! retiring a drained one) touches the segment list, guarded by a
//! spinlock.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::log::record::Record;
use crate::log::segment::Segment;

/// Minimal test-and-set spinlock guarding the segment list. The per-push
/// hot path never takes this lock; only `setup_next_segment`/segment
/// retirement does.
struct Spinlock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    fn new(data: T) -> Spinlock<T> {
        Spinlock {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    fn lock(&self) -> SpinlockGuard<'_, T> {
        while self.locked.swap(true, Ordering::Acquire) {
            std::hint::spin_loop();
        }
        SpinlockGuard { lock: self }
    }
}

struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
}

impl<T> Deref for SpinlockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding the guard is proof of exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard is proof of exclusive access.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinlockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

pub(super) struct Queue {
    segment_len: usize,
    segments: Spinlock<VecDeque<Arc<Segment>>>,
    /// Non-owning pointer into the segment currently being written; the
    /// owning `Arc` lives in `segments` until the drain thread retires it.
    write_segment: AtomicPtr<Segment>,
    write_idx: AtomicUsize,
    /// Exclusively owned by the single drain thread; never touched by a
    /// producer, so it needs no atomics.
    read_segment: UnsafeCell<Option<Arc<Segment>>>,
    read_idx: UnsafeCell<usize>,
}

// SAFETY: `read_segment`/`read_idx` are only ever touched from
// `try_pop`, which the logger's contract restricts to a single drain
// thread (see `logger::initialize`).
unsafe impl Sync for Queue {}

impl Queue {
    pub(super) fn new(segment_len: usize) -> Queue {
        let first = Arc::new(Segment::new(segment_len));
        let ptr = Arc::as_ptr(&first) as *mut Segment;
        let mut segments = VecDeque::new();
        segments.push_back(first);
        Queue {
            segment_len,
            segments: Spinlock::new(segments),
            write_segment: AtomicPtr::new(ptr),
            write_idx: AtomicUsize::new(0),
            read_segment: UnsafeCell::new(None),
            read_idx: UnsafeCell::new(0),
        }
    }

    pub(super) fn push(&self, record: Record) {
        let idx = self.write_idx.fetch_add(1, Ordering::Relaxed);
        if idx < self.segment_len {
            let seg_ptr = self.write_segment.load(Ordering::Acquire);
            // SAFETY: `seg_ptr` always points at a `Segment` kept alive by
            // an `Arc` held in `self.segments` until the drain thread has
            // fully consumed it and popped it from the list.
            let seg = unsafe { &*seg_ptr };
            if seg.push(record, idx) {
                self.setup_next_segment();
            }
        } else {
            // Lost the race for the last slot; spin until whoever filled
            // it finishes rotating, then retry against the new segment.
            while self.write_idx.load(Ordering::Acquire) >= self.segment_len {
                std::hint::spin_loop();
            }
            self.push(record);
        }
    }

    pub(super) fn try_pop(&self) -> Option<Record> {
        // SAFETY: single-drain-thread invariant, see the `unsafe impl
        // Sync` note above.
        let read_segment = unsafe { &mut *self.read_segment.get() };
        let read_idx = unsafe { &mut *self.read_idx.get() };

        if read_segment.is_none() {
            *read_segment = self.segments.lock().front().cloned();
        }
        let seg = read_segment.as_ref()?;

        match seg.try_pop(*read_idx) {
            Some(record) => {
                *read_idx += 1;
                if *read_idx == seg.len() {
                    *read_idx = 0;
                    *read_segment = None;
                    self.segments.lock().pop_front();
                }
                Some(record)
            }
            None => None,
        }
    }

    fn setup_next_segment(&self) {
        let next = Arc::new(Segment::new(self.segment_len));
        let ptr = Arc::as_ptr(&next) as *mut Segment;
        self.write_segment.store(ptr, Ordering::Release);
        self.segments.lock().push_back(next);
        self.write_idx.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::level::Severity;

    #[test]
    fn fifo_ordering_within_one_segment() {
        let queue = Queue::new(8);
        for i in 0..5u32 {
            let mut record = Record::new(Severity::Info, "f", "g", i);
            record.push_u32(i);
            queue.push(record);
        }
        let mut line = String::new();
        for expected in 0..5u32 {
            let record = queue.try_pop().expect("record present");
            line.clear();
            record.format_into(&mut line);
            assert!(line.contains(&expected.to_string()));
        }
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn rotates_across_segment_boundary() {
        let queue = Queue::new(2);
        for i in 0..5u32 {
            queue.push(Record::new(Severity::Info, "f", "g", i));
        }
        let mut count = 0;
        while queue.try_pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
    }
}
