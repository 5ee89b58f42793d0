//! Fixed-capacity slab of log records: a ~1MiB slab of uninitialized
//! slots, each written at most once via an atomically-claimed index, with
//! a shared counter reporting when the slab is full so the producer can
//! rotate to a new one.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::log::record::Record;

const TARGET_BYTES: usize = 1024 * 1024;
const MIN_SLOTS: usize = 64;

/// Number of [`Record`] slots that fit a roughly-1MiB segment.
pub(super) fn segment_len() -> usize {
    (TARGET_BYTES / std::mem::size_of::<Record>()).max(MIN_SLOTS)
}

pub(super) struct Segment {
    slots: Box<[UnsafeCell<MaybeUninit<Record>>]>,
    written: Box<[AtomicBool]>,
    consumed: Box<[AtomicBool]>,
    filled: AtomicUsize,
    len: usize,
}

// SAFETY: each slot is written by exactly one producer (the thread that
// atomically claimed that index in `Queue::push`) and read by exactly one
// consumer (the single drain thread), synchronized through `written`'s
// release/acquire pair.
unsafe impl Sync for Segment {}

impl Segment {
    pub(super) fn new(len: usize) -> Segment {
        let slots = (0..len)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        let written = (0..len).map(|_| AtomicBool::new(false)).collect();
        let consumed = (0..len).map(|_| AtomicBool::new(false)).collect();
        Segment {
            slots,
            written,
            consumed,
            filled: AtomicUsize::new(0),
            len,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    /// Writes `record` into `index`. Returns `true` if this write filled
    /// the segment, signaling the caller to rotate to a new one.
    pub(super) fn push(&self, record: Record, index: usize) -> bool {
        // SAFETY: `index` was claimed exactly once by `Queue::push`'s
        // atomic fetch_add, so no two producers ever target this slot.
        unsafe {
            (*self.slots[index].get()).write(record);
        }
        self.written[index].store(true, Ordering::Release);
        self.filled.fetch_add(1, Ordering::AcqRel) + 1 == self.len
    }

    /// Takes ownership of the record at `index`, if it's been written and
    /// not already taken. Only ever called by the single drain thread.
    pub(super) fn try_pop(&self, index: usize) -> Option<Record> {
        if !self.written[index].load(Ordering::Acquire) {
            return None;
        }
        if self.consumed[index].swap(true, Ordering::AcqRel) {
            return None;
        }
        // SAFETY: `written` is set only after `push` initializes this
        // slot, and `consumed` guarantees this is the only read of it.
        Some(unsafe { (*self.slots[index].get()).assume_init_read() })
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        for i in 0..self.len {
            if *self.written[i].get_mut() && !*self.consumed[i].get_mut() {
                // SAFETY: written and not yet consumed means this slot
                // still holds a live, un-dropped `Record`.
                unsafe {
                    (*self.slots[i].get()).assume_init_drop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::level::Severity;

    #[test]
    fn push_then_pop_roundtrips() {
        let seg = Segment::new(4);
        assert!(!seg.push(Record::new(Severity::Info, "f", "g", 1), 0));
        assert!(seg.try_pop(1).is_none());
        let popped = seg.try_pop(0);
        assert!(popped.is_some());
        assert!(seg.try_pop(0).is_none());
    }

    #[test]
    fn reports_full_on_last_slot() {
        let seg = Segment::new(2);
        assert!(!seg.push(Record::new(Severity::Info, "f", "g", 1), 0));
        assert!(seg.push(Record::new(Severity::Info, "f", "g", 2), 1));
    }
}
