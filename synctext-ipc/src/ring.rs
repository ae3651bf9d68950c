//! Lock-free single-producer single-consumer receive ring.
//!
//! Decouples the mailbox listener (producer) from the editor loop
//! (consumer). One slot is sacrificed to distinguish full from empty,
//! so the ring holds `RING_CAPACITY - 1` records at most.
//!
//! Memory ordering: the producer writes the slot, then publishes the
//! new head with `Release`; the consumer `Acquire`-loads the head
//! before reading the slot, and releases the slot back by storing the
//! tail with `Release`. Overflow drops the record; the upstream mailbox
//! is already bounded and LWW subsumes loss.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::wire::UpdateMessage;

/// Slot count; one slot is reserved as the full/empty marker.
pub const RING_CAPACITY: usize = 128;

struct RingInner {
    head: AtomicUsize,
    tail: AtomicUsize,
    slots: [UnsafeCell<MaybeUninit<UpdateMessage>>; RING_CAPACITY],
}

// SAFETY: the split-handle API guarantees exactly one producer touches
// head/slots-at-head and exactly one consumer touches tail; publication
// is ordered by the Release/Acquire pairs on head and tail.
unsafe impl Sync for RingInner {}
unsafe impl Send for RingInner {}

/// Producer half; owned by the listener task.
pub struct RingProducer {
    inner: Arc<RingInner>,
}

/// Consumer half; owned by the editor loop.
pub struct RingConsumer {
    inner: Arc<RingInner>,
}

/// Create a connected producer/consumer pair.
pub fn ring() -> (RingProducer, RingConsumer) {
    let inner = Arc::new(RingInner {
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        slots: std::array::from_fn(|_| UnsafeCell::new(MaybeUninit::uninit())),
    });
    (
        RingProducer {
            inner: inner.clone(),
        },
        RingConsumer { inner },
    )
}

impl RingProducer {
    /// Push one record. Returns `false` (dropping the record) when the
    /// ring is full.
    pub fn push(&mut self, msg: UpdateMessage) -> bool {
        let inner = &*self.inner;
        let head = inner.head.load(Ordering::Relaxed);
        let next = (head + 1) % RING_CAPACITY;
        if next == inner.tail.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: slot `head` is outside the readable window until the
        // head store below, and only this producer writes slots.
        unsafe {
            (*inner.slots[head].get()).write(msg);
        }
        inner.head.store(next, Ordering::Release);
        true
    }
}

impl RingConsumer {
    /// Pop the oldest record, or `None` when the ring is empty.
    pub fn pop(&mut self) -> Option<UpdateMessage> {
        let inner = &*self.inner;
        let tail = inner.tail.load(Ordering::Relaxed);
        if tail == inner.head.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: head > tail (mod capacity) proves the producer
        // finished writing this slot; records are Copy so the slot can
        // simply be read out.
        let msg = unsafe { (*inner.slots[tail].get()).assume_init_read() };
        inner.tail.store((tail + 1) % RING_CAPACITY, Ordering::Release);
        Some(msg)
    }
}
