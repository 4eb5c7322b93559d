//! Copy-on-write handles
//!
//! A [`Handle`] is the only way callers hold composite payloads. Cloning a
//! handle is a reference-count increment; the payload itself is duplicated
//! only when [`Handle::get_mut`] is called while another handle still shares
//! it. Every physical duplication and allocation is recorded in per-thread
//! [`StoreStats`] so tests and the interpreter's memory ceiling can observe
//! them.

use std::cell::Cell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use tracing::trace;

/// Data that can live behind a [`Handle`].
pub trait Payload: Clone {
    /// Approximate number of bytes the payload occupies.
    fn footprint(&self) -> usize;

    /// Drop any cached derived data (content hashes).
    fn invalidate(&mut self);
}

/// Per-thread value store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Payloads allocated through [`Handle::new`].
    pub allocations: u64,
    /// Payloads physically cloned by copy-on-write.
    pub payload_clones: u64,
    /// Bytes currently held by live payloads.
    pub live_bytes: usize,
}

thread_local! {
    static STATS: Cell<StoreStats> = Cell::new(StoreStats::default());
}

/// Snapshot of this thread's store counters.
pub fn store_stats() -> StoreStats {
    STATS.try_with(Cell::get).unwrap_or_default()
}

fn update_stats(f: impl FnOnce(&mut StoreStats)) {
    // Payloads dropped during thread teardown can outlive the counters.
    let _ = STATS.try_with(|cell| {
        let mut stats = cell.get();
        f(&mut stats);
        cell.set(stats);
    });
}

struct Slot<T> {
    payload: T,
    bytes: usize,
}

impl<T: Payload> Clone for Slot<T> {
    fn clone(&self) -> Self {
        let mut payload = self.payload.clone();
        payload.invalidate();
        let bytes = self.bytes;
        update_stats(|s| {
            s.payload_clones += 1;
            s.live_bytes += bytes;
        });
        trace!(bytes, "copy-on-write payload clone");
        Slot { payload, bytes }
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        let bytes = self.bytes;
        update_stats(|s| s.live_bytes = s.live_bytes.saturating_sub(bytes));
    }
}

/// Reference-counted, copy-on-write pointer to a payload.
pub struct Handle<T: Payload> {
    slot: Rc<Slot<T>>,
}

impl<T: Payload> Handle<T> {
    /// Allocate a new payload.
    pub fn new(payload: T) -> Self {
        let bytes = payload.footprint();
        update_stats(|s| {
            s.allocations += 1;
            s.live_bytes += bytes;
        });
        Handle {
            slot: Rc::new(Slot { payload, bytes }),
        }
    }

    /// Borrow the payload. Never copies.
    #[inline]
    pub fn read(&self) -> &T {
        &self.slot.payload
    }

    /// Mutable view of the payload, cloning it first if any other handle
    /// shares it. The handle is repointed at the private copy.
    pub fn get_mut(&mut self) -> PayloadMut<'_, T> {
        let slot = Rc::make_mut(&mut self.slot);
        slot.payload.invalidate();
        PayloadMut { slot }
    }

    /// Number of handles sharing this payload.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.slot)
    }

    /// Whether two handles share one payload.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }

    /// Payload address, used as identity during cyclic traversals.
    #[inline]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.slot) as *const () as usize
    }
}

impl<T: Payload> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        Handle {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: Payload + fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(self.read()).finish()
    }
}

/// Exclusive access to a payload obtained through [`Handle::get_mut`].
///
/// The recorded footprint is refreshed when the guard is dropped.
pub struct PayloadMut<'a, T: Payload> {
    slot: &'a mut Slot<T>,
}

impl<T: Payload> Deref for PayloadMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot.payload
    }
}

impl<T: Payload> DerefMut for PayloadMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.slot.payload
    }
}

impl<T: Payload> Drop for PayloadMut<'_, T> {
    fn drop(&mut self) {
        let before = self.slot.bytes;
        let after = self.slot.payload.footprint();
        if before != after {
            self.slot.bytes = after;
            update_stats(|s| s.live_bytes = (s.live_bytes + after).saturating_sub(before));
        }
    }
}
