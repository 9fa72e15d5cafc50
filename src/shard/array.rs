//! Core pointer-as-lock shard array algorithm.
//!
//! This module provides the claim/release machinery underneath the sharded
//! queue: an array of slots, each holding either a pointer to its sub-queue
//! ("available") or null ("claimed by some thread").
//!
//! # Algorithm
//!
//! - Each slot owns one boxed `VecDeque` allocated at construction; the
//!   pointer's identity never changes for the lifetime of the array
//! - A thread claims a shard by CAS-ing the slot from its pointer to null
//! - While the slot is null, the claiming thread holds the only reachable
//!   pointer to the sub-queue and may mutate it without further
//!   synchronization
//! - Releasing stores the pointer back with Release ordering, publishing the
//!   thread's mutations to the next claimant (whose successful CAS uses
//!   Acquire ordering)
//! - The scan starts at a thread-local hint (the index last claimed by this
//!   thread) and walks the array cyclically via bitmask, skipping null slots
//!   without attempting a CAS nobody can win
//!
//! # Safety
//!
//! Mutual exclusion is encoded purely in the pointer-vs-null state: there is
//! no lock word. Soundness rests on the slot holding the *unique* pointer to
//! its sub-queue whenever it is non-null, and on exactly one thread moving
//! that pointer out at a time (the CAS). `ShardGuard` re-installs the pointer
//! in `Drop`, so release happens on every exit path exactly once.

use std::cell::Cell;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::trace::trace;

/// A single shard slot.
#[repr(C)]
#[repr(align(64))] // Each slot on its own cache line to avoid false sharing between claimants
pub(crate) struct Slot<T> {
    /// Pointer-as-lock: non-null means the sub-queue is available for
    /// claiming, null means some thread currently owns it.
    queue: AtomicPtr<VecDeque<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            queue: AtomicPtr::new(Box::into_raw(Box::new(VecDeque::new()))),
        }
    }
}

// SAFETY: The slot is shared between threads, but the sub-queue behind the
// pointer is only reachable by the single thread that nulled the slot via a
// successful CAS, so T is never accessed concurrently. T: Send because the
// sub-queue's contents move between threads across claim/release.
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

thread_local! {
    /// Index of the shard this thread last claimed successfully.
    ///
    /// Purely a locality heuristic: scans start here, so an uncontended
    /// thread keeps reusing the shard it just released. Correctness holds
    /// for any value, including a constant zero.
    static LAST_CLAIMED: Cell<usize> = const { Cell::new(0) };
}

/// Fixed array of independently claimable shards.
///
/// `N` must be a nonzero power of two (indices are computed by bitmask); the
/// facade enforces this at compile time.
pub(crate) struct ShardArray<T, const N: usize> {
    slots: [Slot<T>; N],
    /// Owns the queued elements through the slot pointers.
    _marker: PhantomData<T>,
}

// SAFETY: ShardArray owns its sub-queues and hands each out to one thread at
// a time through the claim protocol, so moving the array between threads
// only requires T: Send.
unsafe impl<T: Send, const N: usize> Send for ShardArray<T, N> {}

// SAFETY: Shared access is mediated entirely by the slots' CAS protocol: a
// thread touches a sub-queue only while holding its pointer exclusively.
// Like a mutex, exclusive handoff means T: Sync is not required.
unsafe impl<T: Send, const N: usize> Sync for ShardArray<T, N> {}

impl<T, const N: usize> ShardArray<T, N> {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::new()),
            _marker: PhantomData,
        }
    }

    /// Claims a shard, spinning until one is won.
    ///
    /// Scans cyclically from the calling thread's last successful index. A
    /// null slot is owned by another thread and is skipped without a CAS; a
    /// non-null slot is claimed by CAS-ing its pointer to null (Acquire on
    /// success to observe the previous owner's writes, Relaxed on failure).
    /// A lost or spurious CAS just advances the scan.
    ///
    /// The call never sleeps and is not interruptible. The spin is
    /// unbounded: with far more contending threads than shards, a claim may
    /// take arbitrarily long. Liveness expects the shard count to be
    /// comparable to or greater than the number of contending threads.
    #[inline]
    pub(crate) fn acquire(&self) -> ShardGuard<'_, T, N> {
        let mut pos = LAST_CLAIMED.with(Cell::get);
        loop {
            let index = pos & (N - 1);
            let observed = self.slots[index].queue.load(Ordering::Relaxed);
            if !observed.is_null()
                && self.slots[index]
                    .queue
                    .compare_exchange_weak(
                        observed,
                        ptr::null_mut(),
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                LAST_CLAIMED.with(|hint| hint.set(index));
                trace!(index, "claimed shard");
                return ShardGuard {
                    array: self,
                    index,
                    queue: observed,
                };
            }
            pos = pos.wrapping_add(1);
            std::hint::spin_loop();
        }
    }

    /// Spins until the shard at `index` specifically is claimed.
    ///
    /// Test-only: lets protocol tests pin a shard or drain the whole array
    /// deterministically. The public surface never targets a shard by index.
    #[cfg(test)]
    pub(crate) fn acquire_at(&self, index: usize) -> ShardGuard<'_, T, N> {
        loop {
            let observed = self.slots[index].queue.load(Ordering::Relaxed);
            if !observed.is_null()
                && self.slots[index]
                    .queue
                    .compare_exchange_weak(
                        observed,
                        ptr::null_mut(),
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                return ShardGuard {
                    array: self,
                    index,
                    queue: observed,
                };
            }
            std::hint::spin_loop();
        }
    }
}

impl<T, const N: usize> Drop for ShardArray<T, N> {
    fn drop(&mut self) {
        for slot in &self.slots {
            let queue = slot.queue.load(Ordering::Relaxed);
            // A null slot here means a guard was leaked with mem::forget;
            // its sub-queue leaks with it rather than being freed through a
            // dangling pointer.
            if !queue.is_null() {
                // SAFETY: `&mut self` proves no guard borrows the array, so
                // this slot holds the unique pointer installed at
                // construction (or returned by the last release). Each box
                // is reconstructed at most once.
                drop(unsafe { Box::from_raw(queue) });
            }
        }
    }
}

/// Scoped exclusive ownership of one shard.
///
/// Holding the guard *is* holding the lock: the slot stays null for the
/// guard's whole lifetime, so no other thread can claim the same sub-queue.
/// `Drop` stores the pointer back with Release ordering, publishing this
/// thread's mutations to the next claimant.
///
/// The guard is move-only (no `Clone`), and Rust's single-drop guarantee
/// makes the release exactly-once on every exit path, including panics. It
/// borrows the array, so the array cannot be dropped while any guard is
/// live. Holding a raw pointer, it is neither `Send` nor `Sync`: a claim is
/// released by the thread that won it.
pub(crate) struct ShardGuard<'a, T, const N: usize> {
    array: &'a ShardArray<T, N>,
    index: usize,
    /// Unique pointer to the claimed sub-queue, moved out of its slot.
    queue: *mut VecDeque<T>,
}

impl<T, const N: usize> ShardGuard<'_, T, N> {
    /// Exclusive access to the owned sub-queue.
    #[inline]
    pub(crate) fn queue(&mut self) -> &mut VecDeque<T> {
        // SAFETY: The successful claim moved this pointer out of its slot,
        // so no other thread can reach the sub-queue until Drop stores it
        // back. The pointee stays live for the guard's lifetime because the
        // array (which would free it) is borrowed by the guard.
        unsafe { &mut *self.queue }
    }

    /// Index of the claimed shard.
    #[cfg(test)]
    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

impl<T, const N: usize> Drop for ShardGuard<'_, T, N> {
    fn drop(&mut self) {
        trace!(index = self.index, "released shard");
        // Release pairs with the Acquire CAS of the next claim.
        self.array.slots[self.index]
            .queue
            .store(self.queue, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_claim_nulls_slot_and_release_restores_it() {
        let array: ShardArray<u64, 4> = ShardArray::new();

        let before = array.slots[0].queue.load(Ordering::Relaxed);
        assert!(!before.is_null());

        let guard = array.acquire_at(0);
        assert!(array.slots[0].queue.load(Ordering::Relaxed).is_null());
        drop(guard);

        // Same pointer identity comes back, not a reallocation.
        let after = array.slots[0].queue.load(Ordering::Relaxed);
        assert_eq!(before, after);
    }

    #[test]
    fn test_scan_skips_claimed_slot() {
        let array: ShardArray<u64, 4> = ShardArray::new();

        // Fresh thread: hint is 0, so the first claim wins slot 0 and a
        // second claim on the same thread must skip past it.
        let first = array.acquire();
        assert_eq!(first.index(), 0);
        let second = array.acquire();
        assert_eq!(second.index(), 1);
    }

    #[test]
    fn test_hint_reuses_last_claimed_index() {
        let array: ShardArray<u64, 4> = ShardArray::new();

        let guard = array.acquire();
        assert_eq!(guard.index(), 0);
        drop(guard);

        // Uncontended: the same thread keeps winning its hint shard.
        let guard = array.acquire();
        assert_eq!(guard.index(), 0);

        // With 0 still held, the next claim lands on 1 and moves the hint.
        let skipped = array.acquire();
        assert_eq!(skipped.index(), 1);
        drop(skipped);
        drop(guard);

        let guard = array.acquire();
        assert_eq!(guard.index(), 1);
    }

    #[test]
    fn test_mutual_exclusion_instrumented() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 1_000;

        let array: Arc<ShardArray<u64, 4>> = Arc::new(ShardArray::new());
        let owners: Arc<[AtomicUsize; 4]> = Arc::new(std::array::from_fn(|_| AtomicUsize::new(0)));

        let mut handles = Vec::new();
        for _ in 0..THREADS {
            let array = Arc::clone(&array);
            let owners = Arc::clone(&owners);
            handles.push(thread::spawn(move || {
                for round in 0..ROUNDS {
                    let mut guard = array.acquire();
                    let index = guard.index();

                    let previous = owners[index].fetch_add(1, Ordering::SeqCst);
                    assert_eq!(previous, 0, "two threads own shard {index} at once");

                    // Touch the sub-queue while the claim interval is open.
                    guard.queue().push_back(round as u64);
                    guard.queue().pop_front();

                    owners[index].fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_release_publishes_mutations_to_next_owner() {
        let array: Arc<ShardArray<u64, 2>> = Arc::new(ShardArray::new());

        let writer = {
            let array = Arc::clone(&array);
            thread::spawn(move || {
                let mut guard = array.acquire_at(0);
                for i in 0..1_000 {
                    guard.queue().push_back(i);
                }
            })
        };
        writer.join().unwrap();

        let mut guard = array.acquire_at(0);
        for expected in 0..1_000 {
            assert_eq!(guard.queue().pop_front(), Some(expected));
        }
        assert!(guard.queue().is_empty());
    }

    #[test]
    fn test_single_shard_serializes_all_threads() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 1_000;

        // N = 1 degrades to a spin-locked queue: every claim contends on the
        // same slot, so the read-modify-write below is racy unless the
        // protocol really is mutually exclusive.
        let array: Arc<ShardArray<u64, 1>> = Arc::new(ShardArray::new());
        array.acquire().queue().push_back(0);

        let mut handles = Vec::new();
        for _ in 0..THREADS {
            let array = Arc::clone(&array);
            handles.push(thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let mut guard = array.acquire();
                    let value = guard.queue().pop_front().unwrap();
                    guard.queue().push_back(value + 1);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let mut guard = array.acquire();
        assert_eq!(guard.queue().pop_front(), Some((THREADS * ROUNDS) as u64));
    }
}
