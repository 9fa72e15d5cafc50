//! Sharded contention-tolerant MPMC queue.
//!
//! An unbounded multi-producer/multi-consumer queue partitioned into a fixed
//! number of independently owned FIFO shards. Instead of one mutex in front
//! of one queue, each shard is guarded by a pointer-as-lock slot: a thread
//! atomically moves the shard's sub-queue pointer out of a shared slot
//! (leaving null behind), mutates the sub-queue exclusively, and moves the
//! pointer back. Producers and consumers contending on different shards never
//! touch the same cache line.
//!
//! # Overview
//!
//! - [`ShardedQueue`] - the queue facade: `enqueue`, `try_dequeue`, bulk
//!   variants and `front`
//! - Claim/release instead of lock/unlock: ownership of the pointer *is* the
//!   lock, there is no separate lock flag
//! - No syscalls, no condition variables: acquisition busy-waits
//!
//! # Example
//!
//! ```
//! use shoal::ShardedQueue;
//!
//! let queue = ShardedQueue::<u64, 8>::new();
//! queue.enqueue(1);
//! queue.enqueue(2);
//!
//! assert_eq!(queue.try_dequeue(), Some(1));
//! assert_eq!(queue.try_dequeue(), Some(2));
//! assert_eq!(queue.try_dequeue(), None);
//! ```
//!
//! # Trade-offs
//!
//! The design trades ordering and consumer fairness for reduced contention:
//!
//! - FIFO order holds *within* a shard only; there is no global order across
//!   shards.
//! - A dequeue inspects the single shard it claimed. `None` means "the shard
//!   this call claimed was empty", not "the queue is empty" - other shards
//!   may still hold items.
//! - Acquisition spins until it wins a shard. Liveness expects the shard
//!   count to be comparable to or greater than the number of concurrently
//!   contending threads.

pub mod queue;
pub mod trace;

pub(crate) mod shard;

#[doc(inline)]
pub use queue::{ConsumerToken, ProducerToken, ShardedQueue};
