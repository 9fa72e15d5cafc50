//! Sharded unbounded MPMC queue.
//!
//! The queue facade over the shard array: every operation claims one shard,
//! mutates its sub-queue, and releases the shard on scope exit. No operation
//! ever touches more than one shard per call.
//!
//! # Overview
//!
//! - [`ShardedQueue`] - unbounded MPMC queue over `N` independently claimed
//!   FIFO shards
//! - [`ProducerToken`] / [`ConsumerToken`] - inert tokens for signature
//!   compatibility with token-based queues
//!
//! # Example
//!
//! ```
//! use shoal::ShardedQueue;
//!
//! // Default shard count is 32; any nonzero power of two works.
//! let queue: ShardedQueue<String> = ShardedQueue::new();
//!
//! queue.enqueue("job".to_string());
//! assert_eq!(queue.front().as_deref(), Some("job"));
//! assert_eq!(queue.try_dequeue().as_deref(), Some("job"));
//! assert_eq!(queue.try_dequeue(), None);
//! ```
//!
//! # Ordering
//!
//! Elements keep FIFO order within the shard they landed on; there is no
//! order across shards. A batch pushed by [`ShardedQueue::enqueue_bulk`]
//! lands on exactly one shard and is therefore observed as a contiguous run
//! by a consumer that drains that shard before another producer reaches it.

use crate::shard::array::ShardArray;
use crate::trace::debug;

struct ShardCountCheck<const N: usize>;

impl<const N: usize> ShardCountCheck<N> {
    /// Compile-time assertion that the shard count is a nonzero power of two.
    const OK: () = assert!(
        N.is_power_of_two(),
        "Shard count must be a nonzero power of two"
    );
}

/// No-op producer token.
///
/// Token-based MPMC queues hand each producer a token that pins it to
/// internal sub-structures. The sharded queue has no such affinity - the
/// claim scan decides shard placement per call - but exposes the same
/// signatures so it can stand behind a common queue interface. Every
/// token-taking operation reports failure and leaves the queue untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProducerToken;

/// No-op consumer token. See [`ProducerToken`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsumerToken;

/// Unbounded MPMC queue over `N` independently claimed FIFO shards.
///
/// `N` defaults to 32 and must be a nonzero power of two (fails to compile
/// otherwise). All `N` sub-queues are allocated at construction and freed at
/// drop; the sub-queues themselves grow without bound.
///
/// # Thread Safety
///
/// `ShardedQueue` is [`Send`] and [`Sync`] for `T: Send` - share it across
/// threads with `Arc` or scoped borrows. Both enqueue and dequeue take
/// exclusive ownership of one shard for the duration of the call, so `T`
/// never needs to be `Sync`.
///
/// # Consumer semantics
///
/// `try_dequeue` judges emptiness for the single shard it claimed: a `None`
/// may be returned while other shards still hold items. Callers that need
/// global emptiness detection want a different queue; widening the dequeue
/// to scan every shard would re-introduce exactly the contention this design
/// sheds.
pub struct ShardedQueue<T, const N: usize = 32> {
    shards: ShardArray<T, N>,
}

impl<T, const N: usize> ShardedQueue<T, N> {
    /// Creates a queue with `N` empty shards.
    ///
    /// # Panics
    ///
    /// Fails to compile if `N` is zero or not a power of two.
    #[must_use]
    pub fn new() -> Self {
        let () = ShardCountCheck::<N>::OK;

        debug!(shards = N, "created sharded queue");
        Self {
            shards: ShardArray::new(),
        }
    }

    /// Number of shards, fixed at compile time.
    #[must_use]
    pub const fn shard_count(&self) -> usize {
        N
    }

    /// Appends an item to one shard's FIFO.
    ///
    /// Never fails: shards grow without bound, so there is no full state to
    /// report. Which shard receives the item is decided by the claim scan;
    /// an uncontended thread keeps landing on the shard it used last.
    #[inline]
    pub fn enqueue(&self, item: T) {
        let mut shard = self.shards.acquire();
        shard.queue().push_back(item);
    }

    /// Appends every item of `items` to a single shard, in order.
    ///
    /// The batch is never split across shards: one claim covers the whole
    /// push, so a consumer draining that shard before any other producer
    /// reaches it sees the batch as a contiguous run.
    pub fn enqueue_bulk<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut shard = self.shards.acquire();
        shard.queue().extend(items);
    }

    /// Pops the front item of one shard.
    ///
    /// Returns `None` if the claimed shard is empty. This is deliberately a
    /// statement about one shard, not the queue: items may remain elsewhere
    /// (see the type-level docs). Other shards are not scanned.
    #[inline]
    #[must_use]
    pub fn try_dequeue(&self) -> Option<T> {
        let mut shard = self.shards.acquire();
        shard.queue().pop_front()
    }

    /// Drains up to `max_items` from one shard in FIFO order.
    ///
    /// Returns the drained items; the vector's length is the drained count,
    /// `min(max_items, len)` of the single claimed shard. An empty vector
    /// means that shard was empty, not that the queue is.
    #[must_use]
    pub fn try_dequeue_bulk(&self, max_items: usize) -> Vec<T> {
        let mut shard = self.shards.acquire();
        let queue = shard.queue();
        let take = max_items.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Returns a copy of the front element of one shard, without removing it.
    ///
    /// A copy rather than a reference: the shard is released before this
    /// returns, so a reference would outlive the exclusion window and race
    /// with the next claimant.
    #[inline]
    #[must_use]
    pub fn front(&self) -> Option<T>
    where
        T: Clone,
    {
        let mut shard = self.shards.acquire();
        shard.queue().front().cloned()
    }

    /// Token-taking `enqueue`; signature compatibility only.
    ///
    /// Always returns `false` without enqueueing anything.
    pub fn enqueue_with_token(&self, _token: &ProducerToken, _item: T) -> bool {
        false
    }

    /// Token-taking fallible enqueue; signature compatibility only.
    ///
    /// Always returns `false` without enqueueing anything.
    pub fn try_enqueue_with_token(&self, _token: &ProducerToken, _item: T) -> bool {
        false
    }

    /// Token-taking `try_dequeue`; signature compatibility only.
    ///
    /// Always returns `None` without claiming any shard.
    #[must_use]
    pub fn try_dequeue_with_token(&self, _token: &ConsumerToken) -> Option<T> {
        None
    }

    /// Token-taking `enqueue_bulk`; signature compatibility only.
    ///
    /// Always returns `false` without enqueueing anything.
    pub fn enqueue_bulk_with_token<I>(&self, _token: &ProducerToken, _items: I) -> bool
    where
        I: IntoIterator<Item = T>,
    {
        false
    }

    /// Token-taking `try_dequeue_bulk`; signature compatibility only.
    ///
    /// Always returns an empty vector without claiming any shard.
    #[must_use]
    pub fn try_dequeue_bulk_with_token(
        &self,
        _token: &ConsumerToken,
        _max_items: usize,
    ) -> Vec<T> {
        Vec::new()
    }
}

impl<T, const N: usize> Default for ShardedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
