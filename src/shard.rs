//! Core sharded claim/release primitives.
//!
//! This module contains the pointer-as-lock shard array: a fixed set of FIFO
//! sub-queues, each behind a cache-line-aligned atomic pointer slot. A thread
//! claims a sub-queue by swapping its pointer for null, mutates it while no
//! other thread can reach it, and releases it by storing the pointer back.
//!
//! Used by:
//! - [`crate::queue`] - the public sharded MPMC queue facade

pub(crate) mod array;
