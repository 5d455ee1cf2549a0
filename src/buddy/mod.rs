//! Buddy heap module
//!
//! This module provides the buddy system over a single arena:
//! - Order arithmetic and arena layout
//! - Intrusive per-order free lists stored in the free blocks
//! - Splitting on allocation, coalescing on release
//! - Optional statistics (`tracking` feature)

pub mod buddy_block;
pub mod buddy_heap;
pub mod free_list;
pub mod heap_layout;
pub mod order;
#[cfg(feature = "tracking")]
pub mod stats;

pub use buddy_block::{buddy_of, BlockHeader, FreeNode, Freedom, HEADER_SIZE};
pub use buddy_heap::BuddyHeap;
pub use free_list::{FreeList, FreeListIter};
pub use heap_layout::{HeapMetadata, MAX_ORDERS};
pub use order::{block_size, required_order};
#[cfg(feature = "tracking")]
pub use stats::BuddyStats;
