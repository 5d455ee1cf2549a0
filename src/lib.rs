//! Buddy Arena Allocator
//!
//! A buddy-block allocator that manages one contiguous, caller-supplied
//! memory arena without any help from a host allocator. It features:
//! - In-arena metadata: the order count and the free list registry live at
//!   the start of the arena
//! - Intrusive doubly-linked free lists, one per order, stored inside the
//!   free blocks themselves
//! - Buddy splitting on allocation and eager coalescing on release
//! - Double-free and foreign-pointer detection reported as errors
//! - A spin-locked wrapper usable as a `#[global_allocator]`

#![no_std]

#[cfg(test)]
extern crate alloc;

use core::ptr::NonNull;

// Logging support - conditionally import log crate
#[cfg(feature = "log")]
extern crate log;

// Stub macros when log is disabled - these become no-ops
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// Size in bytes of the smallest block (order 0).
///
/// Must be a power of two and large enough to hold a [`FreeNode`].
pub const LOW_ORDER: usize = 32;

/// The error type used by the allocator.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The arena cannot hold the metadata prefix plus one minimal block.
    #[error("arena too small for heap metadata and one block")]
    InsufficientSpace,
    /// The block behind the pointer is already free.
    #[error("double free detected")]
    DoubleFree,
    /// The pointer cannot designate a block of this heap, or an arena start is null.
    #[error("pointer does not belong to this heap")]
    InvalidPointer,
    /// The allocator has not been initialized yet.
    #[error("allocator not initialized")]
    Uninitialized,
    /// The allocator was already given an arena.
    #[error("allocator already initialized")]
    AlreadyInitialized,
}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// Byte-granularity allocator.
pub trait ByteAllocator {
    /// Allocate at least `size` bytes. `None` means the heap is exhausted.
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Deallocate memory previously returned by [`ByteAllocator::alloc`].
    ///
    /// # Safety
    ///
    /// `pos` must have been returned by `alloc` on the same allocator.
    unsafe fn dealloc(&mut self, pos: NonNull<u8>) -> AllocResult;

    /// Returns the size of the managed block region in bytes.
    fn total_bytes(&self) -> usize;

    /// Returns allocated memory size in bytes, block headers included.
    fn used_bytes(&self) -> usize;

    /// Returns available memory size in bytes.
    fn available_bytes(&self) -> usize;
}

#[inline]
const fn align_up(pos: usize, align: usize) -> usize {
    (pos + align - 1) & !(align - 1)
}

/// Checks whether the address has the demanded alignment.
///
/// Equivalent to `addr % align == 0`, but the alignment must be a power of two.
#[inline]
const fn is_aligned(base_addr: usize, align: usize) -> bool {
    base_addr & (align - 1) == 0
}

pub mod buddy;
#[cfg(feature = "tracking")]
pub use buddy::BuddyStats;
pub use buddy::{
    block_size, buddy_of, required_order, BlockHeader, BuddyHeap, FreeList, FreeNode, Freedom,
    HeapMetadata, HEADER_SIZE, MAX_ORDERS,
};

pub mod global_allocator;
pub use global_allocator::LockedBuddyHeap;
