//! Arena layout
//!
//! ```text
//! base                                                             base+size
//! | pad | HeapMetadata | FreeList * N | pad | chunk | chunk | ... | unused |
//!                                           ^ block region (LOW_ORDER aligned)
//! ```
//!
//! The number of orders `N` is fixed here for the arena's lifetime. The
//! block region is then cut greedily into naturally aligned power-of-two
//! chunks, largest first, each capped at order `N - 1`.

use core::mem::{align_of, size_of};

use super::free_list::FreeList;
use super::order::block_size;
use crate::{align_up, AllocError, AllocResult, LOW_ORDER};

/// Upper bound on the number of orders of any heap.
///
/// Keeps `LOW_ORDER << (MAX_ORDERS - 1)` representable in `usize`.
pub const MAX_ORDERS: usize = (usize::BITS - LOW_ORDER.trailing_zeros() - 1) as usize;

const _: () = assert!(MAX_ORDERS <= u8::MAX as usize);

/// Heap-wide record stored at the start of the arena.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HeapMetadata {
    /// Number of orders, i.e. length of the free list registry that follows.
    pub orders: usize,
}

/// Byte offsets of one arena's layout, relative to the arena base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapLayout {
    pub metadata_offset: usize,
    pub lists_offset: usize,
    pub num_orders: usize,
    pub blocks_offset: usize,
    pub blocks_size: usize,
}

impl HeapLayout {
    /// Size the registry for the arena `[base, base + size)`.
    ///
    /// Picks the largest order count whose metadata prefix still leaves room
    /// for one block of the top order.
    pub fn plan(base: usize, size: usize) -> AllocResult<Self> {
        let end = base.checked_add(size).ok_or(AllocError::InsufficientSpace)?;
        let meta_addr = align_up(base, align_of::<HeapMetadata>());
        let lists_addr = align_up(meta_addr + size_of::<HeapMetadata>(), align_of::<FreeList>());

        let mut best = None;
        for num_orders in 1..=MAX_ORDERS {
            let prefix_end = lists_addr
                .checked_add(num_orders * size_of::<FreeList>())
                .and_then(|addr| addr.checked_add(LOW_ORDER - 1))
                .map(|addr| addr & !(LOW_ORDER - 1));
            let Some(blocks_addr) = prefix_end else {
                break;
            };
            let fits = blocks_addr
                .checked_add(block_size(num_orders - 1))
                .is_some_and(|top_end| top_end <= end);
            if !fits {
                break;
            }
            best = Some((num_orders, blocks_addr));
        }

        let (num_orders, blocks_addr) = best.ok_or(AllocError::InsufficientSpace)?;
        Ok(Self {
            metadata_offset: meta_addr - base,
            lists_offset: lists_addr - base,
            num_orders,
            blocks_offset: blocks_addr - base,
            blocks_size: end - blocks_addr,
        })
    }

    pub const fn max_order(&self) -> usize {
        self.num_orders - 1
    }

    /// Top-level chunks of the block region as `(offset, order)` pairs,
    /// offsets relative to the block region start.
    pub fn chunks(&self) -> Chunks {
        Chunks {
            offset: 0,
            remaining: self.blocks_size,
            max_order: self.max_order(),
        }
    }
}

/// Greedy decomposition of the block region into maximal chunks
pub struct Chunks {
    offset: usize,
    remaining: usize,
    max_order: usize,
}

impl Iterator for Chunks {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining < LOW_ORDER {
            return None;
        }
        let fit_order = (self.remaining / LOW_ORDER).ilog2() as usize;
        let order = fit_order.min(self.max_order);
        let offset = self.offset;
        self.offset += block_size(order);
        self.remaining -= block_size(order);
        Some((offset, order))
    }
}
