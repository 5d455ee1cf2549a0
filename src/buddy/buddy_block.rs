//! Buddy block metadata
//!
//! Every block, free or used, starts with a [`BlockHeader`]. While a block is
//! free the bytes after the header carry the free list links, so a free
//! block is reinterpreted in place as a [`FreeNode`].

use core::mem::size_of;
use core::ptr::NonNull;

use super::order::block_size;
use crate::LOW_ORDER;

/// Size of the header in front of every payload.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

const FREE_TAG: u8 = 1;
const USED_TAG: u8 = 0;

/// Allocation state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freedom {
    Free,
    Used,
}

/// Metadata prefixed to every block.
///
/// Fields are kept as raw bytes so that reading the header of an arbitrary
/// address is always sound; the typed view goes through the accessors.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy)]
pub struct BlockHeader {
    freedom: u8,
    order: u8,
    max_order: u8,
}

impl BlockHeader {
    /// Create a header for a block carved from an order-`max_order` chunk.
    pub const fn new(freedom: Freedom, order: u8, max_order: u8) -> Self {
        Self {
            freedom: match freedom {
                Freedom::Free => FREE_TAG,
                Freedom::Used => USED_TAG,
            },
            order,
            max_order,
        }
    }

    pub fn freedom(&self) -> Freedom {
        if self.freedom == FREE_TAG {
            Freedom::Free
        } else {
            Freedom::Used
        }
    }

    pub fn set_freedom(&mut self, freedom: Freedom) {
        self.freedom = match freedom {
            Freedom::Free => FREE_TAG,
            Freedom::Used => USED_TAG,
        };
    }

    pub fn is_free(&self) -> bool {
        self.freedom() == Freedom::Free
    }

    pub fn order(&self) -> usize {
        self.order as usize
    }

    pub fn set_order(&mut self, order: usize) {
        debug_assert!(order <= self.max_order as usize);
        self.order = order as u8;
    }

    pub fn max_order(&self) -> usize {
        self.max_order as usize
    }

    /// A block has a buddy iff it was split off its top-level chunk.
    pub fn has_buddy(&self) -> bool {
        self.order < self.max_order
    }

    /// Total block size, header included.
    pub fn block_size(&self) -> usize {
        block_size(self.order())
    }
}

/// In-place view of a free block: its header followed by free list links.
///
/// The links are only meaningful while the header says [`Freedom::Free`].
#[repr(C)]
#[derive(Debug)]
pub struct FreeNode {
    pub header: BlockHeader,
    pub(crate) prev: Option<NonNull<FreeNode>>,
    pub(crate) next: Option<NonNull<FreeNode>>,
}

const _: () = assert!(LOW_ORDER.is_power_of_two());
const _: () = assert!(size_of::<FreeNode>() <= LOW_ORDER);

impl FreeNode {
    /// Write a fresh unlinked free node at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for writes of `size_of::<FreeNode>()` bytes and
    /// aligned to `LOW_ORDER`.
    pub(crate) unsafe fn init_at(
        addr: NonNull<u8>,
        order: usize,
        max_order: usize,
    ) -> NonNull<FreeNode> {
        let node = addr.cast::<FreeNode>();
        unsafe {
            node.as_ptr().write(FreeNode {
                header: BlockHeader::new(Freedom::Free, order as u8, max_order as u8),
                prev: None,
                next: None,
            });
        }
        node
    }

    pub fn prev(&self) -> Option<NonNull<FreeNode>> {
        self.prev
    }

    pub fn next(&self) -> Option<NonNull<FreeNode>> {
        self.next
    }
}

/// Locate the buddy of the block whose header is at `header`.
///
/// `base` is the start of the block region; all block offsets are aligned
/// to their own size relative to it, so the buddy differs from the block in
/// exactly the bit `order + log2(LOW_ORDER)` of its offset. Returns `None`
/// for a top-level chunk. The returned address is not dereferenced.
///
/// # Safety
///
/// `header` must point to a block header tracked by the heap whose block
/// region starts at `base`.
pub unsafe fn buddy_of(
    base: NonNull<u8>,
    header: NonNull<BlockHeader>,
) -> Option<NonNull<BlockHeader>> {
    let head = unsafe { header.as_ref() };
    if !head.has_buddy() {
        return None;
    }

    let offset = header.as_ptr() as usize - base.as_ptr() as usize;
    let buddy_offset = offset ^ block_size(head.order());
    // SAFETY: the buddy lies inside the parent chunk, which lies inside the
    // block region.
    Some(unsafe { base.add(buddy_offset) }.cast())
}
