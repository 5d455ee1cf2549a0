//! Buddy heap over a single caller-supplied arena
//!
//! [`BuddyHeap`] is the explicit handle to one arena. It owns no memory of
//! its own: the order count, the free list registry and every block header
//! live inside the arena.

use core::ptr::NonNull;

use crate::{is_aligned, AllocError, AllocResult, ByteAllocator, LOW_ORDER};

#[cfg(feature = "log")]
use log::{debug, error, info, trace, warn};

use super::{
    buddy_block::{buddy_of, BlockHeader, FreeNode, Freedom, HEADER_SIZE},
    free_list::{FreeList, FreeListIter, FreeListRegistry},
    heap_layout::{HeapLayout, HeapMetadata},
    order::{block_size, required_order},
};

#[cfg(feature = "tracking")]
use super::stats::{BuddyStats, MemoryStatsReporter};

/// Handle to a buddy heap laid out inside one arena.
///
/// All operations take the handle explicitly, so several independent heaps
/// can coexist. A heap is single-threaded; wrap it in
/// [`LockedBuddyHeap`](crate::LockedBuddyHeap) for shared use.
pub struct BuddyHeap {
    arena: NonNull<u8>,
    arena_size: usize,
    metadata: NonNull<HeapMetadata>,
    registry: FreeListRegistry,
    /// Start of the block region; buddy offsets are relative to it.
    blocks: NonNull<u8>,
    /// Bytes actually covered by carved chunks.
    managed_bytes: usize,
    #[cfg(feature = "tracking")]
    stats: BuddyStats,
}

// SAFETY: the handle holds the exclusive right to its arena; moving it to
// another thread moves that right with it.
unsafe impl Send for BuddyHeap {}

impl BuddyHeap {
    /// Lay out a heap over `[arena, arena + arena_size)`.
    ///
    /// # Safety
    ///
    /// The range must be valid for reads and writes, must not be accessed by
    /// anything but the returned heap, and must outlive it.
    pub unsafe fn initialize(arena: NonNull<u8>, arena_size: usize) -> AllocResult<Self> {
        let base = arena.as_ptr() as usize;
        let layout = match HeapLayout::plan(base, arena_size) {
            Ok(layout) => layout,
            Err(e) => {
                warn!(
                    "buddy heap: arena [{:#x}, +{:#x}) too small for metadata and one block",
                    base, arena_size
                );
                return Err(e);
            }
        };

        let metadata = unsafe { arena.add(layout.metadata_offset) }.cast::<HeapMetadata>();
        unsafe {
            metadata.as_ptr().write(HeapMetadata {
                orders: layout.num_orders,
            })
        };
        let lists = unsafe { arena.add(layout.lists_offset) }.cast::<FreeList>();
        let registry = unsafe { FreeListRegistry::init(lists, layout.num_orders) };
        let blocks = unsafe { arena.add(layout.blocks_offset) };

        let mut heap = Self {
            arena,
            arena_size,
            metadata,
            registry,
            blocks,
            managed_bytes: 0,
            #[cfg(feature = "tracking")]
            stats: BuddyStats::new(),
        };

        for (offset, order) in layout.chunks() {
            unsafe {
                let node = FreeNode::init_at(blocks.add(offset), order, order);
                heap.registry.insert(node);
            }
            heap.managed_bytes += block_size(order);
        }

        #[cfg(feature = "tracking")]
        {
            heap.stats.total_bytes = heap.managed_bytes;
            heap.stats.free_bytes = heap.managed_bytes;
        }

        debug!(
            "buddy heap: arena [{:#x}, {:#x}), {} orders, blocks at {:#x}, {:#x} bytes managed",
            base,
            base + arena_size,
            layout.num_orders,
            blocks.as_ptr() as usize,
            heap.managed_bytes
        );

        Ok(heap)
    }

    /// Number of orders recorded in the arena metadata.
    pub fn num_orders(&self) -> usize {
        // SAFETY: written in `initialize`, never modified afterwards.
        unsafe { self.metadata.as_ref() }.orders
    }

    pub fn max_order(&self) -> usize {
        self.num_orders() - 1
    }

    /// Address range of the caller-supplied arena.
    pub fn arena(&self) -> (NonNull<u8>, usize) {
        (self.arena, self.arena_size)
    }

    /// Start of the block region.
    pub fn blocks_base(&self) -> NonNull<u8> {
        self.blocks
    }

    /// Number of free blocks of the given order.
    pub fn free_block_count(&self, order: usize) -> usize {
        if order < self.num_orders() {
            self.registry.list(order).len()
        } else {
            0
        }
    }

    /// Free blocks of `order`, oldest first. Empty for orders the heap lacks.
    pub fn free_blocks(&self, order: usize) -> FreeListIter<'_> {
        if order < self.num_orders() {
            self.registry.list(order).iter()
        } else {
            FreeListIter::empty()
        }
    }

    /// Allocate a block whose payload holds at least `requested_bytes`.
    ///
    /// Takes the smallest sufficient free block, oldest first, and splits it
    /// down to the required order. Returns `None` when no order can serve the
    /// request.
    pub fn allocate(&mut self, requested_bytes: usize) -> Option<NonNull<u8>> {
        let order = required_order(requested_bytes);

        let Some(found) = self.registry.first_non_empty(order) else {
            debug!(
                "buddy heap: allocation failure: {} bytes (order {}), {} orders",
                requested_bytes,
                order,
                self.num_orders()
            );
            #[cfg(feature = "tracking")]
            {
                self.stats.failed_allocations += 1;
                self.print_alloc_failure_stats(requested_bytes);
            }
            return None;
        };

        let node = self.registry.list(found).head()?;
        for _ in order..found {
            // SAFETY: `node` is the registered free head, order > requested.
            unsafe { self.split(node) };
        }

        unsafe {
            self.registry.remove(node);
            (*node.as_ptr()).header.set_freedom(Freedom::Used);
        }

        #[cfg(feature = "tracking")]
        {
            self.stats.allocations += 1;
            self.stats.used_bytes += block_size(order);
            self.stats.free_bytes -= block_size(order);
        }

        // SAFETY: the payload starts inside the block, after its header.
        Some(unsafe { node.cast::<u8>().add(HEADER_SIZE) })
    }

    /// Return a block to the heap and merge it with free buddies.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`BuddyHeap::allocate`] on this heap.
    /// Pointers that are out of range or misaligned, and blocks that are
    /// already free, are detected and rejected without touching the heap.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) -> AllocResult {
        let node = self.header_of(ptr)?;
        let header = unsafe { &mut (*node.as_ptr()).header };

        if header.is_free() {
            warn!(
                "buddy heap: double free detected at {:#x}",
                ptr.as_ptr() as usize
            );
            #[cfg(feature = "tracking")]
            {
                self.stats.double_frees += 1;
            }
            return Err(AllocError::DoubleFree);
        }

        header.set_freedom(Freedom::Free);

        #[cfg(feature = "tracking")]
        {
            let size = header.block_size();
            self.stats.frees += 1;
            self.stats.used_bytes -= size;
            self.stats.free_bytes += size;
        }

        unsafe { self.coalesce(node) };
        Ok(())
    }

    /// Payload capacity of the live block behind `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`BuddyHeap::allocate`] on this heap
    /// and not freed since.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> AllocResult<usize> {
        let node = self.header_of(ptr)?;
        let header = unsafe { &node.as_ref().header };
        if header.is_free() {
            return Err(AllocError::InvalidPointer);
        }
        Ok(header.block_size() - HEADER_SIZE)
    }

    /// Recover and sanity check the block header in front of a payload.
    fn header_of(&self, ptr: NonNull<u8>) -> AllocResult<NonNull<FreeNode>> {
        let addr = ptr.as_ptr() as usize;
        let base = self.blocks.as_ptr() as usize;

        let offset = match addr.checked_sub(base + HEADER_SIZE) {
            Some(offset) if offset < self.managed_bytes && is_aligned(offset, LOW_ORDER) => {
                offset
            }
            _ => {
                warn!(
                    "buddy heap: free of {:#x}: not a block of heap at {:#x}",
                    addr, base
                );
                return Err(AllocError::InvalidPointer);
            }
        };

        // SAFETY: `offset` lies within the carved part of the block region.
        let node = unsafe { self.blocks.add(offset) }.cast::<FreeNode>();
        let header = unsafe { &node.as_ref().header };
        let plausible = header.order() <= header.max_order()
            && header.max_order() < self.num_orders()
            && is_aligned(offset, header.block_size())
            && header.block_size() <= self.managed_bytes - offset;
        if !plausible {
            warn!(
                "buddy heap: free of {:#x}: corrupted header (order {}, max order {})",
                addr,
                header.order(),
                header.max_order()
            );
            return Err(AllocError::InvalidPointer);
        }

        Ok(node)
    }

    /// Halve a registered free block into two free blocks one order lower.
    ///
    /// # Safety
    ///
    /// `node` must be registered free with `order > 0`.
    unsafe fn split(&mut self, mut node: NonNull<FreeNode>) {
        unsafe {
            debug_assert!(node.as_ref().header.order() > 0);
            self.registry.remove(node);

            let header = &mut node.as_mut().header;
            let order = header.order() - 1;
            header.set_order(order);
            let max_order = header.max_order();

            // Lowering the order below max_order guarantees a buddy
            let Some(buddy) = buddy_of(self.blocks, node.cast()) else {
                unreachable!("split block has no buddy");
            };
            let buddy = FreeNode::init_at(buddy.cast(), order, max_order);

            trace!(
                "buddy heap: split {:#x} into two order {} blocks",
                node.as_ptr() as usize,
                order
            );

            self.registry.insert(node);
            self.registry.insert(buddy);
        }

        #[cfg(feature = "tracking")]
        {
            self.stats.splits += 1;
        }
    }

    /// Merge a just-freed block with its buddy for as long as possible, then
    /// register the result.
    ///
    /// # Safety
    ///
    /// `node` must be marked free and not be in any list.
    unsafe fn coalesce(&mut self, mut node: NonNull<FreeNode>) {
        loop {
            let order = unsafe { node.as_ref() }.header.order();
            let Some(buddy) = (unsafe { buddy_of(self.blocks, node.cast()) }) else {
                break;
            };
            let buddy_header: &BlockHeader = unsafe { buddy.as_ref() };
            // A free header at a lower order means the buddy is partially split
            if !buddy_header.is_free() || buddy_header.order() != order {
                break;
            }

            let buddy = buddy.cast::<FreeNode>();
            unsafe { self.registry.remove(buddy) };

            let mut merged = if buddy < node { buddy } else { node };
            unsafe { merged.as_mut().header.set_order(order + 1) };
            trace!(
                "buddy heap: merged {:#x} and {:#x} into order {}",
                node.as_ptr() as usize,
                buddy.as_ptr() as usize,
                order + 1
            );
            node = merged;

            #[cfg(feature = "tracking")]
            {
                self.stats.merges += 1;
            }
        }

        unsafe { self.registry.insert(node) };
    }

    /// Bytes currently held in free lists.
    fn free_bytes(&self) -> usize {
        (0..self.num_orders())
            .map(|order| self.registry.list(order).len() * block_size(order))
            .sum()
    }

    /// Walk every free list and check the heap invariants.
    ///
    /// Verifies that each registered block is free, carries the order of its
    /// list, sits on a size-aligned offset inside the block region, is
    /// linked symmetrically, and has no free buddy of the same order.
    pub fn is_consistent(&self) -> bool {
        let base = self.blocks.as_ptr() as usize;
        for order in 0..self.num_orders() {
            let list = self.registry.list(order);
            let mut prev: Option<NonNull<FreeNode>> = None;
            let mut count = 0;

            for node in list.iter() {
                let n = unsafe { node.as_ref() };
                let offset = node.as_ptr() as usize - base;
                if !n.header.is_free() || n.header.order() != order {
                    error!(
                        "buddy heap: block {:#x} in order {} list has order {} (free: {})",
                        node.as_ptr() as usize,
                        order,
                        n.header.order(),
                        n.header.is_free()
                    );
                    return false;
                }
                if !is_aligned(offset, block_size(order))
                    || offset + block_size(order) > self.managed_bytes
                {
                    error!(
                        "buddy heap: block {:#x} misplaced for order {}",
                        node.as_ptr() as usize,
                        order
                    );
                    return false;
                }
                if n.prev() != prev {
                    error!(
                        "buddy heap: broken back link at {:#x}",
                        node.as_ptr() as usize
                    );
                    return false;
                }
                if let Some(buddy) = unsafe { buddy_of(self.blocks, node.cast()) } {
                    let b = unsafe { buddy.as_ref() };
                    if b.max_order() != n.header.max_order() {
                        error!(
                            "buddy heap: buddies of {:#x} disagree on max order",
                            node.as_ptr() as usize
                        );
                        return false;
                    }
                    if b.is_free() && b.order() == order {
                        error!(
                            "buddy heap: free buddies {:#x} and {:#x} left unmerged",
                            node.as_ptr() as usize,
                            buddy.as_ptr() as usize
                        );
                        return false;
                    }
                }
                prev = Some(node);
                count += 1;
            }

            if count != list.len() || list.iter().last() != prev {
                error!("buddy heap: order {} list length mismatch", order);
                return false;
            }
        }
        true
    }

    /// Log the free block distribution.
    pub fn print_free_lists(&self) {
        info!("========== Buddy Heap Free Lists ==========");
        info!(
            "Arena: [{:#x}, {:#x})",
            self.arena.as_ptr() as usize,
            self.arena.as_ptr() as usize + self.arena_size
        );
        info!(
            "Orders: {} (block size {} to {})",
            self.num_orders(),
            LOW_ORDER,
            block_size(self.max_order())
        );
        info!(
            "Free bytes: {:#x} of {:#x}",
            self.free_bytes(),
            self.managed_bytes
        );
        for order in 0..self.num_orders() {
            let count = self.registry.list(order).len();
            if count > 0 {
                info!(
                    "  Order {}: {} blocks (size {} bytes each, total {:#x})",
                    order,
                    count,
                    block_size(order),
                    count * block_size(order)
                );
            }
        }
        info!("===========================================");
    }

    /// Snapshot of the heap counters.
    #[cfg(feature = "tracking")]
    pub fn stats(&self) -> BuddyStats {
        let mut stats = self.stats;
        for order in 0..self.num_orders() {
            stats.free_blocks_by_order[order] = self.registry.list(order).len();
        }
        stats
    }

    #[cfg(feature = "tracking")]
    fn print_alloc_failure_stats(&self, requested_bytes: usize) {
        MemoryStatsReporter::print_alloc_failure_stats(
            &self.stats(),
            self.num_orders(),
            requested_bytes,
        );
    }
}

impl ByteAllocator for BuddyHeap {
    fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.allocate(size)
    }

    unsafe fn dealloc(&mut self, pos: NonNull<u8>) -> AllocResult {
        unsafe { self.free(pos) }
    }

    fn total_bytes(&self) -> usize {
        self.managed_bytes
    }

    fn used_bytes(&self) -> usize {
        self.managed_bytes - self.free_bytes()
    }

    fn available_bytes(&self) -> usize {
        self.free_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::alloc::{alloc, dealloc};
    use alloc::vec::Vec;
    use core::alloc::Layout;

    /// Arena whose block region is exactly one chunk of `max_order`.
    fn single_chunk_size(max_order: usize) -> usize {
        let prefix = core::mem::size_of::<HeapMetadata>()
            + (max_order + 1) * core::mem::size_of::<FreeList>();
        crate::align_up(prefix, LOW_ORDER) + block_size(max_order)
    }

    struct TestArena {
        ptr: NonNull<u8>,
        layout: Layout,
    }

    impl TestArena {
        fn new(size: usize) -> Self {
            let layout = Layout::from_size_align(size, 4096).unwrap();
            let ptr = NonNull::new(unsafe { alloc(layout) }).unwrap();
            Self { ptr, layout }
        }

        fn single_chunk(max_order: usize) -> Self {
            Self::new(single_chunk_size(max_order))
        }

        fn heap(&self) -> BuddyHeap {
            unsafe { BuddyHeap::initialize(self.ptr, self.layout.size()) }.unwrap()
        }
    }

    impl Drop for TestArena {
        fn drop(&mut self) {
            unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
        }
    }

    #[test]
    fn test_initialize_records_orders_in_arena() {
        let arena = TestArena::single_chunk(10);
        let heap = arena.heap();

        let stored = unsafe { arena.ptr.cast::<HeapMetadata>().as_ref() }.orders;
        assert_eq!(stored, heap.num_orders());
        assert_eq!(heap.max_order(), 10);
        assert_eq!(heap.free_block_count(10), 1);
        assert_eq!(heap.total_bytes(), block_size(10));
        assert!(heap.is_consistent());
    }

    #[test]
    fn test_initialize_carves_binary_decomposition() {
        let arena = TestArena::new(64 * 1024);
        let heap = arena.heap();

        assert_eq!(heap.max_order(), 10);
        let mut covered = 0;
        for order in (0..heap.num_orders()).rev() {
            for node in heap.free_blocks(order) {
                let header = unsafe { node.as_ref() }.header;
                assert_eq!(header.order(), header.max_order());
                covered += block_size(order);
            }
        }
        assert_eq!(covered, heap.total_bytes());
        assert!(64 * 1024 - covered < 2 * LOW_ORDER + 11 * core::mem::size_of::<FreeList>());
        assert!(heap.is_consistent());
    }

    #[test]
    fn test_initialize_too_small() {
        let arena = TestArena::new(4096);
        let res = unsafe { BuddyHeap::initialize(arena.ptr, LOW_ORDER) };
        assert_eq!(res.err(), Some(AllocError::InsufficientSpace));
    }

    #[test]
    fn test_allocate_splits_down() {
        let arena = TestArena::single_chunk(10);
        let mut heap = arena.heap();
        let top = heap.max_order();

        let ptr = heap.allocate(1).unwrap();
        assert_eq!(ptr.as_ptr() as usize - heap.blocks_base().as_ptr() as usize, HEADER_SIZE);
        // One free buddy left behind at every order below the top
        for order in 0..top {
            assert_eq!(heap.free_block_count(order), 1, "order {}", order);
        }
        assert_eq!(heap.free_block_count(top), 0);
        assert!(heap.is_consistent());

        unsafe { heap.free(ptr) }.unwrap();
        assert_eq!(heap.free_block_count(top), 1);
        for order in 0..top {
            assert_eq!(heap.free_block_count(order), 0);
        }
        assert!(heap.is_consistent());
    }

    #[test]
    fn test_fifo_within_order() {
        let arena = TestArena::single_chunk(10);
        let mut heap = arena.heap();

        let a = heap.allocate(1).unwrap();
        let b = heap.allocate(1).unwrap();
        // `b` took the order-0 buddy of `a`
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, LOW_ORDER);
        let c = heap.allocate(1).unwrap();
        assert_eq!(c.as_ptr() as usize - a.as_ptr() as usize, 2 * LOW_ORDER);
    }

    #[test]
    fn test_released_blocks_reused_oldest_first() {
        let arena = TestArena::single_chunk(10);
        let mut heap = arena.heap();

        // Eight order-0 blocks fill one order-3 block
        let v: Vec<_> = (0..8).map(|_| heap.allocate(1).unwrap()).collect();
        assert_eq!(heap.free_block_count(0), 0);

        // Each buddy is still in use, so nothing coalesces
        for i in [2, 0, 4] {
            unsafe { heap.free(v[i]) }.unwrap();
        }
        assert_eq!(heap.free_block_count(0), 3);

        assert_eq!(heap.allocate(1), Some(v[2]));
        assert_eq!(heap.allocate(1), Some(v[0]));
        assert_eq!(heap.allocate(1), Some(v[4]));
        assert_eq!(heap.free_block_count(0), 0);
    }

    #[test]
    fn test_free_blocks_out_of_range_order_is_empty() {
        let arena = TestArena::single_chunk(4);
        let heap = arena.heap();

        assert_eq!(heap.free_blocks(heap.max_order()).count(), 1);
        assert_eq!(heap.free_blocks(heap.num_orders()).count(), 0);
        assert_eq!(heap.free_blocks(usize::MAX).count(), 0);
    }

    #[test]
    fn test_partially_split_buddy_is_not_merged() {
        let arena = TestArena::single_chunk(10);
        let mut heap = arena.heap();

        // Order-1 block at offset 0; its buddy at 64 is split into two order-0 blocks
        let big = heap.allocate(LOW_ORDER).unwrap();
        let s1 = heap.allocate(1).unwrap();
        let s2 = heap.allocate(1).unwrap();
        assert_eq!(heap.block_offset(big), 0);
        assert_eq!(heap.block_offset(s1), 2 * LOW_ORDER);
        assert_eq!(heap.block_offset(s2), 3 * LOW_ORDER);

        unsafe { heap.free(s1) }.unwrap();
        assert_eq!(heap.free_block_count(0), 1);

        // The header at the buddy address is free but only order 0
        unsafe { heap.free(big) }.unwrap();
        assert_eq!(heap.free_block_count(1), 1);
        assert_eq!(heap.free_block_count(0), 1);
        assert!(heap.is_consistent());

        unsafe { heap.free(s2) }.unwrap();
        assert_eq!(heap.free_block_count(heap.max_order()), 1);
        assert_eq!(heap.available_bytes(), heap.total_bytes());
        assert!(heap.is_consistent());
    }

    #[test]
    fn test_double_free_leaves_heap_untouched() {
        let arena = TestArena::single_chunk(10);
        let mut heap = arena.heap();

        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(100).unwrap();
        unsafe { heap.free(a) }.unwrap();
        let before = heap.available_bytes();

        assert_eq!(unsafe { heap.free(a) }, Err(AllocError::DoubleFree));
        assert_eq!(heap.available_bytes(), before);
        assert!(heap.is_consistent());

        unsafe { heap.free(b) }.unwrap();
        assert_eq!(unsafe { heap.free(b) }, Err(AllocError::DoubleFree));
        assert_eq!(heap.available_bytes(), heap.total_bytes());
    }

    #[test]
    fn test_foreign_pointer_rejected() {
        let arena = TestArena::single_chunk(10);
        let mut heap = arena.heap();
        let p = heap.allocate(8).unwrap();

        let misaligned = unsafe { p.add(1) };
        assert_eq!(unsafe { heap.free(misaligned) }, Err(AllocError::InvalidPointer));

        let mut outside = 0u64;
        let outside = NonNull::from(&mut outside).cast::<u8>();
        assert_eq!(unsafe { heap.free(outside) }, Err(AllocError::InvalidPointer));

        assert_eq!(unsafe { heap.free(heap.blocks_base()) }, Err(AllocError::InvalidPointer));
        unsafe { heap.free(p) }.unwrap();
    }

    #[test]
    fn test_usable_size() {
        let arena = TestArena::single_chunk(10);
        let mut heap = arena.heap();

        let p = heap.allocate(100).unwrap();
        let usable = unsafe { heap.usable_size(p) }.unwrap();
        assert_eq!(usable, 128 - HEADER_SIZE);
        unsafe { heap.free(p) }.unwrap();
        assert_eq!(unsafe { heap.usable_size(p) }, Err(AllocError::InvalidPointer));
    }

    #[test]
    fn test_byte_allocator_accounting() {
        let arena = TestArena::single_chunk(10);
        let mut heap = arena.heap();
        let total = heap.total_bytes();
        assert_eq!(heap.available_bytes(), total);

        let ptrs: Vec<_> = (0..8).map(|_| ByteAllocator::alloc(&mut heap, 200).unwrap()).collect();
        assert_eq!(heap.used_bytes(), 8 * 256);
        assert_eq!(heap.available_bytes(), total - 8 * 256);

        for p in ptrs {
            unsafe { ByteAllocator::dealloc(&mut heap, p) }.unwrap();
        }
        assert_eq!(heap.used_bytes(), 0);
    }

    #[test]
    fn test_request_beyond_max_order() {
        let arena = TestArena::single_chunk(10);
        let mut heap = arena.heap();
        assert!(heap.allocate(block_size(heap.max_order())).is_none());
        assert!(heap.allocate(usize::MAX).is_none());
        assert!(heap.allocate(block_size(heap.max_order()) - HEADER_SIZE).is_some());
    }

    #[cfg(feature = "tracking")]
    #[test]
    fn test_stats_counters() {
        let arena = TestArena::single_chunk(10);
        let mut heap = arena.heap();

        assert_eq!(heap.stats().largest_free_order(), Some(heap.max_order()));
        let p = heap.allocate(1).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.largest_free_order(), Some(heap.max_order() - 1));
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.splits, heap.max_order());
        assert_eq!(stats.used_bytes, LOW_ORDER);

        unsafe { heap.free(p) }.unwrap();
        let _ = unsafe { heap.free(p) };
        let stats = heap.stats();
        assert_eq!(stats.frees, 1);
        assert_eq!(stats.double_frees, 1);
        assert_eq!(stats.merges, heap.max_order());
        assert_eq!(stats.used_bytes, 0);
        assert_eq!(stats.free_blocks_by_order[heap.max_order()], 1);
    }

    impl BuddyHeap {
        fn block_offset(&self, ptr: NonNull<u8>) -> usize {
            ptr.as_ptr() as usize - HEADER_SIZE - self.blocks.as_ptr() as usize
        }
    }
}
