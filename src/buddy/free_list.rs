//! Intrusive free lists stored inside the arena
//!
//! Each order owns one doubly-linked [`FreeList`] whose nodes are the free
//! blocks themselves. The lists never allocate: insert and remove only
//! rewrite links inside caller-owned arena memory.

use core::marker::PhantomData;
use core::ptr::NonNull;

use super::buddy_block::FreeNode;

/// Free list for a single order
#[repr(C)]
#[derive(Debug)]
pub struct FreeList {
    head: Option<NonNull<FreeNode>>,
    tail: Option<NonNull<FreeNode>>,
    len: usize,
}

impl FreeList {
    /// Create a new empty free list
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn head(&self) -> Option<NonNull<FreeNode>> {
        self.head
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append `node` at the tail.
    ///
    /// # Safety
    ///
    /// `node` must point to a free block that is not a member of any list.
    pub(crate) unsafe fn push_back(&mut self, mut node: NonNull<FreeNode>) {
        unsafe {
            let n = node.as_mut();
            n.prev = self.tail;
            n.next = None;
            match self.tail {
                Some(mut tail) => tail.as_mut().next = Some(node),
                None => self.head = Some(node),
            }
        }
        self.tail = Some(node);
        self.len += 1;
    }

    /// Unlink `node` using its own links and clear them.
    ///
    /// # Safety
    ///
    /// `node` must currently be a member of this list.
    pub(crate) unsafe fn unlink(&mut self, mut node: NonNull<FreeNode>) {
        debug_assert!(self.len > 0, "unlink from an empty free list");
        unsafe {
            let n = node.as_mut();
            match n.prev {
                Some(mut prev) => prev.as_mut().next = n.next,
                None => self.head = n.next,
            }
            match n.next {
                Some(mut next) => next.as_mut().prev = n.prev,
                None => self.tail = n.prev,
            }
            n.prev = None;
            n.next = None;
        }
        self.len -= 1;
    }

    /// Iterate over the free blocks, oldest first.
    pub fn iter(&self) -> FreeListIter<'_> {
        FreeListIter {
            current: self.head,
            remaining: self.len,
            _list: PhantomData,
        }
    }
}

impl Default for FreeList {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the nodes of a [`FreeList`]
pub struct FreeListIter<'a> {
    current: Option<NonNull<FreeNode>>,
    remaining: usize,
    _list: PhantomData<&'a FreeList>,
}

impl FreeListIter<'_> {
    /// An iterator that yields nothing.
    pub const fn empty() -> Self {
        Self {
            current: None,
            remaining: 0,
            _list: PhantomData,
        }
    }
}

impl Iterator for FreeListIter<'_> {
    type Item = NonNull<FreeNode>;

    fn next(&mut self) -> Option<Self::Item> {
        // Bounded by the recorded length so a corrupted cycle cannot spin forever
        if self.remaining == 0 {
            return None;
        }
        let node = self.current?;
        self.remaining -= 1;
        // SAFETY: members of a free list are live free nodes in the arena.
        self.current = unsafe { node.as_ref() }.next;
        Some(node)
    }
}

/// The per-order free lists of one heap, living right after its metadata.
pub struct FreeListRegistry {
    lists: NonNull<FreeList>,
    num_orders: usize,
}

impl FreeListRegistry {
    /// Initialize `num_orders` empty lists at `lists`.
    ///
    /// # Safety
    ///
    /// `lists` must be valid for writes of `num_orders` consecutive
    /// [`FreeList`] values and stay valid for the registry's lifetime.
    pub(crate) unsafe fn init(lists: NonNull<FreeList>, num_orders: usize) -> Self {
        for order in 0..num_orders {
            unsafe { lists.add(order).as_ptr().write(FreeList::new()) };
        }
        Self { lists, num_orders }
    }

    pub fn num_orders(&self) -> usize {
        self.num_orders
    }

    /// Free list of the given order.
    pub fn list(&self, order: usize) -> &FreeList {
        assert!(order < self.num_orders, "order {} out of range", order);
        // SAFETY: the lists were initialized in `init` and are only mutated
        // through `&mut self`.
        unsafe { self.lists.add(order).as_ref() }
    }

    fn list_mut(&mut self, order: usize) -> &mut FreeList {
        assert!(order < self.num_orders, "order {} out of range", order);
        unsafe { self.lists.add(order).as_mut() }
    }

    /// Append `node` to the list matching its header's order.
    ///
    /// # Safety
    ///
    /// `node` must be a free block of this heap that is not in any list.
    pub(crate) unsafe fn insert(&mut self, node: NonNull<FreeNode>) {
        let order = unsafe { node.as_ref() }.header.order();
        unsafe { self.list_mut(order).push_back(node) };
    }

    /// Detach `node` from the list matching its header's order.
    ///
    /// # Safety
    ///
    /// `node` must currently be registered in that list.
    pub(crate) unsafe fn remove(&mut self, node: NonNull<FreeNode>) {
        let order = unsafe { node.as_ref() }.header.order();
        unsafe { self.list_mut(order).unlink(node) };
    }

    /// Lowest order in `from..num_orders` whose list is non-empty.
    pub fn first_non_empty(&self, from: usize) -> Option<usize> {
        (from..self.num_orders).find(|&order| !self.list(order).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LOW_ORDER;
    use alloc::alloc::{alloc, dealloc};
    use alloc::vec::Vec;
    use core::alloc::Layout;

    struct TestNodes {
        region: *mut u8,
        layout: Layout,
        nodes: Vec<NonNull<FreeNode>>,
    }

    impl TestNodes {
        fn new(count: usize) -> Self {
            let layout = Layout::from_size_align(count * LOW_ORDER, LOW_ORDER).unwrap();
            let region = unsafe { alloc(layout) };
            let base = NonNull::new(region).unwrap();
            let nodes = (0..count)
                .map(|i| unsafe { FreeNode::init_at(base.add(i * LOW_ORDER), 0, 3) })
                .collect();
            Self {
                region,
                layout,
                nodes,
            }
        }
    }

    impl Drop for TestNodes {
        fn drop(&mut self) {
            unsafe { dealloc(self.region, self.layout) };
        }
    }

    fn collect(list: &FreeList) -> Vec<NonNull<FreeNode>> {
        list.iter().collect()
    }

    #[test]
    fn test_push_back_is_fifo() {
        let t = TestNodes::new(3);
        let mut list = FreeList::new();
        unsafe {
            for &n in &t.nodes {
                list.push_back(n);
            }
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.head(), Some(t.nodes[0]));
        assert_eq!(collect(&list), t.nodes);
    }

    #[test]
    fn test_unlink_head_middle_tail() {
        let t = TestNodes::new(4);
        let mut list = FreeList::new();
        unsafe {
            for &n in &t.nodes {
                list.push_back(n);
            }

            list.unlink(t.nodes[1]);
            assert_eq!(collect(&list), [t.nodes[0], t.nodes[2], t.nodes[3]]);
            assert!(t.nodes[1].as_ref().prev().is_none());
            assert!(t.nodes[1].as_ref().next().is_none());

            list.unlink(t.nodes[0]);
            assert_eq!(list.head(), Some(t.nodes[2]));
            assert!(t.nodes[2].as_ref().prev().is_none());

            list.unlink(t.nodes[3]);
            assert_eq!(collect(&list), [t.nodes[2]]);
            assert!(t.nodes[2].as_ref().next().is_none());

            list.unlink(t.nodes[2]);
        }
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(list.iter().count(), 0);
    }

    #[test]
    fn test_reinsert_after_unlink() {
        let t = TestNodes::new(2);
        let mut list = FreeList::new();
        unsafe {
            list.push_back(t.nodes[0]);
            list.push_back(t.nodes[1]);
            list.unlink(t.nodes[0]);
            list.push_back(t.nodes[0]);
        }
        assert_eq!(collect(&list), [t.nodes[1], t.nodes[0]]);
    }

    #[test]
    fn test_registry_routes_by_order() {
        let t = TestNodes::new(3);
        let mut lists = [const { FreeList::new() }; 4];
        let mut registry =
            unsafe { FreeListRegistry::init(NonNull::new(lists.as_mut_ptr()).unwrap(), 4) };

        unsafe {
            let mut n = t.nodes[2];
            n.as_mut().header.set_order(2);
            registry.insert(t.nodes[0]);
            registry.insert(n);
        }

        assert_eq!(registry.list(0).len(), 1);
        assert_eq!(registry.list(2).len(), 1);
        assert_eq!(registry.first_non_empty(0), Some(0));
        assert_eq!(registry.first_non_empty(1), Some(2));
        assert_eq!(registry.first_non_empty(3), None);

        unsafe { registry.remove(t.nodes[0]) };
        assert!(registry.list(0).is_empty());
        assert_eq!(registry.first_non_empty(0), Some(2));
    }
}
