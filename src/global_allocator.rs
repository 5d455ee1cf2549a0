//! Lock-protected buddy heap.
//!
//! [`BuddyHeap`] itself is single-threaded. This module wraps one heap in a
//! spin lock so that it can be shared, and implements [`GlobalAlloc`] on top
//! so the arena can back Rust's global allocator.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use kspin::SpinNoIrq;

#[cfg(feature = "tracking")]
use crate::buddy::BuddyStats;
use crate::buddy::{BuddyHeap, HEADER_SIZE};
use crate::{AllocError, AllocResult, ByteAllocator};

#[cfg(feature = "log")]
use log::{error, warn};

/// A buddy heap behind a spin lock
///
/// Every allocation and release runs inside one critical section of the
/// heap's own lock; independent `LockedBuddyHeap`s never contend.
///
/// Without the `smp` feature the lock only disables interrupts, which is
/// enough on a single core.
pub struct LockedBuddyHeap {
    heap: SpinNoIrq<Option<BuddyHeap>>,
    initialized: AtomicBool,
}

impl LockedBuddyHeap {
    pub const fn new() -> Self {
        Self {
            heap: SpinNoIrq::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Lay out the heap over `[start, start + size)`.
    ///
    /// A null `start` is rejected with [`AllocError::InvalidPointer`].
    ///
    /// # Safety
    ///
    /// Same contract as [`BuddyHeap::initialize`]: the range must be valid,
    /// exclusively owned by this allocator and outlive it.
    pub unsafe fn init(&self, start: usize, size: usize) -> AllocResult {
        let arena = NonNull::new(start as *mut u8).ok_or(AllocError::InvalidPointer)?;

        let mut guard = self.heap.lock();
        if guard.is_some() {
            error!("locked buddy heap: already initialized");
            return Err(AllocError::AlreadyInitialized);
        }
        *guard = Some(unsafe { BuddyHeap::initialize(arena, size) }?);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Run `f` with exclusive access to the heap.
    pub fn with_heap<R>(&self, f: impl FnOnce(&mut BuddyHeap) -> R) -> AllocResult<R> {
        if !self.is_initialized() {
            return Err(AllocError::Uninitialized);
        }
        let mut guard = self.heap.lock();
        let heap = guard.as_mut().ok_or(AllocError::Uninitialized)?;
        Ok(f(heap))
    }

    /// Allocate at least `size` bytes. `Ok(None)` means the heap is exhausted.
    pub fn alloc(&self, size: usize) -> AllocResult<Option<NonNull<u8>>> {
        self.with_heap(|heap| heap.allocate(size))
    }

    /// Release memory returned by [`LockedBuddyHeap::alloc`].
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator.
    pub unsafe fn dealloc(&self, ptr: NonNull<u8>) -> AllocResult {
        self.with_heap(|heap| unsafe { heap.free(ptr) })?
    }

    /// Payload capacity of the live block behind `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator and not freed since.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> AllocResult<usize> {
        self.with_heap(|heap| unsafe { heap.usable_size(ptr) })?
    }

    pub fn total_bytes(&self) -> usize {
        self.with_heap(|heap| heap.total_bytes()).unwrap_or(0)
    }

    pub fn used_bytes(&self) -> usize {
        self.with_heap(|heap| heap.used_bytes()).unwrap_or(0)
    }

    pub fn available_bytes(&self) -> usize {
        self.with_heap(|heap| heap.available_bytes()).unwrap_or(0)
    }

    /// Get heap statistics
    #[cfg(feature = "tracking")]
    pub fn stats(&self) -> AllocResult<BuddyStats> {
        self.with_heap(|heap| heap.stats())
    }
}

impl Default for LockedBuddyHeap {
    fn default() -> Self {
        Self::new()
    }
}

/// Payloads sit right after a header, at the header's alignment.
const PAYLOAD_ALIGN: usize = HEADER_SIZE;

unsafe impl GlobalAlloc for LockedBuddyHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > PAYLOAD_ALIGN {
            warn!(
                "locked buddy heap: alignment {} above supported {}",
                layout.align(),
                PAYLOAD_ALIGN
            );
            return core::ptr::null_mut();
        }
        match LockedBuddyHeap::alloc(self, layout.size()) {
            Ok(Some(ptr)) => ptr.as_ptr(),
            Ok(None) => core::ptr::null_mut(),
            Err(_) => {
                warn!("locked buddy heap: allocation before initialization");
                core::ptr::null_mut()
            }
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        if let Err(_e) = unsafe { LockedBuddyHeap::dealloc(self, ptr) } {
            error!(
                "locked buddy heap: dealloc of {:#x} failed: {}",
                ptr.as_ptr() as usize,
                _e
            );
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Some(old) = NonNull::new(ptr) else {
            return core::ptr::null_mut();
        };

        // Keep the block when it already has room
        if let Ok(usable) = unsafe { self.usable_size(old) } {
            if new_size <= usable {
                return ptr;
            }
        }

        let Ok(new_layout) = Layout::from_size_align(new_size, layout.align()) else {
            return core::ptr::null_mut();
        };
        let new_ptr = unsafe { GlobalAlloc::alloc(self, new_layout) };
        if !new_ptr.is_null() {
            unsafe {
                core::ptr::copy_nonoverlapping(ptr, new_ptr, layout.size().min(new_size));
                GlobalAlloc::dealloc(self, ptr, layout);
            }
        }
        new_ptr
    }
}
