//! Statistics and debugging for the buddy heap
//!
//! Provides counter tracking and failure reporting.

use super::heap_layout::MAX_ORDERS;
use super::order::block_size;

/// Buddy heap statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyStats {
    pub total_bytes: usize,
    pub free_bytes: usize,
    pub used_bytes: usize,
    pub allocations: usize,
    pub failed_allocations: usize,
    pub frees: usize,
    pub double_frees: usize,
    pub splits: usize,
    pub merges: usize,
    pub free_blocks_by_order: [usize; MAX_ORDERS],
}

impl Default for BuddyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BuddyStats {
    pub const fn new() -> Self {
        Self {
            total_bytes: 0,
            free_bytes: 0,
            used_bytes: 0,
            allocations: 0,
            failed_allocations: 0,
            frees: 0,
            double_frees: 0,
            splits: 0,
            merges: 0,
            free_blocks_by_order: [0; MAX_ORDERS],
        }
    }

    /// Largest order that currently has a free block.
    pub fn largest_free_order(&self) -> Option<usize> {
        self.free_blocks_by_order.iter().rposition(|&count| count > 0)
    }
}

/// Detailed memory statistics reporter
pub struct MemoryStatsReporter;

impl MemoryStatsReporter {
    /// Print the heap state after a failed allocation
    #[allow(unused_variables)]
    pub fn print_alloc_failure_stats(
        stats: &BuddyStats,
        num_orders: usize,
        requested_bytes: usize,
    ) {
        #[cfg(feature = "log")]
        use log::error;
        error!("========================================");
        error!(
            "Request: {} bytes ({} KB)",
            requested_bytes,
            requested_bytes / 1024
        );
        error!("Heap state:");
        error!(
            "  Total: {} KB, free: {} KB, used: {} KB",
            stats.total_bytes / 1024,
            stats.free_bytes / 1024,
            stats.used_bytes / 1024
        );
        error!(
            "  Allocations: {} ({} failed), frees: {}, splits: {}, merges: {}",
            stats.allocations,
            stats.failed_allocations,
            stats.frees,
            stats.splits,
            stats.merges
        );
        match stats.largest_free_order() {
            Some(order) => error!(
                "  Largest free block: order {} ({} bytes)",
                order,
                block_size(order)
            ),
            None => error!("  No free blocks left"),
        }
        error!("  Free blocks by order:");
        for order in (0..num_orders).rev() {
            let count = stats.free_blocks_by_order[order];
            if count > 0 {
                error!(
                    "    Order {}: {} blocks ({} bytes each, {} KB total)",
                    order,
                    count,
                    block_size(order),
                    (count * block_size(order)) / 1024
                );
            }
        }
        error!("========================================");
    }
}
