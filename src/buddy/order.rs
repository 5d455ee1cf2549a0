//! Order (size class) arithmetic
//!
//! An order-`k` block spans `LOW_ORDER << k` bytes, header included.

use super::buddy_block::HEADER_SIZE;
use super::heap_layout::MAX_ORDERS;
use crate::LOW_ORDER;

/// Byte size of a block of the given order.
#[inline]
pub const fn block_size(order: usize) -> usize {
    LOW_ORDER << order
}

/// Smallest order whose blocks can hold `requested_bytes` plus a block header.
///
/// Requests too large for any representable block map to an order of at
/// least [`MAX_ORDERS`], which no heap can satisfy.
pub const fn required_order(requested_bytes: usize) -> usize {
    let total = requested_bytes.saturating_add(HEADER_SIZE);
    let min_blocks = total.div_ceil(LOW_ORDER);
    match min_blocks.checked_next_power_of_two() {
        Some(pow) => pow.trailing_zeros() as usize,
        None => usize::BITS as usize,
    }
}
