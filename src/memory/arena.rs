/*!
 * Forward-Allocating Arena
 *
 * Bump allocation for guest stacks, heaps, and TLS blocks on top of the
 * region list. Sizes round up to `SMALL_PAGE`; each placement keeps an
 * `ARENA_GUARD` band of unmapped space on both sides. A gap between two
 * consecutive regions is used first-fit, otherwise the block lands above the
 * highest mapped region. Deallocation is deliberately absent: no region is
 * ever split or coalesced.
 */

use log::debug;

use super::{AddressSpace, Protection};
use crate::core::limits::{ARENA_BASE, ARENA_GUARD, SMALL_PAGE, TLS_REGION_SIZE};
use crate::core::types::{Addr, MemoryResult, Size};
use crate::memory::MemoryError;

const PAGE_MASK: u32 = SMALL_PAGE - 1;

fn round_up(size: Size) -> Size {
    size.wrapping_add(SMALL_PAGE) & !PAGE_MASK
}

/// Find a placement for `size` bytes. Returns the base address and the
/// rounded size actually reserved.
fn more_memory(space: &AddressSpace, size: Size) -> MemoryResult<(Addr, Size)> {
    let rounded = round_up(size);
    let regions = space.snapshot_bounds();

    if regions.is_empty() {
        return Ok((ARENA_BASE, rounded));
    }

    // Regions arrive sorted by end ascending.
    let mut top: Addr = 0;
    for (i, (_, end)) in regions.iter().enumerate() {
        if top < *end {
            top = end.wrapping_add(1 + ARENA_GUARD) & !PAGE_MASK;
        }

        if let Some((next_start, _)) = regions.get(i + 1) {
            let candidate = end.wrapping_add(1 + ARENA_GUARD) & !PAGE_MASK;
            let gap = (*next_start as i64 - ARENA_GUARD as i64)
                - candidate as i64
                - rounded as i64;
            if gap >= 0 {
                top = candidate;
                break;
            }
        }
    }

    if top == 0 {
        return Err(MemoryError::OutOfSpace(size));
    }
    // Reject placements that would run past the end of the 32-bit space.
    if top.checked_add(rounded).is_none() {
        return Err(MemoryError::OutOfSpace(size));
    }
    debug!("arena placement {top:#010x} size {rounded:#x} for request {size:#x}");
    Ok((top, rounded))
}

/// Map a stack block and return its top (stacks grow down)
pub(super) fn allocate_stack(space: &AddressSpace, size: Size, name: &str) -> MemoryResult<Addr> {
    let (address, reserved) = more_memory(space, size)?;
    let top = address.wrapping_add(reserved);
    space.map(&format!("{name}_stack"), address, top - 1, Protection::RW)?;
    Ok(top)
}

/// Map a heap block and return its base
pub(super) fn allocate_heap(space: &AddressSpace, size: Size, name: &str) -> MemoryResult<Addr> {
    let (address, reserved) = more_memory(space, size)?;
    space.map(
        &format!("{name}_heap"),
        address,
        address.wrapping_add(reserved) - 1,
        Protection::RW,
    )?;
    Ok(address)
}

/// Map a TLS block and return its base
pub(super) fn allocate_tls(space: &AddressSpace, name: &str) -> MemoryResult<Addr> {
    let (address, reserved) = more_memory(space, TLS_REGION_SIZE)?;
    space.map(
        &format!("{name}_tls"),
        address,
        address.wrapping_add(reserved) - 1,
        Protection::RW,
    )?;
    Ok(address)
}
