/*!
 * Memory Types
 * Regions, protection flags, and memory errors
 */

use bitflags::bitflags;
use miette::Diagnostic;
use thiserror::Error;

use crate::core::types::{Addr, Size};

bitflags! {
    /// Guest region protection bits. Bit positions match the container's
    /// program-header flags (R=1, W=2, X=4 shifted into 0/1/2 here).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Protection: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

impl Protection {
    pub const RW: Protection = Protection::READ.union(Protection::WRITE);
}

/// One mapped guest region. The address space exclusively owns the backing
/// buffer; callers address bytes through `Translation`, never raw pointers.
#[derive(Debug)]
pub struct MemoryRegion {
    pub name: String,
    pub start: Addr,
    /// Inclusive end address
    pub end: Addr,
    pub size: Size,
    pub protection: Protection,
    pub(super) data: Vec<u8>,
}

impl MemoryRegion {
    pub(super) fn new(name: String, start: Addr, end: Addr, protection: Protection) -> Self {
        let size = end.wrapping_sub(start).wrapping_add(1);
        Self {
            name,
            start,
            end,
            size,
            protection,
            data: vec![0u8; size as usize],
        }
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.start <= addr && addr <= self.end
    }
}

/// Index-based replacement for a host pointer: which region a guest address
/// landed in, and the byte offset inside its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub region: usize,
    pub offset: usize,
}

/// Snapshot of a region for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub name: String,
    pub start: Addr,
    pub end: Addr,
    pub protection: Protection,
}

/// Address-space errors. Translation misses are recoverable: callers get a
/// sentinel result and the operation degrades to a no-op.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum MemoryError {
    #[error("Address {0:#010x} is not mapped")]
    #[diagnostic(
        code(memory::unmapped),
        help("The guest touched an address outside every mapped region.")
    )]
    Unmapped(Addr),

    #[error("Range {start:#010x}..={end:#010x} overlaps region '{existing}'")]
    #[diagnostic(
        code(memory::overlap),
        help("Regions are never split or coalesced; pick a disjoint range.")
    )]
    Overlap {
        start: Addr,
        end: Addr,
        existing: String,
    },

    #[error("Invalid range {start:#010x}..={end:#010x}")]
    #[diagnostic(code(memory::invalid_range))]
    InvalidRange { start: Addr, end: Addr },

    #[error("No region spans exactly {start:#010x}..={end:#010x}")]
    #[diagnostic(
        code(memory::region_not_found),
        help("Unmap and protection changes must name an exact mapped range.")
    )]
    RegionNotFound { start: Addr, end: Addr },

    #[error("No gap large enough for {0:#x} bytes")]
    #[diagnostic(
        code(memory::out_of_space),
        help("The forward-allocating arena is exhausted.")
    )]
    OutOfSpace(Size),
}
