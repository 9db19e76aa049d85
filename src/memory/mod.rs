/*!
 * Address Space Manager
 *
 * Owns every mapped guest region and its backing buffer. Everything else in
 * the core goes through this module to touch guest bytes: the loader writes
 * decompressed segments here, relocation fixups patch words here, and host
 * syscall implementations read and write argument buffers here.
 *
 * ## Design
 *
 * - Regions are non-overlapping; `map` enforces this rather than trusting
 *   callers to pre-compute gaps.
 * - The region list is kept sorted by end address ascending so the arena
 *   allocator can first-fit scan gaps.
 * - Translation is index-based (`region + offset`), never a long-lived raw
 *   pointer into a buffer.
 * - Every mapping change is mirrored into the Processor collaborator so its
 *   view of the guest address space stays coherent.
 */

mod arena;
mod types;

pub use types::{MemoryError, MemoryRegion, Protection, RegionInfo, Translation};

use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::RwLock;

use crate::core::types::{Addr, MemoryResult, Size};
use crate::cpu::Processor;

/// Guest address space manager
pub struct AddressSpace {
    regions: Arc<RwLock<Vec<MemoryRegion>>>,
    processor: Option<Arc<dyn Processor>>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self {
            regions: Arc::new(RwLock::new(Vec::new())),
            processor: None,
        }
    }

    /// Mirror every mapping change into a processor backend
    pub fn with_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Map a zero-initialized region spanning `[start, end]` inclusive.
    /// Fails if the range is inverted or overlaps an existing region.
    pub fn map(
        &self,
        name: &str,
        start: Addr,
        end: Addr,
        protection: Protection,
    ) -> MemoryResult<()> {
        if end < start {
            return Err(MemoryError::InvalidRange { start, end });
        }

        let mut regions = self.regions.write();
        if let Some(existing) = regions.iter().find(|r| r.start <= end && start <= r.end) {
            warn!(
                "refusing to map {name} over '{}' ({:#010x}..={:#010x})",
                existing.name, existing.start, existing.end
            );
            return Err(MemoryError::Overlap {
                start,
                end,
                existing: existing.name.clone(),
            });
        }

        let region = MemoryRegion::new(name.to_string(), start, end, protection);
        info!(
            "Mapped memory {name} {:#010x} ... {:#010x} size {:#010x} protection flags {:#03x}",
            start,
            end,
            region.size,
            protection.bits()
        );
        regions.push(region);
        regions.sort_by_key(|r| r.end);
        drop(regions);

        if let Some(processor) = &self.processor {
            processor.map_region(start, end, protection);
        }
        Ok(())
    }

    /// Unmap the region spanning exactly `[start, end]`
    pub fn unmap(&self, start: Addr, end: Addr) -> MemoryResult<()> {
        let mut regions = self.regions.write();
        let index = regions
            .iter()
            .position(|r| r.start == start && r.end == end)
            .ok_or(MemoryError::RegionNotFound { start, end })?;
        let region = regions.remove(index);
        drop(regions);

        info!(
            "Unmapped memory {} {:#010x} ... {:#010x}",
            region.name, region.start, region.end
        );
        if let Some(processor) = &self.processor {
            processor.unmap_region(start, end);
        }
        Ok(())
    }

    /// Drop every region. Called to reset emulator state on a fatal load
    /// failure so nothing stays partially mapped.
    pub fn unmap_all(&self) {
        let mut regions = self.regions.write();
        let dropped: Vec<(Addr, Addr)> = regions.iter().map(|r| (r.start, r.end)).collect();
        regions.clear();
        drop(regions);

        info!("Unmapped all memory regions");
        if let Some(processor) = &self.processor {
            for (start, end) in dropped {
                processor.unmap_region(start, end);
            }
        }
    }

    /// Update the protection of the region spanning exactly `[start, end]`
    pub fn change_protection(
        &self,
        start: Addr,
        end: Addr,
        protection: Protection,
    ) -> MemoryResult<()> {
        let mut regions = self.regions.write();
        let region = regions
            .iter_mut()
            .find(|r| r.start == start && r.end == end)
            .ok_or(MemoryError::RegionNotFound { start, end })?;
        region.protection = protection;
        drop(regions);

        if let Some(processor) = &self.processor {
            processor.protect_region(start, end, protection);
        }
        Ok(())
    }

    /// Locate the region containing `addr`. A miss is logged but not fatal;
    /// callers decide how to degrade.
    pub fn translate(&self, addr: Addr) -> Option<Translation> {
        let regions = self.regions.read();
        let translation = regions
            .iter()
            .position(|r| r.contains(addr))
            .map(|region| Translation {
                region,
                offset: (addr - regions[region].start) as usize,
            });
        if translation.is_none() {
            error!("translation miss for address {addr:#010x}");
        }
        translation
    }

    /// Whether `[start, end]` lies entirely inside one mapped region
    pub fn contains_range(&self, start: Addr, end: Addr) -> bool {
        let regions = self.regions.read();
        regions.iter().any(|r| r.contains(start) && r.contains(end))
    }

    /// Copy bytes out of guest memory. The whole range must lie in one region.
    pub fn read_bytes(&self, addr: Addr, len: usize) -> MemoryResult<Vec<u8>> {
        let regions = self.regions.read();
        let region = Self::resolve(&regions, addr)?;
        let offset = (addr - region.start) as usize;
        if offset + len > region.data.len() {
            error!(
                "read of {len:#x} bytes at {addr:#010x} runs past region '{}'",
                region.name
            );
            return Err(MemoryError::Unmapped(addr.wrapping_add(len as u32)));
        }
        Ok(region.data[offset..offset + len].to_vec())
    }

    /// Copy bytes into guest memory. The whole range must lie in one region.
    pub fn write_bytes(&self, addr: Addr, bytes: &[u8]) -> MemoryResult<()> {
        let mut regions = self.regions.write();
        let region = Self::resolve_mut(&mut regions, addr)?;
        let offset = (addr - region.start) as usize;
        if offset + bytes.len() > region.data.len() {
            error!(
                "write of {:#x} bytes at {addr:#010x} runs past region '{}'",
                bytes.len(),
                region.name
            );
            return Err(MemoryError::Unmapped(addr.wrapping_add(bytes.len() as u32)));
        }
        region.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Set `len` bytes at `addr` to `value`
    pub fn fill(&self, addr: Addr, value: u8, len: usize) -> MemoryResult<()> {
        let mut regions = self.regions.write();
        let region = Self::resolve_mut(&mut regions, addr)?;
        let offset = (addr - region.start) as usize;
        if offset + len > region.data.len() {
            return Err(MemoryError::Unmapped(addr.wrapping_add(len as u32)));
        }
        region.data[offset..offset + len].fill(value);
        Ok(())
    }

    pub fn read_u16(&self, addr: Addr) -> MemoryResult<u16> {
        let bytes = self.read_bytes(addr, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn write_u16(&self, addr: Addr, value: u16) -> MemoryResult<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    pub fn read_u32(&self, addr: Addr) -> MemoryResult<u32> {
        let bytes = self.read_bytes(addr, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn write_u32(&self, addr: Addr, value: u32) -> MemoryResult<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Read a NUL-terminated guest string, bounded by the region end
    pub fn read_cstring(&self, addr: Addr) -> MemoryResult<String> {
        let regions = self.regions.read();
        let region = Self::resolve(&regions, addr)?;
        let offset = (addr - region.start) as usize;
        let tail = &region.data[offset..];
        let len = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(String::from_utf8_lossy(&tail[..len]).into_owned())
    }

    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }

    /// Snapshot of every region for diagnostics
    pub fn regions(&self) -> Vec<RegionInfo> {
        self.regions
            .read()
            .iter()
            .map(|r| RegionInfo {
                name: r.name.clone(),
                start: r.start,
                end: r.end,
                protection: r.protection,
            })
            .collect()
    }

    /// Allocate a stack through the arena; returns the stack top
    pub fn allocate_stack(&self, size: Size, name: &str) -> MemoryResult<Addr> {
        arena::allocate_stack(self, size, name)
    }

    /// Allocate a heap block through the arena; returns the base address
    pub fn allocate_heap(&self, size: Size, name: &str) -> MemoryResult<Addr> {
        arena::allocate_heap(self, size, name)
    }

    /// Allocate a thread-local-storage block; returns the base address
    pub fn allocate_tls(&self, name: &str) -> MemoryResult<Addr> {
        arena::allocate_tls(self, name)
    }

    pub(super) fn snapshot_bounds(&self) -> Vec<(Addr, Addr)> {
        self.regions.read().iter().map(|r| (r.start, r.end)).collect()
    }

    fn resolve<'a>(regions: &'a [MemoryRegion], addr: Addr) -> MemoryResult<&'a MemoryRegion> {
        regions.iter().find(|r| r.contains(addr)).ok_or_else(|| {
            error!("Unmapped accessed address {addr:#010x}");
            MemoryError::Unmapped(addr)
        })
    }

    fn resolve_mut<'a>(
        regions: &'a mut [MemoryRegion],
        addr: Addr,
    ) -> MemoryResult<&'a mut MemoryRegion> {
        regions.iter_mut().find(|r| r.contains(addr)).ok_or_else(|| {
            error!("Unmapped accessed address {addr:#010x}");
            MemoryError::Unmapped(addr)
        })
    }
}

impl Clone for AddressSpace {
    fn clone(&self) -> Self {
        Self {
            regions: Arc::clone(&self.regions),
            processor: self.processor.as_ref().map(Arc::clone),
        }
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}
