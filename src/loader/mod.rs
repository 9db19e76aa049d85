/*!
 * Image Loader
 *
 * Loads a signed/compressed executable image into the guest address space:
 * parse and inflate segments, map loadable segments page-aligned, apply
 * position-independent relocation fixups, then walk the module's import
 * descriptors and register the resolved import table with the HLE registry.
 *
 * A failure in any stage unmaps everything; no partially-loaded state
 * survives a bad image.
 */

pub mod format;
mod image;
mod imports;
mod relocation;

pub use image::{parse_image, DecryptedSegment, LoadedImage};
pub use relocation::{
    R_ARM_ABS32, R_ARM_PREL31, R_ARM_TARGET1, R_ARM_THM_CALL, R_ARM_THM_MOVT_ABS,
    R_ARM_THM_MOVW_ABS_NC,
};

use log::{debug, error, warn};
use miette::Diagnostic;
use thiserror::Error;

use crate::core::limits::PAGE_SIZE;
use crate::core::types::{Addr, LoadResult};
use crate::hle::HleRegistry;
use crate::memory::{AddressSpace, MemoryError, Protection};

/// Loader errors. All of them abort the load; the address space is reset
/// before they propagate.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum LoadError {
    #[error("Container magic mismatch")]
    #[diagnostic(code(loader::bad_magic), help("The input is not a signed container."))]
    BadMagic,

    #[error("Truncated input: need {need} bytes at offset {offset:#x}")]
    #[diagnostic(code(loader::truncated))]
    Truncated { offset: usize, need: usize },

    #[error("Unsupported image type {0:#06x}")]
    #[diagnostic(
        code(loader::unsupported_image_type),
        help("Only non-relocatable and relocatable executables are loadable.")
    )]
    UnsupportedImageType(u16),

    #[error("Segment {0} is encrypted")]
    #[diagnostic(
        code(loader::encrypted_segment),
        help("Decryption is not implemented; provide a decrypted image.")
    )]
    EncryptedSegment(usize),

    #[error("Can't decompress segment {segment}: {reason}")]
    #[diagnostic(code(loader::decompression))]
    Decompression { segment: usize, reason: String },

    #[error("Unimplemented relocation entry format {0}")]
    #[diagnostic(code(loader::relocation_format))]
    UnsupportedRelocationFormat(u8),

    #[error("Unimplemented relocation type {0}")]
    #[diagnostic(code(loader::relocation_code))]
    UnsupportedRelocationCode(u8),

    #[error("Invalid relocation patch address {0:#010x}")]
    #[diagnostic(code(loader::bad_patch_address))]
    BadPatchAddress(Addr),

    #[error("Module info not readable at {0:#010x}")]
    #[diagnostic(code(loader::bad_module_info))]
    BadModuleInfo(Addr),

    #[error("Unimplemented import descriptor layout {0:#06x}")]
    #[diagnostic(
        code(loader::import_layout),
        help("Only the 0x34-byte import descriptor layout is supported.")
    )]
    UnsupportedImportLayout(u16),

    #[error("Invalid import address {0:#010x}")]
    #[diagnostic(code(loader::bad_import_address))]
    BadImportAddress(Addr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Memory(#[from] MemoryError),
}

/// What the kernel retains from a completed load: the mapped segments are in
/// the address space and the import table is registered; this is just the
/// summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadInfo {
    /// Raw encoded entry value from the executable header
    pub entry: u32,
    /// Decoded entry program counter; `None` for relocatable images, whose
    /// entry value encodes the module-info location instead
    pub entry_pc: Option<Addr>,
    /// Whether the decoded entry starts in Thumb state (bit 0 of the raw
    /// entry); always false for relocatable images
    pub thumb_entry: bool,
    /// Lowest mapped segment address
    pub base_address: Addr,
    pub mapped_segments: usize,
}

/// Image loader bound to one emulator instance
pub struct Loader {
    memory: AddressSpace,
    hle: HleRegistry,
}

impl Loader {
    pub fn new(memory: AddressSpace, hle: HleRegistry) -> Self {
        Self { memory, hle }
    }

    /// Parse and load raw container bytes
    pub fn load_bytes(&self, bytes: &[u8]) -> LoadResult<LoadInfo> {
        let image = parse_image(bytes)?;
        self.load(&image)
    }

    /// Map, relocate, and register the parsed image. On any failure the
    /// whole address space is unmapped before the error propagates.
    pub fn load(&self, image: &LoadedImage) -> LoadResult<LoadInfo> {
        self.load_inner(image).map_err(|e| {
            error!("load failed, unmapping all regions: {e}");
            self.memory.unmap_all();
            e
        })
    }

    fn load_inner(&self, image: &LoadedImage) -> LoadResult<LoadInfo> {
        let mut bottom_address = Addr::MAX;
        let mut mapped_segments = 0usize;

        for segment in image.segments.iter().filter(|s| s.loadable) {
            let phdr = &segment.phdr;
            if segment.relocatable {
                warn!(
                    "Relocatable memory region {:#010x} .. {:#010x}",
                    phdr.p_vaddr,
                    phdr.p_vaddr.wrapping_add(segment.logical_len as u32).wrapping_sub(1)
                );
                continue;
            }

            let mut protection = Protection::empty();
            if phdr.p_flags & format::PF_R != 0 {
                protection |= Protection::READ;
            }
            if phdr.p_flags & format::PF_W != 0 {
                protection |= Protection::WRITE;
            }
            if phdr.p_flags & format::PF_X != 0 {
                protection |= Protection::EXECUTE;
            }

            let aligned_end = ((phdr.p_vaddr.wrapping_add(phdr.p_memsz))
                .wrapping_add(PAGE_SIZE - 1)
                & !(PAGE_SIZE - 1))
                .wrapping_sub(1);
            bottom_address = bottom_address.min(phdr.p_vaddr);

            self.memory
                .map(&segment.name, phdr.p_vaddr, aligned_end, protection)?;
            self.memory
                .write_bytes(phdr.p_vaddr, &segment.data[..segment.logical_len])?;
            mapped_segments += 1;
        }

        let mut entry_pc = None;
        let mut thumb_entry = false;
        if image.relocatable {
            let segment_index = (image.entry >> 30) as usize;
            let offset = image.entry & 0x3FFF_FFFF;
            let modinfo_addr = image
                .segments
                .get(segment_index)
                .map(|s| s.phdr.p_vaddr.wrapping_add(offset))
                .ok_or(LoadError::BadModuleInfo(image.entry))?;

            debug!("Found module info, performing relocations..");
            let modinfo = imports::read_module_info(&self.memory, modinfo_addr)?;
            relocation::relocate(image, &self.memory)?;
            imports::register_imports(&self.memory, &self.hle, &modinfo, bottom_address)?;
        } else {
            // Absolute entry; nothing encodes a module-info location, so no
            // import table is registered for this image.
            entry_pc = Some(image.entry & !1);
            thumb_entry = image.entry & 1 != 0;
            debug!("Non-relocatable image, entry {:#010x}", image.entry);
        }

        Ok(LoadInfo {
            entry: image.entry,
            entry_pc,
            thumb_entry,
            base_address: bottom_address,
            mapped_segments,
        })
    }
}
