/*!
 * Container Format
 *
 * Fixed-layout little-endian views over the signed container: the outer
 * header, the embedded executable header, the program-header table, and the
 * parallel per-segment metadata table. All reads are bounds-checked; the
 * input is untrusted.
 */

use super::LoadError;
use crate::core::types::LoadResult;

/// Outer container magic
pub const SCE_MAGIC: [u8; 4] = *b"SCE\0";

/// Non-relocatable executable
pub const ET_SCE_EXEC: u16 = 0xFE00;
/// Relocatable executable
pub const ET_SCE_RELEXEC: u16 = 0xFE04;

/// Loadable program segment
pub const PT_LOAD: u32 = 0x0000_0001;
/// Relocation-table segment
pub const PT_SCE_RELA: u32 = 0x6000_0000;

pub const PF_X: u32 = 0x1;
pub const PF_W: u32 = 0x2;
pub const PF_R: u32 = 0x4;

/// Segment metadata compression tag: zlib-deflated on disk
pub const COMPRESSION_DEFLATED: u64 = 2;
/// Segment metadata encryption tag: encrypted on disk (unsupported)
pub const ENCRYPTION_ENCRYPTED: u64 = 1;

pub const CONTAINER_HEADER_LEN: usize = 0x80;
pub const EXECUTABLE_HEADER_LEN: usize = 0x34;
pub const PROGRAM_HEADER_LEN: usize = 0x20;
pub const SEGMENT_INFO_LEN: usize = 0x20;

/// Bounds-checked little-endian reader
pub(super) struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn bytes_at(&self, offset: usize, len: usize) -> LoadResult<&'a [u8]> {
        self.data
            .get(offset..offset.checked_add(len).ok_or(LoadError::Truncated {
                offset,
                need: len,
            })?)
            .ok_or(LoadError::Truncated { offset, need: len })
    }

    pub fn u16_at(&self, offset: usize) -> LoadResult<u16> {
        let b = self.bytes_at(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32_at(&self, offset: usize) -> LoadResult<u32> {
        let b = self.bytes_at(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64_at(&self, offset: usize) -> LoadResult<u64> {
        let b = self.bytes_at(offset, 8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

/// Outer container header: offsets into the embedded executable
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    pub header_len: u64,
    pub elf_offset: u64,
    pub phdr_offset: u64,
    pub section_info_offset: u64,
}

impl ContainerHeader {
    pub(super) fn parse(reader: &Reader<'_>) -> LoadResult<Self> {
        let magic = reader.bytes_at(0x00, 4)?;
        if magic != SCE_MAGIC {
            return Err(LoadError::BadMagic);
        }
        Ok(Self {
            header_len: reader.u64_at(0x10)?,
            elf_offset: reader.u64_at(0x40)?,
            phdr_offset: reader.u64_at(0x48)?,
            section_info_offset: reader.u64_at(0x58)?,
        })
    }
}

/// Embedded executable header fields the loader consumes
#[derive(Debug, Clone)]
pub struct ExecutableHeader {
    pub e_type: u16,
    pub entry: u32,
    pub phnum: u16,
}

impl ExecutableHeader {
    pub(super) fn parse(reader: &Reader<'_>, offset: usize) -> LoadResult<Self> {
        reader.bytes_at(offset, EXECUTABLE_HEADER_LEN)?;
        Ok(Self {
            e_type: reader.u16_at(offset + 0x10)?,
            entry: reader.u32_at(offset + 0x18)?,
            phnum: reader.u16_at(offset + 0x2C)?,
        })
    }
}

/// One program-header table entry
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub p_offset: u32,
    pub p_vaddr: u32,
    pub p_paddr: u32,
    pub p_filesz: u32,
    pub p_memsz: u32,
    pub p_flags: u32,
    pub p_align: u32,
}

impl ProgramHeader {
    pub(super) fn parse(reader: &Reader<'_>, offset: usize) -> LoadResult<Self> {
        Ok(Self {
            p_type: reader.u32_at(offset)?,
            p_offset: reader.u32_at(offset + 0x04)?,
            p_vaddr: reader.u32_at(offset + 0x08)?,
            p_paddr: reader.u32_at(offset + 0x0C)?,
            p_filesz: reader.u32_at(offset + 0x10)?,
            p_memsz: reader.u32_at(offset + 0x14)?,
            p_flags: reader.u32_at(offset + 0x18)?,
            p_align: reader.u32_at(offset + 0x1C)?,
        })
    }
}

/// Per-segment metadata: where the segment bytes live on disk and how they
/// are stored (compression tag 1 = raw, 2 = deflated; encryption tag
/// 1 = encrypted, 2 = plain)
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentInfo {
    pub offset: u64,
    pub length: u64,
    pub compression: u64,
    pub encryption: u64,
}

impl SegmentInfo {
    pub(super) fn parse(reader: &Reader<'_>, offset: usize) -> LoadResult<Self> {
        Ok(Self {
            offset: reader.u64_at(offset)?,
            length: reader.u64_at(offset + 0x08)?,
            compression: reader.u64_at(offset + 0x10)?,
            encryption: reader.u64_at(offset + 0x18)?,
        })
    }
}
