/*!
 * Image Parse Stage
 *
 * Walks the program-header table and the parallel segment metadata table,
 * inflating segment bytes into owned buffers. Produces a `LoadedImage` that
 * the map/relocation/import stages consume and discard.
 */

use std::io::Read;

use flate2::read::ZlibDecoder;
use log::{debug, error, warn};

use super::format::{
    ContainerHeader, ExecutableHeader, ProgramHeader, Reader, SegmentInfo, COMPRESSION_DEFLATED,
    ENCRYPTION_ENCRYPTED, ET_SCE_EXEC, ET_SCE_RELEXEC, PROGRAM_HEADER_LEN, PT_LOAD, PT_SCE_RELA,
    SEGMENT_INFO_LEN,
};
use super::LoadError;
use crate::core::types::LoadResult;

/// One decoded segment. Placeholder entries (unknown program-header type)
/// keep their index in the table so relocation segment indices stay aligned,
/// but are neither loadable nor relocatable.
#[derive(Debug)]
pub struct DecryptedSegment {
    pub name: String,
    pub data: Vec<u8>,
    /// Valid byte count inside `data` (inflated length for deflated segments)
    pub logical_len: usize,
    pub relocatable: bool,
    pub loadable: bool,
    pub phdr: ProgramHeader,
}

/// Parsed image: consumed by one load operation, not retained afterward
#[derive(Debug)]
pub struct LoadedImage {
    /// Raw encoded entry value from the executable header
    pub entry: u32,
    pub relocatable: bool,
    pub executable_type: u16,
    pub segments: Vec<DecryptedSegment>,
}

/// Parse the raw container bytes into a `LoadedImage`
pub fn parse_image(bytes: &[u8]) -> LoadResult<LoadedImage> {
    let reader = Reader::new(bytes);
    let header = ContainerHeader::parse(&reader)?;
    let elf = ExecutableHeader::parse(&reader, header.elf_offset as usize)?;

    let relocatable = match elf.e_type {
        ET_SCE_EXEC => false,
        ET_SCE_RELEXEC => true,
        other => {
            error!("Unimplemented e_type {other:#06x}");
            return Err(LoadError::UnsupportedImageType(other));
        }
    };

    let mut segments = Vec::with_capacity(elf.phnum as usize);
    for i in 0..elf.phnum as usize {
        let phdr = ProgramHeader::parse(&reader, header.phdr_offset as usize + i * PROGRAM_HEADER_LEN)?;
        let info = SegmentInfo::parse(
            &reader,
            header.section_info_offset as usize + i * SEGMENT_INFO_LEN,
        )?;

        let mut segment = DecryptedSegment {
            name: format!("program_segment_{i}"),
            data: vec![0u8; phdr.p_filesz as usize],
            logical_len: 0,
            relocatable: false,
            loadable: false,
            phdr,
        };

        match phdr.p_type {
            PT_LOAD => segment.relocatable = false,
            PT_SCE_RELA => segment.relocatable = true,
            other => {
                warn!("Unknown program type {other:#010x} for segment {i}");
                segments.push(segment);
                continue;
            }
        }
        segment.loadable = true;

        if info.encryption == ENCRYPTION_ENCRYPTED {
            error!("Unimplemented encrypted segment {i}");
            return Err(LoadError::EncryptedSegment(i));
        }

        debug!(
            "Segment {i} file size: {:#010x} on-disk size {:#010x} virt addr: {:#010x} phys addr: {:#010x} enc {:x} comp {:x}",
            phdr.p_filesz, info.length, phdr.p_vaddr, phdr.p_paddr, info.encryption, info.compression
        );

        let raw = reader.bytes_at(info.offset as usize, info.length as usize)?;
        if info.compression == COMPRESSION_DEFLATED {
            let mut inflated = Vec::with_capacity(phdr.p_filesz as usize);
            ZlibDecoder::new(raw)
                .read_to_end(&mut inflated)
                .map_err(|e| LoadError::Decompression {
                    segment: i,
                    reason: e.to_string(),
                })?;
            if inflated.len() > segment.data.len() {
                return Err(LoadError::Decompression {
                    segment: i,
                    reason: format!(
                        "inflated {:#x} bytes into a {:#x}-byte segment",
                        inflated.len(),
                        segment.data.len()
                    ),
                });
            }
            debug!("Decompressed segment data {i}");
            segment.data[..inflated.len()].copy_from_slice(&inflated);
            segment.logical_len = inflated.len();
        } else {
            if raw.len() > segment.data.len() {
                return Err(LoadError::Decompression {
                    segment: i,
                    reason: format!(
                        "on-disk length {:#x} exceeds declared file size {:#x}",
                        raw.len(),
                        segment.data.len()
                    ),
                });
            }
            segment.data[..raw.len()].copy_from_slice(raw);
            segment.logical_len = raw.len();
        }

        segments.push(segment);
    }

    Ok(LoadedImage {
        entry: elf.entry,
        relocatable,
        executable_type: elf.e_type,
        segments,
    })
}
