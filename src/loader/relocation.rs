/*!
 * Relocation Engine
 *
 * Relocation-table segments are streams of bit-packed entries; the low four
 * bits of each entry select an encoding, of which only format 0 (12 bytes,
 * symbol segment / patch segment / code / optional secondary code) exists in
 * the images this loader accepts. Fixups are written through the address
 * space after the map stage, so a bad patch address surfaces as a
 * translation miss and fails the whole load.
 */

use log::{debug, error};

use super::image::LoadedImage;
use super::LoadError;
use crate::core::types::{Addr, LoadResult};
use crate::memory::AddressSpace;

pub const R_ARM_ABS32: u8 = 2;
pub const R_ARM_THM_CALL: u8 = 10;
pub const R_ARM_TARGET1: u8 = 38;
pub const R_ARM_PREL31: u8 = 42;
pub const R_ARM_THM_MOVW_ABS_NC: u8 = 47;
pub const R_ARM_THM_MOVT_ABS: u8 = 48;

const FORMAT0_ENTRY_LEN: usize = 12;

/// Apply every relocation segment of `image`. Any failure aborts the load.
pub(super) fn relocate(image: &LoadedImage, memory: &AddressSpace) -> LoadResult<()> {
    for segment in image.segments.iter().filter(|s| s.relocatable) {
        relocate_segment(image, segment, memory)?;
    }
    Ok(())
}

fn relocate_segment(
    image: &LoadedImage,
    segment: &super::image::DecryptedSegment,
    memory: &AddressSpace,
) -> LoadResult<()> {
    let len = (segment.phdr.p_filesz as usize).min(segment.data.len());
    let data = &segment.data[..len];
    debug!(
        "Performing {} relocation size {:#010x}",
        segment.name, segment.phdr.p_filesz
    );

    let mut pos = 0usize;
    while pos < len {
        if pos + FORMAT0_ENTRY_LEN > len {
            return Err(LoadError::Truncated {
                offset: pos,
                need: FORMAT0_ENTRY_LEN,
            });
        }
        let word0 = read_word(data, pos);
        let format = (word0 & 0xF) as u8;
        if format != 0 {
            error!(
                "Unimplemented format {format} for relocation in {}",
                segment.name
            );
            return Err(LoadError::UnsupportedRelocationFormat(format));
        }

        let symbol_segment = ((word0 >> 4) & 0xF) as usize;
        let code = ((word0 >> 8) & 0xFF) as u8;
        let patch_segment = ((word0 >> 16) & 0xF) as usize;
        let code2 = ((word0 >> 20) & 0xFF) as u8;
        let dist2 = (word0 >> 28) & 0xF;
        let addend = read_word(data, pos + 4);
        let offset = read_word(data, pos + 8);

        let symbol_address = image
            .segments
            .get(symbol_segment)
            .map(|s| s.phdr.p_vaddr)
            .unwrap_or(0);
        let patch_base = image
            .segments
            .get(patch_segment)
            .map(|s| s.phdr.p_vaddr)
            .unwrap_or(0);
        let patch_address = patch_base.wrapping_add(offset);

        apply_one(memory, code, symbol_address, addend, patch_address)?;
        if code2 != 0 {
            apply_one(
                memory,
                code2,
                symbol_address,
                addend,
                patch_address.wrapping_add(dist2 * 2),
            )?;
        }

        pos += FORMAT0_ENTRY_LEN;
    }
    Ok(())
}

fn read_word(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// Apply a single fixup. `s` is the symbol segment base, `a` the addend, and
/// `p` the patch address.
fn apply_one(memory: &AddressSpace, code: u8, s: u32, a: u32, p: Addr) -> LoadResult<()> {
    let displacement = a.wrapping_sub(p).wrapping_add(s);

    let result = match code {
        R_ARM_ABS32 | R_ARM_TARGET1 => memory.write_u32(p, s.wrapping_add(a)),
        R_ARM_PREL31 => memory.write_u32(p, displacement & 0x7FFF_FFFF),
        R_ARM_THM_CALL => {
            // Thumb BL/BLX pair: imm10+sign in the first halfword, imm11 and
            // the J1/J2 bits in the second.
            let sign = (displacement >> 24) & 1;
            let j2 = sign ^ ((!displacement >> 22) & 1);
            let j1 = sign ^ ((!displacement >> 23) & 1);
            memory
                .read_u16(p)
                .and_then(|upper| {
                    let upper = (upper & 0xF800)
                        | ((sign as u16) << 10)
                        | (((displacement >> 12) & 0x3FF) as u16);
                    memory.write_u16(p, upper)
                })
                .and_then(|_| memory.read_u16(p.wrapping_add(2)))
                .and_then(|lower| {
                    let lower = (lower & 0xD000)
                        | ((j1 as u16) << 13)
                        | ((j2 as u16) << 11)
                        | (((displacement >> 1) & 0x7FF) as u16);
                    memory.write_u16(p.wrapping_add(2), lower)
                })
        }
        R_ARM_THM_MOVW_ABS_NC => memory
            .read_u32(p)
            .and_then(|opcode| memory.write_u32(p, scatter_mov(opcode, s.wrapping_add(a) & 0xFFFF))),
        R_ARM_THM_MOVT_ABS => memory
            .read_u32(p)
            .and_then(|opcode| memory.write_u32(p, scatter_mov(opcode, s.wrapping_add(a) >> 16))),
        other => {
            error!("Unimplemented relocation type {other}");
            return Err(LoadError::UnsupportedRelocationCode(other));
        }
    };

    result.map_err(|_| {
        error!("invalid relocation patch address {p:#010x}");
        LoadError::BadPatchAddress(p)
    })
}

/// Scatter 16 bits of `value` into the imm4:i:imm3:imm8 fields of a Thumb2
/// MOVW/MOVT instruction word, preserving every non-immediate bit.
fn scatter_mov(opcode: u32, value: u32) -> u32 {
    let imm8 = value & 0xFF;
    let imm3 = (value >> 8) & 0x7;
    let imm1 = (value >> 11) & 0x1;
    let imm4 = (value >> 12) & 0xF;
    (opcode & 0x8F00_FBF0) | (imm8 << 16) | (imm3 << 28) | (imm1 << 10) | imm4
}
