use std::sync::Arc;

use pretty_assertions::assert_eq;

use vita_core::core::limits::{TRAP_INSTRUCTION_SIZE, TRAP_PATCH};
use vita_core::loader::LoadError;
use vita_core::Emulator;

use crate::common::{build_image, rela_entry, FakeProcessor, SegmentSpec, ET_SCE_RELEXEC, PF_RX};

const BASE: u32 = 0x8100_0000;
const MODINFO_OFFSET: u32 = 0x100;
const IMPORT_SLOT_0: u32 = 0x40;
const IMPORT_SLOT_1: u32 = 0x48;

const NID_GET_THREAD_ID: u32 = 0x0FB9_72F9;
const NID_CREATE_MUTEX: u32 = 0xED53_334A;

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// A loadable segment carrying module info, one import descriptor for two
/// functions, and the string/NID/entry tables the descriptor points at.
fn program_segment(descriptor_size: u16, nids: [u32; 2]) -> Vec<u8> {
    let mut data = vec![0u8; 0x200];

    // Module info
    data[0x104..0x104 + 8].copy_from_slice(b"testmod\0");
    put_u32(&mut data, 0x12C, 0x140); // import table start
    put_u32(&mut data, 0x130, 0x174); // import table end
    put_u32(&mut data, 0x134, 0xCAFE_0001);

    // Import descriptor
    put_u16(&mut data, 0x140, descriptor_size);
    put_u16(&mut data, 0x146, 2);
    put_u32(&mut data, 0x150, 0xCAE9_ACE6);
    put_u32(&mut data, 0x154, BASE + 0x180);
    put_u32(&mut data, 0x15C, BASE + 0x190);
    put_u32(&mut data, 0x160, BASE + 0x198);

    data[0x180..0x180 + 13].copy_from_slice(b"SceLibKernel\0");
    put_u32(&mut data, 0x190, nids[0]);
    put_u32(&mut data, 0x194, nids[1]);
    put_u32(&mut data, 0x198, BASE + IMPORT_SLOT_0);
    put_u32(&mut data, 0x19C, BASE + IMPORT_SLOT_1);
    data
}

fn relocatable_image(descriptor_size: u16, nids: [u32; 2]) -> Vec<u8> {
    // One fixup: word at base+0x20 becomes segment base + 0x10
    let rela = rela_entry(2, 0, 0, 0x10, 0x20);
    build_image(
        ET_SCE_RELEXEC,
        MODINFO_OFFSET,
        vec![
            SegmentSpec::load(BASE, PF_RX, program_segment(descriptor_size, nids)),
            SegmentSpec::rela(rela),
        ],
    )
}

#[test]
fn test_relocatable_image_patches_and_resolves_imports() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor).with_default_modules();

    let info = emulator
        .load_image(&relocatable_image(0x34, [NID_GET_THREAD_ID, NID_CREATE_MUTEX]))
        .unwrap();
    assert_eq!(info.entry_pc, None);
    assert_eq!(info.base_address, BASE);

    // Relocation applied
    assert_eq!(
        emulator.memory().read_u32(BASE + 0x20).unwrap(),
        BASE + 0x10
    );

    // Both import slots carry the trap sequence
    for slot in [IMPORT_SLOT_0, IMPORT_SLOT_1] {
        assert_eq!(
            emulator.memory().read_u32(BASE + slot).unwrap(),
            TRAP_PATCH[0]
        );
        assert_eq!(
            emulator
                .memory()
                .read_u32(BASE + slot + TRAP_INSTRUCTION_SIZE)
                .unwrap(),
            TRAP_PATCH[1]
        );
    }

    // NIDs resolved against the built-in modules
    assert_eq!(emulator.hle().resolved_count(), 2);
    let first = emulator.hle().resolved_import(BASE + IMPORT_SLOT_0).unwrap();
    assert_eq!(first.library_name, "SceLibKernel");
    assert_eq!(first.nid, NID_GET_THREAD_ID);
    assert_eq!(first.function.unwrap().name, "sceKernelGetThreadId");
    let second = emulator.hle().resolved_import(BASE + IMPORT_SLOT_1).unwrap();
    assert_eq!(second.function.unwrap().name, "sceKernelCreateMutex");
}

#[test]
fn test_unknown_nid_stays_unresolved() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor).with_default_modules();

    emulator
        .load_image(&relocatable_image(0x34, [NID_GET_THREAD_ID, 0xDEAD_0000]))
        .unwrap();

    let import = emulator.hle().resolved_import(BASE + IMPORT_SLOT_1).unwrap();
    assert_eq!(import.nid, 0xDEAD_0000);
    assert!(import.function.is_none());
}

#[test]
fn test_unknown_relocation_entry_format_aborts_load() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor.clone()).with_default_modules();

    // The low nibble of the first word selects the entry encoding; only
    // format 0 is implemented.
    let mut rela = rela_entry(2, 0, 0, 0x10, 0x20);
    rela[0] |= 5;
    let image = build_image(
        ET_SCE_RELEXEC,
        MODINFO_OFFSET,
        vec![
            SegmentSpec::load(
                BASE,
                PF_RX,
                program_segment(0x34, [NID_GET_THREAD_ID, NID_CREATE_MUTEX]),
            ),
            SegmentSpec::rela(rela),
        ],
    );

    let err = emulator.load_image(&image).unwrap_err();
    assert_eq!(err, LoadError::UnsupportedRelocationFormat(5));
    assert_eq!(emulator.memory().region_count(), 0);
    assert!(processor.mapped_regions().is_empty());
}

#[test]
fn test_truncated_relocation_stream_aborts_load() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor).with_default_modules();

    // 8 bytes cannot hold a 12-byte entry
    let mut rela = rela_entry(2, 0, 0, 0x10, 0x20);
    rela.truncate(8);
    let image = build_image(
        ET_SCE_RELEXEC,
        MODINFO_OFFSET,
        vec![
            SegmentSpec::load(
                BASE,
                PF_RX,
                program_segment(0x34, [NID_GET_THREAD_ID, NID_CREATE_MUTEX]),
            ),
            SegmentSpec::rela(rela),
        ],
    );

    let err = emulator.load_image(&image).unwrap_err();
    assert_eq!(
        err,
        LoadError::Truncated {
            offset: 0,
            need: 12
        }
    );
    assert_eq!(emulator.memory().region_count(), 0);
}

#[test]
fn test_short_descriptor_layout_aborts_load() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor).with_default_modules();

    let err = emulator
        .load_image(&relocatable_image(0x24, [NID_GET_THREAD_ID, NID_CREATE_MUTEX]))
        .unwrap_err();
    assert_eq!(err, LoadError::UnsupportedImportLayout(0x24));
    // The failed load leaves no mappings behind
    assert_eq!(emulator.memory().region_count(), 0);
}
