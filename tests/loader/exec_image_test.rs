use std::sync::Arc;

use pretty_assertions::assert_eq;

use vita_core::loader::LoadError;
use vita_core::memory::Protection;
use vita_core::Emulator;

use crate::common::{build_image, FakeProcessor, SegmentSpec, ET_SCE_EXEC, PF_RX, PF_RW};

#[test]
fn test_exec_image_maps_and_decodes_entry() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor.clone()).with_default_modules();

    let code = vec![0xAAu8; 0x40];
    let image = build_image(
        ET_SCE_EXEC,
        0x8100_0021,
        vec![SegmentSpec::load(0x8100_0000, PF_RX, code)],
    );

    let info = emulator.load_image(&image).unwrap();
    assert_eq!(info.entry, 0x8100_0021);
    assert_eq!(info.entry_pc, Some(0x8100_0020));
    assert!(info.thumb_entry);
    assert_eq!(info.base_address, 0x8100_0000);
    assert_eq!(info.mapped_segments, 1);

    // Segment bytes are in guest memory, and the mapped region is page
    // aligned and mirrored to the backend with execute permission.
    assert_eq!(emulator.memory().read_u32(0x8100_0000).unwrap(), 0xAAAA_AAAA);
    let mirrored = processor.mapped_regions();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].0, 0x8100_0000);
    assert_eq!(mirrored[0].1, 0x8100_3FFF);
    assert!(mirrored[0].2.contains(Protection::EXECUTE));

    // Tearing everything down leaves the address untranslatable.
    emulator.memory().unmap_all();
    assert!(emulator.memory().read_u32(0x8100_0000).is_err());
    assert!(processor.mapped_regions().is_empty());
}

#[test]
fn test_bss_tail_is_zero_filled() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor).with_default_modules();

    let mut segment = SegmentSpec::load(0x8100_0000, PF_RW, vec![0xFFu8; 0x10]);
    segment.bss = 0x100;
    let image = build_image(ET_SCE_EXEC, 0x8100_0000, vec![segment]);

    emulator.load_image(&image).unwrap();
    assert_eq!(emulator.memory().read_u32(0x8100_000C).unwrap(), 0xFFFF_FFFF);
    assert_eq!(emulator.memory().read_u32(0x8100_0010).unwrap(), 0);
}

#[test]
fn test_deflated_segment_is_inflated() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor).with_default_modules();

    let payload: Vec<u8> = (0..=255u8).cycle().take(0x800).collect();
    let mut segment = SegmentSpec::load(0x8100_0000, PF_RX, payload.clone());
    segment.deflate = true;
    let image = build_image(ET_SCE_EXEC, 0x8100_0000, vec![segment]);

    emulator.load_image(&image).unwrap();
    let bytes = emulator.memory().read_bytes(0x8100_0000, 0x800).unwrap();
    assert_eq!(bytes, payload);
}

#[test]
fn test_corrupted_deflate_stream_is_rejected() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor).with_default_modules();

    let payload: Vec<u8> = (0..=255u8).cycle().take(0x800).collect();
    let mut segment = SegmentSpec::load(0x8100_0000, PF_RX, payload);
    segment.deflate = true;
    let mut image = build_image(ET_SCE_EXEC, 0x8100_0000, vec![segment]);

    // Single-segment layout puts the payload right after the metadata
    // tables; clobber the zlib header.
    let payload_offset = 0x80 + 0x34 + 0x20 + 0x20;
    image[payload_offset] ^= 0xFF;

    let err = emulator.load_image(&image).unwrap_err();
    assert!(matches!(err, LoadError::Decompression { segment: 0, .. }));
    assert_eq!(emulator.memory().region_count(), 0);
}

#[test]
fn test_unknown_image_type_is_rejected() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor).with_default_modules();

    let image = build_image(
        0x0002,
        0x8100_0000,
        vec![SegmentSpec::load(0x8100_0000, PF_RX, vec![0u8; 0x10])],
    );

    assert_eq!(
        emulator.load_image(&image).unwrap_err(),
        LoadError::UnsupportedImageType(0x0002)
    );
    assert_eq!(emulator.memory().region_count(), 0);
}

#[test]
fn test_encrypted_segment_is_rejected() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor).with_default_modules();

    let mut segment = SegmentSpec::load(0x8100_0000, PF_RX, vec![0u8; 0x10]);
    segment.encrypt = true;
    let image = build_image(ET_SCE_EXEC, 0x8100_0000, vec![segment]);

    assert_eq!(
        emulator.load_image(&image).unwrap_err(),
        LoadError::EncryptedSegment(0)
    );
    assert_eq!(emulator.memory().region_count(), 0);
}

#[test]
fn test_bad_magic_is_rejected() {
    let processor = Arc::new(FakeProcessor::new());
    let emulator = Emulator::new(processor).with_default_modules();

    let mut image = build_image(
        ET_SCE_EXEC,
        0x8100_0000,
        vec![SegmentSpec::load(0x8100_0000, PF_RX, vec![0u8; 0x10])],
    );
    image[..4].copy_from_slice(b"\x7FELF");

    assert_eq!(
        emulator.load_image(&image).unwrap_err(),
        LoadError::BadMagic
    );
}
