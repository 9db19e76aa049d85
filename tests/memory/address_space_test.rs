use std::sync::Arc;

use pretty_assertions::assert_eq;

use vita_core::memory::{AddressSpace, MemoryError, Protection};

use crate::common::FakeProcessor;

#[test]
fn test_map_write_read_round_trip() {
    let memory = AddressSpace::new();
    memory
        .map("code", 0x8100_0000, 0x8100_3FFF, Protection::RW)
        .unwrap();

    memory.write_u32(0x8100_0010, 0xDEAD_BEEF).unwrap();
    assert_eq!(memory.read_u32(0x8100_0010).unwrap(), 0xDEAD_BEEF);

    memory.write_bytes(0x8100_0100, b"hello\0world").unwrap();
    assert_eq!(memory.read_cstring(0x8100_0100).unwrap(), "hello");
}

#[test]
fn test_overlapping_map_is_rejected() {
    let memory = AddressSpace::new();
    memory
        .map("a", 0x8100_0000, 0x8100_3FFF, Protection::RW)
        .unwrap();
    let err = memory
        .map("b", 0x8100_2000, 0x8100_5FFF, Protection::RW)
        .unwrap_err();
    assert!(matches!(err, MemoryError::Overlap { .. }));
    assert_eq!(memory.region_count(), 1);
}

#[test]
fn test_unmapped_access_fails() {
    let memory = AddressSpace::new();
    assert_eq!(
        memory.read_u32(0x1234_5678).unwrap_err(),
        MemoryError::Unmapped(0x1234_5678)
    );
}

#[test]
fn test_write_past_region_end_fails() {
    let memory = AddressSpace::new();
    memory
        .map("small", 0x1000, 0x1FFF, Protection::RW)
        .unwrap();
    assert!(memory.write_u32(0x1FFE, 1).is_err());
}

#[test]
fn test_processor_mirrors_region_lifecycle() {
    let processor = Arc::new(FakeProcessor::new());
    let memory = AddressSpace::new().with_processor(processor.clone());

    memory
        .map("code", 0x8100_0000, 0x8100_3FFF, Protection::RW)
        .unwrap();
    assert_eq!(
        processor.mapped_regions(),
        vec![(0x8100_0000, 0x8100_3FFF, Protection::RW)]
    );

    memory
        .change_protection(
            0x8100_0000,
            0x8100_3FFF,
            Protection::READ | Protection::EXECUTE,
        )
        .unwrap();
    assert_eq!(
        processor.mapped_regions()[0].2,
        Protection::READ | Protection::EXECUTE
    );

    memory.unmap(0x8100_0000, 0x8100_3FFF).unwrap();
    assert!(processor.mapped_regions().is_empty());
}

#[test]
fn test_unmap_requires_exact_bounds() {
    let memory = AddressSpace::new();
    memory
        .map("code", 0x8100_0000, 0x8100_3FFF, Protection::RW)
        .unwrap();
    assert!(memory.unmap(0x8100_0000, 0x8100_1FFF).is_err());
    assert_eq!(memory.region_count(), 1);
    memory.unmap(0x8100_0000, 0x8100_3FFF).unwrap();
    assert_eq!(memory.region_count(), 0);
}
