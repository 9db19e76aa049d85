/*!
 * Shared Test Fixtures
 * Scripted processor backend and container image builders
 */

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use parking_lot::Mutex;

use vita_core::cpu::{Processor, QuantumExit, RegisterContext};
use vita_core::memory::Protection;
use vita_core::{Addr, CoreId};

const CORES: usize = 4;

/// Execution backend stand-in. Register files are real; quanta follow a
/// scripted exit queue instead of executing instructions. Region mirror
/// calls are recorded for assertions.
pub struct FakeProcessor {
    registers: Mutex<Vec<[u32; 17]>>,
    script: Mutex<VecDeque<QuantumExit>>,
    mapped: Mutex<Vec<(Addr, Addr, Protection)>>,
    stopped: Mutex<Vec<CoreId>>,
}

impl FakeProcessor {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            registers: Mutex::new(vec![[0u32; 17]; CORES]),
            script: Mutex::new(VecDeque::new()),
            mapped: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
        }
    }

    /// Queue the exit reason for the next quantum. An empty queue means
    /// quanta complete normally.
    pub fn push_exit(&self, exit: QuantumExit) {
        self.script.lock().push_back(exit);
    }

    pub fn mapped_regions(&self) -> Vec<(Addr, Addr, Protection)> {
        self.mapped.lock().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stopped.lock().len()
    }
}

impl Processor for FakeProcessor {
    fn map_region(&self, start: Addr, end: Addr, protection: Protection) {
        self.mapped.lock().push((start, end, protection));
    }

    fn unmap_region(&self, start: Addr, end: Addr) {
        self.mapped
            .lock()
            .retain(|region| !(region.0 == start && region.1 == end));
    }

    fn protect_region(&self, start: Addr, end: Addr, protection: Protection) {
        for region in self.mapped.lock().iter_mut() {
            if region.0 == start && region.1 == end {
                region.2 = protection;
            }
        }
    }

    fn read_register(&self, core: CoreId, index: usize) -> u32 {
        self.registers.lock()[core][index]
    }

    fn write_register(&self, core: CoreId, index: usize, value: u32) {
        self.registers.lock()[core][index] = value;
    }

    fn run_quantum(
        &self,
        core: CoreId,
        ctx: &mut RegisterContext,
        _instructions: u64,
    ) -> QuantumExit {
        {
            let mut registers = self.registers.lock();
            registers[core][..16].copy_from_slice(&ctx.reg);
            registers[core][16] = ctx.cpsr;
        }
        let exit = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(QuantumExit::Completed);
        if let QuantumExit::Svc { pc } = exit {
            self.registers.lock()[core][15] = pc;
        }
        let registers = self.registers.lock();
        ctx.reg.copy_from_slice(&registers[core][..16]);
        ctx.cpsr = registers[core][16];
        exit
    }

    fn stop(&self, core: CoreId) {
        self.stopped.lock().push(core);
    }

    fn available_core(&self) -> CoreId {
        0
    }
}

pub const ET_SCE_EXEC: u16 = 0xFE00;
pub const ET_SCE_RELEXEC: u16 = 0xFE04;
pub const PT_LOAD: u32 = 0x0000_0001;
pub const PT_SCE_RELA: u32 = 0x6000_0000;
pub const PF_RX: u32 = 0x5;
pub const PF_RW: u32 = 0x6;

/// One segment of a synthetic container image.
pub struct SegmentSpec {
    pub p_type: u32,
    pub vaddr: u32,
    pub flags: u32,
    pub data: Vec<u8>,
    /// Extra zero-initialized bytes past the file contents
    pub bss: u32,
    pub deflate: bool,
    pub encrypt: bool,
}

impl SegmentSpec {
    pub fn load(vaddr: u32, flags: u32, data: Vec<u8>) -> Self {
        Self {
            p_type: PT_LOAD,
            vaddr,
            flags,
            data,
            bss: 0,
            deflate: false,
            encrypt: false,
        }
    }

    pub fn rela(data: Vec<u8>) -> Self {
        Self {
            p_type: PT_SCE_RELA,
            vaddr: 0,
            flags: 0,
            data,
            bss: 0,
            deflate: false,
            encrypt: false,
        }
    }
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Assemble a signed container image from segment specs. The layout is the
/// one the loader expects: outer header, executable header, program-header
/// table, segment-metadata table, then the segment payloads.
pub fn build_image(e_type: u16, entry: u32, segments: Vec<SegmentSpec>) -> Vec<u8> {
    let elf_offset = 0x80usize;
    let phdr_offset = elf_offset + 0x34;
    let seginfo_offset = phdr_offset + segments.len() * 0x20;
    let mut payload_offset = seginfo_offset + segments.len() * 0x20;

    let mut payloads = Vec::with_capacity(segments.len());
    for segment in &segments {
        let bytes = if segment.deflate {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&segment.data).unwrap();
            encoder.finish().unwrap()
        } else {
            segment.data.clone()
        };
        payloads.push((payload_offset, bytes));
        payload_offset += payloads.last().unwrap().1.len();
    }

    let mut image = vec![0u8; payload_offset];
    image[..4].copy_from_slice(b"SCE\0");
    put_u64(&mut image, 0x10, elf_offset as u64);
    put_u64(&mut image, 0x40, elf_offset as u64);
    put_u64(&mut image, 0x48, phdr_offset as u64);
    put_u64(&mut image, 0x58, seginfo_offset as u64);

    put_u16(&mut image, elf_offset + 0x10, e_type);
    put_u32(&mut image, elf_offset + 0x18, entry);
    put_u16(&mut image, elf_offset + 0x2C, segments.len() as u16);

    for (i, segment) in segments.iter().enumerate() {
        let phdr = phdr_offset + i * 0x20;
        put_u32(&mut image, phdr, segment.p_type);
        put_u32(&mut image, phdr + 0x08, segment.vaddr);
        put_u32(&mut image, phdr + 0x0C, segment.vaddr);
        put_u32(&mut image, phdr + 0x10, segment.data.len() as u32);
        put_u32(
            &mut image,
            phdr + 0x14,
            segment.data.len() as u32 + segment.bss,
        );
        put_u32(&mut image, phdr + 0x18, segment.flags);
        put_u32(&mut image, phdr + 0x1C, 0x1000);

        let (offset, bytes) = &payloads[i];
        let seginfo = seginfo_offset + i * 0x20;
        put_u64(&mut image, seginfo, *offset as u64);
        put_u64(&mut image, seginfo + 0x08, bytes.len() as u64);
        put_u64(&mut image, seginfo + 0x10, if segment.deflate { 2 } else { 1 });
        put_u64(&mut image, seginfo + 0x18, if segment.encrypt { 1 } else { 2 });
    }

    for (offset, bytes) in &payloads {
        image[*offset..*offset + bytes.len()].copy_from_slice(bytes);
    }
    image
}

/// A format-0 relocation entry.
pub fn rela_entry(
    code: u8,
    symbol_segment: u32,
    patch_segment: u32,
    addend: u32,
    offset: u32,
) -> Vec<u8> {
    let word0 = (symbol_segment << 4) | ((code as u32) << 8) | (patch_segment << 16);
    let mut entry = Vec::with_capacity(12);
    entry.extend_from_slice(&word0.to_le_bytes());
    entry.extend_from_slice(&addend.to_le_bytes());
    entry.extend_from_slice(&offset.to_le_bytes());
    entry
}
