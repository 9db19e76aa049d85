/*!
 * Processor Collaborator
 *
 * The instruction decode/execute engine lives outside this crate. The core
 * only needs a register file per core, a mirrored view of the guest address
 * space, and the ability to run a bounded quantum of instructions. Backends
 * (an interpreter, a JIT, a fake for tests) implement `Processor`.
 */

use crate::core::types::{Addr, CoreId};
use crate::memory::Protection;

/// Stack pointer alias (r13)
pub const REG_SP: usize = 13;
/// Link register alias (r14)
pub const REG_LR: usize = 14;
/// Program counter alias (r15)
pub const REG_PC: usize = 15;
/// Status register alias, addressed through the same index space
pub const REG_CPSR: usize = 16;

/// Thumb execution state bit in the status register
pub const CPSR_THUMB: u32 = 1 << 5;

/// Guest register file: 16 general-purpose registers (r15 aliases the
/// program counter) plus the status register. Copied into and out of the
/// processor by the scheduler each quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterContext {
    pub reg: [u32; 16],
    pub cpsr: u32,
}

impl RegisterContext {
    /// Read by alias index; index 16 reaches the status register
    pub fn read(&self, index: usize) -> u32 {
        match index {
            REG_CPSR => self.cpsr,
            i if i < 16 => self.reg[i],
            _ => {
                log::error!("read of invalid register index {index}");
                0
            }
        }
    }

    /// Write by alias index; index 16 reaches the status register
    pub fn write(&mut self, index: usize, value: u32) {
        match index {
            REG_CPSR => self.cpsr = value,
            i if i < 16 => self.reg[i] = value,
            _ => log::error!("write of invalid register index {index}"),
        }
    }

    pub fn sp(&self) -> u32 {
        self.reg[REG_SP]
    }

    pub fn pc(&self) -> u32 {
        self.reg[REG_PC]
    }
}

/// Why a quantum ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantumExit {
    /// Instruction budget exhausted
    Completed,
    /// Supervisor-call trap; `pc` is the program counter after the trap
    /// instruction
    Svc { pc: Addr },
    /// The core was stopped (externally or by a fault)
    Halted,
}

/// Execution-engine contract.
///
/// Region mirroring is address-based: a backend that needs guest bytes reads
/// them through the shared `AddressSpace` rather than holding raw aliases
/// into region buffers.
pub trait Processor: Send + Sync {
    /// Mirror a newly mapped guest region
    fn map_region(&self, start: Addr, end: Addr, protection: Protection);

    /// Drop the mirror of an unmapped region
    fn unmap_region(&self, start: Addr, end: Addr);

    /// Update the mirrored protection of a region
    fn protect_region(&self, start: Addr, end: Addr, protection: Protection);

    /// Read a live register on a core (indices 13/14/15/16 alias SP/LR/PC/CPSR)
    fn read_register(&self, core: CoreId, index: usize) -> u32;

    /// Write a live register on a core
    fn write_register(&self, core: CoreId, index: usize, value: u32);

    /// Load `ctx`, execute up to `instructions` guest instructions, then
    /// store the updated register state back into `ctx` before returning
    fn run_quantum(&self, core: CoreId, ctx: &mut RegisterContext, instructions: u64)
        -> QuantumExit;

    /// Stop guest execution on a core
    fn stop(&self, core: CoreId);

    /// Pick a core for the next quantum
    fn available_core(&self) -> CoreId;
}
