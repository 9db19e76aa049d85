/*!
 * Execution core for an ARM handheld guest: address space management,
 * executable image loading and relocation, a high-level kernel with
 * cooperative scheduling, and NID-based dispatch of guest imports to
 * host functions.
 *
 * The instruction engine itself lives behind the [`cpu::Processor`] trait;
 * this crate supplies everything around it.
 */

pub mod core;
pub mod cpu;
pub mod emulator;
pub mod hle;
pub mod kernel;
pub mod loader;
pub mod memory;

pub use crate::core::errors::CoreError;
pub use crate::core::types::{Addr, CoreId, Nid, Size, Uid};
pub use cpu::{Processor, QuantumExit, RegisterContext};
pub use emulator::Emulator;
pub use hle::{Dispatcher, HleRegistry};
pub use kernel::{Kernel, Scheduler, StepOutcome, ThreadStatus};
pub use loader::{LoadError, LoadInfo, Loader};
pub use memory::{AddressSpace, MemoryError, Protection};
