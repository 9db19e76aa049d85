/*!
 * System Limits and Constants
 *
 * Centralized location for the tunable constants of the emulator core.
 * Grouped by domain.
 */

// =============================================================================
// MEMORY LAYOUT
// =============================================================================

/// Loader page size (16KB)
/// Loadable segments are mapped up to the next multiple of this
pub const PAGE_SIZE: u32 = 0x4000;

/// Arena page size (4KB)
/// Stack/heap/TLS allocations round up to this
pub const SMALL_PAGE: u32 = 0x1000;

/// Guard band left unmapped on each side of an arena placement (4KB)
pub const ARENA_GUARD: u32 = 0x1000;

/// First arena placement when nothing is mapped yet
pub const ARENA_BASE: u32 = 0x6000_0000;

// =============================================================================
// KERNEL OBJECTS
// =============================================================================

/// First UID handed out by the kernel; UIDs only ever increase
pub const UID_BASE: i32 = 0x100;

/// Highest valid TLS key, inclusive
pub const TLS_KEY_MAX: u32 = 0x100;

/// Bytes backing one thread's TLS slots ((TLS_KEY_MAX + 1) * 4)
pub const TLS_REGION_SIZE: u32 = (TLS_KEY_MAX + 1) * 4;

/// Default thread stack size when the guest passes zero
pub const DEFAULT_STACK_SIZE: u32 = 0x1_0000;

// =============================================================================
// SCHEDULING
// =============================================================================

/// Emulated CPU clock rate (Cortex-A9 class)
pub const CPU_CLOCK_HZ: u64 = 333_000_000;

/// Wall-clock length of one scheduling quantum, in microseconds
pub const QUANTUM_US: u64 = 1_000;

/// Instruction budget for one quantum
pub const fn quantum_instructions() -> u64 {
    CPU_CLOCK_HZ * QUANTUM_US / 1_000_000
}

// =============================================================================
// SYSCALL TRAPS
// =============================================================================

/// Two-instruction sequence written over every resolved import entry:
/// SVC #0 followed by BX LR
pub const TRAP_PATCH: [u32; 2] = [0xEF00_0000, 0xE12F_FF1E];

/// Width of the supervisor-call instruction; the call site is pc minus this
pub const TRAP_INSTRUCTION_SIZE: u32 = 4;
