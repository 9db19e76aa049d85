/*!
 * Core Types
 * Common types used across the emulator core
 */

/// Guest virtual address
pub type Addr = u32;

/// Size of a guest memory range in bytes
pub type Size = u32;

/// Kernel object UID
pub type Uid = i32;

/// 32-bit numeric import id ("NID")
pub type Nid = u32;

/// Logical processor core index
pub type CoreId = usize;

/// Common result type for memory operations
pub type MemoryResult<T> = Result<T, crate::memory::MemoryError>;

/// Common result type for the loader
pub type LoadResult<T> = Result<T, crate::loader::LoadError>;

/// Common result type for kernel operations
pub type KernelResult<T> = Result<T, crate::kernel::KernelError>;

/// Result alias for trap dispatch
pub type DispatchResult<T> = Result<T, crate::hle::DispatchError>;
