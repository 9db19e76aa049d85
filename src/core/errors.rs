/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use thiserror::Error;

// Re-export MemoryError from the memory module
pub use crate::memory::MemoryError;

// Re-export LoadError from the loader module
pub use crate::loader::LoadError;

// Re-export KernelError from the kernel module
pub use crate::kernel::KernelError;

// Re-export DispatchError from the HLE module
pub use crate::hle::DispatchError;

/// Top-level error for embedders driving the whole core
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum CoreError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dispatch(#[from] DispatchError),
}
