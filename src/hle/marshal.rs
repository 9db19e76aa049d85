/*!
 * Register Marshaling
 * Data-driven argument passing between guest registers and host handlers
 */

use std::sync::Arc;

use crate::core::types::CoreId;
use crate::cpu::Processor;
use crate::kernel::Kernel;
use crate::memory::AddressSpace;

/// Up to four arguments are carried in r0 through r3.
pub const MAX_REGISTER_ARGS: usize = 4;

/// How an argument word should be interpreted by a handler. Both kinds
/// travel as a raw `u32`; the distinction documents handler intent and
/// shows up in call traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Int,
    Address,
}

/// Calling convention of a host function: which registers carry arguments.
/// The return value always lands in r0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallConv {
    args: &'static [ArgKind],
}

impl CallConv {
    pub const VOID: Self = Self { args: &[] };

    pub const fn new(args: &'static [ArgKind]) -> Self {
        assert!(args.len() <= MAX_REGISTER_ARGS);
        Self { args }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn args(&self) -> &'static [ArgKind] {
        self.args
    }
}

/// Everything a host handler may touch. Borrowed for the duration of a
/// single invocation; handlers must not stash these references.
pub struct HleContext<'a> {
    pub kernel: &'a Kernel,
    pub memory: &'a AddressSpace,
    pub processor: &'a dyn Processor,
    pub core: CoreId,
}

/// A host-side implementation of a guest-importable function.
pub type HostFn = Arc<dyn Fn(&HleContext<'_>, &[u32]) -> i32 + Send + Sync>;

/// Read the argument registers named by `conv`, run the handler, and
/// store the returned value in r0.
pub fn invoke(
    processor: &dyn Processor,
    core: CoreId,
    conv: CallConv,
    ctx: &HleContext<'_>,
    handler: &HostFn,
) -> i32 {
    let mut args = [0u32; MAX_REGISTER_ARGS];
    for (index, _) in conv.args().iter().enumerate() {
        args[index] = processor.read_register(core, index);
    }
    let result = handler(ctx, &args[..conv.arity()]);
    processor.write_register(core, 0, result as u32);
    result
}
