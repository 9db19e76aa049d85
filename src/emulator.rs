/*!
 * Emulator Context
 * Owns and wires the address space, kernel, HLE registry, and scheduler
 */

use std::sync::Arc;

use log::info;

use crate::core::types::LoadResult;
use crate::cpu::Processor;
use crate::hle::{modules, Dispatcher, HleModuleDef, HleRegistry};
use crate::kernel::{Kernel, Scheduler, StepOutcome};
use crate::loader::{LoadInfo, Loader};
use crate::memory::AddressSpace;

/// Top-level context. Everything hangs off this one object; subsystems are
/// cheap clones sharing state behind `Arc`s, so handing out references or
/// clones of the parts is fine.
pub struct Emulator {
    processor: Arc<dyn Processor>,
    memory: AddressSpace,
    kernel: Kernel,
    hle: HleRegistry,
    scheduler: Scheduler,
    loader: Loader,
}

impl Emulator {
    /// Wire up every subsystem around the given execution backend. No host
    /// modules are registered; see `with_default_modules`.
    pub fn new(processor: Arc<dyn Processor>) -> Self {
        let memory = AddressSpace::new().with_processor(processor.clone());
        let kernel = Kernel::new(memory.clone());
        let hle = HleRegistry::new();
        let dispatcher = Dispatcher::new(
            hle.clone(),
            kernel.clone(),
            memory.clone(),
            processor.clone(),
        );
        let scheduler = Scheduler::new(kernel.clone(), processor.clone(), dispatcher);
        let loader = Loader::new(memory.clone(), hle.clone());
        info!("Emulator context initialized");
        Self {
            processor,
            memory,
            kernel,
            hle,
            scheduler,
            loader,
        }
    }

    /// Register the built-in system libraries.
    pub fn with_default_modules(self) -> Self {
        for module in modules::default_modules() {
            self.hle.register_module(module);
        }
        self
    }

    pub fn register_module(&self, module: HleModuleDef) {
        self.hle.register_module(module);
    }

    /// Load an executable image and bind its imports to host functions.
    pub fn load_image(&self, bytes: &[u8]) -> LoadResult<LoadInfo> {
        let info = self.loader.load_bytes(bytes)?;
        self.hle.resolve();
        Ok(info)
    }

    /// Re-run NID resolution, picking up modules registered after a load.
    pub fn resolve_imports(&self) -> usize {
        self.hle.resolve()
    }

    /// Run one scheduling quantum.
    pub fn step(&self) -> StepOutcome {
        self.scheduler.step()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn memory(&self) -> &AddressSpace {
        &self.memory
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn hle(&self) -> &HleRegistry {
        &self.hle
    }

    pub fn processor(&self) -> &Arc<dyn Processor> {
        &self.processor
    }
}
