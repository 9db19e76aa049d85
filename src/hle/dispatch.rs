/*!
 * Trap Dispatch
 * Routes supervisor-call traps to host functions
 */

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info};

use crate::core::limits::TRAP_INSTRUCTION_SIZE;
use crate::core::types::{Addr, CoreId, DispatchResult, Nid};
use crate::cpu::Processor;
use crate::kernel::Kernel;
use crate::memory::AddressSpace;

use super::marshal::{self, HleContext};
use super::HleRegistry;

#[derive(Debug, Error, PartialEq, Eq, Clone, miette::Diagnostic)]
pub enum DispatchError {
    #[error("Supervisor call from unknown address {0:#x}")]
    #[diagnostic(
        code(hle::unknown_call),
        help("The trap did not come from a patched import entry")
    )]
    UnknownCall(Addr),

    #[error("Call through unresolved import {library_name} NID {nid:#x} at {address:#x}")]
    #[diagnostic(
        code(hle::unresolved_call),
        help("No registered host module exports this NID")
    )]
    UnresolvedCall {
        address: Addr,
        library_name: String,
        nid: Nid,
    },
}

/// Services supervisor-call traps.
///
/// A trap's call site is the address of the trap instruction itself, one
/// instruction before the reported program counter. Host handlers run under
/// a single global lock so kernel state sees one call at a time.
pub struct Dispatcher {
    registry: HleRegistry,
    kernel: Kernel,
    memory: AddressSpace,
    processor: Arc<dyn Processor>,
    lock: Arc<Mutex<()>>,
}

impl Dispatcher {
    pub fn new(
        registry: HleRegistry,
        kernel: Kernel,
        memory: AddressSpace,
        processor: Arc<dyn Processor>,
    ) -> Self {
        Self {
            registry,
            kernel,
            memory,
            processor,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn dispatch(&self, core: CoreId, pc: Addr) -> DispatchResult<()> {
        let call_site = pc.wrapping_sub(TRAP_INSTRUCTION_SIZE);
        let Some(import) = self.registry.resolved_import(call_site) else {
            error!(core, pc, call_site, "supervisor call from unknown address");
            self.processor.stop(core);
            return Err(DispatchError::UnknownCall(call_site));
        };
        let Some(function) = import.function else {
            error!(
                core,
                call_site,
                library = %import.library_name,
                nid = import.nid,
                "call through unresolved import"
            );
            self.processor.stop(core);
            return Err(DispatchError::UnresolvedCall {
                address: call_site,
                library_name: import.library_name,
                nid: import.nid,
            });
        };

        let _guard = self.lock.lock();
        let ctx = HleContext {
            kernel: &self.kernel,
            memory: &self.memory,
            processor: self.processor.as_ref(),
            core,
        };
        let result = marshal::invoke(
            self.processor.as_ref(),
            core,
            function.conv,
            &ctx,
            &function.handler,
        );
        info!(
            core,
            call_site,
            name = function.name,
            nid = import.nid,
            result,
            "hle call"
        );
        Ok(())
    }
}

impl Clone for Dispatcher {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            kernel: self.kernel.clone(),
            memory: self.memory.clone(),
            processor: self.processor.clone(),
            lock: self.lock.clone(),
        }
    }
}
