/*!
 * High-Level Emulation Registry
 * Host-side modules, runtime import records, and NID resolution
 */

mod dispatch;
mod marshal;

pub mod modules;

pub use dispatch::{DispatchError, Dispatcher};
pub use marshal::{ArgKind, CallConv, HleContext, HostFn, MAX_REGISTER_ARGS};

use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::core::types::{Addr, Nid};

/// A single patched function-import entry from a loaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionImport {
    pub nid: Nid,
    pub entry_address: Addr,
}

/// One imported library's worth of function imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionImportLibrary {
    pub library_name: String,
    pub library_nid: Nid,
    pub function_imports: Vec<FunctionImport>,
}

/// Import records collected while loading one guest module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeModule {
    pub library_name: String,
    pub module_nid: Nid,
    pub function_import_libraries: Vec<FunctionImportLibrary>,
}

/// A host function registered under a library NID pair.
pub struct HleFunctionDef {
    pub name: &'static str,
    pub nid: Nid,
    pub flags: u16,
    pub conv: CallConv,
    pub handler: HostFn,
}

/// A host-side module: a named library and its exported functions.
pub struct HleModuleDef {
    pub name: &'static str,
    pub nid: Nid,
    pub functions: Vec<HleFunctionDef>,
}

/// The host function bound to a resolved import entry.
#[derive(Clone)]
pub struct ResolvedFunction {
    pub name: &'static str,
    pub conv: CallConv,
    pub handler: HostFn,
}

/// One resolved trap site. `function` is `None` when no host module
/// exports the NID; calling through such an entry is fatal.
#[derive(Clone)]
pub struct ResolvedImport {
    pub library_name: String,
    pub nid: Nid,
    pub function: Option<ResolvedFunction>,
}

/// Registry of host modules and resolved guest imports.
///
/// Loading populates the runtime-module list; `resolve` flattens it into a
/// map from trap address to host function, consulted on every trap.
pub struct HleRegistry {
    modules: Arc<RwLock<Vec<HleModuleDef>>>,
    runtime_modules: Arc<RwLock<Vec<RuntimeModule>>>,
    resolved: Arc<DashMap<Addr, ResolvedImport, RandomState>>,
}

impl HleRegistry {
    pub fn new() -> Self {
        Self {
            modules: Arc::new(RwLock::new(Vec::new())),
            runtime_modules: Arc::new(RwLock::new(Vec::new())),
            resolved: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    pub fn register_module(&self, module: HleModuleDef) {
        info!(
            "Registered HLE module {} ({:#x}) with {} functions",
            module.name,
            module.nid,
            module.functions.len()
        );
        self.modules.write().push(module);
    }

    /// Look up a host function by NID across every registered module.
    pub fn find_function(&self, nid: Nid) -> Option<ResolvedFunction> {
        let modules = self.modules.read();
        for module in modules.iter() {
            for function in &module.functions {
                if function.nid == nid {
                    return Some(ResolvedFunction {
                        name: function.name,
                        conv: function.conv,
                        handler: function.handler.clone(),
                    });
                }
            }
        }
        None
    }

    pub fn add_runtime_module(&self, module: RuntimeModule) {
        debug!(
            "Recorded runtime module {} ({:#x})",
            module.library_name, module.module_nid
        );
        self.runtime_modules.write().push(module);
    }

    /// Bind every recorded import entry to a host function. Unmatched NIDs
    /// are kept as unresolved entries so a call through them can be reported
    /// with the library and NID that failed.
    pub fn resolve(&self) -> usize {
        let runtime_modules = self.runtime_modules.read();
        let mut bound = 0;
        let mut missing = 0;
        for module in runtime_modules.iter() {
            for library in &module.function_import_libraries {
                for import in &library.function_imports {
                    let function = self.find_function(import.nid);
                    match &function {
                        Some(function) => {
                            debug!(
                                "Resolved {}::{} ({:#x}) at {:#x}",
                                library.library_name, function.name, import.nid, import.entry_address
                            );
                            bound += 1;
                        }
                        None => {
                            warn!(
                                "No host function for {} NID {:#x} at {:#x}",
                                library.library_name, import.nid, import.entry_address
                            );
                            missing += 1;
                        }
                    }
                    self.resolved.insert(
                        import.entry_address,
                        ResolvedImport {
                            library_name: library.library_name.clone(),
                            nid: import.nid,
                            function,
                        },
                    );
                }
            }
        }
        info!("Import resolution: {} bound, {} unresolved", bound, missing);
        bound
    }

    pub fn resolved_import(&self, address: Addr) -> Option<ResolvedImport> {
        self.resolved.get(&address).map(|entry| entry.clone())
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

impl Default for HleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for HleRegistry {
    fn clone(&self) -> Self {
        Self {
            modules: self.modules.clone(),
            runtime_modules: self.runtime_modules.clone(),
            resolved: self.resolved.clone(),
        }
    }
}
