/*!
 * Import Resolution Stage
 *
 * Walks the module's import-descriptor table inside the mapped image,
 * patches every function-import entry with the trap sequence, and registers
 * the collected `RuntimeModule` with the HLE registry. This is how guest
 * calls to OS functions become traps the dispatch layer can intercept.
 */

use log::{debug, error};

use super::LoadError;
use crate::core::limits::TRAP_PATCH;
use crate::core::types::{Addr, LoadResult};
use crate::hle::{FunctionImport, FunctionImportLibrary, HleRegistry, RuntimeModule};
use crate::memory::AddressSpace;

/// Supported import-descriptor layout
const IMPORT_LAYOUT_FULL: u16 = 0x34;
/// Known but unsupported short layout
const IMPORT_LAYOUT_SHORT: u16 = 0x24;

/// Module info fields the loader consumes (read out of guest memory)
#[derive(Debug, Clone)]
pub(super) struct ModuleInfo {
    pub name: String,
    pub module_nid: u32,
    pub import_top: Addr,
    pub import_end: Addr,
}

pub(super) fn read_module_info(memory: &AddressSpace, addr: Addr) -> LoadResult<ModuleInfo> {
    let read = |offset: u32| {
        memory
            .read_u32(addr.wrapping_add(offset))
            .map_err(|_| LoadError::BadModuleInfo(addr))
    };
    let name_bytes = memory
        .read_bytes(addr.wrapping_add(0x04), 27)
        .map_err(|_| LoadError::BadModuleInfo(addr))?;
    let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(27);
    let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();

    let info = ModuleInfo {
        name,
        import_top: read(0x2C)?,
        import_end: read(0x30)?,
        module_nid: read(0x34)?,
    };
    debug!(
        "Module name: {} import range {:#010x}..{:#010x} nid {:#010x}",
        info.name, info.import_top, info.import_end, info.module_nid
    );
    Ok(info)
}

/// Walk `[import_top, import_end)` (offset by `base` for relocatable images),
/// patch every import entry, and register the resulting runtime module.
pub(super) fn register_imports(
    memory: &AddressSpace,
    hle: &HleRegistry,
    modinfo: &ModuleInfo,
    base: Addr,
) -> LoadResult<()> {
    let mut libraries = Vec::new();
    let mut cursor = modinfo.import_top;

    while cursor < modinfo.import_end {
        let descriptor = base.wrapping_add(cursor);
        let size = memory
            .read_u16(descriptor)
            .map_err(|_| LoadError::BadImportAddress(descriptor))?;

        if size != IMPORT_LAYOUT_FULL {
            if size == IMPORT_LAYOUT_SHORT {
                error!("unimplemented struct size 0x24 for import descriptor");
            } else {
                error!("unimplemented struct size {size:#06x} for import descriptor");
            }
            return Err(LoadError::UnsupportedImportLayout(size));
        }

        let field = |offset: u32| {
            memory
                .read_u32(descriptor.wrapping_add(offset))
                .map_err(|_| LoadError::BadImportAddress(descriptor))
        };
        let num_funcs = memory
            .read_u16(descriptor.wrapping_add(0x06))
            .map_err(|_| LoadError::BadImportAddress(descriptor))?;
        let library_nid = field(0x10)?;
        let library_name_addr = field(0x14)?;
        let nid_table = field(0x1C)?;
        let entry_table = field(0x20)?;

        let library_name = memory
            .read_cstring(library_name_addr)
            .map_err(|_| LoadError::BadImportAddress(library_name_addr))?;

        let mut function_imports = Vec::with_capacity(num_funcs as usize);
        for i in 0..num_funcs as u32 {
            let nid = memory
                .read_u32(nid_table.wrapping_add(i * 4))
                .map_err(|_| LoadError::BadImportAddress(nid_table))?;
            let entry_address = memory
                .read_u32(entry_table.wrapping_add(i * 4))
                .map_err(|_| LoadError::BadImportAddress(entry_table))?;

            patch_function_import(memory, entry_address)?;
            function_imports.push(FunctionImport { nid, entry_address });
        }

        libraries.push(FunctionImportLibrary {
            library_name,
            library_nid,
            function_imports,
        });
        cursor += size as u32;
    }

    hle.add_runtime_module(RuntimeModule {
        library_name: modinfo.name.clone(),
        module_nid: modinfo.module_nid,
        function_import_libraries: libraries,
    });
    debug!("Added runtime library functions to HLE");
    Ok(())
}

/// Overwrite the 8 bytes at a function-import entry with the trap sequence
/// (supervisor call, then return)
fn patch_function_import(memory: &AddressSpace, entry: Addr) -> LoadResult<()> {
    for (i, word) in TRAP_PATCH.iter().enumerate() {
        memory
            .write_u32(entry.wrapping_add(i as u32 * 4), *word)
            .map_err(|_| {
                error!("can't patch out entry address {entry:#010x}");
                LoadError::BadImportAddress(entry)
            })?;
    }
    Ok(())
}
