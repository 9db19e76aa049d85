/*!
 * Host Modules
 * Built-in system library implementations
 */

pub mod libkernel;
pub mod sysmem;

use super::{HleFunctionDef, HleModuleDef};
use crate::hle::marshal::{CallConv, HostFn};

/// All built-in host modules, in registration order.
pub fn default_modules() -> Vec<HleModuleDef> {
    vec![libkernel::module(), sysmem::module()]
}

pub(super) fn function(
    name: &'static str,
    nid: u32,
    flags: u16,
    conv: CallConv,
    handler: HostFn,
) -> HleFunctionDef {
    HleFunctionDef {
        name,
        nid,
        flags,
        conv,
        handler,
    }
}
