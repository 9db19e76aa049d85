/*!
 * SceSysmem
 * Guest memory block services
 */

use std::sync::Arc;

use log::warn;

use crate::hle::marshal::ArgKind::{Address, Int};
use crate::hle::marshal::CallConv;
use crate::hle::HleModuleDef;

use super::function;

pub const LIBRARY_NID: u32 = 0x37FE_725A;

pub fn module() -> HleModuleDef {
    HleModuleDef {
        name: "SceSysmem",
        nid: LIBRARY_NID,
        functions: vec![function(
            "sceKernelAllocMemBlock",
            0xB9D5_EBDE,
            0x1500,
            CallConv::new(&[Address, Int, Int, Address]),
            Arc::new(|ctx, args| {
                let name = ctx.memory.read_cstring(args[0]).unwrap_or_default();
                warn!(
                    "sceKernelAllocMemBlock({:?}, type {:#x}, size {:#x}) not implemented",
                    name, args[1], args[2]
                );
                -1
            }),
        )],
    }
}
