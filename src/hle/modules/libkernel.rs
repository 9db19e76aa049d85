/*!
 * SceLibKernel
 * Threading, synchronization, and C runtime entry points
 */

use std::sync::Arc;

use log::{error, trace, warn};

use crate::hle::marshal::ArgKind::{Address, Int};
use crate::hle::marshal::CallConv;
use crate::hle::HleModuleDef;

use super::function;

pub const LIBRARY_NID: u32 = 0xCAE9_ACE6;

pub fn module() -> HleModuleDef {
    HleModuleDef {
        name: "SceLibKernel",
        nid: LIBRARY_NID,
        functions: vec![
            function(
                "sceKernelGetThreadId",
                0x0FB9_72F9,
                0x0000,
                CallConv::VOID,
                Arc::new(|ctx, _args| match ctx.kernel.current_thread(ctx.core) {
                    Some(uid) => uid,
                    None => {
                        error!("sceKernelGetThreadId called with no thread on core");
                        -1
                    }
                }),
            ),
            function(
                "sceKernelCreateMutex",
                0xED53_334A,
                0x0000,
                CallConv::new(&[Address, Int, Int, Address]),
                Arc::new(|ctx, args| {
                    let name = ctx.memory.read_cstring(args[0]).unwrap_or_default();
                    warn!(
                        "sceKernelCreateMutex({:?}, attr {:#x}, count {}) not implemented",
                        name, args[1], args[2]
                    );
                    -1
                }),
            ),
            function(
                "sceKernelLockMutex",
                0x1D8D_7945,
                0x0000,
                CallConv::new(&[Int, Int, Address]),
                Arc::new(|_ctx, args| {
                    warn!("sceKernelLockMutex({:#x}) not implemented", args[0]);
                    -1
                }),
            ),
            function(
                "sceKernelUnlockMutex",
                0x1A37_2EC8,
                0x0000,
                CallConv::new(&[Int, Int]),
                Arc::new(|_ctx, args| {
                    warn!("sceKernelUnlockMutex({:#x}) not implemented", args[0]);
                    -1
                }),
            ),
            function(
                "sceKernelGetTLSAddr",
                0xB295_EB61,
                0x0000,
                CallConv::new(&[Int]),
                Arc::new(|ctx, args| {
                    let Some(uid) = ctx.kernel.current_thread(ctx.core) else {
                        error!("sceKernelGetTLSAddr called with no thread on core");
                        return 0;
                    };
                    match ctx.kernel.get_tls_address(uid, args[0]) {
                        Ok(addr) => addr as i32,
                        Err(e) => {
                            error!("sceKernelGetTLSAddr failed: {}", e);
                            0
                        }
                    }
                }),
            ),
            function(
                "sceClibMemset",
                0x6329_80D7,
                0x0000,
                CallConv::new(&[Address, Int, Int]),
                Arc::new(|ctx, args| {
                    let (dst, value, len) = (args[0], args[1] as u8, args[2]);
                    trace!("sceClibMemset({:#x}, {:#x}, {:#x})", dst, value, len);
                    if len > 0 {
                        if let Err(e) = ctx.memory.fill(dst, value, len as usize) {
                            error!("sceClibMemset failed: {}", e);
                            return 0;
                        }
                    }
                    dst as i32
                }),
            ),
            function(
                "sceClibMemmove",
                0x7367_53C8,
                0x0000,
                CallConv::new(&[Address, Address, Int]),
                Arc::new(|ctx, args| {
                    let (dst, src, len) = (args[0], args[1], args[2]);
                    trace!("sceClibMemmove({:#x}, {:#x}, {:#x})", dst, src, len);
                    if len > 0 {
                        // Copying out then back in makes overlap safe.
                        let bytes = match ctx.memory.read_bytes(src, len as usize) {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                error!("sceClibMemmove source read failed: {}", e);
                                return 0;
                            }
                        };
                        if let Err(e) = ctx.memory.write_bytes(dst, &bytes) {
                            error!("sceClibMemmove destination write failed: {}", e);
                            return 0;
                        }
                    }
                    dst as i32
                }),
            ),
        ],
    }
}
