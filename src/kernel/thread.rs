/*!
 * Thread Objects
 * Guest thread state and the thread status machine
 */

use crate::core::types::{Addr, Size, Uid};
use crate::cpu::RegisterContext;

/// Thread status values. Only `Stagnant`, `Ready`, and `Running` carry
/// transition logic; the remaining values are reserved for blocking
/// primitives that do not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ThreadStatus {
    Running = 1,
    Ready = 2,
    Standby = 4,
    Waiting = 8,
    Dormant = 16,
    Deleted = 32,
    Dead = 64,
    Stagnant = 128,
}

/// A guest thread. Created `Stagnant`; `start_thread` gives it a stack, a
/// TLS block, and an initial register context, and makes it `Ready`.
#[derive(Debug, Clone)]
pub struct Thread {
    pub uid: Uid,
    pub process_id: Uid,
    pub name: String,
    pub attr: u32,
    pub status: ThreadStatus,
    pub entry_point: Addr,
    pub stack_base: Addr,
    pub stack_size: Size,
    pub init_priority: i32,
    pub current_priority: i32,
    pub wait_type: u32,
    pub wait_id: Uid,
    pub tls_base: Addr,
    pub context: RegisterContext,
}

impl Thread {
    pub(super) fn new(
        uid: Uid,
        name: String,
        entry_point: Addr,
        init_priority: i32,
        stack_size: Size,
        attr: u32,
    ) -> Self {
        Self {
            uid,
            process_id: 0,
            name,
            attr,
            status: ThreadStatus::Stagnant,
            entry_point,
            stack_base: 0,
            stack_size,
            init_priority,
            current_priority: init_priority,
            wait_type: 0,
            wait_id: 0,
            tls_base: 0,
            context: RegisterContext::default(),
        }
    }
}
