/*!
 * High-Level Kernel
 * Object table, thread lifecycle, and TLS slot addressing
 */

mod object;
mod thread;

pub mod scheduler;

pub use object::{KernelObject, ObjectType};
pub use scheduler::{Scheduler, StepOutcome};
pub use thread::{Thread, ThreadStatus};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, error, info};
use parking_lot::RwLock;
use thiserror::Error;

use crate::core::limits::{DEFAULT_STACK_SIZE, TLS_KEY_MAX, UID_BASE};
use crate::core::types::{Addr, CoreId, KernelResult, Uid};
use crate::cpu::{CPSR_THUMB, REG_LR, REG_SP};
use crate::memory::{AddressSpace, MemoryError};

#[derive(Debug, Error, PartialEq, Eq, Clone, miette::Diagnostic)]
pub enum KernelError {
    #[error("Invalid handle: {0:#x}")]
    #[diagnostic(
        code(kernel::invalid_handle),
        help("The UID does not name a live kernel object")
    )]
    InvalidHandle(Uid),

    #[error("Wrong object type for handle {uid:#x}: expected {expected}")]
    #[diagnostic(code(kernel::wrong_object_type))]
    WrongObjectType { uid: Uid, expected: ObjectType },

    #[error("Invalid state for thread {uid:#x}: {status:?}")]
    #[diagnostic(
        code(kernel::invalid_state),
        help("The operation is only legal from a different thread status")
    )]
    InvalidState { uid: Uid, status: ThreadStatus },

    #[error("TLS key out of range: {0:#x}")]
    #[diagnostic(code(kernel::tls_key_out_of_range))]
    TlsKeyOutOfRange(u32),

    #[error("Stack allocation failed: {0}")]
    #[diagnostic(code(kernel::stack_allocation))]
    StackAllocation(#[from] MemoryError),
}

/// Kernel object table and thread bookkeeping.
///
/// UIDs are handed out from a single monotonic counter and never reused.
/// The ready queue holds UIDs only; thread state lives in the object table.
pub struct Kernel {
    memory: AddressSpace,
    objects: Arc<DashMap<Uid, KernelObject, RandomState>>,
    next_uid: Arc<AtomicI32>,
    thread_list: Arc<RwLock<Vec<Uid>>>,
    ready_queue: Arc<RwLock<VecDeque<Uid>>>,
    current: Arc<DashMap<CoreId, Uid, RandomState>>,
}

impl Kernel {
    pub fn new(memory: AddressSpace) -> Self {
        info!("Kernel initialized");
        Self {
            memory,
            objects: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_uid: Arc::new(AtomicI32::new(UID_BASE)),
            thread_list: Arc::new(RwLock::new(Vec::new())),
            ready_queue: Arc::new(RwLock::new(VecDeque::new())),
            current: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    fn generate_uid(&self) -> Uid {
        self.next_uid.fetch_add(1, Ordering::SeqCst)
    }

    /// Create a thread in the `Stagnant` state. A zero stack size picks the
    /// default. No memory is touched until the thread is started.
    pub fn create_thread(
        &self,
        name: &str,
        entry_point: Addr,
        init_priority: i32,
        stack_size: u32,
        attr: u32,
    ) -> Uid {
        let uid = self.generate_uid();
        let stack_size = if stack_size == 0 {
            DEFAULT_STACK_SIZE
        } else {
            stack_size
        };
        let thread = Thread::new(
            uid,
            name.to_string(),
            entry_point,
            init_priority,
            stack_size,
            attr,
        );
        self.objects.insert(uid, KernelObject::Thread(thread));
        self.thread_list.write().push(uid);
        info!(
            "Created thread {} (uid {:#x}, entry {:#x}, stack {:#x})",
            name, uid, entry_point, stack_size
        );
        uid
    }

    /// Remove an object from the table. Thread bookkeeping is cleaned up
    /// alongside the entry itself.
    pub fn destroy_object(&self, uid: Uid) -> KernelResult<()> {
        let (_, object) = self
            .objects
            .remove(&uid)
            .ok_or(KernelError::InvalidHandle(uid))?;
        if matches!(object, KernelObject::Thread(_)) {
            self.thread_list.write().retain(|entry| *entry != uid);
            self.ready_queue.write().retain(|entry| *entry != uid);
            self.current.retain(|_, running| *running != uid);
        }
        debug!("Destroyed {} {:#x}", object.object_type(), uid);
        Ok(())
    }

    /// Run a closure against a thread's shared state.
    pub fn with_thread<R>(&self, uid: Uid, f: impl FnOnce(&Thread) -> R) -> KernelResult<R> {
        let entry = self
            .objects
            .get(&uid)
            .ok_or(KernelError::InvalidHandle(uid))?;
        let thread = entry.as_thread().ok_or(KernelError::WrongObjectType {
            uid,
            expected: ObjectType::Thread,
        })?;
        Ok(f(thread))
    }

    /// Run a closure against a thread's exclusive state.
    pub fn with_thread_mut<R>(
        &self,
        uid: Uid,
        f: impl FnOnce(&mut Thread) -> R,
    ) -> KernelResult<R> {
        let mut entry = self
            .objects
            .get_mut(&uid)
            .ok_or(KernelError::InvalidHandle(uid))?;
        let thread = entry.as_thread_mut().ok_or(KernelError::WrongObjectType {
            uid,
            expected: ObjectType::Thread,
        })?;
        Ok(f(thread))
    }

    /// Transition a `Stagnant` thread to `Ready`: allocate its stack and TLS
    /// block, build the initial register context, and enqueue it.
    pub fn start_thread(&self, uid: Uid) -> KernelResult<()> {
        let (name, entry_point, stack_size) = self.with_thread(uid, |thread| {
            (
                thread.name.clone(),
                thread.entry_point,
                thread.stack_size,
            )
        })?;
        let status = self.with_thread(uid, |thread| thread.status)?;
        if status != ThreadStatus::Stagnant {
            error!("Cannot start thread {:#x} from state {:?}", uid, status);
            return Err(KernelError::InvalidState { uid, status });
        }

        let stack_top = self.memory.allocate_stack(stack_size, &name)?;
        let tls_base = self.memory.allocate_tls(&name)?;

        self.with_thread_mut(uid, |thread| {
            thread.stack_base = stack_top - thread.stack_size;
            thread.tls_base = tls_base;
            thread.context = crate::cpu::RegisterContext::default();
            thread.context.reg[REG_SP] = stack_top;
            thread.context.reg[REG_LR] = 0;
            thread.context.reg[crate::cpu::REG_PC] = entry_point & !1;
            if entry_point & 1 != 0 {
                thread.context.cpsr |= CPSR_THUMB;
            }
            thread.status = ThreadStatus::Ready;
        })?;
        self.ready_queue.write().push_back(uid);
        info!(
            "Started thread {} (uid {:#x}, sp {:#x}, tls {:#x})",
            name, uid, stack_top, tls_base
        );
        Ok(())
    }

    /// Address of a TLS slot for a started thread. Keys run from 0 through
    /// the maximum inclusive; each slot is one word.
    pub fn get_tls_address(&self, uid: Uid, key: u32) -> KernelResult<Addr> {
        if key > TLS_KEY_MAX {
            error!("TLS key {:#x} out of range for thread {:#x}", key, uid);
            return Err(KernelError::TlsKeyOutOfRange(key));
        }
        let tls_base = self.with_thread(uid, |thread| thread.tls_base)?;
        Ok(tls_base + key * 4)
    }

    /// Thread currently bound to a core, if any.
    pub fn current_thread(&self, core: CoreId) -> Option<Uid> {
        self.current.get(&core).map(|entry| *entry)
    }

    pub(crate) fn set_current(&self, core: CoreId, uid: Uid) {
        self.current.insert(core, uid);
    }

    /// Pop the next runnable thread. When the queue is empty it is rebuilt
    /// from every `Ready` thread, in creation order.
    pub(crate) fn fetch_ready_thread(&self) -> Option<Uid> {
        let mut queue = self.ready_queue.write();
        if queue.is_empty() {
            for uid in self.thread_list.read().iter() {
                let ready = self
                    .objects
                    .get(uid)
                    .and_then(|entry| entry.as_thread().map(|t| t.status == ThreadStatus::Ready))
                    .unwrap_or(false);
                if ready {
                    queue.push_back(*uid);
                }
            }
        }
        while let Some(uid) = queue.pop_front() {
            if self.objects.contains_key(&uid) {
                return Some(uid);
            }
        }
        None
    }

    pub fn thread_count(&self) -> usize {
        self.thread_list.read().len()
    }

    pub fn thread_list(&self) -> Vec<Uid> {
        self.thread_list.read().clone()
    }
}

impl Clone for Kernel {
    fn clone(&self) -> Self {
        Self {
            memory: self.memory.clone(),
            objects: self.objects.clone(),
            next_uid: self.next_uid.clone(),
            thread_list: self.thread_list.clone(),
            ready_queue: self.ready_queue.clone(),
            current: self.current.clone(),
        }
    }
}
