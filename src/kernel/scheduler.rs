/*!
 * Cooperative Scheduler
 * Round-robin quantum stepping over ready threads
 */

use std::sync::Arc;

use log::warn;
use tracing::debug;

use crate::core::limits::quantum_instructions;
use crate::core::types::Uid;
use crate::cpu::{Processor, QuantumExit, REG_CPSR};
use crate::hle::Dispatcher;

use super::{Kernel, ThreadStatus};

/// What a single scheduling step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No thread was runnable
    Idle,
    /// A thread ran for a quantum and was requeued
    Ran { uid: Uid },
    /// A thread's core halted (stop request or unrecoverable trap)
    Halted { uid: Uid },
}

/// Drives one quantum at a time. The caller owns the loop: each `step`
/// picks a ready thread, runs it on an available core, services any
/// supervisor-call trap, and saves the register context back.
pub struct Scheduler {
    kernel: Kernel,
    processor: Arc<dyn Processor>,
    dispatcher: Dispatcher,
}

impl Scheduler {
    pub fn new(kernel: Kernel, processor: Arc<dyn Processor>, dispatcher: Dispatcher) -> Self {
        Self {
            kernel,
            processor,
            dispatcher,
        }
    }

    pub fn step(&self) -> StepOutcome {
        let Some(uid) = self.kernel.fetch_ready_thread() else {
            return StepOutcome::Idle;
        };
        let core = self.processor.available_core();
        self.kernel.set_current(core, uid);

        let mut ctx = match self.kernel.with_thread_mut(uid, |thread| {
            thread.status = ThreadStatus::Running;
            thread.context
        }) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Ready thread {:#x} vanished before running: {}", uid, e);
                return StepOutcome::Idle;
            }
        };

        debug!(uid, core, pc = ctx.pc(), "quantum start");
        let exit = self
            .processor
            .run_quantum(core, &mut ctx, quantum_instructions());

        match exit {
            QuantumExit::Completed => {}
            QuantumExit::Svc { pc } => {
                if self.dispatcher.dispatch(core, pc).is_err() {
                    let _ = self.kernel.with_thread_mut(uid, |thread| {
                        thread.context = ctx;
                    });
                    return StepOutcome::Halted { uid };
                }
                // Handlers write results through live registers; pull the
                // register file back into the saved context.
                for index in 0..16 {
                    ctx.reg[index] = self.processor.read_register(core, index);
                }
                ctx.cpsr = self.processor.read_register(core, REG_CPSR);
            }
            QuantumExit::Halted => {
                let _ = self.kernel.with_thread_mut(uid, |thread| {
                    thread.context = ctx;
                });
                return StepOutcome::Halted { uid };
            }
        }

        let _ = self.kernel.with_thread_mut(uid, |thread| {
            thread.context = ctx;
            if thread.status == ThreadStatus::Running {
                thread.status = ThreadStatus::Ready;
            }
        });
        StepOutcome::Ran { uid }
    }
}

impl Clone for Scheduler {
    fn clone(&self) -> Self {
        Self {
            kernel: self.kernel.clone(),
            processor: self.processor.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}
