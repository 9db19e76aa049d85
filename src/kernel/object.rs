/*!
 * Kernel Objects
 * Tagged object table entries keyed by UID
 */

use std::fmt;

use crate::core::types::Uid;

use super::thread::Thread;

/// Discriminant for object table entries. Grows as more primitive kinds
/// (mutexes, semaphores, event flags) gain real implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Thread,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread => write!(f, "thread"),
        }
    }
}

/// An entry in the kernel object table. Every guest-visible handle maps
/// to exactly one of these.
#[derive(Debug, Clone)]
pub enum KernelObject {
    Thread(Thread),
}

impl KernelObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Thread(_) => ObjectType::Thread,
        }
    }

    pub fn uid(&self) -> Uid {
        match self {
            Self::Thread(thread) => thread.uid,
        }
    }

    pub fn as_thread(&self) -> Option<&Thread> {
        match self {
            Self::Thread(thread) => Some(thread),
        }
    }

    pub fn as_thread_mut(&mut self) -> Option<&mut Thread> {
        match self {
            Self::Thread(thread) => Some(thread),
        }
    }
}
