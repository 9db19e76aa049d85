/*!
 * Core Module
 * Shared types, limits, and the aggregated error surface
 */

pub mod errors;
pub mod limits;
pub mod logging;
pub mod types;

pub use errors::CoreError;
pub use types::{
    Addr, CoreId, DispatchResult, KernelResult, LoadResult, MemoryResult, Nid, Size, Uid,
};
