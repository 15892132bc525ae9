//! keyfs-engine: the narrow control boundary to the encryption engine.
//!
//! The engine (the filesystem driver) owns the per-filesystem and per-node
//! key tables; this crate models the six control primitives and ships two
//! backends: an in-process table for tests and embedders, and a synchronous
//! Unix-socket client for a driver control endpoint. Calls are blocking and
//! never retried; a failed call surfaces immediately.

pub mod memory;
pub mod proto;
pub mod table;
#[cfg(unix)]
pub mod uds;

pub use memory::MemoryKeyTable;
pub use table::{KeyTable, Scope};
#[cfg(unix)]
pub use uds::UdsKeyTable;
