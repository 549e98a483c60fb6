//! Broker implementations for the task queue

pub mod memory;
pub mod spool;

pub use memory::MemoryBroker;
pub use spool::SpoolBroker;
