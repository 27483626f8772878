//! Identity store implementations.

pub mod memory;

pub use memory::MemoryIdentityStore;
