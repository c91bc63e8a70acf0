//! Object Store Adapters
//!
//! Implementations of the `ObjectStore` and `StatusWriter` ports.

pub mod fixtures;
mod cluster;
mod memory;

pub use cluster::{KubeStore, FIELD_MANAGER};
pub use memory::{MemoryStore, StoreOp};
