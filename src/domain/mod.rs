//! Domain layer - Core types and port definitions
//!
//! This module defines the traits (ports) that store adapters implement,
//! following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
