//! Custom Resource Definitions for the Replication Group Operator
//!
//! - ReplicationGroup: a selector over PersistentVolumeClaims plus the
//!   aggregate state derived from them

pub mod replication_group;

pub use replication_group::*;
