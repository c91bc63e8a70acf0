//! Domain Ports - Core trait definitions for the replication group operator
//!
//! These traits define the boundaries between the reconcile core and the
//! object store. The core only ever reads; status publication lives behind a
//! separate port that the host controller alone holds.

use crate::crd::{ReplicationGroup, ReplicationGroupStatus};
use crate::error::Result;
use crate::selector::Selector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::runtime::reflector::ObjectRef;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Reconcile Key
// =============================================================================

/// Identity of a group to reconcile
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReconcileKey {
    pub namespace: String,
    pub name: String,
}

impl ReconcileKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<&ReconcileKey> for ObjectRef<ReplicationGroup> {
    fn from(key: &ReconcileKey) -> Self {
        ObjectRef::new(&key.name).within(&key.namespace)
    }
}

impl From<&ObjectRef<ReplicationGroup>> for ReconcileKey {
    fn from(obj: &ObjectRef<ReplicationGroup>) -> Self {
        ReconcileKey::new(obj.namespace.clone().unwrap_or_default(), obj.name.clone())
    }
}

// =============================================================================
// Object Store Port
// =============================================================================

/// Read-only access to groups, claims and volumes
///
/// Not-found is reported as `Ok(None)`; any other failure is a transient
/// `Error::StoreUnavailable`. Listings may lag behind concurrent writes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get a group by namespace and name
    async fn get_group(&self, namespace: &str, name: &str) -> Result<Option<ReplicationGroup>>;

    /// List every group in a namespace
    async fn list_groups(&self, namespace: &str) -> Result<Vec<ReplicationGroup>>;

    /// List the claims in a namespace that satisfy a selector
    async fn list_claims(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<PersistentVolumeClaim>>;

    /// Get a cluster-scoped volume by name
    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>>;
}

// =============================================================================
// Status Writer Port
// =============================================================================

/// Publishes derived status back onto a group
#[async_trait]
pub trait StatusWriter: Send + Sync {
    async fn publish_status(&self, key: &ReconcileKey, status: &ReplicationGroupStatus)
        -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ObjectStoreRef = Arc<dyn ObjectStore>;
pub type StatusWriterRef = Arc<dyn StatusWriter>;
