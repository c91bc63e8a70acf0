//! In-memory object store
//!
//! DashMap-backed store with the same not-found and failure semantics as the
//! cluster store. Listings come back in insertion order. Failures can be
//! injected per operation to exercise retry paths.

use async_trait::async_trait;
use dashmap::DashMap;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::ResourceExt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::crd::{ReplicationGroup, ReplicationGroupStatus};
use crate::domain::ports::{ObjectStore, ReconcileKey, StatusWriter};
use crate::error::{Error, Result};
use crate::selector::Selector;

/// Store operation, used for fault injection and call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetGroup,
    ListGroups,
    ListClaims,
    GetVolume,
    PublishStatus,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreOp::GetGroup => write!(f, "get group"),
            StoreOp::ListGroups => write!(f, "list groups"),
            StoreOp::ListClaims => write!(f, "list claims"),
            StoreOp::GetVolume => write!(f, "get volume"),
            StoreOp::PublishStatus => write!(f, "publish status"),
        }
    }
}

type Sequenced<T> = (u64, T);

/// In-memory store of groups, claims and volumes
#[derive(Default)]
pub struct MemoryStore {
    groups: DashMap<ReconcileKey, Sequenced<ReplicationGroup>>,
    claims: DashMap<(String, String), Sequenced<PersistentVolumeClaim>>,
    volumes: DashMap<String, PersistentVolume>,
    statuses: DashMap<ReconcileKey, ReplicationGroupStatus>,
    failures: DashMap<StoreOp, usize>,
    calls: DashMap<StoreOp, usize>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert or replace a group, keeping its original listing position
    pub fn insert_group(&self, group: ReplicationGroup) {
        let key = group.key();
        let seq = self
            .groups
            .get(&key)
            .map(|entry| entry.0)
            .unwrap_or_else(|| self.next_sequence());
        self.groups.insert(key, (seq, group));
    }

    pub fn remove_group(&self, namespace: &str, name: &str) -> Option<ReplicationGroup> {
        self.groups
            .remove(&ReconcileKey::new(namespace, name))
            .map(|(_, (_, group))| group)
    }

    /// Insert or replace a claim, keeping its original listing position
    pub fn insert_claim(&self, claim: PersistentVolumeClaim) {
        let key = (claim.namespace().unwrap_or_default(), claim.name_any());
        let seq = self
            .claims
            .get(&key)
            .map(|entry| entry.0)
            .unwrap_or_else(|| self.next_sequence());
        self.claims.insert(key, (seq, claim));
    }

    pub fn remove_claim(&self, namespace: &str, name: &str) -> Option<PersistentVolumeClaim> {
        self.claims
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|(_, (_, claim))| claim)
    }

    pub fn insert_volume(&self, volume: PersistentVolume) {
        self.volumes.insert(volume.name_any(), volume);
    }

    pub fn remove_volume(&self, name: &str) -> Option<PersistentVolume> {
        self.volumes.remove(name).map(|(_, volume)| volume)
    }

    /// Make the next `count` calls of `op` fail
    pub fn fail_next(&self, op: StoreOp, count: usize) {
        self.failures.insert(op, count);
    }

    /// Number of calls made for `op`
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    /// Last status published for a group
    pub fn published_status(&self, key: &ReconcileKey) -> Option<ReplicationGroupStatus> {
        self.statuses.get(key).map(|s| s.clone())
    }

    fn enter(&self, op: StoreOp) -> Result<()> {
        *self.calls.entry(op).or_insert(0) += 1;

        if let Some(mut remaining) = self.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::store(op.to_string(), "injected failure"));
            }
        }
        Ok(())
    }
}

fn in_order<T: Clone>(mut items: Vec<Sequenced<T>>) -> Vec<T> {
    items.sort_by_key(|(seq, _)| *seq);
    items.into_iter().map(|(_, item)| item).collect()
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_group(&self, namespace: &str, name: &str) -> Result<Option<ReplicationGroup>> {
        self.enter(StoreOp::GetGroup)?;
        Ok(self
            .groups
            .get(&ReconcileKey::new(namespace, name))
            .map(|entry| entry.1.clone()))
    }

    async fn list_groups(&self, namespace: &str) -> Result<Vec<ReplicationGroup>> {
        self.enter(StoreOp::ListGroups)?;
        let items = self
            .groups
            .iter()
            .filter(|entry| entry.key().namespace == namespace)
            .map(|entry| entry.value().clone())
            .collect();
        Ok(in_order(items))
    }

    async fn list_claims(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        self.enter(StoreOp::ListClaims)?;
        let items = self
            .claims
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .filter(|entry| selector.matches(entry.value().1.labels()))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(in_order(items))
    }

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>> {
        self.enter(StoreOp::GetVolume)?;
        Ok(self.volumes.get(name).map(|v| v.clone()))
    }
}

#[async_trait]
impl StatusWriter for MemoryStore {
    async fn publish_status(
        &self,
        key: &ReconcileKey,
        status: &ReplicationGroupStatus,
    ) -> Result<()> {
        self.enter(StoreOp::PublishStatus)?;
        let mut entry = self
            .groups
            .get_mut(key)
            .ok_or_else(|| Error::not_found("replicationgroups", key))?;
        entry.1.status = Some(status.clone());
        drop(entry);

        self.statuses.insert(key.clone(), status.clone());
        Ok(())
    }
}
