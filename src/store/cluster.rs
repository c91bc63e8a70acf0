//! Kubernetes-backed object store
//!
//! Reads go through the API server; a 404 becomes `Ok(None)` and any other
//! failure becomes a transient `StoreUnavailable`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use tracing::debug;

use crate::crd::{ReplicationGroup, ReplicationGroupStatus};
use crate::domain::ports::{ObjectStore, ReconcileKey, StatusWriter};
use crate::error::{Error, Result};
use crate::selector::Selector;

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "replication-group-operator";

/// Object store over a live cluster
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_group(&self, namespace: &str, name: &str) -> Result<Option<ReplicationGroup>> {
        let api: Api<ReplicationGroup> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| Error::store("get group", e))
    }

    async fn list_groups(&self, namespace: &str) -> Result<Vec<ReplicationGroup>> {
        let api: Api<ReplicationGroup> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::store("list groups", e))?;
        Ok(list.items)
    }

    async fn list_claims(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }
        debug!(namespace, selector = %selector, "listing claims");

        let list = api
            .list(&params)
            .await
            .map_err(|e| Error::store("list claims", e))?;
        Ok(list.items)
    }

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| Error::store("get volume", e))
    }
}

#[async_trait]
impl StatusWriter for KubeStore {
    async fn publish_status(
        &self,
        key: &ReconcileKey,
        status: &ReplicationGroupStatus,
    ) -> Result<()> {
        let api: Api<ReplicationGroup> = Api::namespaced(self.client.clone(), &key.namespace);
        let patch = serde_json::json!({ "status": status });

        // Kept as a kube error so a group deleted mid-pass classifies as not-found
        api.patch_status(&key.name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;

        Ok(())
    }
}
