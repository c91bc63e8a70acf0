//! Object builders for tests and benches

use k8s_openapi::api::core::v1::{
    ObjectReference, PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimStatus, PersistentVolumeSpec, PersistentVolumeStatus,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as KubeQuantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::ObjectMeta;
use std::collections::BTreeMap;

use crate::crd::{ReplicationGroup, ReplicationGroupSpec};

fn label_map(labels: &[(&str, &str)]) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn meta(namespace: &str, name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: (!labels.is_empty()).then(|| label_map(labels)),
        ..Default::default()
    }
}

/// Group selecting claims by `matchLabels`
pub fn group(namespace: &str, name: &str, match_labels: &[(&str, &str)]) -> ReplicationGroup {
    group_with_selector(
        namespace,
        name,
        LabelSelector {
            match_labels: Some(label_map(match_labels)),
            match_expressions: None,
        },
    )
}

/// Group with an arbitrary selector
pub fn group_with_selector(namespace: &str, name: &str, selector: LabelSelector) -> ReplicationGroup {
    ReplicationGroup {
        metadata: ObjectMeta {
            generation: Some(1),
            ..meta(namespace, name, &[])
        },
        spec: ReplicationGroupSpec {
            application_name: name.to_string(),
            selector,
            cluster_peers: Vec::new(),
        },
        status: None,
    }
}

/// Claim still waiting for a volume
pub fn claim(namespace: &str, name: &str, labels: &[(&str, &str)]) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(namespace, name, labels),
        spec: Some(PersistentVolumeClaimSpec {
            storage_class_name: Some("standard".to_string()),
            ..Default::default()
        }),
        status: Some(PersistentVolumeClaimStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        }),
    }
}

/// Claim bound to `volume`
pub fn bound_claim(
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
    volume: &str,
) -> PersistentVolumeClaim {
    let mut pvc = claim(namespace, name, labels);
    if let Some(spec) = pvc.spec.as_mut() {
        spec.volume_name = Some(volume.to_string());
    }
    pvc.status = Some(PersistentVolumeClaimStatus {
        phase: Some("Bound".to_string()),
        ..Default::default()
    });
    pvc
}

/// Bound volume of the given capacity pointing back at `namespace/claim`
pub fn volume(name: &str, capacity: &str, namespace: &str, claim: &str) -> PersistentVolume {
    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            capacity: Some(BTreeMap::from([(
                "storage".to_string(),
                KubeQuantity(capacity.to_string()),
            )])),
            claim_ref: Some(ObjectReference {
                namespace: Some(namespace.to_string()),
                name: Some(claim.to_string()),
                ..Default::default()
            }),
            persistent_volume_reclaim_policy: Some("Delete".to_string()),
            ..Default::default()
        }),
        status: Some(PersistentVolumeStatus {
            phase: Some("Bound".to_string()),
            ..Default::default()
        }),
    }
}
