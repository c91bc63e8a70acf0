//! End-to-end routing and reconcile scenarios against the in-memory store

use assert_matches::assert_matches;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use replication_group_operator::reconcile::route_claim;
use replication_group_operator::store::fixtures::{bound_claim, claim, group, volume};
use replication_group_operator::store::{MemoryStore, StoreOp};
use replication_group_operator::{
    Error, GroupAggregate, ObjectStoreRef, ReconcileKey, ReconcileOutcome, Reconciler, Router,
};

fn setup() -> (Arc<MemoryStore>, Router, Reconciler) {
    let store = Arc::new(MemoryStore::new());
    let port: ObjectStoreRef = store.clone();
    (store, Router::new(port.clone()), Reconciler::new(port))
}

async fn aggregate(reconciler: &Reconciler, key: &ReconcileKey) -> GroupAggregate {
    match reconciler.reconcile(key, &CancellationToken::new()).await {
        Ok(ReconcileOutcome::Aggregated(agg)) => agg,
        other => panic!("expected aggregate for {}, got {:?}", key, other),
    }
}

#[tokio::test]
async fn test_single_group_routes_and_aggregates() {
    let (store, router, reconciler) = setup();
    store.insert_group(group("apps", "g1", &[("app", "db")]));
    let c1 = bound_claim("apps", "c1", &[("app", "db")], "v1");
    let c2 = claim("apps", "c2", &[("app", "web")]);
    store.insert_claim(c1.clone());
    store.insert_claim(c2.clone());
    store.insert_volume(volume("v1", "10Gi", "apps", "c1"));

    let g1 = ReconcileKey::new("apps", "g1");
    assert_eq!(router.route(&c1).await.keys, vec![g1.clone()]);
    assert!(router.route(&c2).await.is_empty());

    let agg = aggregate(&reconciler, &g1).await;
    assert_eq!(agg.claim_count, 1);
    assert_eq!(agg.total_capacity.to_string(), "10Gi");
}

#[tokio::test]
async fn test_pending_claim_fails_transiently() {
    let (store, _, reconciler) = setup();
    store.insert_group(group("apps", "g1", &[("app", "db")]));
    store.insert_claim(bound_claim("apps", "c1", &[("app", "db")], "v1"));
    store.insert_claim(claim("apps", "c3", &[("app", "db")]));
    store.insert_volume(volume("v1", "10Gi", "apps", "c1"));

    let err = reconciler
        .reconcile(&ReconcileKey::new("apps", "g1"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_matches!(err, Error::ClaimNotBound { ref claim, unbound: 1, total: 2 } if claim == "apps/c3");
    assert!(err.is_transient());
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_deleted_group_is_a_no_op() {
    let (store, _, reconciler) = setup();
    store.insert_group(group("apps", "g1", &[("app", "db")]));
    store.insert_claim(bound_claim("apps", "c1", &[("app", "db")], "v1"));
    store.remove_group("apps", "g1");

    let outcome = reconciler
        .reconcile(&ReconcileKey::new("apps", "g1"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::GroupDeleted);
    assert_eq!(store.call_count(StoreOp::ListClaims), 0);
}

#[tokio::test]
async fn test_claim_fans_out_to_every_matching_group() {
    let (store, router, reconciler) = setup();
    store.insert_group(group("apps", "g1", &[("app", "db")]));
    store.insert_group(group("apps", "g2", &[("tier", "data")]));
    let c1 = bound_claim("apps", "c1", &[("app", "db"), ("tier", "data")], "v1");
    store.insert_claim(c1.clone());
    store.insert_volume(volume("v1", "5Gi", "apps", "c1"));

    let keys = router.route(&c1).await.keys;
    assert_eq!(
        keys,
        vec![ReconcileKey::new("apps", "g1"), ReconcileKey::new("apps", "g2")]
    );

    for key in &keys {
        let agg = aggregate(&reconciler, key).await;
        assert_eq!(agg.claim_count, 1);
        assert_eq!(agg.total_capacity.to_string(), "5Gi");
    }
}

#[tokio::test]
async fn test_routing_matches_selector_exactly() {
    let groups = vec![
        group("apps", "db", &[("app", "db")]),
        group("apps", "db-prod", &[("app", "db"), ("env", "prod")]),
        group("other", "db", &[("app", "db")]),
    ];
    let claims = [
        (claim("apps", "c1", &[("app", "db")]), vec!["db"]),
        (
            claim("apps", "c2", &[("app", "db"), ("env", "prod")]),
            vec!["db", "db-prod"],
        ),
        (claim("apps", "c3", &[("env", "prod")]), vec![]),
    ];

    for (c, expected) in claims {
        let names: Vec<_> = route_claim(&groups, &c)
            .keys
            .into_iter()
            .inspect(|k| assert_eq!(k.namespace, "apps"))
            .map(|k| k.name)
            .collect();
        assert_eq!(names, expected);
    }
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (store, _, reconciler) = setup();
    store.insert_group(group("apps", "g1", &[("app", "db")]));
    for (name, vol, size) in [("c1", "v1", "10Gi"), ("c2", "v2", "512Mi")] {
        store.insert_claim(bound_claim("apps", name, &[("app", "db")], vol));
        store.insert_volume(volume(vol, size, "apps", name));
    }

    let key = ReconcileKey::new("apps", "g1");
    let first = aggregate(&reconciler, &key).await;
    let second = aggregate(&reconciler, &key).await;
    assert_eq!(first, second);
    assert_eq!(first.total_capacity.to_string(), "10752Mi");
}

#[tokio::test]
async fn test_binding_converges() {
    let (store, _, reconciler) = setup();
    store.insert_group(group("apps", "g1", &[("app", "db")]));
    store.insert_claim(claim("apps", "c1", &[("app", "db")]));
    let key = ReconcileKey::new("apps", "g1");

    let err = reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_matches!(err, Error::ClaimNotBound { .. });

    store.insert_claim(bound_claim("apps", "c1", &[("app", "db")], "v1"));
    store.insert_volume(volume("v1", "1Gi", "apps", "c1"));

    let agg = aggregate(&reconciler, &key).await;
    assert_eq!(agg.bound_volume_count, 1);
}

#[tokio::test]
async fn test_missing_volume_yields_partial_aggregate() {
    let (store, _, reconciler) = setup();
    store.insert_group(group("apps", "g1", &[("app", "db")]));
    for (name, vol) in [("c1", "v1"), ("c2", "v2"), ("c3", "v3")] {
        store.insert_claim(bound_claim("apps", name, &[("app", "db")], vol));
    }
    store.insert_volume(volume("v1", "10Gi", "apps", "c1"));
    store.insert_volume(volume("v3", "10Gi", "apps", "c3"));

    let agg = aggregate(&reconciler, &ReconcileKey::new("apps", "g1")).await;
    assert!(agg.is_partial());
    assert_eq!(agg.claim_count, 3);
    assert_eq!(agg.bound_volume_count, 2);
    assert_eq!(agg.missing_volumes, vec!["v2".to_string()]);
    assert_eq!(agg.total_capacity.to_string(), "20Gi");
}

#[tokio::test]
async fn test_store_outage_aborts_pass() {
    let (store, router, reconciler) = setup();
    store.insert_group(group("apps", "g1", &[("app", "db")]));
    let c1 = bound_claim("apps", "c1", &[("app", "db")], "v1");
    store.insert_claim(c1.clone());
    store.insert_volume(volume("v1", "10Gi", "apps", "c1"));

    store.fail_next(StoreOp::GetVolume, 1);
    let err = reconciler
        .reconcile(&ReconcileKey::new("apps", "g1"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_matches!(err, Error::StoreUnavailable { .. });

    store.fail_next(StoreOp::ListGroups, 1);
    let result = router.route(&c1).await;
    assert!(result.is_empty());
    assert_matches!(result.error, Some(Error::StoreUnavailable { .. }));
}
