use std::collections::HashSet;
use std::thread;

use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use xds_snapshot_config::{BroadcastPolicy, MetricsConfig, ReopenPolicy};
use xds_snapshot_primitives::discovery::{DeltaDiscoveryRequest, DiscoveryRequest};
use xds_snapshot_primitives::snapshot::type_url;

use super::*;
use crate::callbacks::Callbacks;
use crate::metrics::PrometheusCacheMetrics;
use crate::test_support::{bogus_resources, clusters, init_tracing, RejectingStore};

fn request_from(node_id: &str, group: &str) -> DiscoveryRequest {
    DiscoveryRequest {
        node: Some(Node::new(node_id, group)),
        type_url: type_url::CLUSTER.to_owned(),
        ..DiscoveryRequest::default()
    }
}

fn delta_request_from(node_id: &str, group: &str) -> DeltaDiscoveryRequest {
    DeltaDiscoveryRequest {
        node: Some(Node::new(node_id, group)),
        type_url: type_url::CLUSTER.to_owned(),
        ..DeltaDiscoveryRequest::default()
    }
}

fn config(broadcast: BroadcastPolicy) -> CacheConfig {
    CacheConfig::new(broadcast, ReopenPolicy::default(), MetricsConfig::default())
}

#[test]
fn test_versions_increase_across_groups() {
    let cache = SnapshotCache::new(&CacheConfig::default());

    assert_eq!(cache.generate_snapshot("g1", clusters(&["a"])).unwrap(), "1");
    assert_eq!(cache.generate_snapshot("g2", clusters(&["b"])).unwrap(), "2");
    assert_eq!(cache.generate_snapshot("g1", clusters(&["c"])).unwrap(), "3");

    assert_eq!(cache.group_snapshot("g1").unwrap().version(), &"3");
    assert_eq!(cache.group_snapshot("g2").unwrap().version(), &"2");
}

#[test]
fn test_instances_do_not_share_versions() {
    let first = SnapshotCache::new(&CacheConfig::default());
    let second = SnapshotCache::new(&CacheConfig::default());

    assert_eq!(first.generate_snapshot("g1", clusters(&["a"])).unwrap(), "1");
    assert_eq!(first.generate_snapshot("g1", clusters(&["a"])).unwrap(), "2");
    assert_eq!(second.generate_snapshot("g1", clusters(&["a"])).unwrap(), "1");
}

#[test]
fn test_failed_construction_keeps_previous_snapshot() {
    init_tracing();
    let cache = SnapshotCache::new(&CacheConfig::default());

    let _ = cache.generate_snapshot("g1", clusters(&["a"])).unwrap();
    let err = cache.generate_snapshot("g1", bogus_resources()).unwrap_err();

    assert!(
        matches!(err, CacheError::SnapshotConstruction { ref group, .. } if group == "g1"),
        "unexpected error: {err}"
    );
    let current = cache.group_snapshot("g1").unwrap();
    assert_eq!(current.version(), &"1");
    assert_eq!(
        current
            .resource_names(type_url::CLUSTER)
            .collect::<Vec<_>>(),
        vec!["a"]
    );
}

#[test]
fn test_broadcast_reaches_nodes_on_both_stream_kinds() {
    init_tracing();
    let cache = SnapshotCache::new(&CacheConfig::default());

    cache.on_stream_open(1, "").unwrap();
    cache.on_stream_request(1, &request_from("n1", "g1")).unwrap();
    cache.on_delta_stream_open(2, "").unwrap();
    cache
        .on_stream_delta_request(2, &mut delta_request_from("n2", "g1"))
        .unwrap();
    cache.on_stream_open(3, "").unwrap();
    cache.on_stream_request(3, &request_from("n3", "g2")).unwrap();

    assert_eq!(cache.node_ids("g1"), vec!["n1", "n2"]);

    let version = cache.generate_snapshot("g1", clusters(&["a"])).unwrap();

    assert_eq!(cache.get_snapshot("n1").unwrap().version(), &version);
    assert_eq!(cache.get_snapshot("n2").unwrap().version(), &version);
    assert!(cache.get_snapshot("n3").is_err(), "n3 belongs to g2");
}

#[test]
fn test_generation_is_isolated_per_group() {
    let cache = SnapshotCache::new(&CacheConfig::default());

    cache.on_stream_open(1, "").unwrap();
    cache.on_stream_request(1, &request_from("n1", "g1")).unwrap();
    cache.on_stream_open(2, "").unwrap();
    cache.on_stream_request(2, &request_from("n2", "g2")).unwrap();

    let _ = cache.generate_snapshot("g2", clusters(&["b"])).unwrap();
    let _ = cache.generate_snapshot("g1", clusters(&["a"])).unwrap();
    let _ = cache.generate_snapshot("g1", clusters(&["a2"])).unwrap();

    assert_eq!(cache.group_snapshot("g2").unwrap().version(), &"1");
    assert_eq!(cache.get_snapshot("n2").unwrap().version(), &"1");
    assert_eq!(cache.get_snapshot("n1").unwrap().version(), &"3");
    assert_eq!(cache.lookup_node(StreamKind::StateOfTheWorld, 2).unwrap().group, "g2");
}

#[test]
fn test_fail_fast_broadcast_reports_assignment_failure() {
    let cache = SnapshotCache::with_store(
        &config(BroadcastPolicy::FailFast),
        RejectingStore::rejecting(&["n1"]),
        Arc::new(NoopCacheMetrics),
    );

    cache.on_stream_open(1, "").unwrap();
    cache.on_stream_request(1, &request_from("n1", "g1")).unwrap();

    let err = cache.generate_snapshot("g1", clusters(&["a"])).unwrap_err();

    assert!(
        matches!(err, CacheError::SnapshotAssignment { ref node_id, .. } if node_id == "n1"),
        "unexpected error: {err}"
    );
    assert_eq!(
        cache.group_snapshot("g1").unwrap().version(),
        &"1",
        "the group snapshot is stored before the broadcast"
    );
}

#[test]
fn test_best_effort_broadcast_assigns_remaining_nodes() {
    let cache = SnapshotCache::with_store(
        &config(BroadcastPolicy::BestEffort),
        RejectingStore::rejecting(&["n1"]),
        Arc::new(NoopCacheMetrics),
    );

    for (stream_id, node_id) in [(1, "n1"), (2, "n2"), (3, "n3")] {
        cache.on_stream_open(stream_id, "").unwrap();
        cache
            .on_stream_request(stream_id, &request_from(node_id, "g1"))
            .unwrap();
    }

    let err = cache.generate_snapshot("g1", clusters(&["a"])).unwrap_err();

    assert!(
        matches!(err, CacheError::SnapshotAssignment { ref node_id, .. } if node_id == "n1"),
        "unexpected error: {err}"
    );
    assert_eq!(cache.get_snapshot("n2").unwrap().version(), &"1");
    assert_eq!(cache.get_snapshot("n3").unwrap().version(), &"1");
}

#[test]
fn test_snapshot_outcomes_are_metered() {
    let mut registry = Registry::default();
    let metrics = Arc::new(PrometheusCacheMetrics::new(&mut registry, &[0.1, 1.0]));
    let cache = SnapshotCache::with_store(
        &CacheConfig::default(),
        MemorySnapshotStore::new(),
        metrics,
    );

    cache.on_stream_open(1, "").unwrap();
    cache.on_stream_request(1, &request_from("n1", "g1")).unwrap();
    let _ = cache.generate_snapshot("g1", clusters(&["a"])).unwrap();
    let _ = cache.generate_snapshot("g1", bogus_resources()).unwrap_err();

    let mut buffer = String::new();
    encode(&mut buffer, &registry).unwrap();

    assert!(
        buffer.contains(r#"xds_snapshot_create_total{status="success",reason=""} 1"#),
        "{buffer}"
    );
    assert!(
        buffer.contains(r#"xds_snapshot_create_total{status="failure",reason="error"} 1"#),
        "{buffer}"
    );
    assert!(
        buffer.contains(r#"xds_snapshot_update_total{status="success",reason="",node_id="n1"} 1"#),
        "{buffer}"
    );
}

#[test]
fn test_concurrent_generation_keeps_latest() {
    let cache = SnapshotCache::new(&CacheConfig::default());

    cache.on_stream_open(1, "").unwrap();
    cache.on_stream_request(1, &request_from("n1", "g1")).unwrap();

    let versions: Vec<u64> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let cache = &cache;
                scope.spawn(move || {
                    (0..25)
                        .map(|round| {
                            let name = format!("w{worker}-r{round}");
                            cache
                                .generate_snapshot("g1", clusters(&[name.as_str()]))
                                .unwrap()
                                .as_str()
                                .parse::<u64>()
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    let unique: HashSet<_> = versions.iter().copied().collect();
    assert_eq!(unique.len(), 200, "every generation got its own version");

    let last = versions.iter().copied().max().unwrap().to_string();
    assert_eq!(cache.group_snapshot("g1").unwrap().version(), &last.as_str());
    assert_eq!(cache.get_snapshot("n1").unwrap().version(), &last.as_str());
}
