//! Partition Module Tests
//!
//! ## Test Scopes
//! - **Bulk load**: validation and overwrite behaviour.
//! - **Partitioning**: rows grouped by owning fragment.
//! - **Distribution**: role guard and per-node results.
//! - **Stats**: the node's view of topology, data and outbox.

#[cfg(test)]
mod tests {
    use crate::partition::types::{BulkInsertRequest, BulkInsertResponse};
    use crate::replication::protocol::ENDPOINT_BULK_INSERT;
    use crate::replication::transport::LoopbackTransport;
    use crate::server::{Node, NodeOptions};
    use crate::storage::types::{SeedRow, UserPatch, UserRow, utc_now};
    use crate::topology::router::RoutingPolicy;
    use crate::topology::types::{NodeId, NodeRef, NodeRole, Topology};
    use axum::Json;
    use axum::http::StatusCode;
    use axum::routing::post;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // Port 9 (discard) is expected to refuse connections.
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    fn node(local: &str) -> Node {
        node_with_odd_fragment_at(local, UNREACHABLE)
    }

    fn node_with_odd_fragment_at(local: &str, odd_address: &str) -> Node {
        let nodes = vec![
            NodeRef::new("node1", NodeRole::Central, UNREACHABLE),
            NodeRef::new("node2", NodeRole::Fragment, UNREACHABLE),
            NodeRef::new("node3", NodeRole::Fragment, odd_address),
        ];
        let options = NodeOptions {
            routing: RoutingPolicy::Parity {
                even_node: NodeId::from("node2"),
                odd_node: NodeId::from("node3"),
            },
            delivery_timeout: Duration::from_millis(300),
            delivery_attempts: 1,
            ..NodeOptions::default()
        };
        let topology = Arc::new(Topology::new(&NodeId::from(local), nodes).unwrap());
        Node::build(topology, &options, LoopbackTransport::new()).unwrap()
    }

    fn seed(user_id: i64, username: &str) -> SeedRow {
        SeedRow {
            user_id,
            fields: UserPatch {
                username: Some(Some(username.to_string())),
                ..UserPatch::default()
            },
            updated_at: None,
        }
    }

    // ============================================================
    // BULK LOAD
    // ============================================================

    #[tokio::test]
    async fn test_bulk_load_inserts_and_overwrites() {
        // ARRANGE
        let node = node("node1");

        // ACT
        let first = node
            .sync
            .bulk_load(vec![seed(1, "a"), seed(2, "b")])
            .await
            .unwrap();
        let second = node.sync.bulk_load(vec![seed(2, "bb")]).await.unwrap();

        // ASSERT
        assert_eq!((first, second), (2, 1));
        assert_eq!(node.store.user_count(), 2);
        assert_eq!(node.store.get_user(2).unwrap().username.as_deref(), Some("bb"));
        // Bulk loading never produces replication traffic.
        assert_eq!(node.outbox.counts().pending, 0);
    }

    #[tokio::test]
    async fn test_bulk_load_validation() {
        let node = node("node2");

        assert_eq!(node.sync.bulk_load(Vec::new()).await.unwrap(), 0);
        let err = node
            .sync
            .bulk_load(vec![seed(4, "ok"), seed(-1, "bad")])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "validation_error");
        assert_eq!(node.store.user_count(), 0);
    }

    #[tokio::test]
    async fn test_seed_timestamp_is_kept_when_given() {
        let node = node("node1");
        let stamp = utc_now() - chrono::Duration::days(1);
        let mut row = seed(5, "old");
        row.updated_at = Some(stamp);

        node.sync.bulk_load(vec![row]).await.unwrap();

        assert_eq!(node.store.get_user(5).unwrap().updated_at, stamp);
    }

    // ============================================================
    // PARTITIONING AND DISTRIBUTION
    // ============================================================

    #[tokio::test]
    async fn test_partition_rows_by_parity() {
        let node = node("node1");
        let now = utc_now();
        let rows: Vec<UserRow> = (1..=5).map(|k| UserRow::empty(k, now)).collect();

        let partitions = node.sync.partition_rows(rows);

        let keys = |id: &str| -> Vec<i64> {
            partitions[&NodeId::from(id)]
                .iter()
                .map(|r| r.user_id)
                .collect()
        };
        assert_eq!(keys("node2"), vec![2, 4]);
        assert_eq!(keys("node3"), vec![1, 3, 5]);
        assert!(!partitions.contains_key(&NodeId::from("node1")));
    }

    #[tokio::test]
    async fn test_distribute_is_central_only() {
        let fragment = node("node3");

        let err = fragment.sync.distribute().await.unwrap_err();

        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_distribute_with_no_rows() {
        let central = node("node1");

        let results = central.sync.distribute().await.unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_distribute_reports_unreachable_fragment() {
        // ARRANGE: only odd keys, so node2 has nothing to receive
        let central = node("node1");
        central
            .sync
            .bulk_load(vec![seed(1, "x"), seed(3, "y")])
            .await
            .unwrap();

        // ACT
        let results = central.sync.distribute().await.unwrap();

        // ASSERT
        assert_eq!(results.len(), 2);
        let even = results.iter().find(|r| r.node_id.as_str() == "node2").unwrap();
        let odd = results.iter().find(|r| r.node_id.as_str() == "node3").unwrap();
        assert!(even.success);
        assert_eq!(even.records_count, 0);
        assert!(!odd.success);
        assert_eq!(odd.records_count, 2);
        assert!(odd.error.is_some());
    }

    #[tokio::test]
    async fn test_distribute_counts_only_delivered_chunks() {
        // ARRANGE: a fragment that accepts the first chunk and refuses the rest
        let calls = Arc::new(AtomicUsize::new(0));
        let app = axum::Router::new().route(
            ENDPOINT_BULK_INSERT,
            post({
                let calls = calls.clone();
                move |Json(request): Json<BulkInsertRequest>| {
                    let calls = calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            Ok(Json(BulkInsertResponse {
                                count: request.users.len(),
                            }))
                        } else {
                            Err(StatusCode::SERVICE_UNAVAILABLE)
                        }
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let central = node_with_odd_fragment_at("node1", &address);
        let odd_keys: Vec<SeedRow> = (0..1001).map(|i| seed(2 * i + 1, "odd")).collect();
        central.sync.bulk_load(odd_keys).await.unwrap();

        // ACT
        let results = central.sync.distribute().await.unwrap();

        // ASSERT
        let odd = results.iter().find(|r| r.node_id.as_str() == "node3").unwrap();
        assert!(!odd.success);
        assert_eq!(odd.records_count, 1000);
        assert!(odd.error.as_deref().unwrap().contains("503"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    // ============================================================
    // STATS
    // ============================================================

    #[tokio::test]
    async fn test_stats_describe_node() {
        let node = node("node2");
        node.sync.bulk_load(vec![seed(2, "z")]).await.unwrap();

        let stats = node.sync.stats();

        assert_eq!(stats.node.as_str(), "node2");
        assert_eq!(stats.role, NodeRole::Fragment);
        assert_eq!(stats.central_node.id.as_str(), "node1");
        assert_eq!(stats.fragment_nodes.len(), 2);
        assert_eq!(stats.local_rows, 1);
        assert_eq!(stats.applied_incoming, 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["centralNode"]["role"], "CENTRAL");
        assert!(json["routing"].as_str().unwrap().contains("node2"));
    }
}
