//! HTTP Cluster Tests
//!
//! Three nodes served by axum on ephemeral ports, talking to each other over
//! real HTTP. node1 is CENTRAL, node2 owns even keys, node3 owns odd keys.

use distributed_store::replication::transport::{HttpTransport, PeerClient};
use distributed_store::server::{Node, NodeOptions};
use distributed_store::topology::router::RoutingPolicy;
use distributed_store::topology::types::{NodeId, NodeRef, NodeRole, Topology};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const IDS: [&str; 3] = ["node1", "node2", "node3"];

struct Addresses {
    listeners: Vec<Option<TcpListener>>,
    urls: Vec<String>,
}

async fn reserve() -> Addresses {
    let mut listeners = Vec::new();
    let mut urls = Vec::new();
    for _ in IDS {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        urls.push(format!("http://{}", listener.local_addr().unwrap()));
        listeners.push(Some(listener));
    }
    Addresses { listeners, urls }
}

fn topology(local: &str, urls: &[String]) -> Arc<Topology> {
    let nodes = IDS
        .iter()
        .zip(urls)
        .map(|(id, url)| {
            let role = if *id == "node1" {
                NodeRole::Central
            } else {
                NodeRole::Fragment
            };
            NodeRef::new(*id, role, url.clone())
        })
        .collect();
    Arc::new(Topology::new(&NodeId::from(local), nodes).unwrap())
}

/// Builds the node at `index` and serves it on `listener`.
fn serve(index: usize, urls: &[String], listener: TcpListener) -> Node {
    let options = NodeOptions {
        routing: RoutingPolicy::Parity {
            even_node: NodeId::from("node2"),
            odd_node: NodeId::from("node3"),
        },
        delivery_timeout: Duration::from_millis(500),
        delivery_attempts: 1,
        ..NodeOptions::default()
    };
    let transport = Arc::new(HttpTransport::new(PeerClient::new(
        options.delivery_timeout,
        options.delivery_attempts,
    )));
    let node = Node::build(topology(IDS[index], urls), &options, transport).unwrap();

    let app = node.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    node
}

fn start_all(addresses: &mut Addresses) -> Vec<Node> {
    (0..IDS.len())
        .map(|i| {
            let listener = addresses.listeners[i].take().unwrap();
            serve(i, &addresses.urls, listener)
        })
        .collect()
}

async fn get(client: &reqwest::Client, url: String) -> (u16, Value) {
    let response = client.get(url).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
    let response = client.post(url).json(&body).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn wait_for_user(client: &reqwest::Client, base: &str, key: i64) -> Value {
    for _ in 0..100 {
        let (status, body) = get(client, format!("{}/users/{}", base, key)).await;
        if status == 200 {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("user {} never reached {}", key, base);
}

// ============================================================
// END-TO-END REPLICATION
// ============================================================

#[tokio::test]
async fn test_writes_replicate_in_both_directions() {
    // ARRANGE
    let mut addresses = reserve().await;
    let _nodes = start_all(&mut addresses);
    let urls = &addresses.urls;
    let client = reqwest::Client::new();

    // ACT: CENTRAL writes an odd key, node2 writes an even key
    let (status, down) = post(
        &client,
        format!("{}/txn/insert-auto", urls[0]),
        json!({ "city": "Vigo", "isolation": "SERIALIZABLE" }),
    )
    .await;
    assert_eq!(status, 200);
    let (status, up) = post(
        &client,
        format!("{}/txn/insert-auto", urls[1]),
        json!({ "username": "marta" }),
    )
    .await;
    assert_eq!(status, 200);

    // ASSERT
    let down_key = down["userId"].as_i64().unwrap();
    let up_key = up["userId"].as_i64().unwrap();
    assert_eq!(down_key % 2, 1);
    assert_eq!(up_key % 2, 0);
    assert_eq!(down["isolation"], "SERIALIZABLE");
    assert_eq!(down["outbox"]["targetNode"], "node3");

    let on_fragment = wait_for_user(&client, &urls[2], down_key).await;
    assert_eq!(on_fragment["city"], "Vigo");
    assert_eq!(on_fragment["updatedAt"], down["after"]["updatedAt"]);
    let on_central = wait_for_user(&client, &urls[0], up_key).await;
    assert_eq!(on_central["username"], "marta");

    let (status, _) = get(&client, format!("{}/users/{}", urls[1], down_key)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_scripted_update_reaches_owner() {
    let mut addresses = reserve().await;
    let _nodes = start_all(&mut addresses);
    let urls = &addresses.urls;
    let client = reqwest::Client::new();
    post(
        &client,
        format!("{}/partition/bulk-insert", urls[0]),
        json!({ "users": [{ "user_id": 12, "city": "Ulm" }] }),
    )
    .await;

    let (status, trace) = post(
        &client,
        format!("{}/txn/scripted", urls[0]),
        json!({
            "isolation": "READ COMMITTED",
            "userId": 12,
            "steps": [
                { "type": "READ" },
                { "type": "UPDATE", "data": { "city": "Ingolstadt" } }
            ]
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(trace["steps"][1]["label"], "UPDATE_1");
    let owner = wait_for_user(&client, &urls[1], 12).await;
    assert_eq!(owner["city"], "Ingolstadt");
}

// ============================================================
// RECOVERY
// ============================================================

#[tokio::test]
async fn test_recovery_after_fragment_restart() {
    // ARRANGE: node3 is down (its port is released, so connections are refused)
    let mut addresses = reserve().await;
    let node3_listener = addresses.listeners[2].take().unwrap();
    let node3_addr = node3_listener.local_addr().unwrap();
    drop(node3_listener);
    let urls = addresses.urls.clone();
    let _central = serve(0, &urls, addresses.listeners[0].take().unwrap());
    let _even = serve(1, &urls, addresses.listeners[1].take().unwrap());
    let client = reqwest::Client::new();

    let (status, trace) = post(
        &client,
        format!("{}/txn/scripted", urls[0]),
        json!({
            "userId": 21,
            "steps": [{ "type": "INSERT", "data": { "city": "Trondheim" } }],
            "simulateReplicationFailure": true
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(trace["delivery"], "skipped");

    // ACT: sweep while node3 is down
    let (_, down) = post(&client, format!("{}/recovery/run", urls[0]), json!({})).await;

    // ASSERT
    assert_eq!(down["attempted"], 1);
    assert_eq!(down["failed"], 1);
    assert_eq!(down["details"][0]["status"], "PENDING");

    // ACT: node3 comes back on the same address
    let listener = TcpListener::bind(node3_addr).await.unwrap();
    let _odd = serve(2, &urls, listener);
    let (_, up) = post(&client, format!("{}/recovery/run?limit=10", urls[0]), json!({})).await;

    // ASSERT
    assert_eq!(up["succeeded"], 1);
    assert_eq!(up["details"][0]["appliedOnTarget"], true);
    let (status, row) = get(&client, format!("{}/users/21", urls[2])).await;
    assert_eq!(status, 200);
    assert_eq!(row["city"], "Trondheim");

    let (_, pending) = get(&client, format!("{}/outbox?status=PENDING", urls[0])).await;
    assert!(pending.as_array().unwrap().is_empty());
}

// ============================================================
// PARTITIONING
// ============================================================

#[tokio::test]
async fn test_distribute_seeds_fragments() {
    let mut addresses = reserve().await;
    let _nodes = start_all(&mut addresses);
    let urls = &addresses.urls;
    let client = reqwest::Client::new();

    let users: Vec<Value> = (1..=5)
        .map(|k| json!({ "user_id": k, "username": format!("user{}", k) }))
        .collect();
    let (_, loaded) = post(
        &client,
        format!("{}/partition/bulk-insert", urls[0]),
        json!({ "users": users }),
    )
    .await;
    assert_eq!(loaded["count"], 5);

    let (status, results) = post(&client, format!("{}/partition/distribute", urls[0]), json!({})).await;

    assert_eq!(status, 200);
    assert!(results.as_array().unwrap().iter().all(|r| r["success"] == true));
    let (_, even) = get(&client, format!("{}/partition/stats", urls[1])).await;
    let (_, odd) = get(&client, format!("{}/partition/stats", urls[2])).await;
    assert_eq!(even["localRows"], 2);
    assert_eq!(odd["localRows"], 3);
    assert_eq!(even["outbox"]["pending"], 0);
}

// ============================================================
// ERROR RESPONSES
// ============================================================

#[tokio::test]
async fn test_error_responses() {
    let mut addresses = reserve().await;
    let _nodes = start_all(&mut addresses);
    let urls = &addresses.urls;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        format!("{}/txn/scripted", urls[1]),
        json!({ "userId": 3, "steps": [{ "type": "READ" }] }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = post(&client, format!("{}/partition/distribute", urls[1]), json!({})).await;
    assert_eq!(status, 400);

    let (status, _) = post(&client, format!("{}/recovery/run?limit=0", urls[0]), json!({})).await;
    assert_eq!(status, 400);

    let (status, body) = get(&client, format!("{}/users/77", urls[0])).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "not_found");

    let (status, _) = get(&client, format!("{}/outbox?status=LOST", urls[0])).await;
    assert_eq!(status, 400);

    let (status, health) = get(&client, format!("{}/health", urls[2])).await;
    assert_eq!(status, 200);
    assert_eq!(health["role"], "FRAGMENT");
}
