//! Common test utilities.
//!
//! Shared helpers for the multi-node integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use distributed_store::config::NodeConfig;
use distributed_store::replication::transport::LoopbackTransport;
use distributed_store::server::Node;
use std::sync::Arc;
use std::time::Duration;

/// TOML for one member of the three-node parity cluster.
pub fn cluster_config(local: &str) -> String {
    let role = if local == "node1" { "CENTRAL" } else { "FRAGMENT" };
    let port = match local {
        "node1" => 3001,
        "node2" => 3002,
        _ => 3003,
    };
    let peers: String = [("node1", "CENTRAL", 3001), ("node2", "FRAGMENT", 3002), ("node3", "FRAGMENT", 3003)]
        .iter()
        .filter(|(id, _, _)| *id != local)
        .map(|(id, role, port)| {
            format!(
                "[[peers]]\nid = \"{}\"\nrole = \"{}\"\naddress = \"http://127.0.0.1:{}\"\n\n",
                id, role, port
            )
        })
        .collect();

    format!(
        r#"
[node]
id = "{local}"
role = "{role}"
bind = "127.0.0.1:{port}"

{peers}
[routing]
policy = "parity"
even_node = "node2"
odd_node = "node3"

[recovery]
interval_secs = 0
on_startup = false

[storage]
lock_timeout_ms = 500
"#
    )
}

/// Three in-process nodes wired through one loopback transport.
pub struct LoopbackCluster {
    pub central: Node,
    pub even: Node,
    pub odd: Node,
    pub transport: Arc<LoopbackTransport>,
}

impl LoopbackCluster {
    pub fn start() -> Self {
        let transport = LoopbackTransport::new();
        let build = |id: &str| {
            let config = NodeConfig::from_toml(&cluster_config(id)).unwrap();
            let topology = Arc::new(config.topology().unwrap());
            let options = config.node_options(&topology).unwrap();
            let node = Node::build(topology, &options, transport.clone()).unwrap();
            transport.register(node.engine.clone());
            node
        };

        Self {
            central: build("node1"),
            even: build("node2"),
            odd: build("node3"),
            transport,
        }
    }

    pub fn nodes(&self) -> [&Node; 3] {
        [&self.central, &self.even, &self.odd]
    }
}

/// Polls `check` every 10ms for up to two seconds.
pub async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// True once no node has a retryable outbox entry left.
pub fn quiescent(cluster: &LoopbackCluster) -> bool {
    cluster
        .nodes()
        .iter()
        .all(|node| node.outbox.total_pending() == 0)
}
