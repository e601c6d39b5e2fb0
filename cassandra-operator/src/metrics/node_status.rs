//! The status of individual Cassandra nodes, derived from a cluster's status.

use std::collections::HashMap;

use crate::metrics::gatherer::ClusterStatus;

/// Every `(liveness, state)` label pair a node may be reported under.
pub const ALL_LABEL_PAIRS: [(&str, &str); 8] = [
    ("up", "normal"),
    ("up", "joining"),
    ("up", "leaving"),
    ("up", "moving"),
    ("down", "normal"),
    ("down", "joining"),
    ("down", "leaving"),
    ("down", "moving"),
];

/// The liveness and ring state of a node.
///
/// Joining, leaving and moving are exclusive. A node seen only in a ring state set has neither
/// liveness flag set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeStatus {
    pub up: bool,
    pub down: bool,
    pub joining: bool,
    pub leaving: bool,
    pub moving: bool,
}

impl NodeStatus {
    pub fn liveness_label(&self) -> &'static str {
        if self.up {
            "up"
        } else {
            "down"
        }
    }

    pub fn state_label(&self) -> &'static str {
        if self.joining {
            "joining"
        } else if self.leaving {
            "leaving"
        } else if self.moving {
            "moving"
        } else {
            "normal"
        }
    }

    /// The label pairs which do not describe this node.
    pub fn inapplicable_label_pairs(&self) -> impl Iterator<Item = (&'static str, &'static str)> {
        let applicable = (self.liveness_label(), self.state_label());
        ALL_LABEL_PAIRS.into_iter().filter(move |pair| *pair != applicable)
    }
}

/// Derive the status of every node mentioned in the given cluster status, keyed by IP.
///
/// Ring states are applied in the order leaving, moving, joining; the last one wins.
pub fn node_statuses(status: &ClusterStatus) -> HashMap<String, NodeStatus> {
    let mut nodes: HashMap<String, NodeStatus> = HashMap::new();
    for ip in status.live_nodes.iter() {
        let node = nodes.entry(ip.clone()).or_default();
        node.up = true;
        node.down = false;
    }
    for ip in status.unreachable_nodes.iter() {
        let node = nodes.entry(ip.clone()).or_default();
        node.up = false;
        node.down = true;
    }
    for ip in status.leaving_nodes.iter() {
        let node = nodes.entry(ip.clone()).or_default();
        node.leaving = true;
        node.joining = false;
        node.moving = false;
    }
    for ip in status.moving_nodes.iter() {
        let node = nodes.entry(ip.clone()).or_default();
        node.moving = true;
        node.joining = false;
        node.leaving = false;
    }
    for ip in status.joining_nodes.iter() {
        let node = nodes.entry(ip.clone()).or_default();
        node.joining = true;
        node.leaving = false;
        node.moving = false;
    }
    nodes
}
