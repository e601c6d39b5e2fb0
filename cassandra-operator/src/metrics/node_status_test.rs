use crate::metrics::gatherer::ClusterStatus;
use crate::metrics::node_status::{node_statuses, NodeStatus};

fn ips(ips: &[&str]) -> Vec<String> {
    ips.iter().map(|ip| ip.to_string()).collect()
}

#[test]
fn live_and_unreachable_nodes() {
    let nodes = node_statuses(&ClusterStatus {
        live_nodes: ips(&["10.0.0.1"]),
        unreachable_nodes: ips(&["10.0.0.2"]),
        ..Default::default()
    });
    let live = nodes["10.0.0.1"];
    assert!(live.up && !live.down, "expected a live node to be up, got {:?}", live);
    assert_eq!((live.liveness_label(), live.state_label()), ("up", "normal"));
    let unreachable = nodes["10.0.0.2"];
    assert!(unreachable.down && !unreachable.up, "unexpected liveness, got {:?}", unreachable);
    assert_eq!((unreachable.liveness_label(), unreachable.state_label()), ("down", "normal"));
}

#[test]
fn ring_states_are_exclusive() {
    let nodes = node_statuses(&ClusterStatus {
        live_nodes: ips(&["10.0.0.1"]),
        leaving_nodes: ips(&["10.0.0.1"]),
        moving_nodes: ips(&["10.0.0.1"]),
        joining_nodes: ips(&["10.0.0.1"]),
        ..Default::default()
    });
    let node = nodes["10.0.0.1"];
    assert!(node.joining && !node.leaving && !node.moving, "expected joining to win, got {:?}", node);
    assert_eq!(node.state_label(), "joining");
}

#[test]
fn node_in_state_set_only_reports_down() {
    let nodes = node_statuses(&ClusterStatus {
        moving_nodes: ips(&["10.0.0.3"]),
        ..Default::default()
    });
    let node = nodes["10.0.0.3"];
    assert!(!node.up && !node.down, "expected unspecified liveness, got {:?}", node);
    assert_eq!((node.liveness_label(), node.state_label()), ("down", "moving"));
}

#[test]
fn inapplicable_label_pairs_exclude_own_pair() {
    let node = NodeStatus {
        up: true,
        leaving: true,
        ..Default::default()
    };
    let pairs: Vec<_> = node.inapplicable_label_pairs().collect();
    assert_eq!(pairs.len(), 7, "unexpected number of label pairs, got {}, expected 7", pairs.len());
    assert!(!pairs.contains(&("up", "leaving")), "expected the node's own pair to be excluded");
}
