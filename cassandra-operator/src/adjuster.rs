//! Planning of the changes needed to move a cluster from one definition to another.
//!
//! Each change targets a single rack. Changes are planned in a fixed order: added racks, then
//! deleted racks, then scaled down racks, then updated racks.

use std::fmt;

use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::json;

use crate::cluster::{Cluster, BOOTSTRAPPER_CONTAINER_NAME, CASSANDRA_CONTAINER_NAME, SIDECAR_CONTAINER_NAME};
use cassandra_core::crd::{Cassandra, Rack};
use cassandra_core::hash::config_map_hash;
use cassandra_core::validation::forbidden_changes;
use cassandra_core::{AppError, CONFIG_HASH_ANNOTATION};

/// The kind of a planned change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeType {
    AddRack,
    DeleteRack,
    ScaleDownRack,
    UpdateRack,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AddRack => "add rack",
            Self::DeleteRack => "delete rack",
            Self::ScaleDownRack => "scale down rack",
            Self::UpdateRack => "update rack",
        })
    }
}

/// A change to a single rack of a cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterChange {
    /// The rack as it is defined after the change, or before it for deleted racks.
    pub rack: Rack,
    pub change_type: ChangeType,
    /// The strategic merge patch to apply to the rack's stateful set, if any.
    pub patch: Option<serde_json::Value>,
    /// The number of nodes removed by a scale down.
    pub nodes_to_scale_down: i32,
}

impl ClusterChange {
    fn new(rack: Rack, change_type: ChangeType, patch: Option<serde_json::Value>) -> Self {
        Self {
            rack,
            change_type,
            patch,
            nodes_to_scale_down: 0,
        }
    }
}

/// Plan the changes needed to move a cluster from the old definition to the new one.
///
/// Both definitions are expected to have defaults applied. Fails with the first forbidden
/// change found, in which case no change is planned.
pub fn changes_for_cluster(old: &Cassandra, new: &Cassandra) -> Result<Vec<ClusterChange>, AppError> {
    if let Some(forbidden) = forbidden_changes(old, new).into_iter().next() {
        return Err(AppError::ForbiddenChange(forbidden));
    }
    let target = Cluster::new(new)?;

    let mut matched = vec![];
    let mut removed = vec![];
    for old_rack in old.spec.racks.iter() {
        match new.spec.racks.iter().find(|rack| rack.name == old_rack.name) {
            Some(new_rack) => matched.push((old_rack, new_rack)),
            None => removed.push(old_rack),
        }
    }
    let added = new.spec.racks.iter().filter(|new_rack| !old.spec.racks.iter().any(|rack| rack.name == new_rack.name));

    let mut changes: Vec<_> = added.map(|rack| ClusterChange::new(rack.clone(), ChangeType::AddRack, None)).collect();
    changes.extend(removed.into_iter().map(|rack| ClusterChange::new(rack.clone(), ChangeType::DeleteRack, None)));
    changes.extend(matched.iter().filter(|(old, new)| new.replicas < old.replicas).map(|(old, new)| ClusterChange {
        nodes_to_scale_down: old.replicas - new.replicas,
        ..ClusterChange::new((*new).clone(), ChangeType::ScaleDownRack, Some(json!({"spec": {"replicas": new.replicas}})))
    }));

    let pod_spec_changed = pod_spec_has_changed(old, new);
    changes.extend(
        matched
            .iter()
            .filter(|(old, new)| pod_spec_changed || new.replicas > old.replicas)
            .map(|(_, new)| ClusterChange::new((*new).clone(), ChangeType::UpdateRack, Some(rack_patch(&target, new)))),
    );

    Ok(changes)
}

/// The change restarting the given rack's pods for a new version of its custom config map.
///
/// Only the config hash annotation of the pod template is patched.
pub fn change_for_config_map(rack: &Rack, cm: Option<&ConfigMap>) -> ClusterChange {
    let patch = json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": {CONFIG_HASH_ANNOTATION: config_map_hash(cm)}
                }
            }
        }
    });
    ClusterChange::new(rack.clone(), ChangeType::UpdateRack, Some(patch))
}

fn pod_spec_has_changed(old: &Cassandra, new: &Cassandra) -> bool {
    old.spec.pod.cpu != new.spec.pod.cpu
        || old.spec.pod.memory != new.spec.pod.memory
        || old.liveness_probe() != new.liveness_probe()
        || old.readiness_probe() != new.readiness_probe()
        || old.bootstrapper_image() != new.bootstrapper_image()
}

/// The patch carrying the replicas of the given rack, and the parts of the pod spec which may
/// change after creation.
fn rack_patch(cluster: &Cluster, rack: &Rack) -> serde_json::Value {
    let resources = cluster.resource_requirements();
    let env: Vec<_> = cluster
        .bootstrapper_env(rack)
        .into_iter()
        .filter(|env| env.name == "POD_CPU_MILLICORES" || env.name == "POD_MEMORY_BYTES")
        .collect();
    json!({
        "spec": {
            "replicas": rack.replicas,
            "template": {
                "spec": {
                    "initContainers": [{
                        "name": BOOTSTRAPPER_CONTAINER_NAME,
                        "image": cluster.definition().bootstrapper_image(),
                        "env": env,
                        "resources": resources,
                    }],
                    "containers": [
                        {
                            "name": CASSANDRA_CONTAINER_NAME,
                            "livenessProbe": cluster.liveness_probe(),
                            "readinessProbe": cluster.readiness_probe(),
                            "resources": resources,
                        },
                        {
                            "name": SIDECAR_CONTAINER_NAME,
                            "resources": cluster.sidecar_resource_requirements(),
                        },
                    ],
                }
            }
        }
    })
}
