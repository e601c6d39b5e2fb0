use anyhow::Result;
use serde_json::json;

use crate::adjuster::{change_for_config_map, changes_for_cluster, ChangeType, ClusterChange};
use crate::fixtures;
use cassandra_core::hash::config_map_hash;
use cassandra_core::{AppError, CONFIG_HASH_ANNOTATION};

fn change_summary(changes: &[ClusterChange]) -> Vec<(ChangeType, String)> {
    changes.iter().map(|change| (change.change_type, change.rack.name.clone())).collect()
}

#[test]
fn unchanged_definition_plans_nothing() -> Result<()> {
    let old = fixtures::cassandra("c").with_defaults();
    let changes = changes_for_cluster(&old, &old.clone())?;
    assert!(changes.is_empty(), "unexpected changes planned, got {:?}", changes);
    Ok(())
}

#[test]
fn pod_spec_change_updates_every_rack_in_order() -> Result<()> {
    let old = fixtures::cassandra("c").with_defaults();
    let mut new = old.clone();
    new.spec.pod.memory = "2Gi".into();
    new.spec.pod.cpu = "200m".into();

    let changes = changes_for_cluster(&old, &new)?;
    assert_eq!(
        change_summary(&changes),
        vec![(ChangeType::UpdateRack, "a".to_string()), (ChangeType::UpdateRack, "b".to_string())]
    );
    let patch = changes[0].patch.as_ref().expect("expected an update patch");
    assert_eq!(patch.pointer("/spec/replicas"), Some(&json!(1)));
    assert_eq!(
        patch.pointer("/spec/template/spec/containers/0/resources"),
        Some(&json!({"requests": {"cpu": "200m", "memory": "2Gi"}, "limits": {"memory": "2Gi"}}))
    );
    assert_eq!(
        patch.pointer("/spec/template/spec/initContainers/0/env"),
        Some(&json!([
            {"name": "POD_CPU_MILLICORES", "value": "200"},
            {"name": "POD_MEMORY_BYTES", "value": "2147483648"},
        ]))
    );
    Ok(())
}

#[test]
fn probe_change_is_a_pod_spec_change() -> Result<()> {
    let old = fixtures::cassandra("c").with_defaults();
    let mut new = old.clone();
    if let Some(probe) = new.spec.pod.readiness_probe.as_mut() {
        probe.timeout_seconds = 10;
    }

    let changes = changes_for_cluster(&old, &new)?;
    assert_eq!(changes.len(), 2, "unexpected number of changes, got {}, expected 2", changes.len());
    let patch = changes[1].patch.as_ref().expect("expected an update patch");
    assert_eq!(patch.pointer("/spec/template/spec/containers/0/readinessProbe/timeoutSeconds"), Some(&json!(10)));
    assert_eq!(patch.pointer("/spec/template/spec/containers/0/readinessProbe/httpGet/path"), Some(&json!("/ready")));
    Ok(())
}

#[test]
fn scale_up_updates_the_scaled_rack_only() -> Result<()> {
    let old = fixtures::cassandra("c").with_defaults();
    let mut new = old.clone();
    new.spec.racks[1].replicas = 3;

    let changes = changes_for_cluster(&old, &new)?;
    assert_eq!(change_summary(&changes), vec![(ChangeType::UpdateRack, "b".to_string())]);
    assert_eq!(changes[0].patch.as_ref().and_then(|patch| patch.pointer("/spec/replicas")), Some(&json!(3)));
    Ok(())
}

#[test]
fn scale_up_with_pod_spec_change_updates_each_rack_once() -> Result<()> {
    let old = fixtures::cassandra("c").with_defaults();
    let mut new = old.clone();
    new.spec.racks[0].replicas = 4;
    new.spec.pod.memory = "2Gi".into();

    let changes = changes_for_cluster(&old, &new)?;
    let expected = vec![(ChangeType::UpdateRack, "a".to_string()), (ChangeType::UpdateRack, "b".to_string())];
    let got = change_summary(&changes);
    assert_eq!(got, expected, "unexpected changes, got {:?}, expected {:?}", got, expected);
    let replicas = changes[0].patch.as_ref().and_then(|patch| patch.pointer("/spec/replicas"));
    assert_eq!(replicas, Some(&json!(4)), "unexpected replicas in patch, got {:?}, expected 4", replicas);
    let memory = changes[0].patch.as_ref().and_then(|patch| patch.pointer("/spec/template/spec/containers/0/resources/limits/memory"));
    assert_eq!(memory, Some(&json!("2Gi")), "unexpected memory limit in patch, got {:?}, expected 2Gi", memory);
    Ok(())
}

#[test]
fn scale_down_is_planned_with_node_count() -> Result<()> {
    let mut old = fixtures::cassandra("c").with_defaults();
    old.spec.racks[0].replicas = 3;
    let mut new = old.clone();
    new.spec.racks[0].replicas = 1;

    let changes = changes_for_cluster(&old, &new)?;
    assert_eq!(change_summary(&changes), vec![(ChangeType::ScaleDownRack, "a".to_string())]);
    assert_eq!(changes[0].nodes_to_scale_down, 2);
    assert_eq!(changes[0].patch, Some(json!({"spec": {"replicas": 1}})));
    Ok(())
}

#[test]
fn changes_are_ordered_by_kind() -> Result<()> {
    let mut old = fixtures::cassandra("c").with_defaults();
    old.spec.racks = vec![fixtures::rack("a", 2), fixtures::rack("b", 1)];
    let mut new = old.clone();
    new.spec.racks = vec![fixtures::rack("a", 1), fixtures::rack("c", 1)];
    new.spec.pod.cpu = "200m".into();

    let changes = changes_for_cluster(&old, &new)?;
    assert_eq!(
        change_summary(&changes),
        vec![
            (ChangeType::AddRack, "c".to_string()),
            (ChangeType::DeleteRack, "b".to_string()),
            (ChangeType::ScaleDownRack, "a".to_string()),
            (ChangeType::UpdateRack, "a".to_string()),
        ]
    );
    assert!(changes[0].patch.is_none(), "expected no patch for an added rack");
    assert!(changes[1].patch.is_none(), "expected no patch for a deleted rack");
    Ok(())
}

#[test]
fn forbidden_changes_are_rejected() {
    let old = fixtures::cassandra("c").with_defaults();

    let mut new = old.clone();
    new.spec.racks[0].zone = "elsewhere".into();
    assert!(
        matches!(changes_for_cluster(&old, &new), Err(AppError::ForbiddenChange(msg)) if msg.contains("zone for rack 'a'")),
        "expected a zone change to be rejected"
    );

    let mut new = old.clone();
    new.spec.racks[1].storage_class = "fast".into();
    new.spec.pod.memory = "2Gi".into();
    assert!(
        matches!(changes_for_cluster(&old, &new), Err(AppError::ForbiddenChange(msg)) if msg.contains("storageClass for rack 'b'")),
        "expected a storage class change to be rejected"
    );
}

#[test]
fn config_map_change_patches_the_hash_annotation() {
    let cm = fixtures::config_map("c-config", &[("jvm.options", "-Xmx1G")]);
    let rack = fixtures::rack("a", 1);
    let change = change_for_config_map(&rack, Some(&cm));

    assert_eq!(change.change_type, ChangeType::UpdateRack);
    assert_eq!(change.rack, rack);
    let expected = json!({"spec": {"template": {"metadata": {"annotations": {CONFIG_HASH_ANNOTATION: config_map_hash(Some(&cm))}}}}});
    assert_eq!(change.patch, Some(expected));
}

#[test]
fn change_type_display() {
    let names: Vec<_> = [ChangeType::AddRack, ChangeType::DeleteRack, ChangeType::ScaleDownRack, ChangeType::UpdateRack]
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(names, vec!["add rack", "delete rack", "scale down rack", "update rack"]);
}
