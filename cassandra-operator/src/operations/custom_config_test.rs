use std::sync::Arc;

use anyhow::{Context, Result};

use super::*;
use crate::fixtures::{self, Fakes};
use crate::k8s::events::CLUSTER_UPDATE;
use cassandra_core::hash::config_map_hash;
use cassandra_core::CONFIG_HASH_ANNOTATION;

fn config_hash(fakes: &Fakes, sts_name: &str) -> Option<String> {
    fakes.accessor.with_state(|state| {
        state
            .statefulsets
            .get(sts_name)
            .and_then(|sts| sts.spec.as_ref())
            .and_then(|spec| spec.template.metadata.as_ref())
            .and_then(|meta| meta.annotations.as_ref())
            .and_then(|annotations| annotations.get(CONFIG_HASH_ANNOTATION).cloned())
    })
}

/// Add cluster `n.c`, then forget the calls it made.
async fn managed(fakes: &Fakes, ctx: &OperationContext) -> Result<Cluster> {
    Operation::AddCluster(Arc::new(fixtures::cassandra("c"))).execute(ctx).await;
    fakes.accessor.with_state(|state| state.calls.clear());
    ctx.clusters.get("n.c").context("expected cluster n.c to be managed")
}

#[tokio::test(start_paused = true)]
async fn add_custom_config_updates_every_rack() -> Result<()> {
    let fakes = Fakes::default();
    let ctx = fakes.context(ManagedClusters::new())?;
    let cluster = managed(&fakes, &ctx).await?;
    let cm = Arc::new(fixtures::config_map("c-config", &[("cassandra.yaml", "x: 1")]));

    Operation::AddCustomConfig(cluster, cm.clone()).execute(&ctx).await;

    let calls = fakes.accessor.calls();
    let expected = vec!["update statefulset c-a", "update statefulset c-b"];
    assert_eq!(calls, expected, "unexpected calls, got {:?}, expected {:?}", calls, expected);
    let hash = config_hash(&fakes, "c-b");
    let expected_hash = config_map_hash(Some(cm.as_ref()));
    assert_eq!(hash.as_deref(), Some(expected_hash.as_str()), "unexpected config hash, got {:?}, expected {}", hash, expected_hash);
    let events = fakes.recorder.change_events();
    assert_eq!(events.len(), 1, "unexpected events, got {:?}", events);
    assert_eq!(events[0].reason, CLUSTER_UPDATE);
    assert_eq!(events[0].message, "Custom config created for cluster n.c");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn update_custom_config_patches_the_config_hash() -> Result<()> {
    let fakes = Fakes::default();
    let ctx = fakes.context(ManagedClusters::new())?;
    let cluster = managed(&fakes, &ctx).await?;
    let cm = Arc::new(fixtures::config_map("c-config", &[("cassandra.yaml", "x: 2")]));

    Operation::UpdateCustomConfig(cluster, cm.clone()).execute(&ctx).await;

    let calls = fakes.accessor.calls();
    assert_eq!(calls.len(), 2, "unexpected calls, got {:?}", calls);
    let expected_hash = config_map_hash(Some(cm.as_ref()));
    for (call, sts) in calls.iter().zip(["c-a", "c-b"]) {
        assert!(call.starts_with(&format!("patch statefulset {} ", sts)), "unexpected call, got {}", call);
        assert!(call.contains(&expected_hash), "expected the patch to carry the config hash, got {}", call);
    }
    let events = fakes.recorder.change_events();
    assert_eq!(events.len(), 1, "unexpected events, got {:?}", events);
    assert_eq!(events[0].message, "Custom config updated for cluster n.c");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn delete_custom_config_removes_the_config_hash() -> Result<()> {
    let fakes = Fakes::default();
    let ctx = fakes.context(ManagedClusters::new())?;
    let cluster = managed(&fakes, &ctx).await?;
    let cm = Arc::new(fixtures::config_map("c-config", &[("cassandra.yaml", "x: 1")]));
    Operation::AddCustomConfig(cluster.clone(), cm.clone()).execute(&ctx).await;
    fakes.accessor.with_state(|state| state.calls.clear());

    Operation::DeleteCustomConfig(cluster, cm).execute(&ctx).await;

    let calls = fakes.accessor.calls();
    let expected = vec!["update statefulset c-a", "update statefulset c-b"];
    assert_eq!(calls, expected, "unexpected calls, got {:?}, expected {:?}", calls, expected);
    assert!(config_hash(&fakes, "c-a").is_none(), "expected the config hash to be removed");
    let messages: Vec<_> = fakes.recorder.change_events().into_iter().map(|event| event.message).collect();
    assert_eq!(messages.last().map(String::as_str), Some("Custom config deleted for cluster n.c"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn custom_config_failure_stops_at_the_failing_rack() -> Result<()> {
    let fakes = Fakes::default();
    let ctx = fakes.context(ManagedClusters::new())?;
    let cluster = managed(&fakes, &ctx).await?;
    fakes.accessor.with_state(|state| state.failing_statefulsets.push("c-a".into()));
    let cm = Arc::new(fixtures::config_map("c-config", &[("cassandra.yaml", "x: 1")]));

    Operation::AddCustomConfig(cluster, cm).execute(&ctx).await;

    let calls = fakes.accessor.calls();
    assert!(calls.is_empty(), "expected no rack to be updated, got {:?}", calls);
    Ok(())
}
