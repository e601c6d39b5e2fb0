use std::sync::Arc;

use anyhow::{Context, Result};
use k8s_openapi::api::batch::v1::CronJob;

use super::*;
use crate::fixtures::{self, Fakes};
use crate::k8s::events::{
    SNAPSHOT_CLEANUP_SCHEDULE, SNAPSHOT_CLEANUP_UNSCHEDULE, SNAPSHOT_CREATION_MODIFICATION, SNAPSHOT_CREATION_SCHEDULE, SNAPSHOT_CREATION_UNSCHEDULE,
};

fn with_snapshot(retention: bool) -> Arc<Cassandra> {
    let mut def = fixtures::cassandra("c");
    def.spec.snapshot = Some(fixtures::snapshot(retention));
    Arc::new(def)
}

fn cronjob(fakes: &Fakes, name: &str) -> Option<CronJob> {
    fakes.accessor.with_state(|state| state.cronjobs.get(name).cloned())
}

fn command(job: &CronJob) -> Result<Vec<String>> {
    job.spec
        .as_ref()
        .and_then(|spec| spec.job_template.spec.as_ref())
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|spec| spec.containers.first())
        .and_then(|container| container.command.clone())
        .context("cronjob has no container command")
}

#[tokio::test]
async fn add_snapshot_with_retention_schedules_both_jobs() -> Result<()> {
    let fakes = Fakes::default();
    let ctx = fakes.context(ManagedClusters::new())?;
    let def = with_snapshot(true);

    Operation::AddSnapshot(def.clone()).execute(&ctx).await;
    Operation::AddSnapshotCleanup(def).execute(&ctx).await;

    let calls = fakes.accessor.calls();
    let expected = vec!["create cronjob c-snapshot", "create cronjob c-snapshot-cleanup"];
    assert_eq!(calls, expected, "unexpected calls, got {:?}, expected {:?}", calls, expected);

    let create = command(&cronjob(&fakes, "c-snapshot").context("expected snapshot cronjob")?)?;
    assert_eq!(&create[..2], ["/cassandra-snapshot", "create"]);
    assert_eq!(&create[create.len() - 2..], ["-t", "30s"]);
    let cleanup = command(&cronjob(&fakes, "c-snapshot-cleanup").context("expected cleanup cronjob")?)?;
    assert_eq!(&cleanup[..2], ["/cassandra-snapshot", "cleanup"]);
    assert_eq!(&cleanup[cleanup.len() - 4..], ["-r", "240h0m0s", "-t", "5s"]);

    let reasons = fakes.recorder.reasons();
    assert_eq!(reasons, vec![SNAPSHOT_CREATION_SCHEDULE, SNAPSHOT_CLEANUP_SCHEDULE]);
    let messages: Vec<_> = fakes.recorder.events().into_iter().map(|event| event.message).collect();
    assert_eq!(messages[0], "Snapshot creation scheduled for cluster n.c");
    assert_eq!(messages[1], "Snapshot cleanup scheduled for cluster n.c");
    Ok(())
}

#[tokio::test]
async fn update_snapshot_replaces_schedule_and_container() -> Result<()> {
    let fakes = Fakes::default();
    let ctx = fakes.context(ManagedClusters::new())?;
    Operation::AddSnapshot(with_snapshot(false)).execute(&ctx).await;

    let mut def = fixtures::cassandra("c");
    let mut snapshot = fixtures::snapshot(false);
    snapshot.schedule = "1 1 * * *".into();
    snapshot.keyspaces = vec!["ks1".into(), "ks2".into()];
    def.spec.snapshot = Some(snapshot);
    Operation::UpdateSnapshot(Arc::new(def)).execute(&ctx).await;

    let job = cronjob(&fakes, "c-snapshot").context("expected snapshot cronjob")?;
    let schedule = job.spec.as_ref().map(|spec| spec.schedule.clone()).unwrap_or_default();
    assert_eq!(schedule, "1 1 * * *", "unexpected schedule, got {}, expected 1 1 * * *", schedule);
    let cmd = command(&job)?;
    assert_eq!(&cmd[cmd.len() - 2..], ["-k", "ks1,ks2"]);
    let reasons = fakes.recorder.reasons();
    assert_eq!(reasons.last().map(String::as_str), Some(SNAPSHOT_CREATION_MODIFICATION));
    Ok(())
}

#[tokio::test]
async fn update_of_missing_snapshot_job_does_nothing() -> Result<()> {
    let fakes = Fakes::default();
    let ctx = fakes.context(ManagedClusters::new())?;

    Operation::UpdateSnapshot(with_snapshot(false)).execute(&ctx).await;

    assert!(fakes.accessor.calls().is_empty(), "expected no calls");
    assert!(fakes.recorder.events().is_empty(), "expected no events");
    Ok(())
}

#[tokio::test]
async fn delete_snapshot_unschedules_existing_jobs_only() -> Result<()> {
    let fakes = Fakes::default();
    let ctx = fakes.context(ManagedClusters::new())?;
    let def = with_snapshot(true);
    Operation::AddSnapshot(def.clone()).execute(&ctx).await;
    fakes.accessor.with_state(|state| state.calls.clear());

    Operation::DeleteSnapshot(def.clone()).execute(&ctx).await;
    Operation::DeleteSnapshotCleanup(def).execute(&ctx).await;

    let calls = fakes.accessor.calls();
    assert_eq!(calls, vec!["delete cronjob c-snapshot"], "unexpected calls, got {:?}", calls);
    let reasons = fakes.recorder.reasons();
    assert_eq!(reasons, vec![SNAPSHOT_CREATION_SCHEDULE, SNAPSHOT_CREATION_UNSCHEDULE]);
    assert!(!reasons.iter().any(|reason| reason == SNAPSHOT_CLEANUP_UNSCHEDULE), "expected no cleanup unschedule event");
    Ok(())
}
