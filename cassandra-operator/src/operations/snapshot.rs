//! Scheduling of snapshot and snapshot cleanup cron jobs.

use anyhow::{Context, Result};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::Container;

use super::OperationContext;
use crate::cluster::Cluster;
use crate::k8s::events::{
    EventType, SNAPSHOT_CLEANUP_MODIFICATION, SNAPSHOT_CLEANUP_SCHEDULE, SNAPSHOT_CLEANUP_UNSCHEDULE, SNAPSHOT_CREATION_MODIFICATION,
    SNAPSHOT_CREATION_SCHEDULE, SNAPSHOT_CREATION_UNSCHEDULE,
};
use cassandra_core::crd::{Cassandra, RequiredMetadata};

#[tracing::instrument(level = "debug", skip(ctx, def), fields(cluster = %def.qualified_name()))]
pub(super) async fn add_snapshot(ctx: &OperationContext, def: &Cassandra) -> Result<()> {
    let cluster = Cluster::new(def).context("unable to create cluster")?;
    let job = match cluster.build_snapshot_job() {
        Some(job) => job,
        None => return Ok(()),
    };
    ctx.accessor.create_cronjob(job).await.context("error creating snapshot cronjob")?;
    ctx.recorder.record(
        def,
        EventType::Normal,
        SNAPSHOT_CREATION_SCHEDULE,
        format!("Snapshot creation scheduled for cluster {}", def.qualified_name()),
    );
    Ok(())
}

#[tracing::instrument(level = "debug", skip(ctx, def), fields(cluster = %def.qualified_name()))]
pub(super) async fn update_snapshot(ctx: &OperationContext, def: &Cassandra) -> Result<()> {
    let cluster = Cluster::new(def).context("unable to create cluster")?;
    let snapshot = match cluster.definition().spec.snapshot.as_ref() {
        Some(snapshot) => snapshot,
        None => return Ok(()),
    };
    let container = cluster.snapshot_container(snapshot);
    let updated = update_cronjob(ctx, def, &def.snapshot_job_name(), &snapshot.schedule, container).await?;
    if updated {
        ctx.recorder.record(
            def,
            EventType::Normal,
            SNAPSHOT_CREATION_MODIFICATION,
            format!("Snapshot creation modified for cluster {}", def.qualified_name()),
        );
    }
    Ok(())
}

#[tracing::instrument(level = "debug", skip(ctx, def), fields(cluster = %def.qualified_name()))]
pub(super) async fn delete_snapshot(ctx: &OperationContext, def: &Cassandra) -> Result<()> {
    if delete_cronjob(ctx, def, &def.snapshot_job_name()).await? {
        ctx.recorder.record(
            def,
            EventType::Normal,
            SNAPSHOT_CREATION_UNSCHEDULE,
            format!("Snapshot creation unscheduled for cluster {}", def.qualified_name()),
        );
    }
    Ok(())
}

#[tracing::instrument(level = "debug", skip(ctx, def), fields(cluster = %def.qualified_name()))]
pub(super) async fn add_snapshot_cleanup(ctx: &OperationContext, def: &Cassandra) -> Result<()> {
    let cluster = Cluster::new(def).context("unable to create cluster")?;
    let job = match cluster.build_snapshot_cleanup_job() {
        Some(job) => job,
        None => return Ok(()),
    };
    ctx.accessor.create_cronjob(job).await.context("error creating snapshot cleanup cronjob")?;
    ctx.recorder.record(
        def,
        EventType::Normal,
        SNAPSHOT_CLEANUP_SCHEDULE,
        format!("Snapshot cleanup scheduled for cluster {}", def.qualified_name()),
    );
    Ok(())
}

#[tracing::instrument(level = "debug", skip(ctx, def), fields(cluster = %def.qualified_name()))]
pub(super) async fn update_snapshot_cleanup(ctx: &OperationContext, def: &Cassandra) -> Result<()> {
    let cluster = Cluster::new(def).context("unable to create cluster")?;
    let snapshot = match cluster.definition().spec.snapshot.as_ref() {
        Some(snapshot) => snapshot,
        None => return Ok(()),
    };
    let schedule = match snapshot.retention_policy.as_ref() {
        Some(policy) => policy.cleanup_schedule.clone(),
        None => return Ok(()),
    };
    let container = cluster.snapshot_cleanup_container(snapshot);
    let updated = update_cronjob(ctx, def, &def.snapshot_cleanup_job_name(), &schedule, container).await?;
    if updated {
        ctx.recorder.record(
            def,
            EventType::Normal,
            SNAPSHOT_CLEANUP_MODIFICATION,
            format!("Snapshot cleanup modified for cluster {}", def.qualified_name()),
        );
    }
    Ok(())
}

#[tracing::instrument(level = "debug", skip(ctx, def), fields(cluster = %def.qualified_name()))]
pub(super) async fn delete_snapshot_cleanup(ctx: &OperationContext, def: &Cassandra) -> Result<()> {
    if delete_cronjob(ctx, def, &def.snapshot_cleanup_job_name()).await? {
        ctx.recorder.record(
            def,
            EventType::Normal,
            SNAPSHOT_CLEANUP_UNSCHEDULE,
            format!("Snapshot cleanup unscheduled for cluster {}", def.qualified_name()),
        );
    }
    Ok(())
}

/// Replace the schedule and the container of the named cron job, returning false if it does
/// not exist.
async fn update_cronjob(ctx: &OperationContext, def: &Cassandra, name: &str, schedule: &str, container: Container) -> Result<bool> {
    let mut job: CronJob = match ctx
        .accessor
        .find_cronjob(def.namespace(), name)
        .await
        .with_context(|| format!("error looking up cronjob {}", name))?
    {
        Some(job) => job,
        None => {
            tracing::warn!(cronjob = name, "no cronjob found to update");
            return Ok(false);
        }
    };
    let spec = job.spec.get_or_insert_with(Default::default);
    spec.schedule = schedule.into();
    let pod_spec = spec
        .job_template
        .spec
        .get_or_insert_with(Default::default)
        .template
        .spec
        .get_or_insert_with(Default::default);
    match pod_spec.containers.first_mut() {
        Some(first) => *first = container,
        None => pod_spec.containers.push(container),
    }
    ctx.accessor
        .update_cronjob(job)
        .await
        .with_context(|| format!("error updating cronjob {}", name))?;
    Ok(true)
}

/// Delete the named cron job, returning false if it does not exist.
async fn delete_cronjob(ctx: &OperationContext, def: &Cassandra, name: &str) -> Result<bool> {
    let job = match ctx
        .accessor
        .find_cronjob(def.namespace(), name)
        .await
        .with_context(|| format!("error looking up cronjob {}", name))?
    {
        Some(job) => job,
        None => return Ok(false),
    };
    ctx.accessor
        .delete_cronjob(&job)
        .await
        .with_context(|| format!("error deleting cronjob {}", name))?;
    Ok(true)
}
