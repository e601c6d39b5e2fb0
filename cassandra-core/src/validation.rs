//! Structural validation of Cassandra objects, and compatibility validation of updates.
//!
//! Both are used by the validating admissions webhook, and again by the operator before any
//! Kubernetes object is derived from a cluster definition.

use std::str::FromStr;

use crate::crd::{Cassandra, CassandraCRD, Probe, Rack};
use crate::error::AppError;
use crate::quantity::ParsedQuantity;

impl CassandraCRD {
    /// Validate the structure of this object, returning every violation found.
    ///
    /// Validation is performed against a defaulted copy of this object, so unset optional fields
    /// never produce violations.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let cluster = self.with_defaults();
        let mut errs = vec![];
        validate_racks(&cluster, &mut errs);
        validate_pod_resources(&cluster, &mut errs);
        validate_probes(&cluster, &mut errs);
        validate_snapshot(&cluster, &mut errs);
        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs)
        }
    }

    /// Validate that this object, as an update of the given old object, only changes fields
    /// which may be changed after creation.
    pub fn validate_compatibility(&self, old: &Self) -> Result<(), Vec<String>> {
        let errs = forbidden_changes(old, self);
        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs)
        }
    }

    /// Validate the structure of this object, wrapping any violations as an `AppError`.
    pub fn ensure_valid(&self) -> Result<(), AppError> {
        self.validate().map_err(AppError::InvalidSpec)
    }
}

/// Find all changes between the given objects which are forbidden after creation.
///
/// Racks are matched by name. Added or removed racks, and changes of replicas, are not
/// considered here.
pub fn forbidden_changes(old: &Cassandra, new: &Cassandra) -> Vec<String> {
    let mut errs = vec![];
    if old.datacenter() != new.datacenter() {
        errs.push(format!("changing dc is forbidden. The dc used will continue to be '{}'", old.datacenter()));
    }
    if old.cassandra_image() != new.cassandra_image() {
        errs.push(format!(
            "changing image is forbidden. The image used will continue to be '{}'",
            old.cassandra_image()
        ));
    }
    if old.use_empty_dir() != new.use_empty_dir() {
        errs.push(format!(
            "changing useEmptyDir is forbidden. The useEmptyDir used will continue to be '{}'",
            old.use_empty_dir()
        ));
    }
    for old_rack in old.spec.racks.iter() {
        let new_rack = match new.spec.racks.iter().find(|rack| rack.name == old_rack.name) {
            Some(new_rack) => new_rack,
            None => continue,
        };
        if new_rack.storage_class != old_rack.storage_class {
            errs.push(format!(
                "changing storageClass for rack '{}' is forbidden. The storageClass used will continue to be '{}'",
                old_rack.name, old_rack.storage_class
            ));
        }
        if new_rack.zone != old_rack.zone {
            errs.push(format!(
                "changing zone for rack '{}' is forbidden. The zone used will continue to be '{}'",
                old_rack.name, old_rack.zone
            ));
        }
    }
    errs
}

/// Check if the given schedule is a valid cron expression, in the 5 field format used by
/// Kubernetes cron jobs or as one of the `@` descriptors.
pub fn is_cron_expression(schedule: &str) -> bool {
    let schedule = schedule.trim();
    if schedule.starts_with('@') {
        return cron::Schedule::from_str(schedule).is_ok();
    }
    let fields: Vec<_> = schedule.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    // The parser expects a leading seconds field, and counts days of the week from 1 (Sunday).
    let dow: String = fields[4]
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(d) if d <= 7 => std::char::from_digit(d % 7 + 1, 10).unwrap_or(c),
            _ => c,
        })
        .collect();
    let expression = format!("0 {} {} {} {} {}", fields[0], fields[1], fields[2], fields[3], dow);
    cron::Schedule::from_str(&expression).is_ok()
}

fn validate_racks(cluster: &Cassandra, errs: &mut Vec<String>) {
    let qn = cluster.qualified_name();
    if cluster.spec.racks.is_empty() {
        errs.push(format!("spec.racks: no racks specified for cluster: {}", qn));
        return;
    }
    for (idx, rack) in cluster.spec.racks.iter().enumerate() {
        let path = format!("spec.racks[{}]", idx);
        if rack.name.is_empty() {
            errs.push(format!("{}.name: rack name must not be empty for Cassandra cluster definition: {}", path, qn));
        } else if cluster.spec.racks[..idx].iter().any(|other: &Rack| other.name == rack.name) {
            errs.push(format!(
                "{}.name: duplicate rack name '{}' for Cassandra cluster definition: {}",
                path, rack.name, qn
            ));
        }
        if rack.replicas < 1 {
            errs.push(format!(
                "{}.replicas: invalid rack replicas value {} provided for Cassandra cluster definition: {}",
                path, rack.replicas, qn
            ));
        }
        if cluster.use_empty_dir() {
            continue;
        }
        if rack.storage_class.is_empty() {
            errs.push(format!(
                "{}.storageClass: rack named '{}' with no storage class specified, either set useEmptyDir to true or specify storage class: {}",
                path, rack.name, qn
            ));
        }
        if rack.zone.is_empty() {
            errs.push(format!(
                "{}.zone: rack named '{}' with no zone specified, either set useEmptyDir to true or specify zone: {}",
                path, rack.name, qn
            ));
        }
    }
}

fn validate_pod_resources(cluster: &Cassandra, errs: &mut Vec<String>) {
    let qn = cluster.qualified_name();
    let pod = &cluster.spec.pod;
    let parse = |field: &str, value: &str, errs: &mut Vec<String>| match ParsedQuantity::parse(value) {
        Ok(quantity) => Some(quantity),
        Err(err) => {
            errs.push(format!("spec.pod.{}: {} for Cassandra cluster definition: {}", field, err, qn));
            None
        }
    };

    if let Some(memory) = parse("memory", &pod.memory, errs) {
        if memory.is_zero() {
            errs.push(format!("spec.pod.memory: no podMemory property provided for Cassandra cluster definition: {}", qn));
        }
    }
    parse("cpu", &pod.cpu, errs);
    if let Some(storage_size) = parse("storageSize", &pod.storage_size, errs) {
        match (cluster.use_empty_dir(), storage_size.is_zero()) {
            (true, false) => errs.push(format!(
                "spec.pod.storageSize: podStorageSize property provided when useEmptyDir is true for Cassandra cluster definition: {}",
                qn
            )),
            (false, true) => errs.push(format!(
                "spec.pod.storageSize: no podStorageSize property provided and useEmptyDir false for Cassandra cluster definition: {}",
                qn
            )),
            _ => (),
        }
    }
}

fn validate_probes(cluster: &Cassandra, errs: &mut Vec<String>) {
    let qn = cluster.qualified_name();
    let liveness = cluster.liveness_probe();
    if liveness.success_threshold != 1 {
        errs.push(format!(
            "spec.pod.livenessProbe.successThreshold: invalid success threshold for liveness probe, must be set to 1 for Cassandra cluster definition: {}",
            qn
        ));
    }
    validate_probe("liveness", &liveness, &qn, errs);
    validate_probe("readiness", &cluster.readiness_probe(), &qn, errs);
}

fn validate_probe(name: &str, probe: &Probe, qn: &str, errs: &mut Vec<String>) {
    let checks = [
        ("failureThreshold", "failure threshold", probe.failure_threshold, 1),
        ("initialDelaySeconds", "initial delay", probe.initial_delay_seconds, 0),
        ("periodSeconds", "period seconds", probe.period_seconds, 1),
        ("successThreshold", "success threshold", probe.success_threshold, 1),
        ("timeoutSeconds", "timeout seconds", probe.timeout_seconds, 1),
    ];
    for (field, desc, value, min) in checks {
        if value < min {
            errs.push(format!(
                "spec.pod.{}Probe.{}: invalid {} for {} probe, must be {} or greater, got {} for Cassandra cluster definition: {}",
                name, field, desc, name, min, value, qn
            ));
        }
    }
}

fn validate_snapshot(cluster: &Cassandra, errs: &mut Vec<String>) {
    let snapshot = match &cluster.spec.snapshot {
        Some(snapshot) => snapshot,
        None => return,
    };
    let qn = cluster.qualified_name();
    if snapshot.schedule.trim().is_empty() {
        errs.push(format!(
            "spec.snapshot.schedule: no snapshot schedule property provided for Cassandra cluster definition: {}",
            qn
        ));
    } else if !is_cron_expression(&snapshot.schedule) {
        errs.push(format!(
            "spec.snapshot.schedule: invalid snapshot schedule, must be a cron expression but got '{}' for Cassandra cluster definition: {}",
            snapshot.schedule, qn
        ));
    }
    if let Some(timeout) = snapshot.timeout_seconds.filter(|val| *val < 0) {
        errs.push(format!(
            "spec.snapshot.timeoutSeconds: invalid snapshot timeoutSeconds value {}, must be non-negative for Cassandra cluster definition: {}",
            timeout, qn
        ));
    }

    let policy = match &snapshot.retention_policy {
        Some(policy) => policy,
        None => return,
    };
    if let Some(days) = policy.retention_period_days.filter(|val| *val < 0) {
        errs.push(format!(
            "spec.snapshot.retentionPolicy.retentionPeriodDays: invalid snapshot retention policy retentionPeriodDays value {}, must be non-negative for Cassandra cluster definition: {}",
            days, qn
        ));
    }
    if let Some(timeout) = policy.cleanup_timeout_seconds.filter(|val| *val < 0) {
        errs.push(format!(
            "spec.snapshot.retentionPolicy.cleanupTimeoutSeconds: invalid snapshot retention policy cleanupTimeoutSeconds value {}, must be non-negative for Cassandra cluster definition: {}",
            timeout, qn
        ));
    }
    if policy.enabled && policy.cleanup_schedule.trim().is_empty() {
        errs.push(format!(
            "spec.snapshot.retentionPolicy.cleanupSchedule: no snapshot cleanup schedule property provided for Cassandra cluster definition: {}",
            qn
        ));
    } else if !policy.cleanup_schedule.is_empty() && !is_cron_expression(&policy.cleanup_schedule) {
        errs.push(format!(
            "spec.snapshot.retentionPolicy.cleanupSchedule: invalid snapshot cleanup schedule, must be a cron expression but got '{}' for Cassandra cluster definition: {}",
            policy.cleanup_schedule, qn
        ));
    }
}
