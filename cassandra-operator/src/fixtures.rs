//! Test fixtures shared across the operator's test modules.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, PodStatus, Service};

use crate::cluster::{Cluster, ManagedClusters};
use crate::k8s::accessor::ClusterAccessor;
use crate::k8s::events::{EventRecorder, EventType, WAITING_FOR_STATEFULSET_CHANGE};
use crate::metrics::gatherer::{ClusterStatus, Gatherer};
use crate::metrics::registry::ClusterMetrics;
use crate::operations::OperationContext;
use cassandra_core::crd::{Cassandra, CassandraSpec, Pod as PodSpec, Rack, RetentionPolicy, Snapshot};

/// A two rack cluster definition in namespace `n`, without defaults applied.
pub fn cassandra(name: &str) -> Cassandra {
    let mut cluster = Cassandra::new(
        name,
        CassandraSpec {
            datacenter: None,
            racks: vec![rack("a", 1), rack("b", 1)],
            use_empty_dir: None,
            pod: PodSpec {
                memory: "1Gi".into(),
                cpu: "100m".into(),
                storage_size: "1Gi".into(),
                ..Default::default()
            },
            snapshot: None,
        },
    );
    cluster.metadata.namespace = Some("n".into());
    cluster
}

/// A snapshot taken every night, optionally with an enabled retention policy.
pub fn snapshot(retention: bool) -> Snapshot {
    Snapshot {
        schedule: "01 23 * * *".into(),
        timeout_seconds: Some(30),
        retention_policy: if retention {
            Some(RetentionPolicy {
                enabled: true,
                retention_period_days: Some(10),
                cleanup_schedule: "11 22 1 * *".into(),
                cleanup_timeout_seconds: Some(5),
            })
        } else {
            None
        },
        ..Default::default()
    }
}

pub fn rack(name: &str, replicas: i32) -> Rack {
    Rack {
        name: name.into(),
        zone: format!("zone-{}", name),
        storage_class: format!("sc-{}", name),
        replicas,
    }
}

/// A managed cluster built from `cassandra(name)`.
pub fn cluster(name: &str) -> Result<Cluster> {
    Ok(Cluster::new(&cassandra(name))?)
}

/// A config map in namespace `n` with the given name and data.
pub fn config_map(name: &str, data: &[(&str, &str)]) -> ConfigMap {
    let mut cm = ConfigMap::default();
    cm.metadata.name = Some(name.into());
    cm.metadata.namespace = Some("n".into());
    cm.data = Some(data.iter().map(|(key, val)| (key.to_string(), val.to_string())).collect());
    cm
}

/// A running pod with the given name and IP.
pub fn pod(name: &str, ip: Option<&str>) -> Pod {
    let mut pod = Pod::default();
    pod.metadata.name = Some(name.into());
    pod.metadata.namespace = Some("n".into());
    pod.status = Some(PodStatus {
        pod_ip: ip.map(String::from),
        ..Default::default()
    });
    pod
}

/// The status of a stateful set which has fully rolled out.
pub fn ready_status(replicas: i32, generation: i64) -> StatefulSetStatus {
    StatefulSetStatus {
        observed_generation: Some(generation),
        replicas,
        ready_replicas: Some(replicas),
        current_revision: Some("rev-1".into()),
        update_revision: Some("rev-1".into()),
        ..Default::default()
    }
}

/// An audit event recorded by `FakeRecorder`.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    pub cluster: String,
    pub type_: EventType,
    pub reason: String,
    pub message: String,
}

/// An event recorder which keeps every event in memory.
#[derive(Default)]
pub struct FakeRecorder {
    pub events: Mutex<Vec<RecordedEvent>>,
}

impl FakeRecorder {
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.reason).collect()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// The recorded events, without those of the rolling-change waiter.
    pub fn change_events(&self) -> Vec<RecordedEvent> {
        self.events().into_iter().filter(|event| event.reason != WAITING_FOR_STATEFULSET_CHANGE).collect()
    }
}

impl EventRecorder for FakeRecorder {
    fn record(&self, cluster: &Cassandra, type_: EventType, reason: &str, message: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                cluster: cluster.qualified_name(),
                type_,
                reason: reason.into(),
                message,
            });
        }
    }
}

/// The state of `FakeAccessor`, open for inspection by tests.
#[derive(Default)]
pub struct FakeState {
    pub services: Vec<Service>,
    pub statefulsets: HashMap<String, StatefulSet>,
    pub cronjobs: HashMap<String, CronJob>,
    pub config_maps: HashMap<String, ConfigMap>,
    pub pods: Vec<Pod>,
    /// Every mutating call, in order, as `<verb> <kind> <name>`.
    pub calls: Vec<String>,
    /// Names of stateful sets whose creation, update and patching fails.
    pub failing_statefulsets: Vec<String>,
    /// Set to make listings fail.
    pub failing_lists: bool,
}

/// An in-memory accessor whose stateful sets are always immediately ready.
#[derive(Default)]
pub struct FakeAccessor {
    pub state: Mutex<FakeState>,
}

impl FakeAccessor {
    pub fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        f(&mut state)
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.clone())
    }
}

fn name_of(meta: &kube::api::ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

#[async_trait]
impl ClusterAccessor for FakeAccessor {
    async fn find_existing_resources(&self, cluster: &Cluster) -> Vec<String> {
        self.with_state(|state| {
            let mut found = vec![];
            found.extend(
                state
                    .services
                    .iter()
                    .filter(|svc| svc.metadata.name.as_deref() == Some(cluster.name()))
                    .map(|svc| format!("service:{}", name_of(&svc.metadata))),
            );
            let mut sts_names: Vec<_> = state
                .statefulsets
                .keys()
                .filter(|name| name.starts_with(&format!("{}-", cluster.name())))
                .cloned()
                .collect();
            sts_names.sort();
            found.extend(sts_names.into_iter().map(|name| format!("statefulset:{}", name)));
            found
        })
    }

    async fn find_custom_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let key = format!("{}.{}", namespace, name);
        Ok(self.with_state(|state| state.config_maps.get(&key).cloned()))
    }

    async fn create_service(&self, service: Service) -> Result<Service> {
        self.with_state(|state| {
            state.calls.push(format!("create service {}", name_of(&service.metadata)));
            state.services.push(service.clone());
        });
        Ok(service)
    }

    async fn delete_service(&self, _namespace: &str, name: &str) -> Result<()> {
        self.with_state(|state| {
            state.calls.push(format!("delete service {}", name));
            state.services.retain(|svc| svc.metadata.name.as_deref() != Some(name));
        });
        Ok(())
    }

    async fn get_statefulset(&self, _namespace: &str, name: &str) -> Result<StatefulSet> {
        match self.with_state(|state| state.statefulsets.get(name).cloned()) {
            Some(sts) => Ok(sts),
            None => bail!("statefulset {} not found", name),
        }
    }

    async fn create_statefulset(&self, mut sts: StatefulSet) -> Result<StatefulSet> {
        let name = name_of(&sts.metadata);
        self.with_state(|state| {
            if state.failing_statefulsets.contains(&name) {
                bail!("error creating statefulset {}", name);
            }
            state.calls.push(format!("create statefulset {}", name));
            sts.metadata.generation = Some(1);
            let replicas = sts.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1);
            sts.status = Some(ready_status(replicas, 1));
            state.statefulsets.insert(name, sts.clone());
            Ok(sts)
        })
    }

    async fn update_statefulset(&self, mut sts: StatefulSet) -> Result<StatefulSet> {
        let name = name_of(&sts.metadata);
        self.with_state(|state| {
            if state.failing_statefulsets.contains(&name) {
                bail!("error updating statefulset {}", name);
            }
            state.calls.push(format!("update statefulset {}", name));
            let generation = sts.metadata.generation.unwrap_or(1) + 1;
            sts.metadata.generation = Some(generation);
            let replicas = sts.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1);
            sts.status = Some(ready_status(replicas, generation));
            state.statefulsets.insert(name, sts.clone());
            Ok(sts)
        })
    }

    async fn patch_statefulset(&self, _namespace: &str, name: &str, patch: &serde_json::Value) -> Result<StatefulSet> {
        self.with_state(|state| {
            if state.failing_statefulsets.iter().any(|failing| failing == name) {
                bail!("error patching statefulset {}", name);
            }
            state.calls.push(format!("patch statefulset {} {}", name, patch));
            let sts = match state.statefulsets.get_mut(name) {
                Some(sts) => sts,
                None => bail!("statefulset {} not found", name),
            };
            let generation = sts.metadata.generation.unwrap_or(1) + 1;
            sts.metadata.generation = Some(generation);
            if let Some(replicas) = patch.pointer("/spec/replicas").and_then(|val| val.as_i64()) {
                sts.spec.get_or_insert_with(Default::default).replicas = Some(replicas as i32);
            }
            let replicas = sts.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1);
            sts.status = Some(ready_status(replicas, generation));
            Ok(sts.clone())
        })
    }

    async fn delete_statefulset(&self, _namespace: &str, name: &str) -> Result<()> {
        self.with_state(|state| {
            state.calls.push(format!("delete statefulset {}", name));
            state.statefulsets.remove(name);
        });
        Ok(())
    }

    async fn find_cronjob(&self, _namespace: &str, app: &str) -> Result<Option<CronJob>> {
        Ok(self.with_state(|state| state.cronjobs.get(app).cloned()))
    }

    async fn create_cronjob(&self, job: CronJob) -> Result<CronJob> {
        self.with_state(|state| {
            let name = name_of(&job.metadata);
            state.calls.push(format!("create cronjob {}", name));
            state.cronjobs.insert(name, job.clone());
        });
        Ok(job)
    }

    async fn update_cronjob(&self, job: CronJob) -> Result<CronJob> {
        self.with_state(|state| {
            let name = name_of(&job.metadata);
            state.calls.push(format!("update cronjob {}", name));
            state.cronjobs.insert(name, job.clone());
        });
        Ok(job)
    }

    async fn delete_cronjob(&self, job: &CronJob) -> Result<()> {
        self.with_state(|state| {
            let name = name_of(&job.metadata);
            state.calls.push(format!("delete cronjob {}", name));
            state.cronjobs.remove(&name);
        });
        Ok(())
    }

    async fn list_pods(&self, _namespace: &str, _app: &str) -> Result<Vec<Pod>> {
        self.with_state(|state| {
            if state.failing_lists {
                bail!("error listing pods");
            }
            Ok(state.pods.clone())
        })
    }
}

/// A gatherer returning a fixed status, or failing when none is set.
#[derive(Default)]
pub struct FakeGatherer {
    pub status: Mutex<Option<ClusterStatus>>,
}

impl FakeGatherer {
    pub fn new(status: ClusterStatus) -> Self {
        Self {
            status: Mutex::new(Some(status)),
        }
    }
}

#[async_trait]
impl Gatherer for FakeGatherer {
    async fn gather_metrics(&self, cluster: &Cluster) -> Result<ClusterStatus> {
        match self.status.lock().ok().and_then(|status| status.clone()) {
            Some(status) => Ok(status),
            None => bail!("no metrics available for cluster {}", cluster.qualified_name()),
        }
    }
}

/// Shared handles to a set of fakes.
pub struct Fakes {
    pub accessor: Arc<FakeAccessor>,
    pub recorder: Arc<FakeRecorder>,
    pub gatherer: Arc<FakeGatherer>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            accessor: Arc::new(FakeAccessor::default()),
            recorder: Arc::new(FakeRecorder::default()),
            gatherer: Arc::new(FakeGatherer::default()),
        }
    }
}

impl Fakes {
    /// An operation context over these fakes and the given cluster table.
    pub fn context(&self, clusters: ManagedClusters) -> Result<OperationContext> {
        Ok(OperationContext::new(
            clusters,
            self.accessor.clone(),
            self.recorder.clone(),
            self.gatherer.clone(),
            Arc::new(ClusterMetrics::new()?),
        ))
    }
}
