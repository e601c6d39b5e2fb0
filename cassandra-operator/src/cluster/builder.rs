//! Builders of the Kubernetes objects backing a cluster.
//!
//! Every object is labelled with the operator label valued with the cluster's name, and carries
//! a controller owner reference to the Cassandra object so that Kubernetes garbage collects it
//! along with the cluster. Persistent volume claims created from a stateful set's claim
//! templates carry no owner reference and therefore outlive the cluster.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetUpdateStrategy};
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource, ExecAction, HTTPGetAction,
    Handler, Lifecycle, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, ObjectFieldSelector, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec, Probe, ResourceRequirements, Service, ServicePort,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::Resource;

use super::Cluster;
use cassandra_core::crd::{self, Rack, Snapshot, NODE_SERVICE_ACCOUNT, SNAPSHOT_SERVICE_ACCOUNT};
use cassandra_core::hash::config_map_hash;
use cassandra_core::quantity::{min_quantity, ParsedQuantity};
use cassandra_core::{APP_LABEL, CONFIG_HASH_ANNOTATION, OPERATOR_LABEL, RACK_LABEL};

/// The name of the main Cassandra container.
pub const CASSANDRA_CONTAINER_NAME: &str = "cassandra";
/// The name of the init container which finalises the Cassandra configuration.
pub const BOOTSTRAPPER_CONTAINER_NAME: &str = "cassandra-bootstrapper";
/// The name of the init container which copies the stock Cassandra configuration.
pub const INIT_CONFIG_CONTAINER_NAME: &str = "init-config";
/// The name of the sidecar container serving health checks.
pub const SIDECAR_CONTAINER_NAME: &str = "cassandra-sidecar";
/// The port of the Jolokia JMX-over-HTTP gateway.
pub const JOLOKIA_PORT: i32 = 7777;
/// The path at which the custom config map is mounted in the bootstrapper.
pub const CUSTOM_CONFIG_MOUNT_PATH: &str = "/custom-config";

const CLIENT_PORT: i32 = 9042;
const SIDECAR_PORT: i32 = 8080;

const CONFIGURATION_VOLUME_NAME: &str = "configuration";
const EXTRA_LIB_VOLUME_NAME: &str = "extra-lib";
const STORAGE_MOUNT_PATH: &str = "/var/lib/cassandra";
const CONFIGURATION_MOUNT_PATH: &str = "/etc/cassandra";
const INIT_CONFIGURATION_MOUNT_PATH: &str = "/configuration";
const EXTRA_LIB_MOUNT_PATH: &str = "/extra-lib";

const ZONE_LABEL: &str = "failure-domain.beta.kubernetes.io/zone";
const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

const SIDECAR_CPU_REQUEST: &str = "100m";
const SIDECAR_CPU_LIMIT: &str = "200m";
const SIDECAR_MEMORY_REQUEST: &str = "50Mi";
const SIDECAR_MEMORY_LIMIT: &str = "50Mi";

impl Cluster {
    /// Build the headless service of this cluster.
    pub fn build_service(&self) -> Service {
        let mut service = Service::default();
        service.metadata = self.object_meta(self.name(), &[(APP_LABEL, self.name())]);

        let spec = service.spec.get_or_insert_with(Default::default);
        spec.selector = Some(maplit::btreemap! {APP_LABEL.into() => self.name().into()});
        spec.cluster_ip = Some("None".into());
        spec.ports = Some(vec![
            ServicePort {
                name: Some("cassandra".into()),
                port: CLIENT_PORT,
                target_port: Some(IntOrString::Int(CLIENT_PORT)),
                ..Default::default()
            },
            ServicePort {
                name: Some("jolokia".into()),
                port: JOLOKIA_PORT,
                target_port: Some(IntOrString::Int(JOLOKIA_PORT)),
                ..Default::default()
            },
        ]);

        service
    }

    /// Build the stateful set of the given rack, associated with the given custom config.
    #[tracing::instrument(level = "debug", skip(self, rack, custom_config), fields(cluster = %self.qualified_name(), rack = %rack.name))]
    pub fn build_statefulset(&self, rack: &Rack, custom_config: Option<&ConfigMap>) -> StatefulSet {
        let definition = self.definition();
        let labels = self.rack_labels(rack);

        let mut sts = StatefulSet::default();
        sts.metadata = self.object_meta(&definition.rack_name(rack), &[(RACK_LABEL, &rack.name), (APP_LABEL, self.name())]);

        let spec = sts.spec.get_or_insert_with(Default::default);
        spec.update_strategy = Some(StatefulSetUpdateStrategy {
            type_: Some("RollingUpdate".into()),
            rolling_update: None,
        });
        spec.service_name = self.name().into();
        spec.replicas = Some(rack.replicas);
        spec.selector = LabelSelector {
            match_labels: Some(labels.clone()),
            ..Default::default()
        };
        spec.template = PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels),
                annotations: custom_config.map(|cm| maplit::btreemap! {CONFIG_HASH_ANNOTATION.into() => config_map_hash(Some(cm))}),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                service_account_name: Some(NODE_SERVICE_ACCOUNT.into()),
                init_containers: Some(vec![self.init_config_container(), self.bootstrapper_container(rack, custom_config.is_some())]),
                containers: vec![self.cassandra_container(), self.sidecar_container(rack)],
                volumes: Some(self.pod_volumes(custom_config)),
                affinity: Some(self.affinity(rack)),
                ..Default::default()
            }),
        };

        if !definition.use_empty_dir() {
            spec.volume_claim_templates = Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(definition.storage_volume_name()),
                    labels: Some(self.rack_labels(rack)),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".into()]),
                    storage_class_name: Some(rack.storage_class.clone()),
                    resources: Some(ResourceRequirements {
                        requests: Some(maplit::btreemap! {
                            "storage".into() => Quantity(definition.spec.pod.storage_size.clone()),
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]);
        }

        sts
    }

    /// Build the cron job taking snapshots of this cluster, if snapshots are configured.
    pub fn build_snapshot_job(&self) -> Option<CronJob> {
        let snapshot = self.definition().spec.snapshot.as_ref()?;
        Some(self.cron_job(
            &self.definition().snapshot_job_name(),
            &snapshot.schedule,
            self.snapshot_container(snapshot),
        ))
    }

    /// Build the cron job cleaning up snapshots of this cluster, if a retention policy is enabled.
    pub fn build_snapshot_cleanup_job(&self) -> Option<CronJob> {
        let snapshot = self.definition().spec.snapshot.as_ref()?;
        let policy = snapshot.retention_policy.as_ref().filter(|policy| policy.enabled)?;
        Some(self.cron_job(
            &self.definition().snapshot_cleanup_job_name(),
            &policy.cleanup_schedule,
            self.snapshot_cleanup_container(snapshot),
        ))
    }

    /// Build the container which takes snapshots according to the given snapshot config.
    pub fn snapshot_container(&self, snapshot: &Snapshot) -> Container {
        let mut command = vec!["/cassandra-snapshot".into(), "create".into()];
        command.extend(self.snapshot_target_args());
        if let Some(timeout) = snapshot.timeout_seconds {
            command.extend(["-t".into(), format_duration(i64::from(timeout))]);
        }
        if !snapshot.keyspaces.is_empty() {
            command.extend(["-k".into(), snapshot.keyspaces.join(",")]);
        }
        Container {
            name: self.definition().snapshot_job_name(),
            image: Some(self.definition().snapshot_image().into()),
            command: Some(command),
            ..Default::default()
        }
    }

    /// Build the container which cleans up snapshots according to the given snapshot config.
    pub fn snapshot_cleanup_container(&self, snapshot: &Snapshot) -> Container {
        let mut command = vec!["/cassandra-snapshot".into(), "cleanup".into()];
        command.extend(self.snapshot_target_args());
        if let Some(policy) = snapshot.retention_policy.as_ref() {
            if let Some(days) = policy.retention_period_days {
                command.extend(["-r".into(), format_duration(i64::from(days) * 24 * 3600)]);
            }
            if let Some(timeout) = policy.cleanup_timeout_seconds {
                command.extend(["-t".into(), format_duration(i64::from(timeout))]);
            }
        }
        Container {
            name: self.definition().snapshot_cleanup_job_name(),
            image: Some(self.definition().snapshot_image().into()),
            command: Some(command),
            ..Default::default()
        }
    }

    /// Associate the given custom config map with the pods of the given stateful set.
    ///
    /// Sets the config hash annotation, adds the config map volume, and mounts it in the
    /// bootstrapper container.
    pub fn add_custom_config_volume(&self, sts: &mut StatefulSet, cm: &ConfigMap) {
        let volume_name = self.definition().custom_config_volume_name();
        let template = &mut sts.spec.get_or_insert_with(Default::default).template;
        template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(Default::default)
            .insert(CONFIG_HASH_ANNOTATION.into(), config_map_hash(Some(cm)));

        let pod = template.spec.get_or_insert_with(Default::default);
        let volumes = pod.volumes.get_or_insert_with(Default::default);
        volumes.retain(|volume| volume.name != volume_name);
        volumes.push(self.custom_config_volume());
        for container in pod.init_containers.iter_mut().flatten() {
            if container.name == BOOTSTRAPPER_CONTAINER_NAME {
                let mounts = container.volume_mounts.get_or_insert_with(Default::default);
                mounts.retain(|mount| mount.name != volume_name);
                mounts.push(self.custom_config_volume_mount());
            }
        }
    }

    /// Reverse the effects of `add_custom_config_volume` on the given stateful set.
    pub fn remove_custom_config_volume(&self, sts: &mut StatefulSet) {
        let volume_name = self.definition().custom_config_volume_name();
        let template = match sts.spec.as_mut() {
            Some(spec) => &mut spec.template,
            None => return,
        };
        if let Some(annotations) = template.metadata.as_mut().and_then(|meta| meta.annotations.as_mut()) {
            annotations.remove(CONFIG_HASH_ANNOTATION);
        }
        let pod = match template.spec.as_mut() {
            Some(pod) => pod,
            None => return,
        };
        if let Some(volumes) = pod.volumes.as_mut() {
            volumes.retain(|volume| volume.name != volume_name);
        }
        for container in pod.init_containers.iter_mut().flatten() {
            if container.name == BOOTSTRAPPER_CONTAINER_NAME {
                if let Some(mounts) = container.volume_mounts.as_mut() {
                    mounts.retain(|mount| mount.name != volume_name);
                }
            }
        }
    }

    /// The resources of the Cassandra containers: memory is both requested and limited, cpu is
    /// only requested.
    pub fn resource_requirements(&self) -> ResourceRequirements {
        let pod = &self.definition().spec.pod;
        ResourceRequirements {
            requests: Some(maplit::btreemap! {
                "cpu".into() => Quantity(pod.cpu.clone()),
                "memory".into() => Quantity(pod.memory.clone()),
            }),
            limits: Some(maplit::btreemap! {
                "memory".into() => Quantity(pod.memory.clone()),
            }),
        }
    }

    /// The resources of the sidecar: the pod's resources capped at the sidecar's maximums.
    pub fn sidecar_resource_requirements(&self) -> ResourceRequirements {
        let pod = &self.definition().spec.pod;
        ResourceRequirements {
            requests: Some(maplit::btreemap! {
                "cpu".into() => Quantity(min_quantity(&pod.cpu, SIDECAR_CPU_REQUEST).into()),
                "memory".into() => Quantity(min_quantity(&pod.memory, SIDECAR_MEMORY_REQUEST).into()),
            }),
            limits: Some(maplit::btreemap! {
                "cpu".into() => Quantity(min_quantity(&pod.cpu, SIDECAR_CPU_LIMIT).into()),
                "memory".into() => Quantity(min_quantity(&pod.memory, SIDECAR_MEMORY_LIMIT).into()),
            }),
        }
    }

    /// The environment describing the node's place in the cluster, and its resources.
    pub fn bootstrapper_env(&self, rack: &Rack) -> Vec<EnvVar> {
        let pod = &self.definition().spec.pod;
        let cpu_millis = ParsedQuantity::parse(&pod.cpu).map(|cpu| cpu.milli_value()).unwrap_or_default();
        let memory_bytes = ParsedQuantity::parse(&pod.memory).map(|memory| memory.value()).unwrap_or_default();
        let mut env = self.node_env(rack);
        env.push(EnvVar {
            name: "POD_CPU_MILLICORES".into(),
            value: Some(cpu_millis.to_string()),
            ..Default::default()
        });
        env.push(EnvVar {
            name: "POD_MEMORY_BYTES".into(),
            value: Some(memory_bytes.to_string()),
            ..Default::default()
        });
        env
    }

    /// The liveness probe of the Cassandra container, served by the sidecar.
    pub fn liveness_probe(&self) -> Probe {
        http_probe(&self.definition().liveness_probe(), "/live")
    }

    /// The readiness probe of the Cassandra container, served by the sidecar.
    pub fn readiness_probe(&self) -> Probe {
        http_probe(&self.definition().readiness_probe(), "/ready")
    }

    fn node_env(&self, rack: &Rack) -> Vec<EnvVar> {
        vec![
            EnvVar {
                name: "CLUSTER_NAMESPACE".into(),
                value: Some(self.namespace().into()),
                ..Default::default()
            },
            EnvVar {
                name: "CLUSTER_NAME".into(),
                value: Some(self.name().into()),
                ..Default::default()
            },
            EnvVar {
                name: "CLUSTER_CURRENT_RACK".into(),
                value: Some(rack.name.clone()),
                ..Default::default()
            },
            EnvVar {
                name: "CLUSTER_DATA_CENTER".into(),
                value: Some(self.definition().datacenter().into()),
                ..Default::default()
            },
            EnvVar {
                name: "NODE_LISTEN_ADDRESS".into(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "status.podIP".into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]
    }

    fn init_config_container(&self) -> Container {
        Container {
            name: INIT_CONFIG_CONTAINER_NAME.into(),
            image: Some(self.definition().cassandra_image().into()),
            command: Some(vec!["sh".into(), "-c".into(), "cp -vr /etc/cassandra/* /configuration".into()]),
            volume_mounts: Some(vec![VolumeMount {
                name: CONFIGURATION_VOLUME_NAME.into(),
                mount_path: INIT_CONFIGURATION_MOUNT_PATH.into(),
                ..Default::default()
            }]),
            resources: Some(self.resource_requirements()),
            ..Default::default()
        }
    }

    fn bootstrapper_container(&self, rack: &Rack, with_custom_config: bool) -> Container {
        let mut mounts = vec![
            VolumeMount {
                name: CONFIGURATION_VOLUME_NAME.into(),
                mount_path: INIT_CONFIGURATION_MOUNT_PATH.into(),
                ..Default::default()
            },
            VolumeMount {
                name: EXTRA_LIB_VOLUME_NAME.into(),
                mount_path: EXTRA_LIB_MOUNT_PATH.into(),
                ..Default::default()
            },
        ];
        if with_custom_config {
            mounts.push(self.custom_config_volume_mount());
        }
        Container {
            name: BOOTSTRAPPER_CONTAINER_NAME.into(),
            image: Some(self.definition().bootstrapper_image().into()),
            env: Some(self.bootstrapper_env(rack)),
            volume_mounts: Some(mounts),
            resources: Some(self.resource_requirements()),
            ..Default::default()
        }
    }

    fn cassandra_container(&self) -> Container {
        let port = |name: &str, port: i32| ContainerPort {
            name: Some(name.into()),
            container_port: port,
            protocol: Some("TCP".into()),
            ..Default::default()
        };
        Container {
            name: CASSANDRA_CONTAINER_NAME.into(),
            image: Some(self.definition().cassandra_image().into()),
            ports: Some(vec![
                port("internode", 7000),
                port("jmx-exporter", 7070),
                port("cassandra-jmx", 7199),
                port("jolokia", JOLOKIA_PORT),
                port("client", CLIENT_PORT),
            ]),
            resources: Some(self.resource_requirements()),
            liveness_probe: Some(self.liveness_probe()),
            readiness_probe: Some(self.readiness_probe()),
            lifecycle: Some(Lifecycle {
                pre_stop: Some(Handler {
                    exec: Some(ExecAction {
                        command: Some(vec!["/bin/sh".into(), "-c".into(), "nodetool drain".into()]),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            env: Some(vec![EnvVar {
                name: "EXTRA_CLASSPATH".into(),
                value: Some("/extra-lib/cassandra-seed-provider.jar".into()),
                ..Default::default()
            }]),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: self.definition().storage_volume_name(),
                    mount_path: STORAGE_MOUNT_PATH.into(),
                    ..Default::default()
                },
                VolumeMount {
                    name: CONFIGURATION_VOLUME_NAME.into(),
                    mount_path: CONFIGURATION_MOUNT_PATH.into(),
                    ..Default::default()
                },
                VolumeMount {
                    name: EXTRA_LIB_VOLUME_NAME.into(),
                    mount_path: EXTRA_LIB_MOUNT_PATH.into(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }
    }

    fn sidecar_container(&self, rack: &Rack) -> Container {
        Container {
            name: SIDECAR_CONTAINER_NAME.into(),
            image: Some(self.definition().sidecar_image().into()),
            ports: Some(vec![ContainerPort {
                name: Some("http".into()),
                container_port: SIDECAR_PORT,
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            env: Some(self.node_env(rack)),
            resources: Some(self.sidecar_resource_requirements()),
            ..Default::default()
        }
    }

    fn pod_volumes(&self, custom_config: Option<&ConfigMap>) -> Vec<Volume> {
        let mut volumes = vec![empty_dir(CONFIGURATION_VOLUME_NAME), empty_dir(EXTRA_LIB_VOLUME_NAME)];
        if custom_config.is_some() {
            volumes.push(self.custom_config_volume());
        }
        if self.definition().use_empty_dir() {
            volumes.push(empty_dir(&self.definition().storage_volume_name()));
        }
        volumes
    }

    fn custom_config_volume(&self) -> Volume {
        Volume {
            name: self.definition().custom_config_volume_name(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(self.definition().custom_config_map_name()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn custom_config_volume_mount(&self) -> VolumeMount {
        VolumeMount {
            name: self.definition().custom_config_volume_name(),
            mount_path: CUSTOM_CONFIG_MOUNT_PATH.into(),
            ..Default::default()
        }
    }

    fn affinity(&self, rack: &Rack) -> Affinity {
        Affinity {
            pod_anti_affinity: Some(PodAntiAffinity {
                required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                    label_selector: Some(LabelSelector {
                        match_labels: Some(maplit::btreemap! {OPERATOR_LABEL.into() => self.name().into()}),
                        ..Default::default()
                    }),
                    topology_key: HOSTNAME_LABEL.into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            node_affinity: Some(NodeAffinity {
                required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                    node_selector_terms: vec![NodeSelectorTerm {
                        match_expressions: Some(vec![NodeSelectorRequirement {
                            key: ZONE_LABEL.into(),
                            operator: "In".into(),
                            values: Some(vec![rack.zone.clone()]),
                        }]),
                        ..Default::default()
                    }],
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn cron_job(&self, name: &str, schedule: &str, container: Container) -> CronJob {
        let meta = self.object_meta(name, &[(APP_LABEL, name)]);
        CronJob {
            metadata: meta.clone(),
            spec: Some(CronJobSpec {
                schedule: schedule.into(),
                concurrency_policy: Some("Forbid".into()),
                job_template: JobTemplateSpec {
                    metadata: Some(meta.clone()),
                    spec: Some(JobSpec {
                        template: PodTemplateSpec {
                            metadata: Some(meta),
                            spec: Some(PodSpec {
                                restart_policy: Some("OnFailure".into()),
                                service_account_name: Some(SNAPSHOT_SERVICE_ACCOUNT.into()),
                                containers: vec![container],
                                ..Default::default()
                            }),
                        },
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// The namespace and pod selector arguments of the snapshot binary.
    fn snapshot_target_args(&self) -> Vec<String> {
        vec![
            "-n".into(),
            self.namespace().into(),
            "-l".into(),
            format!("{}={},{}={}", OPERATOR_LABEL, self.name(), APP_LABEL, self.name()),
        ]
    }

    fn rack_labels(&self, rack: &Rack) -> BTreeMap<String, String> {
        maplit::btreemap! {
            OPERATOR_LABEL.into() => self.name().into(),
            RACK_LABEL.into() => rack.name.clone(),
            APP_LABEL.into() => self.name().into(),
        }
    }

    /// A controller reference to the cluster definition, blocking its deletion until dependents are gone.
    fn owner_reference(&self) -> OwnerReference {
        let def = self.definition();
        OwnerReference {
            api_version: crd::Cassandra::api_version(&()).into_owned(),
            kind: crd::Cassandra::kind(&()).into_owned(),
            name: self.name().into(),
            uid: def.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Metadata of a top-level object of this cluster: namespaced, labelled and owned.
    fn object_meta(&self, name: &str, extra_labels: &[(&str, &str)]) -> ObjectMeta {
        let mut labels = maplit::btreemap! {OPERATOR_LABEL.to_string() => self.name().to_string()};
        labels.extend(extra_labels.iter().map(|(key, val)| (key.to_string(), val.to_string())));
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some(self.namespace().into()),
            labels: Some(labels),
            owner_references: Some(vec![self.owner_reference()]),
            ..Default::default()
        }
    }
}

fn http_probe(probe: &crd::Probe, path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.into()),
            port: IntOrString::Int(SIDECAR_PORT),
            ..Default::default()
        }),
        failure_threshold: Some(probe.failure_threshold),
        initial_delay_seconds: Some(probe.initial_delay_seconds),
        period_seconds: Some(probe.period_seconds),
        success_threshold: Some(probe.success_threshold),
        timeout_seconds: Some(probe.timeout_seconds),
        ..Default::default()
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.into(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// Format whole seconds the way the snapshot binary parses durations, e.g. `30s`, `1m30s` or
/// `240h0m0s`.
pub fn format_duration(seconds: i64) -> String {
    let (hours, minutes, seconds) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if hours != 0 {
        format!("{}h{}m{}s", hours, minutes.abs(), seconds.abs())
    } else if minutes != 0 {
        format!("{}m{}s", minutes, seconds.abs())
    } else {
        format!("{}s", seconds)
    }
}
