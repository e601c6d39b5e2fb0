//! Access to the Kubernetes objects backing a Cassandra cluster.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::client::Client;
use kube::Resource;

use crate::cluster::Cluster;
use crate::k8s::API_TIMEOUT;
use cassandra_core::{APP_LABEL, OPERATOR_LABEL};

/// Operations on the Kubernetes objects of a cluster.
#[async_trait]
pub trait ClusterAccessor: Send + Sync + 'static {
    /// Find any service, stateful set or pod labelled as belonging to the given cluster.
    ///
    /// Returns `kind:name` descriptions. A listing failure is logged and treated as nothing found.
    async fn find_existing_resources(&self, cluster: &Cluster) -> Vec<String>;

    /// Find the custom config map of the given cluster, if it exists.
    async fn find_custom_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    async fn create_service(&self, service: Service) -> Result<Service>;

    /// Delete the given service, succeeding if it is already gone.
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<StatefulSet>;

    async fn create_statefulset(&self, sts: StatefulSet) -> Result<StatefulSet>;

    async fn update_statefulset(&self, sts: StatefulSet) -> Result<StatefulSet>;

    /// Apply a strategic merge patch to the given stateful set.
    async fn patch_statefulset(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<StatefulSet>;

    /// Delete the given stateful set, succeeding if it is already gone.
    async fn delete_statefulset(&self, namespace: &str, name: &str) -> Result<()>;

    /// Find the cron job labelled `app=<app>`, erroring if more than one matches.
    async fn find_cronjob(&self, namespace: &str, app: &str) -> Result<Option<CronJob>>;

    async fn create_cronjob(&self, job: CronJob) -> Result<CronJob>;

    async fn update_cronjob(&self, job: CronJob) -> Result<CronJob>;

    /// Delete the given cron job along with its jobs, in the background.
    async fn delete_cronjob(&self, job: &CronJob) -> Result<()>;

    /// List the pods labelled `app=<app>`.
    async fn list_pods(&self, namespace: &str, app: &str) -> Result<Vec<Pod>>;
}

/// A cluster accessor backed by the Kubernetes API.
pub struct KubeAccessor {
    client: Client,
}

impl KubeAccessor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn list_names<K>(&self, namespace: &str, params: &ListParams, kind: &str) -> Result<Vec<String>>
    where
        K: Resource<DynamicType = ()> + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
    {
        let api: Api<K> = self.api(namespace);
        let list = tokio::time::timeout(API_TIMEOUT, api.list(params))
            .await
            .with_context(|| format!("timeout while listing {}s", kind))?
            .with_context(|| format!("error listing {}s", kind))?;
        Ok(list
            .items
            .iter()
            .filter_map(|obj| obj.meta().name.as_ref())
            .map(|name| format!("{}:{}", kind, name))
            .collect())
    }
}

/// Map a 404 response to success.
fn ignore_not_found<T>(res: kube::Result<T>) -> kube::Result<()> {
    match res {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == http::StatusCode::NOT_FOUND => Ok(()),
        Err(err) => Err(err),
    }
}

fn namespace_of(meta: &kube::api::ObjectMeta) -> &str {
    meta.namespace.as_deref().unwrap_or_default()
}

fn name_of(meta: &kube::api::ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

#[async_trait]
impl ClusterAccessor for KubeAccessor {
    #[tracing::instrument(level = "debug", skip(self, cluster), fields(cluster = %cluster.qualified_name()))]
    async fn find_existing_resources(&self, cluster: &Cluster) -> Vec<String> {
        let params = ListParams::default().labels(&format!("{}={}", OPERATOR_LABEL, cluster.name()));
        let ns = cluster.namespace();
        let mut found = vec![];
        let results = vec![
            self.list_names::<Service>(ns, &params, "service").await,
            self.list_names::<StatefulSet>(ns, &params, "statefulset").await,
            self.list_names::<Pod>(ns, &params, "pod").await,
        ];
        for res in results {
            match res {
                Ok(names) => found.extend(names),
                Err(err) => tracing::error!(error = ?err, "error looking up existing cluster resources"),
            }
        }
        found
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_custom_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = self.api(namespace);
        match tokio::time::timeout(API_TIMEOUT, api.get(name)).await.context("timeout while fetching config map")? {
            Ok(cm) => Ok(Some(cm)),
            Err(kube::Error::Api(err)) if err.code == http::StatusCode::NOT_FOUND => Ok(None),
            Err(err) => Err(err).context("error fetching config map"),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, service))]
    async fn create_service(&self, service: Service) -> Result<Service> {
        let api: Api<Service> = self.api(namespace_of(&service.metadata));
        let service = tokio::time::timeout(API_TIMEOUT, api.create(&PostParams::default(), &service))
            .await
            .context("timeout while creating service")?
            .context("error creating service")?;
        tracing::info!(service = name_of(&service.metadata), "service created");
        Ok(service)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Service> = self.api(namespace);
        let res = tokio::time::timeout(API_TIMEOUT, api.delete(name, &DeleteParams::default()))
            .await
            .context("timeout while deleting service")?;
        ignore_not_found(res).context("error deleting service")
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<StatefulSet> {
        let api: Api<StatefulSet> = self.api(namespace);
        tokio::time::timeout(API_TIMEOUT, api.get(name))
            .await
            .context("timeout while fetching statefulset")?
            .context("error fetching statefulset")
    }

    #[tracing::instrument(level = "debug", skip(self, sts), fields(statefulset = name_of(&sts.metadata)))]
    async fn create_statefulset(&self, sts: StatefulSet) -> Result<StatefulSet> {
        let api: Api<StatefulSet> = self.api(namespace_of(&sts.metadata));
        let sts = tokio::time::timeout(API_TIMEOUT, api.create(&PostParams::default(), &sts))
            .await
            .context("timeout while creating statefulset")?
            .context("error creating statefulset")?;
        tracing::info!(statefulset = name_of(&sts.metadata), "statefulset created");
        Ok(sts)
    }

    #[tracing::instrument(level = "debug", skip(self, sts), fields(statefulset = name_of(&sts.metadata)))]
    async fn update_statefulset(&self, sts: StatefulSet) -> Result<StatefulSet> {
        let api: Api<StatefulSet> = self.api(namespace_of(&sts.metadata));
        tokio::time::timeout(API_TIMEOUT, api.replace(name_of(&sts.metadata), &PostParams::default(), &sts))
            .await
            .context("timeout while updating statefulset")?
            .context("error updating statefulset")
    }

    #[tracing::instrument(level = "debug", skip(self, patch))]
    async fn patch_statefulset(&self, namespace: &str, name: &str, patch: &serde_json::Value) -> Result<StatefulSet> {
        let api: Api<StatefulSet> = self.api(namespace);
        tokio::time::timeout(API_TIMEOUT, api.patch(name, &PatchParams::default(), &Patch::Strategic(patch)))
            .await
            .context("timeout while patching statefulset")?
            .context("error patching statefulset")
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_statefulset(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<StatefulSet> = self.api(namespace);
        let res = tokio::time::timeout(API_TIMEOUT, api.delete(name, &DeleteParams::default()))
            .await
            .context("timeout while deleting statefulset")?;
        ignore_not_found(res).context("error deleting statefulset")
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_cronjob(&self, namespace: &str, app: &str) -> Result<Option<CronJob>> {
        let api: Api<CronJob> = self.api(namespace);
        let params = ListParams::default().labels(&format!("{}={}", APP_LABEL, app));
        let mut jobs = tokio::time::timeout(API_TIMEOUT, api.list(&params))
            .await
            .context("timeout while listing cronjobs")?
            .context("error listing cronjobs")?
            .items;
        if jobs.len() > 1 {
            bail!("found {} cronjobs labelled {}={}, expected at most one", jobs.len(), APP_LABEL, app);
        }
        Ok(jobs.pop())
    }

    #[tracing::instrument(level = "debug", skip(self, job), fields(cronjob = name_of(&job.metadata)))]
    async fn create_cronjob(&self, job: CronJob) -> Result<CronJob> {
        let api: Api<CronJob> = self.api(namespace_of(&job.metadata));
        let job = tokio::time::timeout(API_TIMEOUT, api.create(&PostParams::default(), &job))
            .await
            .context("timeout while creating cronjob")?
            .context("error creating cronjob")?;
        tracing::info!(cronjob = name_of(&job.metadata), "cronjob created");
        Ok(job)
    }

    #[tracing::instrument(level = "debug", skip(self, job), fields(cronjob = name_of(&job.metadata)))]
    async fn update_cronjob(&self, job: CronJob) -> Result<CronJob> {
        let api: Api<CronJob> = self.api(namespace_of(&job.metadata));
        tokio::time::timeout(API_TIMEOUT, api.replace(name_of(&job.metadata), &PostParams::default(), &job))
            .await
            .context("timeout while updating cronjob")?
            .context("error updating cronjob")
    }

    #[tracing::instrument(level = "debug", skip(self, job), fields(cronjob = name_of(&job.metadata)))]
    async fn delete_cronjob(&self, job: &CronJob) -> Result<()> {
        let api: Api<CronJob> = self.api(namespace_of(&job.metadata));
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        let res = tokio::time::timeout(API_TIMEOUT, api.delete(name_of(&job.metadata), &params))
            .await
            .context("timeout while deleting cronjob")?;
        ignore_not_found(res).context("error deleting cronjob")
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_pods(&self, namespace: &str, app: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = self.api(namespace);
        let params = ListParams::default().labels(&format!("{}={}", APP_LABEL, app));
        Ok(tokio::time::timeout(API_TIMEOUT, api.list(&params))
            .await
            .context("timeout while listing pods")?
            .context("error listing pods")?
            .items)
    }
}
