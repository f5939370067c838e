use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::{apps::v1::StatefulSet, batch::v1::Job, core::v1::Pod};
use kube::{
    Client,
    api::{
        Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams,
        PropagationPolicy,
    },
    core::TypeMeta,
};
use tokio::time::Instant;

use crate::{
    Error, Result,
    config::Config,
    poll::JobStatus,
    resource::{Kind, Propagation, Resource},
};

use super::ControlPlane;

const DELETE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// [`ControlPlane`] backed by the Kubernetes API.
pub struct KubeControlPlane {
    client: Client,
    field_manager: String,
    delete_timeout: Duration,
}

impl KubeControlPlane {
    /// Discovers cluster access from the in-cluster service account, `KUBECONFIG`, or
    /// `~/.kube/config`, in that order.
    pub async fn new(config: &Config) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|err| Error::remote("connect", err))?;
        tracing::debug!("kubernetes client initialized");
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            field_manager: config.field_manager.clone(),
            delete_timeout: config.delete_timeout,
        }
    }

    fn api(&self, kind: Kind, namespace: &str) -> (Api<DynamicObject>, ApiResource) {
        let resource = match kind {
            Kind::Job => ApiResource::erase::<Job>(&()),
            Kind::StatefulSet => ApiResource::erase::<StatefulSet>(&()),
        };
        let api = Api::namespaced_with(self.client.clone(), namespace, &resource);
        (api, resource)
    }
}

fn into_resource(mut object: DynamicObject, api_resource: &ApiResource) -> Result<Resource> {
    if object.types.is_none() {
        object.types = Some(TypeMeta {
            api_version: api_resource.api_version.clone(),
            kind: api_resource.kind.clone(),
        });
    }

    let value = serde_json::to_value(&object)
        .map_err(|err| Error::MalformedManifest(err.to_string()))?;
    Resource::from_value(value)
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    #[tracing::instrument(skip(self))]
    async fn get(&self, kind: Kind, name: &str, namespace: &str) -> Result<Resource> {
        let (api, api_resource) = self.api(kind, namespace);
        let object = api.get(name).await.map_err(|err| Error::remote("get", err))?;
        into_resource(object, &api_resource)
    }

    #[tracing::instrument(skip(self))]
    async fn delete(
        &self,
        kind: Kind,
        name: &str,
        namespace: &str,
        propagation: Propagation,
    ) -> Result<()> {
        let (api, _) = self.api(kind, namespace);
        let params = DeleteParams {
            propagation_policy: Some(match propagation {
                Propagation::Cascade => PropagationPolicy::Background,
                Propagation::Orphan => PropagationPolicy::Orphan,
            }),
            ..Default::default()
        };

        api.delete(name, &params)
            .await
            .map_err(|err| Error::remote("delete", err))?;

        // An orphaning delete finishes only after the garbage collector releases the pods, so
        // the object can linger briefly.
        let started = Instant::now();
        while api
            .get_opt(name)
            .await
            .map_err(|err| Error::remote("delete", err))?
            .is_some()
        {
            if started.elapsed() >= self.delete_timeout {
                return Err(Error::RemoteCall {
                    op: "delete",
                    message: format!(
                        "`{name}` still exists {}s after deletion was requested",
                        self.delete_timeout.as_secs()
                    ),
                });
            }
            tokio::time::sleep(DELETE_POLL_INTERVAL).await;
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(resource = %resource.id()))]
    async fn apply(&self, resource: &Resource, namespace: &str) -> Result<()> {
        let kind = resource.kind().ok_or_else(|| {
            Error::MalformedManifest(format!("cannot apply a `{}`", resource.gvk()))
        })?;
        let (api, _) = self.api(kind, namespace);

        let object: DynamicObject = serde_json::from_value(resource.to_value()?)
            .map_err(|err| Error::MalformedManifest(err.to_string()))?;
        let params = PatchParams::apply(&self.field_manager).force();

        api.patch(resource.name(), &params, &Patch::Apply(&object))
            .await
            .map_err(|err| Error::remote("apply", err))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<String>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|err| Error::remote("list pods", err))?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn job_status(&self, name: &str, namespace: &str) -> Result<JobStatus> {
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let job = jobs
            .get_status(name)
            .await
            .map_err(|err| Error::remote("get status", err))?;

        let status = job.status.unwrap_or_default();
        let count = |n: Option<i32>| u32::try_from(n.unwrap_or(0)).unwrap_or(0);
        Ok(JobStatus {
            succeeded: count(status.succeeded),
            failed: count(status.failed),
            active: count(status.active),
        })
    }
}
