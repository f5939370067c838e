mod cluster;
mod fake;

pub use self::cluster::KubeControlPlane;
pub use self::fake::{Call, FakeControlPlane};

use async_trait::async_trait;

use crate::{
    Result,
    poll::JobStatus,
    resource::{Kind, Propagation, Resource},
};

/// The cluster operations a run needs. Every call is a single remote round trip with no retry;
/// failures surface as [`crate::Error::RemoteCall`].
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get(&self, kind: Kind, name: &str, namespace: &str) -> Result<Resource>;

    /// Deletes the object and returns once it is gone.
    async fn delete(
        &self,
        kind: Kind,
        name: &str,
        namespace: &str,
        propagation: Propagation,
    ) -> Result<()>;

    /// Create-or-update semantics.
    async fn apply(&self, resource: &Resource, namespace: &str) -> Result<()>;

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<String>>;

    async fn job_status(&self, name: &str, namespace: &str) -> Result<JobStatus>;
}
