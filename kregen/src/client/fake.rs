use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::{
    Error, Result,
    poll::JobStatus,
    resource::{Kind, Propagation, Resource},
};

use super::ControlPlane;

/// A call received by [`FakeControlPlane`], in the order it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get {
        kind: Kind,
        name: String,
        namespace: String,
    },
    Delete {
        kind: Kind,
        name: String,
        namespace: String,
        propagation: Propagation,
    },
    Apply {
        resource: Resource,
        namespace: String,
    },
    ListPods {
        namespace: String,
        label_selector: String,
    },
    JobStatus {
        name: String,
        namespace: String,
    },
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Call::Delete { .. } | Call::Apply { .. })
    }
}

type ObjectKey = (Kind, String, String);

#[derive(Debug, Default)]
struct State {
    objects: IndexMap<ObjectKey, Resource>,
    pods: IndexMap<String, Vec<String>>,
    statuses: VecDeque<JobStatus>,
    failures: IndexMap<&'static str, String>,
    calls: Vec<Call>,
}

/// An in-memory control plane that records every call. Useful for exercising a run without a
/// cluster.
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    state: Mutex<State>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `resource` as if it existed in the cluster. Objects without a namespace land in
    /// `default`.
    pub fn with_object(self, resource: Resource) -> Self {
        if let Some(kind) = resource.kind() {
            let namespace = resource.namespace().map_or("default", |ns| ns.as_str());
            let key = (kind, resource.name().to_string(), namespace.to_string());
            self.lock().objects.insert(key, resource);
        }
        self
    }

    /// Pods returned for an exact label selector.
    pub fn with_pods<S: Into<String>>(
        self,
        label_selector: &str,
        pods: impl IntoIterator<Item = S>,
    ) -> Self {
        self.lock().pods.insert(
            label_selector.to_string(),
            pods.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Job statuses returned one per call; the last one repeats once the rest are used up.
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        self.lock().statuses.extend(statuses);
        self
    }

    /// Makes every call of `op` (`get`, `delete`, `apply`, `list pods`, `get status`) fail.
    pub fn failing(self, op: &'static str, message: impl Into<String>) -> Self {
        self.lock().failures.insert(op, message.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn object(&self, kind: Kind, name: &str, namespace: &str) -> Option<Resource> {
        self.lock()
            .objects
            .get(&(kind, name.to_string(), namespace.to_string()))
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, op: &'static str, call: Call) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(call);
        if let Some(message) = state.failures.get(op).cloned() {
            return Err(Error::RemoteCall { op, message });
        }
        Ok(state)
    }
}

fn not_found(op: &'static str, kind: Kind, name: &str) -> Error {
    Error::RemoteCall {
        op,
        message: format!("{kind} \"{name}\" not found"),
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn get(&self, kind: Kind, name: &str, namespace: &str) -> Result<Resource> {
        let call = Call::Get {
            kind,
            name: name.into(),
            namespace: namespace.into(),
        };
        let state = self.record("get", call)?;
        state
            .objects
            .get(&(kind, name.to_string(), namespace.to_string()))
            .cloned()
            .ok_or_else(|| not_found("get", kind, name))
    }

    async fn delete(
        &self,
        kind: Kind,
        name: &str,
        namespace: &str,
        propagation: Propagation,
    ) -> Result<()> {
        let call = Call::Delete {
            kind,
            name: name.into(),
            namespace: namespace.into(),
            propagation,
        };
        let mut state = self.record("delete", call)?;
        state
            .objects
            .shift_remove(&(kind, name.to_string(), namespace.to_string()))
            .map(drop)
            .ok_or_else(|| not_found("delete", kind, name))
    }

    async fn apply(&self, resource: &Resource, namespace: &str) -> Result<()> {
        let call = Call::Apply {
            resource: resource.clone(),
            namespace: namespace.into(),
        };
        let mut state = self.record("apply", call)?;
        let kind = resource.kind().ok_or_else(|| {
            Error::MalformedManifest(format!("cannot apply a `{}`", resource.gvk()))
        })?;
        let key = (kind, resource.name().to_string(), namespace.to_string());
        state.objects.insert(key, resource.clone());
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<String>> {
        let call = Call::ListPods {
            namespace: namespace.into(),
            label_selector: label_selector.into(),
        };
        let state = self.record("list pods", call)?;
        Ok(state.pods.get(label_selector).cloned().unwrap_or_default())
    }

    async fn job_status(&self, name: &str, namespace: &str) -> Result<JobStatus> {
        let call = Call::JobStatus {
            name: name.into(),
            namespace: namespace.into(),
        };
        let mut state = self.record("get status", call)?;
        let status = match state.statuses.len() {
            0 => JobStatus::default(),
            1 => state.statuses[0],
            _ => state.statuses.pop_front().unwrap_or_default(),
        };
        Ok(status)
    }
}
