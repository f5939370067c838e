
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::{
    Error, Result,
    backup::{BackupRecord, BackupStore},
    client::ControlPlane,
    poll::{PollOutcome, Poller},
    prompt::Prompter,
    resource::{Kind, Propagation, ResId, Resource},
    transform::{self, Change, EnvUpsert, Mutations},
};

/// Where the new volume claim size comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SizeRequest {
    #[default]
    Keep,
    Set(String),
    /// Ask the prompter; an empty answer keeps the current size.
    Ask,
}

/// One regeneration of a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub kind: Kind,
    pub name: String,
    pub namespace: String,
    pub dry_run: bool,
    pub latest_tag: bool,
    pub env: Option<EnvUpsert>,
    pub volume: SizeRequest,
    /// Watch the recreated Job until it finishes or the poller times out.
    pub monitor: Option<Poller>,
}

impl Request {
    pub fn new(kind: Kind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
            dry_run: false,
            latest_tag: false,
            env: None,
            volume: SizeRequest::Keep,
            monitor: None,
        }
    }

    /// Rejects inconsistent requests before anything touches the cluster.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.namespace.is_empty() {
            return Err(Error::InvalidArguments(
                "name and namespace must both be non-empty".into(),
            ));
        }

        if let Some(env) = &self.env {
            env.validate()?;
        }

        if matches!(&self.volume, SizeRequest::Set(size) if size.trim().is_empty()) {
            return Err(Error::InvalidArguments("volume size cannot be empty".into()));
        }

        if self.monitor.is_some() && self.kind != Kind::Job {
            return Err(Error::InvalidArguments(format!(
                "only a Job can be monitored, not a {}",
                self.kind
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum State {
    Fetched,
    BackedUp,
    Sanitized,
    Mutated,
    DryRunReported,
    DeletionIssued,
    Recreated,
    Idle,
    Polling,
}

/// What a run did, for rendering to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ResId,
    pub states: Vec<State>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    pub changes: Vec<Change>,
    /// Pods left running without a controller between delete and recreate.
    pub orphaned_pods: Vec<String>,
    pub propagation: Propagation,
    pub descriptor: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollOutcome>,
}

impl Report {
    fn enter(&mut self, state: State) {
        tracing::info!(?state, resource = %self.id, "lifecycle");
        self.states.push(state);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    DryRun(Report),
    Recreated(Report),
    /// The operator declined the confirmation; nothing was changed in the cluster.
    Cancelled(Report),
}

impl Outcome {
    pub fn report(&self) -> &Report {
        match self {
            Outcome::DryRun(report) | Outcome::Recreated(report) | Outcome::Cancelled(report) => {
                report
            }
        }
    }
}

/// Renders `spec.selector.matchLabels` as a label selector, falling back to `app=<name>`.
pub fn pod_selector(resource: &Resource) -> String {
    let labels = resource
        .root()
        .get("spec")
        .and_then(|spec| spec.get("selector"))
        .and_then(|selector| selector.get("matchLabels"))
        .and_then(Value::as_object)
        .filter(|labels| !labels.is_empty());

    match labels {
        Some(labels) => labels
            .iter()
            .map(|(key, value)| match value {
                Value::String(value) => format!("{key}={value}"),
                value => format!("{key}={value}"),
            })
            .collect::<Vec<_>>()
            .join(","),
        None => format!("app={}", resource.name()),
    }
}

/// Drives a single run: fetch, back up, regenerate, then either report or replace the object.
pub struct Lifecycle<'a> {
    control_plane: &'a dyn ControlPlane,
    backups: &'a dyn BackupStore,
    prompter: &'a mut dyn Prompter,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        control_plane: &'a dyn ControlPlane,
        backups: &'a dyn BackupStore,
        prompter: &'a mut dyn Prompter,
    ) -> Self {
        Self {
            control_plane,
            backups,
            prompter,
        }
    }

    #[tracing::instrument(skip_all, fields(kind = %request.kind, name = %request.name, namespace = %request.namespace))]
    pub async fn run(&mut self, request: &Request) -> Result<Outcome> {
        request.validate()?;
        let Request {
            kind,
            name,
            namespace,
            ..
        } = request;

        let fetched = self.control_plane.get(*kind, name, namespace).await?;
        if fetched.kind() != Some(*kind) {
            return Err(Error::KindMismatch {
                expected: kind.gvk().to_string(),
                actual: fetched.gvk().to_string(),
            });
        }

        let mut report = Report {
            id: fetched.id().clone(),
            states: vec![],
            backup: None,
            changes: vec![],
            orphaned_pods: vec![],
            propagation: kind.propagation(),
            descriptor: Value::Null,
            poll: None,
        };
        report.enter(State::Fetched);

        if kind.is_guarded() {
            let record = BackupRecord::capture(&fetched, namespace);
            report.backup = Some(self.backups.write_snapshot(&record)?);
            report.enter(State::BackedUp);
        }

        let selector = pod_selector(&fetched);
        let mutations = Mutations {
            latest_tag: request.latest_tag,
            env: request.env.clone(),
            volume_size: self.volume_size(&request.volume)?,
        };

        let (regenerated, changes) = transform::regenerate(fetched, &mutations)?;
        report.enter(State::Sanitized);
        report.changes = changes;
        report.enter(State::Mutated);
        report.descriptor = regenerated.to_value()?;

        if request.dry_run {
            report.enter(State::DryRunReported);
            return Ok(Outcome::DryRun(report));
        }

        if kind.is_guarded() {
            report.orphaned_pods = self.control_plane.list_pods(namespace, &selector).await?;
            let question = format!(
                "This will delete {kind} `{name}` while keeping its pods running ({}). Proceed?",
                report.orphaned_pods.join(", ")
            );
            if !self.prompter.confirm(&question)? {
                tracing::info!("cancelled by operator");
                return Ok(Outcome::Cancelled(report));
            }
        }

        self.control_plane
            .delete(*kind, name, namespace, kind.propagation())
            .await?;
        report.enter(State::DeletionIssued);

        if let Err(err) = self.control_plane.apply(&regenerated, namespace).await {
            tracing::error!(%err, backup = ?report.backup, "recreate failed after delete");
            return Err(Error::RecreateFailed {
                id: report.id,
                backup: report.backup,
                message: err.to_string(),
            });
        }
        report.enter(State::Recreated);

        match &request.monitor {
            Some(poller) => {
                report.enter(State::Polling);
                report.poll = Some(poller.watch(self.control_plane, name, namespace).await?);
            }
            None => report.enter(State::Idle),
        }

        Ok(Outcome::Recreated(report))
    }

    fn volume_size(&mut self, request: &SizeRequest) -> Result<Option<String>> {
        match request {
            SizeRequest::Keep => Ok(None),
            SizeRequest::Set(size) => Ok(Some(size.clone())),
            SizeRequest::Ask => {
                let size = self
                    .prompter
                    .ask("Enter new persistent volume size (e.g. 100Gi), empty to keep:")?;
                if size.is_none() {
                    tracing::info!("no size given, keeping the original");
                }
                Ok(size)
            }
        }
    }
}
