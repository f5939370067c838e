use core::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::{Result, client::ControlPlane};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Pod counters reported by a Job's status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub succeeded: u32,
    pub failed: u32,
    pub active: u32,
}

impl JobStatus {
    /// Success wins over failure when both are reported.
    pub fn outcome(&self) -> Option<PollOutcome> {
        if self.succeeded > 0 {
            Some(PollOutcome::Completed)
        } else if self.failed > 0 {
            Some(PollOutcome::Failed)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PollOutcome {
    Completed,
    Failed,
    /// The timeout elapsed without a terminal status; the Job may still be running.
    Inconclusive,
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollOutcome::Completed => write!(f, "completed"),
            PollOutcome::Failed => write!(f, "failed"),
            PollOutcome::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Poller {
    pub fn new(timeout: Duration) -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Reads the Job status once per interval until it reaches a terminal state or `timeout`
    /// elapses. A failed read aborts the watch.
    #[tracing::instrument(skip(self, control_plane), fields(timeout = ?self.timeout))]
    pub async fn watch(
        &self,
        control_plane: &dyn ControlPlane,
        name: &str,
        namespace: &str,
    ) -> Result<PollOutcome> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let status = control_plane.job_status(name, namespace).await?;
            tracing::debug!(?status, "job status");
            if let Some(outcome) = status.outcome() {
                tracing::info!(%outcome, "job finished");
                return Ok(outcome);
            }

            if Instant::now() + self.interval > deadline {
                tracing::info!("gave up waiting for job");
                return Ok(PollOutcome::Inconclusive);
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
