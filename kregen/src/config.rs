use std::{path::PathBuf, time::Duration};

use crate::poll;

/// Settings shared by every run, resolved from flags and `KREGEN_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory StatefulSet snapshots are written to.
    pub backup_dir: PathBuf,
    /// Field manager recorded by server-side apply.
    pub field_manager: String,
    pub poll_interval: Duration,
    /// How long a delete may take to disappear from the API before the run gives up.
    pub delete_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("."),
            field_manager: "kregen".into(),
            poll_interval: poll::DEFAULT_INTERVAL,
            delete_timeout: Duration::from_secs(60),
        }
    }
}
