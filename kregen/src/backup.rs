use std::{
    fs::File,
    io::Write as _,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};

use crate::{Error, Result, resource::Resource, yaml};

/// A snapshot of an object as fetched, taken before anything destructive happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub name: String,
    pub namespace: String,
    pub captured_at: DateTime<Local>,
    pub descriptor: Resource,
}

impl BackupRecord {
    pub fn capture(descriptor: &Resource, namespace: &str) -> Self {
        Self {
            name: descriptor.name().to_string(),
            namespace: namespace.to_string(),
            captured_at: Local::now(),
            descriptor: descriptor.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_backup.yaml",
            self.name,
            self.namespace,
            self.captured_at.format("%Y%m%d_%H%M%S")
        )
    }
}

pub trait BackupStore: Send + Sync {
    /// Persists the record and returns where it was written. The record is durable once this
    /// returns.
    fn write_snapshot(&self, record: &BackupRecord) -> Result<PathBuf>;
}

/// Writes each snapshot as a standalone YAML manifest that can be applied as is.
#[derive(Debug, Clone)]
pub struct FileBackupStore {
    dir: PathBuf,
}

impl FileBackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl BackupStore for FileBackupStore {
    #[tracing::instrument(skip_all, fields(resource = %record.descriptor.id()))]
    fn write_snapshot(&self, record: &BackupRecord) -> Result<PathBuf> {
        let path = self.dir.join(record.file_name());
        let backup_err = |err: &dyn std::fmt::Display| {
            Error::Backup(format!("{}: {err}", path.display()))
        };

        let rendered = yaml::to_string(&record.descriptor).map_err(|err| backup_err(&err))?;
        let mut file = File::create_new(&path).map_err(|err| backup_err(&err))?;
        write!(
            file,
            "# {} {}/{} captured at {}\n{rendered}",
            record.descriptor.gvk().kind,
            record.namespace,
            record.name,
            record.captured_at.to_rfc3339(),
        )
        .and_then(|()| file.sync_all())
        .map_err(|err| backup_err(&err))?;

        tracing::info!(path = %path.display(), "wrote backup");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn record() -> BackupRecord {
        let descriptor = Resource::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": { "name": "db", "namespace": "data", "uid": "9a1" },
            "spec": { "template": { "spec": { "containers": [{ "name": "db", "image": "postgres:16" }] } } },
            "status": { "readyReplicas": 3 },
        }))
        .unwrap();

        BackupRecord {
            name: "db".into(),
            namespace: "data".into(),
            captured_at: Local.with_ymd_and_hms(2024, 5, 1, 10, 30, 5).unwrap(),
            descriptor,
        }
    }

    #[test]
    fn names_files_by_object_and_time() {
        assert_eq!(record().file_name(), "db_data_20240501_103005_backup.yaml");
    }

    #[test]
    fn writes_the_unsanitized_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::new(dir.path());
        let record = record();

        let path = store.write_snapshot(&record).unwrap();
        assert_eq!(path, dir.path().join("db_data_20240501_103005_backup.yaml"));

        let restored = Resource::load(&path).unwrap();
        assert_eq!(restored, record.descriptor);
        assert_eq!(restored.root()["status"]["readyReplicas"], 3);
    }

    #[test]
    fn never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::new(dir.path());
        store.write_snapshot(&record()).unwrap();

        let err = store.write_snapshot(&record()).unwrap_err();
        assert!(matches!(err, Error::Backup(_)), "{err}");
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn missing_directory_is_a_backup_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::new(dir.path().join("missing"));
        assert!(matches!(
            store.write_snapshot(&record()),
            Err(Error::Backup(_))
        ));
    }
}
