use std::path::PathBuf;

use thiserror::Error;

use crate::resource::ResId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A control-plane call failed (transport, auth, not-found, conflict).
    /// The collaborator's message is kept verbatim.
    #[error("{op}: {message}")]
    RemoteCall { op: &'static str, message: String },

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("path `{path}` not found")]
    PathNotFound { path: String },

    #[error("expected {expected} at `{path}`")]
    TypeMismatch { path: String, expected: &'static str },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("writing backup: {0}")]
    Backup(String),

    #[error("expected a `{expected}` but the cluster returned a `{actual}`")]
    KindMismatch { expected: String, actual: String },

    /// The old object was deleted but the replacement was rejected. The cluster no longer has
    /// the resource and must be recovered by hand.
    #[error("`{id}` was deleted but could not be recreated: {message}")]
    RecreateFailed {
        id: ResId,
        backup: Option<PathBuf>,
        message: String,
    },
}

impl Error {
    pub fn remote(op: &'static str, err: impl std::fmt::Display) -> Self {
        Error::RemoteCall {
            op,
            message: err.to_string(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Error::InvalidArguments(_) => 2,
            Error::MalformedManifest(_)
            | Error::PathNotFound { .. }
            | Error::TypeMismatch { .. }
            | Error::KindMismatch { .. } => 3,
            Error::RemoteCall { .. } => 4,
            Error::Backup(_) => 5,
            Error::RecreateFailed { .. } => 6,
        }
    }
}
