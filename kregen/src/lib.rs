use std::path::Path;

use anyhow::Context as _;

pub mod backup;
pub mod client;
pub mod config;
mod error;
pub mod fieldpath;
pub mod lifecycle;
pub mod poll;
pub mod prompt;
pub mod resource;
pub mod transform;
pub mod yaml;

pub use self::error::{Error, Result};
pub use self::lifecycle::{Lifecycle, Outcome, Report, Request, SizeRequest};
pub use self::resource::{Kind, Resource};
pub use self::transform::{Change, Mutations, regenerate};

/// Reads a descriptor as `kubectl get -o yaml` would print it.
pub fn load_descriptor(path: impl AsRef<Path>) -> anyhow::Result<Resource> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "load descriptor: path does not exist: {}",
            path.display()
        ));
    }

    Resource::load(path).with_context(|| format!("loading descriptor {}", path.display()))
}
