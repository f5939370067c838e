mod view;

use core::fmt;
use std::path::Path;

use anyhow::Context as _;
use compact_str::{CompactString, format_compact};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use self::view::{ContainerView, ContainerViewMut, MetadataViewMut};

use crate::{
    Error, Result,
    fieldpath::{FieldPath, JsonValue},
    yaml,
};

pub type Str = CompactString;

pub type Object = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Gvk {
    pub group: Str,
    pub version: Str,
    pub kind: Str,
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.kind, self.version)
        } else {
            write!(f, "{}.{}.{}", self.kind, self.version, self.group)
        }
    }
}

impl Gvk {
    pub fn api_version(&self) -> Str {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format_compact!("{}/{}", self.group, self.version)
        }
    }
}

/// The workload kinds that can be regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Job,
    StatefulSet,
}

/// How the control plane treats dependents when the parent object is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Propagation {
    /// Dependent pods are garbage collected with the parent.
    Cascade,
    /// Only the parent is deleted, dependent pods keep running without an owner.
    Orphan,
}

impl Kind {
    pub fn gvk(self) -> Gvk {
        let (group, version, kind) = match self {
            Kind::Job => ("batch", "v1", "Job"),
            Kind::StatefulSet => ("apps", "v1", "StatefulSet"),
        };

        Gvk {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    pub fn from_gvk(gvk: &Gvk) -> Option<Self> {
        [Kind::Job, Kind::StatefulSet]
            .into_iter()
            .find(|kind| kind.gvk() == *gvk)
    }

    pub fn propagation(self) -> Propagation {
        match self {
            Kind::Job => Propagation::Cascade,
            Kind::StatefulSet => Propagation::Orphan,
        }
    }

    /// StatefulSets carry data-bearing pods, so they are snapshotted and confirmed before
    /// anything destructive happens.
    pub fn is_guarded(self) -> bool {
        matches!(self, Kind::StatefulSet)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Job => write!(f, "Job"),
            Kind::StatefulSet => write!(f, "StatefulSet"),
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Propagation::Cascade => write!(f, "cascade"),
            Propagation::Orphan => write!(f, "orphan"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResId {
    #[serde(flatten)]
    pub gvk: Gvk,
    pub name: Str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Str>,
}

impl fmt::Debug for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = &self.namespace {
            write!(f, "{}/{}.{namespace}", self.gvk, self.name)?;
        } else {
            write!(f, "{}/{}", self.gvk, self.name)?;
        }
        Ok(())
    }
}

/// A fetched cluster object. `root` holds everything but `apiVersion` and `kind`, which live in
/// the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    id: ResId,
    root: Object,
}

impl Resource {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening resource at {}", path.display()))?;
        let value = yaml::from_reader::<_, Value>(file)
            .with_context(|| format!("parsing resource at {}", path.display()))?;
        Ok(Self::from_value(value)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|err| Error::MalformedManifest(err.to_string()))
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|err| Error::MalformedManifest(err.to_string()))
    }

    pub fn id(&self) -> &ResId {
        &self.id
    }

    pub fn name(&self) -> &Str {
        &self.id.name
    }

    pub fn namespace(&self) -> Option<&Str> {
        self.id.namespace.as_ref()
    }

    pub fn gvk(&self) -> &Gvk {
        &self.id.gvk
    }

    pub fn kind(&self) -> Option<Kind> {
        Kind::from_gvk(&self.id.gvk)
    }

    pub fn root(&self) -> &Object {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Object {
        &mut self.root
    }

    pub fn get<T: JsonValue>(&self, path: &FieldPath) -> Result<&T> {
        path.get(&self.root)
    }

    pub fn get_mut<T: JsonValue>(&mut self, path: &FieldPath) -> Result<&mut T> {
        path.get_mut(&mut self.root)
    }

    pub fn containers(&self) -> Result<&[Value]> {
        let containers = self
            .get::<Vec<Value>>(&FieldPath::of(CONTAINERS))
            .map_err(malformed)?;
        if containers.is_empty() {
            return Err(Error::MalformedManifest(format!(
                "`{}` has no containers",
                self.id
            )));
        }
        Ok(containers)
    }

    pub fn containers_mut(&mut self) -> Result<&mut Vec<Value>> {
        let id = self.id.clone();
        let containers = self
            .get_mut::<Vec<Value>>(&FieldPath::of(CONTAINERS))
            .map_err(malformed)?;
        if containers.is_empty() {
            return Err(Error::MalformedManifest(format!("`{id}` has no containers")));
        }
        Ok(containers)
    }

    /// Only the first container is ever mutated; sidecars are left untouched.
    pub fn first_container_mut(&mut self) -> Result<ContainerViewMut<'_>> {
        let id = self.id.clone();
        let container = &mut self.containers_mut()?[0];
        container
            .as_object_mut()
            .map(ContainerViewMut)
            .ok_or_else(|| Error::MalformedManifest(format!("`{id}` has a non-object container")))
    }
}

pub(crate) const CONTAINERS: &str = "spec/template/spec/containers";

fn malformed(err: Error) -> Error {
    match err {
        Error::PathNotFound { path } => Error::MalformedManifest(format!("missing `{path}`")),
        Error::TypeMismatch { path, expected } => {
            Error::MalformedManifest(format!("expected {expected} at `{path}`"))
        }
        err => err,
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Res {
    api_version: Str,
    kind: Str,
    #[serde(flatten)]
    root: Object,
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        Res {
            api_version: self.id.gvk.api_version(),
            kind: self.id.gvk.kind.clone(),
            root: self.root.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let res = Res::deserialize(deserializer)
            .map_err(|err| serde::de::Error::custom(format!("parsing resource: {err}")))?;

        let (group, version) = res
            .api_version
            .split_once('/')
            .map_or(("".into(), res.api_version.clone()), |(g, v)| {
                (g.into(), v.into())
            });

        let metadata = res
            .root
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| serde::de::Error::custom("resource is missing `metadata`"))?;

        let name = metadata
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| serde::de::Error::custom("resource is missing `metadata.name`"))?;

        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .map(Str::from);

        let id = ResId {
            gvk: Gvk {
                group,
                version,
                kind: res.kind,
            },
            name: name.into(),
            namespace,
        };

        Ok(Resource { id, root: res.root })
    }
}
