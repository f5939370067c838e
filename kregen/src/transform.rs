mod env;
mod image;
mod sanitize;
mod volume;

use core::fmt;

use serde::{Deserialize, Serialize};

pub use self::env::{EnvUpsert, ValueEncoding, upsert_env};
pub use self::image::{ImageTagger, latest_tag, set_latest_tag};
pub use self::sanitize::{Sanitizer, sanitize};
pub use self::volume::{VolumeResizer, resize_volumes};

use crate::{Error, Result, resource::Resource};

pub trait Transformer {
    fn transform(&mut self, resource: &mut Resource) -> Result<Vec<Change>>;
}

/// A single edit made to a descriptor, kept so callers can report before and after values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "change")]
pub enum Change {
    Stripped {
        path: String,
    },
    ImageRetagged {
        container: String,
        from: String,
        to: String,
    },
    EnvAdded {
        name: String,
        value: String,
    },
    EnvUpdated {
        name: String,
        from: String,
        to: String,
    },
    EnvUnchanged {
        name: String,
        value: String,
    },
    StorageResized {
        template: String,
        from: String,
        to: String,
    },
    /// A pod volume mounts a claim owned by another object; its size is not ours to change.
    InlineClaimSkipped {
        volume: String,
        claim: String,
    },
}

impl Change {
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Change::InlineClaimSkipped { .. })
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Stripped { path } => write!(f, "removed `{path}`"),
            Change::ImageRetagged {
                container,
                from,
                to,
            } => write!(f, "updated image of `{container}` from `{from}` to `{to}`"),
            Change::EnvAdded { name, value } => {
                write!(f, "added environment variable {name} with value `{value}`")
            }
            Change::EnvUpdated { name, from, to } => {
                write!(f, "updated {name} from `{from}` to `{to}`")
            }
            Change::EnvUnchanged { name, value } => {
                write!(f, "value `{value}` already present in {name}")
            }
            Change::StorageResized { template, from, to } => write!(
                f,
                "updated volume claim template `{template}` storage from `{from}` to `{to}`"
            ),
            Change::InlineClaimSkipped { volume, claim } => write!(
                f,
                "volume `{volume}` references claim `{claim}`, resize that claim separately"
            ),
        }
    }
}

/// The edits requested for one run, on top of the sanitization every run gets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Mutations {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub latest_tag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvUpsert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<String>,
}

impl Mutations {
    pub fn validate(&self) -> Result<()> {
        if let Some(env) = &self.env {
            env.validate()?;
        }

        if let Some(size) = &self.volume_size {
            VolumeResizer::new(size.as_str())?;
        }

        Ok(())
    }

    fn transformers(&self) -> Result<Vec<Box<dyn Transformer>>> {
        let mut transformers = Vec::<Box<dyn Transformer>>::new();
        if self.latest_tag {
            transformers.push(Box::new(ImageTagger));
        }

        if let Some(env) = &self.env {
            transformers.push(Box::new(env.clone()));
        }

        if let Some(size) = &self.volume_size {
            transformers.push(Box::new(VolumeResizer::new(size.as_str())?));
        }

        Ok(transformers)
    }
}

/// Turns a live-fetched descriptor into a submittable replacement: sanitizes it, then applies
/// each requested mutation in order.
#[tracing::instrument(skip_all, fields(resource = %resource.id()))]
pub fn regenerate(
    mut resource: Resource,
    mutations: &Mutations,
) -> Result<(Resource, Vec<Change>)> {
    mutations.validate()?;

    let kind = resource.kind().ok_or_else(|| {
        Error::MalformedManifest(format!(
            "`{}` is neither a Job nor a StatefulSet",
            resource.gvk()
        ))
    })?;

    let mut changes = vec![];
    let mut transformers = mutations.transformers()?;
    transformers.insert(0, Box::new(Sanitizer::new(kind)));

    for transformer in &mut transformers {
        changes.extend(transformer.transform(&mut resource)?);
    }

    Ok((resource, changes))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn job(env: serde_json::Value) -> Resource {
        Resource::from_value(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": "nightly",
                "namespace": "etl",
                "uid": "1f0c",
                "resourceVersion": "811",
                "creationTimestamp": "2024-05-01T10:00:00Z",
            },
            "spec": {
                "template": {
                    "spec": {
                        "containers": [{ "name": "main", "image": "img:v1", "env": env }],
                    }
                }
            },
            "status": { "succeeded": 1 },
        }))
        .unwrap()
    }

    #[test]
    fn dry_run_pipeline_matches_expected_descriptor() {
        let mutations = Mutations {
            latest_tag: true,
            env: Some(EnvUpsert::new("X", "3").unwrap()),
            volume_size: None,
        };
        let (out, changes) = regenerate(job(json!([{ "name": "X", "value": "1 2" }])), &mutations).unwrap();

        let container = out.first_container().unwrap();
        assert_eq!(container.image(), Some("img:latest"));
        assert_eq!(out.containers().unwrap()[0]["env"], json!([{ "name": "X", "value": "1 2 3" }]));

        let root = out.root();
        assert!(!root.contains_key("status"));
        let metadata = root["metadata"].as_object().unwrap();
        for key in ["resourceVersion", "uid", "creationTimestamp"] {
            assert!(!metadata.contains_key(key), "{key} should be stripped");
        }

        assert!(changes.contains(&Change::EnvUpdated {
            name: "X".into(),
            from: "1 2".into(),
            to: "1 2 3".into(),
        }));
    }

    #[test]
    fn rejects_unsupported_kinds() {
        let pod = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "p" },
        }))
        .unwrap();
        let err = regenerate(pod, &Mutations::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedManifest(_)), "{err}");
    }

    #[test]
    fn invalid_mutations_fail_before_transforming() {
        let mutations = Mutations {
            volume_size: Some(" ".into()),
            ..Default::default()
        };
        let err = regenerate(job(json!([])), &mutations).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)), "{err}");
    }

    #[test]
    fn deserializes_requests() {
        let mutations: Mutations = serde_yaml::from_str(
            "latestTag: true\nenv:\n  name: X\n  value: '3'\n  encoding: token-set\n",
        )
        .unwrap();
        assert!(mutations.latest_tag);
        assert_eq!(
            mutations.env.unwrap().encoding,
            Some(ValueEncoding::TokenSet)
        );
    }
}
