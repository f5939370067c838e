use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Error, Result,
    resource::{ContainerViewMut, Resource},
};

use super::{Change, Transformer};

/// How an existing environment value is interpreted when upserting into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueEncoding {
    /// The value is replaced wholesale.
    Scalar,
    /// The value is a whitespace separated set of tokens; the new value is added if missing.
    TokenSet,
}

impl ValueEncoding {
    /// Any whitespace in the current value marks it as a token set. A scalar that happens to
    /// contain a space is indistinguishable from a set, pass an explicit encoding to avoid that.
    pub fn infer(current: &str) -> Self {
        if current.chars().any(char::is_whitespace) {
            ValueEncoding::TokenSet
        } else {
            ValueEncoding::Scalar
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvUpsert {
    pub name: String,
    pub value: String,
    /// `None` infers the encoding from the current value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<ValueEncoding>,
}

impl EnvUpsert {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let upsert = Self {
            name: name.into(),
            value: value.into(),
            encoding: None,
        };
        upsert.validate()?;
        Ok(upsert)
    }

    /// Builds an upsert from an optional name and value, which must be given together.
    pub fn from_pair(name: Option<String>, value: Option<String>) -> Result<Option<Self>> {
        match (name, value) {
            (None, None) => Ok(None),
            (Some(name), Some(value)) => Self::new(name, value).map(Some),
            (Some(name), None) => Err(Error::InvalidArguments(format!(
                "environment variable `{name}` requires a value"
            ))),
            (None, Some(_)) => Err(Error::InvalidArguments(
                "an environment value requires a variable name".into(),
            )),
        }
    }

    pub fn with_encoding(mut self, encoding: Option<ValueEncoding>) -> Self {
        self.encoding = encoding;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.value.is_empty() {
            return Err(Error::InvalidArguments(
                "environment variable name and value must both be non-empty".into(),
            ));
        }
        Ok(())
    }
}

pub fn upsert_env(container: &mut ContainerViewMut<'_>, upsert: &EnvUpsert) -> Result<Change> {
    let EnvUpsert {
        name,
        value,
        encoding,
    } = upsert;

    let env = container
        .make_env_mut()
        .ok_or_else(|| Error::MalformedManifest("container `env` is not a sequence".into()))?;

    let existing = env
        .iter_mut()
        .find(|var| var.get("name").and_then(Value::as_str) == Some(name.as_str()));

    let Some(var) = existing else {
        env.push(serde_json::json!({ "name": name, "value": value }));
        return Ok(Change::EnvAdded {
            name: name.clone(),
            value: value.clone(),
        });
    };

    let var = var.as_object_mut().ok_or_else(|| {
        Error::MalformedManifest(format!("environment variable `{name}` is not an object"))
    })?;

    if var.contains_key("valueFrom") {
        return Err(Error::MalformedManifest(format!(
            "environment variable `{name}` is sourced from `valueFrom` and has no literal value"
        )));
    }

    let Value::String(current) = var
        .entry("value")
        .or_insert_with(|| Value::String(String::new()))
    else {
        return Err(Error::MalformedManifest(format!(
            "environment variable `{name}` has a non-string value"
        )));
    };

    let encoding = encoding.unwrap_or_else(|| ValueEncoding::infer(current));
    let change = match encoding {
        ValueEncoding::TokenSet if current.split_whitespace().any(|token| token == value) => {
            Change::EnvUnchanged {
                name: name.clone(),
                value: value.clone(),
            }
        }
        ValueEncoding::TokenSet if !current.is_empty() => {
            let from = current.clone();
            current.push(' ');
            current.push_str(value);
            Change::EnvUpdated {
                name: name.clone(),
                from,
                to: current.clone(),
            }
        }
        ValueEncoding::TokenSet | ValueEncoding::Scalar => {
            let from = std::mem::replace(current, value.clone());
            Change::EnvUpdated {
                name: name.clone(),
                from,
                to: value.clone(),
            }
        }
    };

    Ok(change)
}

impl Transformer for EnvUpsert {
    #[tracing::instrument(skip_all, name = "env_transform", fields(name = %self.name))]
    fn transform(&mut self, resource: &mut Resource) -> Result<Vec<Change>> {
        let change = upsert_env(&mut resource.first_container_mut()?, self)?;
        tracing::info!(%change);
        Ok(vec![change])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn job(env: Value) -> Resource {
        Resource::from_value(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "nightly" },
            "spec": { "template": { "spec": { "containers": [{ "name": "main", "image": "img", "env": env }] } } },
        }))
        .unwrap()
    }

    fn upsert(job: &mut Resource, name: &str, value: &str) -> Change {
        EnvUpsert::new(name, value)
            .unwrap()
            .transform(job)
            .unwrap()
            .remove(0)
    }

    fn env(job: &Resource) -> Value {
        job.containers().unwrap()[0]["env"].clone()
    }

    #[test]
    fn appends_absent_name() {
        let mut job = job(json!([{ "name": "A", "value": "1" }]));
        let change = upsert(&mut job, "B", "2");
        assert_eq!(
            change,
            Change::EnvAdded {
                name: "B".into(),
                value: "2".into()
            }
        );
        assert_eq!(
            env(&job),
            json!([{ "name": "A", "value": "1" }, { "name": "B", "value": "2" }])
        );
    }

    #[test]
    fn creates_env_when_absent() {
        let mut job = Resource::from_value(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "nightly" },
            "spec": { "template": { "spec": { "containers": [{ "name": "main", "image": "img" }] } } },
        }))
        .unwrap();
        upsert(&mut job, "B", "2");
        assert_eq!(env(&job), json!([{ "name": "B", "value": "2" }]));
    }

    #[test]
    fn replaces_scalar() {
        let mut job = job(json!([{ "name": "X", "value": "a" }]));
        upsert(&mut job, "X", "b");
        assert_eq!(env(&job), json!([{ "name": "X", "value": "b" }]));
    }

    #[test]
    fn unions_into_token_set() {
        let mut job = job(json!([{ "name": "X", "value": "a b" }]));
        upsert(&mut job, "X", "c");
        assert_eq!(env(&job), json!([{ "name": "X", "value": "a b c" }]));

        let change = upsert(&mut job, "X", "c");
        assert!(matches!(change, Change::EnvUnchanged { .. }));
        assert_eq!(env(&job), json!([{ "name": "X", "value": "a b c" }]));
    }

    #[test]
    fn whitespace_only_value_is_appended_to() {
        let mut job = job(json!([{ "name": "X", "value": " " }]));
        let change = upsert(&mut job, "X", "a");
        assert_eq!(env(&job), json!([{ "name": "X", "value": "  a" }]));
        assert_eq!(
            change,
            Change::EnvUpdated {
                name: "X".into(),
                from: " ".into(),
                to: "  a".into(),
            }
        );
    }

    #[test]
    fn explicit_encoding_overrides_inference() {
        let mut job = job(json!([{ "name": "X", "value": "a b" }]));
        EnvUpsert::new("X", "c")
            .unwrap()
            .with_encoding(Some(ValueEncoding::Scalar))
            .transform(&mut job)
            .unwrap();
        assert_eq!(env(&job), json!([{ "name": "X", "value": "c" }]));

        EnvUpsert::new("X", "d")
            .unwrap()
            .with_encoding(Some(ValueEncoding::TokenSet))
            .transform(&mut job)
            .unwrap();
        assert_eq!(env(&job), json!([{ "name": "X", "value": "c d" }]));
    }

    #[test]
    fn value_from_is_rejected() {
        let mut job = job(json!([{ "name": "X", "valueFrom": { "secretKeyRef": { "name": "s", "key": "k" } } }]));
        let err = EnvUpsert::new("X", "c").unwrap().transform(&mut job).unwrap_err();
        assert!(matches!(err, Error::MalformedManifest(_)), "{err}");
    }

    #[test]
    fn pair_must_be_complete() {
        assert_eq!(EnvUpsert::from_pair(None, None).unwrap(), None);
        assert!(matches!(
            EnvUpsert::from_pair(Some("X".into()), None),
            Err(Error::InvalidArguments(_))
        ));
        assert!(matches!(
            EnvUpsert::from_pair(None, Some("1".into())),
            Err(Error::InvalidArguments(_))
        ));
        assert!(matches!(
            EnvUpsert::new("", "1"),
            Err(Error::InvalidArguments(_))
        ));
    }
}
