use serde_json::{Value, map::Entry};

use super::{Object, Resource};

impl Resource {
    pub fn metadata_mut(&mut self) -> Option<MetadataViewMut<'_>> {
        self.root
            .get_mut("metadata")
            .and_then(|v| v.as_object_mut())
            .map(MetadataViewMut)
    }

    /// The pod template's metadata, `spec.template.metadata`.
    pub fn template_metadata_mut(&mut self) -> Option<MetadataViewMut<'_>> {
        self.root
            .get_mut("spec")
            .and_then(|v| v.get_mut("template"))
            .and_then(|v| v.get_mut("metadata"))
            .and_then(|v| v.as_object_mut())
            .map(MetadataViewMut)
    }

    pub fn spec_mut(&mut self) -> Option<&mut Object> {
        self.root.get_mut("spec").and_then(|v| v.as_object_mut())
    }
}

#[derive(Debug)]
pub struct MetadataViewMut<'a>(&'a mut Object);

impl MetadataViewMut<'_> {
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Removes `keys` from the annotations, dropping the annotations map altogether if nothing
    /// remains in it. Returns the keys that were present.
    pub fn remove_annotations<'k>(&mut self, keys: &[&'k str]) -> Vec<&'k str> {
        let Entry::Occupied(mut entry) = self.0.entry("annotations") else {
            return vec![];
        };

        let mut removed = vec![];
        if let Some(annotations) = entry.get_mut().as_object_mut() {
            for &key in keys {
                if annotations.remove(key).is_some() {
                    removed.push(key);
                }
            }
        }

        let emptied = match entry.get() {
            Value::Object(annotations) => annotations.is_empty(),
            Value::Null => true,
            _ => false,
        };
        if emptied {
            entry.remove();
        }

        removed
    }
}

#[derive(Debug)]
pub struct ContainerView<'a>(pub(super) &'a Object);

impl<'a> ContainerView<'a> {
    pub fn name(&self) -> Option<&'a str> {
        self.0.get("name").and_then(|v| v.as_str())
    }

    pub fn image(&self) -> Option<&'a str> {
        self.0.get("image").and_then(|v| v.as_str())
    }
}

#[derive(Debug)]
pub struct ContainerViewMut<'a>(pub(super) &'a mut Object);

impl ContainerViewMut<'_> {
    pub fn view(&self) -> ContainerView<'_> {
        ContainerView(&*self.0)
    }

    pub fn set_image(&mut self, image: impl Into<String>) -> Option<Value> {
        self.0
            .insert("image".to_string(), Value::String(image.into()))
    }

    /// The `env` sequence, created empty if absent. `None` if `env` is present but not a sequence.
    pub fn make_env_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.0
            .entry("env")
            .or_insert_with(|| Value::Array(vec![]))
            .as_array_mut()
    }
}

impl Resource {
    #[cfg(test)]
    pub(crate) fn first_container(&self) -> crate::Result<ContainerView<'_>> {
        let id = self.id();
        self.containers()?[0]
            .as_object()
            .map(ContainerView)
            .ok_or_else(|| {
                crate::Error::MalformedManifest(format!("`{id}` has a non-object container"))
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn resource(metadata: Value) -> Resource {
        Resource::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": metadata,
        }))
        .unwrap()
    }

    #[test]
    fn remove_annotations_drops_emptied_map() {
        let mut res = resource(json!({
            "name": "db",
            "annotations": { "kubernetes.io/change-cause": "x" },
        }));
        let removed = res
            .metadata_mut()
            .unwrap()
            .remove_annotations(&["kubernetes.io/change-cause", "absent"]);
        assert_eq!(removed, ["kubernetes.io/change-cause"]);
        assert!(!res.root()["metadata"].as_object().unwrap().contains_key("annotations"));
    }

    #[test]
    fn remove_annotations_keeps_user_annotations() {
        let mut res = resource(json!({
            "name": "db",
            "annotations": { "kubernetes.io/change-cause": "x", "team": "storage" },
        }));
        res.metadata_mut()
            .unwrap()
            .remove_annotations(&["kubernetes.io/change-cause"]);
        assert_eq!(
            res.root()["metadata"]["annotations"],
            json!({ "team": "storage" })
        );
    }
}
