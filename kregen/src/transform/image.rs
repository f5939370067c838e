use crate::{
    Error, Result,
    resource::{ContainerViewMut, Resource},
};

use super::{Change, Transformer};

/// Replaces everything after the first `:` with `latest`, or appends `:latest` when untagged.
/// Registry ports and digests are not special-cased.
pub fn latest_tag(image: &str) -> String {
    match image.split_once(':') {
        Some((repository, _)) => format!("{repository}:latest"),
        None => format!("{image}:latest"),
    }
}

pub fn set_latest_tag(container: &mut ContainerViewMut<'_>) -> Result<Change> {
    let view = container.view();
    let name = view.name().unwrap_or_default().to_string();
    let from = view
        .image()
        .ok_or_else(|| Error::MalformedManifest(format!("container `{name}` has no image")))?
        .to_string();

    let to = latest_tag(&from);
    container.set_image(to.clone());

    Ok(Change::ImageRetagged {
        container: name,
        from,
        to,
    })
}

/// Moves the first container onto the `latest` tag.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageTagger;

impl Transformer for ImageTagger {
    #[tracing::instrument(skip_all, name = "imagetag_transform", fields(resource = %resource.id()))]
    fn transform(&mut self, resource: &mut Resource) -> Result<Vec<Change>> {
        let change = set_latest_tag(&mut resource.first_container_mut()?)?;
        tracing::info!(%change);
        Ok(vec![change])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn retags() {
        assert_eq!(latest_tag("repo:old"), "repo:latest");
        assert_eq!(latest_tag("repo"), "repo:latest");
        assert_eq!(latest_tag("repo:latest"), "repo:latest");
        assert_eq!(latest_tag("ghcr.io/acme/etl:1.2.3"), "ghcr.io/acme/etl:latest");
    }

    #[test]
    fn only_first_container_is_touched() {
        let mut job = Resource::from_value(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "nightly" },
            "spec": { "template": { "spec": { "containers": [
                { "name": "main", "image": "img:v1" },
                { "name": "sidecar", "image": "proxy:v9" },
            ] } } },
        }))
        .unwrap();

        let changes = ImageTagger.transform(&mut job).unwrap();
        assert_eq!(
            changes,
            [Change::ImageRetagged {
                container: "main".into(),
                from: "img:v1".into(),
                to: "img:latest".into(),
            }]
        );

        let containers = job.containers().unwrap();
        assert_eq!(containers[0]["image"], "img:latest");
        assert_eq!(containers[1]["image"], "proxy:v9");
    }

    #[test]
    fn missing_image_is_malformed() {
        let mut job = Resource::from_value(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "nightly" },
            "spec": { "template": { "spec": { "containers": [{ "name": "main" }] } } },
        }))
        .unwrap();

        let err = ImageTagger.transform(&mut job).unwrap_err();
        assert!(matches!(err, Error::MalformedManifest(_)), "{err}");
    }
}
