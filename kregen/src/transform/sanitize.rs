use crate::{
    Error, Result,
    resource::{Kind, MetadataViewMut, Resource},
};

use super::{Change, Transformer};

/// Server-assigned identity and bookkeeping, rejected or ignored when resubmitted.
const SERVER_METADATA: &[&str] = &[
    "creationTimestamp",
    "resourceVersion",
    "uid",
    "generation",
    "managedFields",
    "selfLink",
];

const SERVER_ANNOTATIONS: &[&str] = &[
    "kubectl.kubernetes.io/last-applied-configuration",
    "deployment.kubernetes.io/revision",
    "kubernetes.io/change-cause",
];

/// Status fields some clients mirror into a StatefulSet's spec.
const STATUS_MIRRORS: &[&str] = &[
    "currentReplicas",
    "updatedReplicas",
    "readyReplicas",
    "availableReplicas",
    "observedGeneration",
    "collisionCount",
    "conditions",
];

/// Strips everything the control plane generated so the descriptor can be submitted as a new
/// object. Applying it twice is the same as applying it once.
///
/// A Job also loses its labels and selector: the job controller stamps both with the old
/// object's `controller-uid` and refuses a copied selector. A StatefulSet keeps them since
/// `apps/v1` requires a selector and the orphaned pods are re-adopted through it.
#[derive(Debug, Clone, Copy)]
pub struct Sanitizer {
    kind: Kind,
}

impl Sanitizer {
    pub fn new(kind: Kind) -> Self {
        Self { kind }
    }

    fn metadata_fields(&self) -> Vec<&'static str> {
        let mut fields = SERVER_METADATA.to_vec();
        if self.kind == Kind::Job {
            fields.push("labels");
        }
        fields
    }

    fn spec_fields(&self) -> &'static [&'static str] {
        match self.kind {
            Kind::Job => &["selector"],
            Kind::StatefulSet => STATUS_MIRRORS,
        }
    }
}

impl Transformer for Sanitizer {
    #[tracing::instrument(skip_all, name = "sanitize", fields(kind = %self.kind))]
    fn transform(&mut self, resource: &mut Resource) -> Result<Vec<Change>> {
        resource.containers()?;

        let mut changes = vec![];
        let metadata_fields = self.metadata_fields();

        strip_metadata(
            resource.metadata_mut(),
            "metadata",
            &metadata_fields,
            &mut changes,
        );
        strip_metadata(
            resource.template_metadata_mut(),
            "spec/template/metadata",
            &metadata_fields,
            &mut changes,
        );

        if resource.root_mut().remove("status").is_some() {
            changes.push(Change::Stripped {
                path: "status".into(),
            });
        }

        if let Some(spec) = resource.spec_mut() {
            for &field in self.spec_fields() {
                if spec.remove(field).is_some() {
                    changes.push(Change::Stripped {
                        path: format!("spec/{field}"),
                    });
                }
            }
        }

        for change in &changes {
            tracing::debug!(%change);
        }

        Ok(changes)
    }
}

fn strip_metadata(
    metadata: Option<MetadataViewMut<'_>>,
    prefix: &str,
    fields: &[&str],
    changes: &mut Vec<Change>,
) {
    let Some(mut metadata) = metadata else {
        return;
    };

    for &field in fields {
        if metadata.remove(field).is_some() {
            changes.push(Change::Stripped {
                path: format!("{prefix}/{field}"),
            });
        }
    }

    for annotation in metadata.remove_annotations(SERVER_ANNOTATIONS) {
        changes.push(Change::Stripped {
            path: format!("{prefix}/annotations/{annotation}"),
        });
    }
}

/// Pure form of [`Sanitizer`], picking the profile from the descriptor's kind.
pub fn sanitize(mut resource: Resource) -> Result<Resource> {
    let kind = resource.kind().ok_or_else(|| {
        Error::MalformedManifest(format!("cannot sanitize a `{}`", resource.gvk()))
    })?;
    Sanitizer::new(kind).transform(&mut resource)?;
    Ok(resource)
}
