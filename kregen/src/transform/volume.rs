use serde_json::Value;

use crate::{
    Error, Result,
    fieldpath::FieldPath,
    resource::{Object, Resource},
};

use super::{Change, Transformer};

/// Overwrites the requested storage of every volume claim template with `size`, verbatim.
/// Shrinking is not guarded against here; the storage backend rejects it at apply time if it
/// must. Pod volumes that mount an existing claim are reported, not rewritten.
pub fn resize_volumes(resource: &mut Resource, size: &str) -> Result<Vec<Change>> {
    let mut changes = vec![];

    FieldPath::of("spec/volumeClaimTemplates[]").for_each_mut::<Object>(
        resource.root_mut(),
        |template| {
            let name = template
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string();

            let Some(storage) = template
                .get_mut("spec")
                .and_then(|s| s.get_mut("resources"))
                .and_then(|r| r.get_mut("requests"))
                .and_then(|r| r.get_mut("storage"))
            else {
                return Ok(());
            };

            let from = match storage {
                Value::String(s) => s.clone(),
                ref other => other.to_string(),
            };
            *storage = Value::String(size.to_string());

            changes.push(Change::StorageResized {
                template: name,
                from,
                to: size.to_string(),
            });
            Ok(())
        },
    )?;

    FieldPath::of("spec/template/spec/volumes[]").for_each_mut::<Object>(
        resource.root_mut(),
        |volume| {
            let claim = volume
                .get("persistentVolumeClaim")
                .and_then(|pvc| pvc.get("claimName"))
                .and_then(Value::as_str);

            if let Some(claim) = claim {
                changes.push(Change::InlineClaimSkipped {
                    volume: volume
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    claim: claim.to_string(),
                });
            }
            Ok(())
        },
    )?;

    Ok(changes)
}

#[derive(Debug, Clone)]
pub struct VolumeResizer {
    size: String,
}

impl VolumeResizer {
    pub fn new(size: impl Into<String>) -> Result<Self> {
        let size = size.into();
        if size.trim().is_empty() {
            return Err(Error::InvalidArguments(
                "volume size cannot be empty".into(),
            ));
        }
        Ok(Self { size })
    }
}

impl Transformer for VolumeResizer {
    #[tracing::instrument(skip_all, name = "volume_transform", fields(size = %self.size))]
    fn transform(&mut self, resource: &mut Resource) -> Result<Vec<Change>> {
        let changes = resize_volumes(resource, &self.size)?;
        for change in &changes {
            if change.is_diagnostic() {
                tracing::warn!(%change);
            } else {
                tracing::info!(%change);
            }
        }
        Ok(changes)
    }
}
