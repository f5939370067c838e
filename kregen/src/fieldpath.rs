use core::fmt;

use serde_json::Value;

use crate::{
    Error, Result,
    resource::{Object, Str},
};

/// A slash separated path into a resource tree, e.g. `spec/template/spec/containers`.
/// A segment suffixed with `[]` expands every element of a sequence.
#[derive(Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Box<[FieldPathSegment]>,
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#""{self}""#)
    }
}

pub type PathRef<'a> = &'a [FieldPathSegment];

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render(&self.segments))
    }
}

fn render(path: PathRef<'_>) -> String {
    path.iter()
        .map(|segment| segment.to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPathSegment {
    Field(Str),
    Array(Str),
}

impl fmt::Display for FieldPathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPathSegment::Field(field) => write!(f, "{field}"),
            FieldPathSegment::Array(field) => write!(f, "{field}[]"),
        }
    }
}

impl FieldPath {
    /// Parses a path known at compile time.
    pub(crate) fn of(s: &'static str) -> Self {
        let segments = s
            .split('/')
            .map(|segment| match segment.strip_suffix("[]") {
                Some(field) => FieldPathSegment::Array(field.into()),
                None => FieldPathSegment::Field(segment.into()),
            })
            .collect();
        FieldPath { segments }
    }

    /// Resolves a path without `[]` segments to a single typed value.
    pub fn get<'a, T: JsonValue>(&self, root: &'a Object) -> Result<&'a T> {
        let mut curr = root;
        for (i, segment) in self.segments.iter().enumerate() {
            let FieldPathSegment::Field(field) = segment else {
                return Err(Error::InvalidArguments(format!(
                    "`{self}` expands a sequence and cannot resolve to a single value"
                )));
            };

            let value = curr.get(field.as_str()).ok_or_else(|| Error::PathNotFound {
                path: render(&self.segments[..=i]),
            })?;

            if i + 1 == self.segments.len() {
                return T::try_as_ref(value).ok_or_else(|| Error::TypeMismatch {
                    path: self.to_string(),
                    expected: T::EXPECTED,
                });
            }

            curr = value.as_object().ok_or_else(|| Error::TypeMismatch {
                path: render(&self.segments[..=i]),
                expected: "an object",
            })?;
        }

        unreachable!("field paths are never empty")
    }

    pub fn get_mut<'a, T: JsonValue>(&self, root: &'a mut Object) -> Result<&'a mut T> {
        let mut curr = root;
        for (i, segment) in self.segments.iter().enumerate() {
            let FieldPathSegment::Field(field) = segment else {
                return Err(Error::InvalidArguments(format!(
                    "`{self}` expands a sequence and cannot resolve to a single value"
                )));
            };

            let value = curr
                .get_mut(field.as_str())
                .ok_or_else(|| Error::PathNotFound {
                    path: render(&self.segments[..=i]),
                })?;

            if i + 1 == self.segments.len() {
                return T::try_as_mut(value).ok_or_else(|| Error::TypeMismatch {
                    path: render(&self.segments),
                    expected: T::EXPECTED,
                });
            }

            curr = value.as_object_mut().ok_or_else(|| Error::TypeMismatch {
                path: render(&self.segments[..=i]),
                expected: "an object",
            })?;
        }

        unreachable!("field paths are never empty")
    }

    /// Calls `f` on every value the path reaches. Missing fields are skipped, a value of the
    /// wrong type along the way is an error.
    pub fn for_each_mut<T: JsonValue>(
        &self,
        root: &mut Object,
        mut f: impl FnMut(&mut T) -> Result<()>,
    ) -> Result<()> {
        fn go<T: JsonValue>(
            curr: &mut Object,
            full: PathRef<'_>,
            depth: usize,
            f: &mut impl FnMut(&mut T) -> Result<()>,
        ) -> Result<()> {
            let path = &full[depth..];
            let Some(segment) = path.first() else {
                return Ok(());
            };

            let type_mismatch = |expected| Error::TypeMismatch {
                path: render(&full[..=depth]),
                expected,
            };

            match segment {
                FieldPathSegment::Field(field) => {
                    let Some(value) = curr.get_mut(field.as_str()) else {
                        return Ok(());
                    };

                    if path.len() == 1 {
                        return f(T::try_as_mut(value).ok_or_else(|| type_mismatch(T::EXPECTED))?);
                    }

                    let obj = value
                        .as_object_mut()
                        .ok_or_else(|| type_mismatch("an object"))?;
                    go(obj, full, depth + 1, f)
                }
                FieldPathSegment::Array(field) => match curr.get_mut(field.as_str()) {
                    None | Some(Value::Null) => Ok(()),
                    Some(Value::Array(seq)) => {
                        for item in seq {
                            if path.len() == 1 {
                                f(T::try_as_mut(item).ok_or_else(|| type_mismatch(T::EXPECTED))?)?;
                                continue;
                            }

                            let obj = item
                                .as_object_mut()
                                .ok_or_else(|| type_mismatch("a sequence of objects"))?;
                            go(obj, full, depth + 1, f)?;
                        }
                        Ok(())
                    }
                    Some(_) => Err(type_mismatch("a sequence")),
                },
            }
        }

        go(root, &self.segments, 0, &mut f)
    }
}

pub trait JsonValue {
    const EXPECTED: &'static str;

    fn try_as_ref(value: &Value) -> Option<&Self>;

    fn try_as_mut(value: &mut Value) -> Option<&mut Self>;
}

impl JsonValue for Value {
    const EXPECTED: &'static str = "a value";

    fn try_as_ref(value: &Value) -> Option<&Self> {
        Some(value)
    }

    fn try_as_mut(value: &mut Value) -> Option<&mut Self> {
        Some(value)
    }
}

impl JsonValue for Object {
    const EXPECTED: &'static str = "an object";

    fn try_as_ref(value: &Value) -> Option<&Self> {
        value.as_object()
    }

    fn try_as_mut(value: &mut Value) -> Option<&mut Self> {
        value.as_object_mut()
    }
}

impl JsonValue for Vec<Value> {
    const EXPECTED: &'static str = "a sequence";

    fn try_as_ref(value: &Value) -> Option<&Self> {
        value.as_array()
    }

    fn try_as_mut(value: &mut Value) -> Option<&mut Self> {
        value.as_array_mut()
    }
}

impl JsonValue for String {
    const EXPECTED: &'static str = "a string";

    fn try_as_ref(value: &Value) -> Option<&Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn try_as_mut(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Object {
        match value {
            Value::Object(obj) => obj,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn splits_into_segments() {
        let path = FieldPath::of("spec/volumeClaimTemplates[]/spec");
        assert_eq!(
            *path.segments,
            [
                FieldPathSegment::Field("spec".into()),
                FieldPathSegment::Array("volumeClaimTemplates".into()),
                FieldPathSegment::Field("spec".into()),
            ]
        );
        assert_eq!(path.to_string(), "spec/volumeClaimTemplates[]/spec");
    }

    #[test]
    fn get_resolves_nested_fields() {
        let root = object(json!({
            "spec": { "template": { "spec": { "containers": [{ "name": "main" }] } } }
        }));
        let containers = FieldPath::of("spec/template/spec/containers")
            .get::<Vec<Value>>(&root)
            .unwrap();
        assert_eq!(containers, &[json!({ "name": "main" })]);
    }

    #[test]
    fn get_reports_the_missing_prefix() {
        let root = object(json!({ "spec": { "template": {} } }));
        let err = FieldPath::of("spec/template/spec/containers")
            .get::<Vec<Value>>(&root)
            .unwrap_err();
        assert!(
            matches!(&err, Error::PathNotFound { path } if path == "spec/template/spec"),
            "{err}"
        );
    }

    #[test]
    fn get_reports_type_mismatch() {
        let root = object(json!({ "spec": { "containers": "oops" } }));
        let err = FieldPath::of("spec/containers")
            .get::<Vec<Value>>(&root)
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { expected: "a sequence", .. }));
    }

    #[test]
    fn for_each_expands_sequences_and_skips_missing() {
        let mut root = object(json!({
            "spec": {
                "items": [
                    { "size": "1Gi" },
                    { "other": true },
                    { "size": "2Gi" },
                ]
            }
        }));

        let mut seen = vec![];
        FieldPath::of("spec/items[]/size")
            .for_each_mut::<String>(&mut root, |size| {
                seen.push(size.clone());
                *size = "5Gi".into();
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, ["1Gi", "2Gi"]);
        assert_eq!(root["spec"]["items"][2]["size"], "5Gi");
    }
}
