use std::path::Path;

use anyhow::Context;
use kregen::{Change, Mutations};
use serde_json::{Value, json};

datatest_stable::harness! {
    { test = test, root = "tests/kregen/testdata", pattern = r".*/descriptor.yaml" },
}

fn test(path: &Path) -> datatest_stable::Result<()> {
    let dir = path.parent().context("descriptor has no parent directory")?;
    let descriptor = kregen::load_descriptor(path)?;
    let request = std::fs::File::open(dir.join("request.yaml")).context("opening request")?;
    let mutations: Mutations = kregen::yaml::from_reader(request)?;

    match kregen::regenerate(descriptor, &mutations) {
        Ok((resource, changes)) => {
            let changes = changes
                .into_iter()
                .filter(|change| !matches!(change, Change::Stripped { .. }))
                .collect::<Vec<_>>();
            let actual = json!({
                "changes": changes,
                "descriptor": resource.to_value()?,
            });
            snapshot_yaml(&dir.join("expected.yaml"), &actual)?;
        }
        Err(err) => {
            eprintln!("Error regenerating {}: {err}", path.display());
            snapshot(&dir.join("expected.stderr"), &format!("{err}\n"))?;
        }
    }
    Ok(())
}

/// Compares structurally so key order and quoting in the snapshot do not matter.
fn snapshot_yaml(path: &Path, actual: &Value) -> datatest_stable::Result<()> {
    let rendered = kregen::yaml::to_string(actual)?;
    if !path.exists() || std::env::var("UPDATE_SNAPSHOTS").is_ok() {
        std::fs::write(path, rendered).context("writing snapshot")?;
        return Ok(());
    }

    let expected = std::fs::read_to_string(path).context("reading snapshot")?;
    let expected_value: Value = kregen::yaml::from_str(&expected)?;
    if expected_value == *actual {
        return Ok(());
    }

    let expected = kregen::yaml::to_string(&expected_value)?;
    report_mismatch(path, &expected, &rendered)
}

fn snapshot(path: &Path, actual: &str) -> datatest_stable::Result<()> {
    if !path.exists() || std::env::var("UPDATE_SNAPSHOTS").is_ok() {
        std::fs::write(path, actual).context("writing snapshot")?;
        return Ok(());
    }

    let expected = std::fs::read_to_string(path).context("reading snapshot")?;
    if expected == actual {
        return Ok(());
    }
    report_mismatch(path, &expected, actual)
}

fn report_mismatch(path: &Path, expected: &str, actual: &str) -> datatest_stable::Result<()> {
    let formatted = format_chunks(dissimilar::diff(expected, actual));
    eprintln!("Snapshot mismatch for {}:\n{}", path.display(), formatted);
    Err(format!("Snapshot mismatch for {}", path.display()).into())
}

fn format_chunks(chunks: Vec<dissimilar::Chunk>) -> String {
    let mut buf = String::new();
    for chunk in chunks {
        let formatted = match chunk {
            dissimilar::Chunk::Equal(text) => text.into(),
            dissimilar::Chunk::Delete(text) => format!("\x1b[4m\x1b[31m{}\x1b[0m", text),
            dissimilar::Chunk::Insert(text) => format!("\x1b[4m\x1b[32m{}\x1b[0m", text),
        };
        buf.push_str(&formatted);
    }
    buf
}
