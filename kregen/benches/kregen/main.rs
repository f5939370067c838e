use kregen::{Mutations, Resource, transform::EnvUpsert};

fn main() {
    divan::main();
}

fn load(case: &str) -> Resource {
    kregen::load_descriptor(format!("tests/kregen/testdata/{case}/descriptor.yaml")).unwrap()
}

#[divan::bench]
fn regenerate_job(bencher: divan::Bencher) {
    let descriptor = load("job-token-set-env");
    let mutations = Mutations {
        latest_tag: true,
        env: Some(EnvUpsert::new("X", "3").unwrap()),
        volume_size: None,
    };

    bencher
        .with_inputs(|| descriptor.clone())
        .bench_values(|descriptor| kregen::regenerate(descriptor, &mutations).unwrap());
}

#[divan::bench]
fn regenerate_stateful_set(bencher: divan::Bencher) {
    let descriptor = load("statefulset-resize");
    let mutations = Mutations {
        volume_size: Some("100Gi".into()),
        ..Default::default()
    };

    bencher
        .with_inputs(|| descriptor.clone())
        .bench_values(|descriptor| kregen::regenerate(descriptor, &mutations).unwrap());
}

#[divan::bench]
fn sanitize_only(bencher: divan::Bencher) {
    let descriptor = load("statefulset-resize");
    bencher
        .with_inputs(|| descriptor.clone())
        .bench_values(|descriptor| kregen::transform::sanitize(descriptor).unwrap());
}
