use criterion::{black_box, criterion_group, criterion_main, Criterion};
use buildkeeper_core::error::BuildError;
use buildkeeper_core::retry::{ErrorPatterns, RetryManager, RetryStrategy};
use buildkeeper_core::{can_transition, BuildJob, BuildStatus, BuildType};

fn benchmark_error_classification(c: &mut Criterion) {
    let patterns = ErrorPatterns::default();
    let err = BuildError::build_failed(
        "error: builder for '/nix/store/abc-app.drv' failed: ld: cannot find -lssl",
    );

    c.bench_function("error_classification", |b| {
        b.iter(|| patterns.classify(black_box(&err)))
    });
}

fn benchmark_should_retry(c: &mut Criterion) {
    let manager = RetryManager::new(RetryStrategy::default());
    let job = BuildJob::new("job-1", "dep-1", "app-1", BuildType::PureNix);
    let err = BuildError::build_failed("network error: connection reset by peer");

    c.bench_function("should_retry", |b| {
        b.iter(|| manager.should_retry(black_box(&job), black_box(&err)))
    });
}

fn benchmark_transition_check(c: &mut Criterion) {
    c.bench_function("transition_check", |b| {
        b.iter(|| {
            BuildStatus::ALL.iter().all(|from| {
                BuildStatus::ALL
                    .iter()
                    .any(|to| can_transition(black_box(*from), black_box(*to), false))
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_error_classification,
    benchmark_should_retry,
    benchmark_transition_check
);
criterion_main!(benches);
