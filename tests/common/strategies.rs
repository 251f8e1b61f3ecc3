use proptest::prelude::*;

use buildkeeper_core::models::{BuildJob, BuildStrategy, BuildType};
use buildkeeper_core::state_machine::BuildStatus;

pub fn build_status_strategy() -> impl Strategy<Value = BuildStatus> {
    prop::sample::select(BuildStatus::ALL.to_vec())
}

pub fn build_strategy_strategy() -> impl Strategy<Value = BuildStrategy> {
    prop::sample::select(BuildStrategy::ALL.to_vec())
}

pub fn build_type_strategy() -> impl Strategy<Value = BuildType> {
    prop_oneof![Just(BuildType::PureNix), Just(BuildType::Oci)]
}

/// Text a builder might print, with no classification pattern in it
pub fn neutral_error_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("syntax error near line 12".to_string()),
        Just("exit status 2".to_string()),
        Just("test suite failed".to_string()),
        Just("permission denied".to_string()),
    ]
}

pub fn retryable_error_text_strategy() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec![
            "hash mismatch",
            "dependency resolution failed",
            "network error",
            "connection refused",
            "unable to fetch",
            "failed to download",
        ]),
        "[a-z ]{0,20}",
    )
        .prop_map(|(pattern, suffix)| format!("{pattern}: {suffix}"))
}

pub fn fallback_error_text_strategy() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec![
            "native dependency not found",
            "Unsupported platform: aarch64-darwin",
            "binary not found: protoc",
            "linking failed",
            "undefined reference to `SSL_new`",
            "ld: cannot find -lssl",
            "pkg-config: command not found",
            "CMake Error at CMakeLists.txt",
            "autoconf required",
        ]),
        "[a-z]{0,10}",
    )
        .prop_map(|(pattern, suffix)| format!("{pattern} {suffix}"))
}

pub fn job_strategy() -> impl Strategy<Value = BuildJob> {
    (
        "[a-z0-9]{1,12}",
        build_type_strategy(),
        build_strategy_strategy(),
        0u32..4,
    )
        .prop_map(|(id, build_type, strategy, retry_count)| {
            let mut job = BuildJob::new(id.clone(), format!("dep-{id}"), "app-1", build_type)
                .with_strategy(strategy);
            job.retry_count = retry_count;
            job
        })
}
