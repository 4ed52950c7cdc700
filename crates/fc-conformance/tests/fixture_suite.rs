#![forbid(unsafe_code)]

//! Runs the JSON fixture suites under both executors.

use fc_conformance::{CaseStatus, HarnessConfig, load_fixtures, run_suite, run_suite_by_name};
use fc_runtime::{ExecutorKind, RuntimeConfig};

fn configs() -> Vec<HarnessConfig> {
    vec![
        HarnessConfig::default_paths().with_runtime(RuntimeConfig {
            executor: ExecutorKind::Sequential,
            ..RuntimeConfig::default()
        }),
        HarnessConfig::default_paths().with_runtime(RuntimeConfig {
            executor: ExecutorKind::Parallel,
            parallel_min_rows: 1,
            memory_limit_bytes: None,
        }),
    ]
}

#[test]
fn every_fixture_suite_is_green() {
    for config in configs() {
        let report = run_suite(&config).expect("fixtures load");
        let failures: Vec<_> = report
            .failures()
            .map(|result| format!("{}/{}: {:?}", result.suite, result.case_id, result.mismatch))
            .collect();
        assert!(failures.is_empty(), "failing cases: {failures:#?}");
        assert!(report.is_green());
        assert_eq!(report.passed, report.fixture_count);
    }
}

#[test]
fn fixture_files_cover_every_suite() {
    let files = load_fixtures(&HarnessConfig::default_paths()).expect("fixtures load");
    let suites: Vec<&str> = files.iter().map(|file| file.suite.as_str()).collect();
    assert_eq!(suites, vec!["regex_flags", "shift_fixed_width", "shift_strings"]);
    assert!(files.iter().all(|file| !file.cases.is_empty()));
}

#[test]
fn suites_can_run_by_name() {
    let report = run_suite_by_name(&HarnessConfig::default_paths(), "shift_strings")
        .expect("suite exists");
    assert!(report.is_green());
    assert!(report.results.iter().all(|result| result.suite == "shift_strings"));
    assert!(run_suite_by_name(&HarnessConfig::default_paths(), "no_such_suite").is_err());
}

#[test]
fn tight_memory_limit_fails_cases_without_panicking() {
    let config = HarnessConfig::default_paths().with_runtime(RuntimeConfig {
        executor: ExecutorKind::Sequential,
        memory_limit_bytes: Some(0),
        ..RuntimeConfig::default()
    });
    let report = run_suite_by_name(&config, "shift_fixed_width").expect("suite exists");
    assert!(!report.is_green());
    let failed = report
        .results
        .iter()
        .find(|result| result.case_id == "int32_forward_valid_fill")
        .expect("case present");
    assert_eq!(failed.status, CaseStatus::Fail);
    assert!(
        failed
            .mismatch
            .as_deref()
            .is_some_and(|msg| msg.contains("exceeds limit"))
    );
}
