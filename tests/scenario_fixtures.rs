use script_sentinel::{AnalysisConfig, ExecutionHarness, Result, RuleId};

const CALLS_THEN_FETCH: &str = include_str!("fixtures/test_1000_calls_fetch.js");
const TAINTS_THEN_FETCH: &str = include_str!("fixtures/test_100_taints_fetch.js");
const PROXY_FALLBACK: &str = include_str!("fixtures/proxy/test_proxy_fallback.js");
const ADD_EVENT_LISTENER: &str = include_str!("fixtures/proxy/test_simple_addEventListener.js");

fn harness() -> Result<ExecutionHarness> {
    ExecutionHarness::new(AnalysisConfig::default())
}

#[test]
fn call_volume_fixture_flags_the_first_request() -> Result<()> {
    let report = harness()?.run(CALLS_THEN_FETCH);
    assert!(report.fault.is_none(), "unexpected fault: {:?}", report.fault);
    assert_eq!(report.verdicts.len(), 2);

    let first = &report.verdicts[0];
    assert_eq!(first.sink, "fetch");
    assert_eq!(first.url.as_deref(), Some("https://malicious.example.com/exfiltrate"));
    assert_eq!(first.method.as_deref(), Some("POST"));
    assert!(first.call_count >= 1210, "call count {}", first.call_count);
    assert_eq!(first.status, 1);
    assert!(first.rules.contains(&RuleId::CallVolume));
    assert!(first.has_evidence("high call volume preceding sink"));
    assert!(first.sensitive_keywords.contains(&"password".to_string()));

    assert_eq!(report.taint_sources.get("atob"), Some(&110));
    Ok(())
}

#[test]
fn counters_are_cumulative_so_the_follow_up_request_is_flagged_too() -> Result<()> {
    let report = harness()?.run(CALLS_THEN_FETCH);
    let second = &report.verdicts[1];
    assert_eq!(second.method.as_deref(), Some("GET"));
    assert!(second.call_count > report.verdicts[0].call_count);
    assert!(second.is_suspicious());
    Ok(())
}

#[test]
fn taint_volume_fixture_flags_by_taint_only() -> Result<()> {
    let report = harness()?.run(TAINTS_THEN_FETCH);
    assert!(report.fault.is_none(), "unexpected fault: {:?}", report.fault);
    assert_eq!(report.taint_count, 240);
    assert_eq!(report.taint_sources.get("atob"), Some(&120));
    assert_eq!(report.taint_sources.get("String.fromCharCode"), Some(&120));

    let first = &report.verdicts[0];
    assert_eq!(first.taint_count, 240);
    assert!(first.call_count < 1000);
    assert_eq!(first.rules, vec![RuleId::TaintVolume]);
    assert!(first.has_evidence("high taint volume preceding sink"));
    assert!(!first.has_evidence("high call volume"));
    assert_eq!(first.status, 1);
    Ok(())
}

#[test]
fn a_quiet_script_gets_a_benign_verdict() -> Result<()> {
    let report = harness()?.run(
        "function f() {} f(); f(); f(); f(); f(); fetch('https://example.net/ping');",
    );
    assert_eq!(report.verdicts.len(), 1);
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.call_count, 5);
    assert_eq!(verdict.taint_count, 0);
    assert_eq!(verdict.status, 0);
    assert!(verdict.rules.is_empty());
    assert!(!report.is_suspicious());
    Ok(())
}

#[test]
fn proxy_fallback_fixture_runs_without_errors() -> Result<()> {
    let report = harness()?.run(PROXY_FALLBACK);
    assert!(report.fault.is_none(), "unexpected fault: {:?}", report.fault);
    assert!(report.complete);
    assert_eq!(
        report.console_lines(),
        vec![
            "start",
            "undefinedGlobalAPI: function",
            "nonExistentFunction(): function",
            "window.notImplementedProperty: function",
            "navigator.notImplementedMethod(): function",
            "btoa: dGVzdA==",
            "atob: test",
            "window.crypto.subtle.encrypt: function",
            "someUndefinedObject.test: value",
            "end",
        ]
    );
    for path in [
        "window.undefinedGlobalAPI",
        "window.nonExistentFunction",
        "window.notImplementedProperty",
        "window.navigator.notImplementedMethod",
        "window.crypto.subtle.encrypt",
    ] {
        assert!(report.stub_paths.iter().any(|stub| stub == path), "missing stub {path}");
    }
    assert!(!report.stub_paths.iter().any(|stub| stub.contains("someUndefinedObject")));
    Ok(())
}

#[test]
fn add_event_listener_fixture_fires_load_after_the_script() -> Result<()> {
    let report = harness()?.run(ADD_EVENT_LISTENER);
    assert!(report.fault.is_none(), "unexpected fault: {:?}", report.fault);
    assert_eq!(
        report.console_lines(),
        vec![
            "typeof window.addEventListener = function",
            "typeof document.addEventListener = function",
            "done",
            "Load event fired!",
        ]
    );
    assert_eq!(report.stub_count, 0);
    Ok(())
}

#[test]
fn raised_thresholds_keep_every_verdict_benign() -> Result<()> {
    let config = AnalysisConfig::default()
        .with_call_volume_threshold(1_000_000)
        .with_taint_volume_threshold(1_000_000);
    let report = ExecutionHarness::new(config)?.run(CALLS_THEN_FETCH);
    assert!(report.verdicts.iter().all(|verdict| verdict.status == 0));
    Ok(())
}
