use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::{FileFailurePersistence, TestCaseError, TestCaseResult};
use script_sentinel::{AnalysisConfig, ExecutionHarness, ExecutionReport};

const INTERCEPTION_PROPTEST_REGRESSION_FILE: &str =
    "tests/proptest-regressions/interception_property_test.txt";
const DEFAULT_INTERCEPTION_PROPTEST_CASES: u32 = 64;

const SOURCE_CALLS: &[&str] = &[
    "atob('YQ==')",
    "btoa('x')",
    "escape('a b')",
    "unescape('%41')",
    "encodeURI('x y')",
    "decodeURI('x%20y')",
    "encodeURIComponent('a&b')",
    "decodeURIComponent('%41')",
    "String.fromCharCode(65, 66)",
    "String.fromCodePoint(67)",
];

#[derive(Clone, Debug)]
enum Crossing {
    Direct,
    ForEach(usize),
    Construct,
    Forwarded,
}

impl Crossing {
    fn source(&self) -> String {
        match self {
            Self::Direct => "f();".to_string(),
            Self::ForEach(len) => format!("new Array({len}).fill(0).forEach(g);"),
            Self::Construct => "new f();".to_string(),
            Self::Forwarded => "f.call(null);".to_string(),
        }
    }

    /// `new Array(n)` and `fill` are crossings of their own.
    fn count(&self) -> u64 {
        match self {
            Self::Direct | Self::Construct | Self::Forwarded => 1,
            Self::ForEach(len) => 3 + *len as u64,
        }
    }
}

fn env_proptest_cases(var_name: &str, default_cases: u32) -> u32 {
    std::env::var(var_name)
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default_cases)
}

fn interception_proptest_cases() -> u32 {
    std::env::var("SCRIPT_SENTINEL_INTERCEPTION_PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or_else(|| {
            env_proptest_cases(
                "SCRIPT_SENTINEL_PROPTEST_CASES",
                DEFAULT_INTERCEPTION_PROPTEST_CASES,
            )
        })
}

fn segment_strategy() -> BoxedStrategy<String> {
    "[a-z][a-z0-9_]{0,6}"
        .prop_map(|tail| format!("q_{tail}"))
        .boxed()
}

fn unresolved_path_strategy() -> BoxedStrategy<Vec<String>> {
    vec(segment_strategy(), 1..=5).boxed()
}

fn crossing_strategy() -> BoxedStrategy<Crossing> {
    prop_oneof![
        4 => Just(Crossing::Direct),
        2 => (0usize..6).prop_map(Crossing::ForEach),
        1 => Just(Crossing::Construct),
        1 => Just(Crossing::Forwarded),
    ]
    .boxed()
}

fn run(src: &str) -> Result<ExecutionReport, TestCaseError> {
    let harness = ExecutionHarness::new(AnalysisConfig::default())
        .map_err(|err| TestCaseError::fail(format!("{err:?}")))?;
    let report = harness.run(src);
    if let Some(fault) = &report.fault {
        return Err(TestCaseError::fail(format!("fault {fault} for script: {src}")));
    }
    Ok(report)
}

fn assert_unresolved_path_is_stable(segments: &[String], reads: usize) -> TestCaseResult {
    let path = segments.join(".");
    let mut src = format!("var first = {path};");
    for _ in 0..reads {
        src.push_str(&format!("{path}; {path}(); console.log(first === {path});"));
    }
    let report = run(&src)?;
    prop_assert_eq!(report.console_lines(), vec!["true"; reads]);
    let stub = format!("window.{path}");
    prop_assert!(
        report.stub_paths.contains(&stub),
        "missing stub {} in {:?}",
        stub,
        report.stub_paths
    );
    if reads > 0 {
        let called = format!("{stub}()");
        prop_assert!(report.stub_paths.contains(&called));
    }
    Ok(())
}

fn assert_taint_count_matches_sources(picks: &[usize], derivations: usize) -> TestCaseResult {
    let mut src = String::from("var acc = '';");
    for pick in picks {
        let call = SOURCE_CALLS[*pick % SOURCE_CALLS.len()];
        src.push_str(&format!("acc = acc + {call};"));
    }
    for _ in 0..derivations {
        src.push_str("acc = acc.slice(0, 64).toUpperCase() + acc.split('').join('');");
    }
    src.push_str("fetch('https://a.test/?d=' + acc.slice(0, 16));");
    let report = run(&src)?;
    prop_assert_eq!(report.taint_count, picks.len() as u64);
    prop_assert_eq!(report.verdicts[0].taint_count, picks.len() as u64);
    let minted = report.taint_sources.values().sum::<u64>();
    prop_assert_eq!(minted, picks.len() as u64);
    Ok(())
}

fn assert_call_count_matches_crossings(crossings: &[Crossing]) -> TestCaseResult {
    let mut src = String::from("function f() {} function g() {}");
    for crossing in crossings {
        src.push_str(&crossing.source());
    }
    src.push_str("fetch('https://a.test');");
    let expected = crossings.iter().map(Crossing::count).sum::<u64>();
    let report = run(&src)?;
    prop_assert_eq!(report.verdicts[0].call_count, expected);
    prop_assert_eq!(report.call_count, expected + 1);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: interception_proptest_cases(),
        failure_persistence: Some(Box::new(
            FileFailurePersistence::Direct(INTERCEPTION_PROPTEST_REGRESSION_FILE),
        )),
        .. ProptestConfig::default()
    })]

    #[test]
    fn unresolved_paths_never_fault_and_share_stubs(
        segments in unresolved_path_strategy(),
        reads in 0usize..4,
    ) {
        assert_unresolved_path_is_stable(&segments, reads)?;
    }

    #[test]
    fn distinct_taint_count_equals_source_invocations(
        picks in vec(0usize..SOURCE_CALLS.len(), 0..40),
        derivations in 0usize..3,
    ) {
        assert_taint_count_matches_sources(&picks, derivations)?;
    }

    #[test]
    fn call_count_equals_hand_counted_crossings(crossings in vec(crossing_strategy(), 0..30)) {
        assert_call_count_matches_crossings(&crossings)?;
    }
}
