use std::time::Duration;

use script_sentinel::{
    AnalysisConfig, Error, ExecutionHarness, ExecutionLimits, FaultKind, Result,
};

fn limited(limits: ExecutionLimits) -> Result<ExecutionHarness> {
    ExecutionHarness::new(AnalysisConfig::default().with_limits(limits))
}

#[test]
fn invalid_manifests_never_start_a_run() {
    let negative = AnalysisConfig::default().with_taint_volume_threshold(-3);
    match ExecutionHarness::new(negative) {
        Err(Error::Config(message)) => assert!(message.contains("taint_volume_threshold")),
        other => panic!("expected a config error, got: {other:?}"),
    }
    assert!(matches!(
        AnalysisConfig::from_json(r#"{ "sinks": ["fetch", "9bad"] }"#),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        AnalysisConfig::from_json(r#"{ "document_url": "relative/page.html" }"#),
        Err(Error::Config(_))
    ));
}

#[test]
fn zero_thresholds_flag_every_sink() -> Result<()> {
    let config = AnalysisConfig::default()
        .with_call_volume_threshold(0)
        .with_taint_volume_threshold(0);
    let report = ExecutionHarness::new(config)?.run("fetch('https://a.test');");
    assert_eq!(report.verdicts[0].status, 1);
    assert_eq!(report.verdicts[0].evidence.len(), 2);
    Ok(())
}

#[test]
fn runaway_loops_abort_with_partial_results() -> Result<()> {
    let harness = limited(ExecutionLimits {
        max_steps: 20_000,
        ..ExecutionLimits::default()
    })?;
    let report = harness.run(
        "atob('YQ=='); fetch('https://a.test/first');\
         for (;;) { Math.max(1, 2); }",
    );
    assert!(!report.complete);
    assert_eq!(report.verdicts.len(), 1);
    let Some(fault) = &report.fault else {
        panic!("expected an aborted fault");
    };
    assert_eq!(fault.kind, FaultKind::Aborted);
    assert!(fault.message.contains("step limit"), "message: {}", fault.message);
    assert_eq!(fault.taint_count, 1);
    assert!(fault.call_count > 2);
    Ok(())
}

#[test]
fn timer_cap_stops_self_rescheduling_scripts() -> Result<()> {
    let harness = limited(ExecutionLimits {
        timer_step_limit: 50,
        ..ExecutionLimits::default()
    })?;
    let report = harness.run("function tick() { setTimeout(tick, 1); } tick();");
    assert!(!report.complete);
    let fault = report.fault.as_ref().map(|fault| fault.kind);
    assert_eq!(fault, Some(FaultKind::Aborted));
    Ok(())
}

#[test]
fn intervals_stop_after_their_repeat_cap() -> Result<()> {
    let report = ExecutionHarness::new(AnalysisConfig::default())?
        .run("var n = 0; setInterval(function () { n++; }, 5); setTimeout(function () { console.log('t'); }, 100000);");
    assert!(report.complete, "fault: {:?}", report.fault);
    assert_eq!(report.console_lines(), vec!["t"]);
    Ok(())
}

#[test]
fn deep_recursion_raises_a_script_range_error() -> Result<()> {
    let harness = limited(ExecutionLimits {
        max_call_depth: 64,
        ..ExecutionLimits::default()
    })?;
    let report = harness.run(
        "function down(n) { return down(n + 1); }\
         try { down(0); } catch (e) { console.log(e.name); }",
    );
    assert!(report.fault.is_none(), "unexpected fault: {:?}", report.fault);
    assert_eq!(report.console_lines(), vec!["RangeError"]);
    Ok(())
}

#[test]
fn self_evaluating_source_hits_the_call_depth_limit() -> Result<()> {
    let harness = ExecutionHarness::new(AnalysisConfig::default())?;
    let caught = harness.run("var s = 'eval(s)'; try { eval(s); } catch (e) { console.log(e.name, e.message); }");
    assert!(caught.fault.is_none(), "unexpected fault: {:?}", caught.fault);
    assert_eq!(caught.console_lines(), vec!["RangeError Maximum call stack size exceeded"]);

    let uncaught = harness.run("var s = 'eval(s)'; eval(s);");
    let Some(fault) = uncaught.fault else {
        panic!("expected a thrown fault");
    };
    assert_eq!(fault.kind, FaultKind::Thrown);
    assert!(fault.message.starts_with("RangeError"), "message: {}", fault.message);

    let constructed = harness.run(
        "var f = 'return Function(f)()'; try { Function(f)(); } catch (e) { console.log(e.name); }",
    );
    assert_eq!(constructed.console_lines(), vec!["RangeError"]);
    Ok(())
}

#[test]
fn deeply_nested_source_is_a_parse_error() -> Result<()> {
    let source = format!("var x = {}1{};", "(".repeat(5000), ")".repeat(5000));
    let report = ExecutionHarness::new(AnalysisConfig::default())?.run(&source);
    let Some(fault) = report.fault else {
        panic!("expected a parse fault");
    };
    assert_eq!(fault.kind, FaultKind::Parse);
    Ok(())
}

#[test]
fn oversized_strings_raise_range_errors() -> Result<()> {
    let harness = ExecutionHarness::new(AnalysisConfig::default())?;
    let report = harness.run(
        "function attempt(label, build) {\
           try { build(); console.log(label, 'built'); }\
           catch (e) { console.log(label, e.name, e.message); }\
         }\
         attempt('pad', function () { return 'a'.padStart(200000000); });\
         attempt('padEnd', function () { return 'a'.padEnd(200000000, 'xy'); });\
         attempt('double', function () { var s = 'abcd'; for (var i = 0; i < 27; i++) { s += s; } return s; });\
         attempt('template', function () { var s = 'x'.repeat(60000000); return `${s}${s}`; });\
         attempt('join', function () { var s = 'x'.repeat(60000000); return [s, s].join(''); });\
         attempt('concat', function () { var s = 'x'.repeat(60000000); return s.concat(s); });\
         attempt('json', function () { var s = 'x'.repeat(60000000); return JSON.stringify([s, s]); });\
         attempt('small', function () { return 'a'.padStart(5, '-'); });",
    );
    assert!(report.fault.is_none(), "unexpected fault: {:?}", report.fault);
    assert_eq!(
        report.console_lines(),
        vec![
            "pad RangeError Invalid string length",
            "padEnd RangeError Invalid string length",
            "double RangeError Invalid string length",
            "template RangeError Invalid string length",
            "join RangeError Invalid string length",
            "concat RangeError Invalid string length",
            "json RangeError Invalid string length",
            "small built",
        ]
    );
    Ok(())
}

#[test]
fn oversized_arrays_raise_range_errors() -> Result<()> {
    let report = ExecutionHarness::new(AnalysisConfig::default())?.run(
        "var a = [];\
         try { a.length = 20000001; } catch (e) { console.log(e.name, e.message, a.length); }\
         try { a[20000000] = 1; } catch (e) { console.log(e.name, a.length); }\
         try { new Array(20000001); } catch (e) { console.log(e.name); }\
         a.length = 3;\
         console.log(a.length);",
    );
    assert!(report.fault.is_none(), "unexpected fault: {:?}", report.fault);
    assert_eq!(
        report.console_lines(),
        vec![
            "RangeError Invalid array length 0",
            "RangeError 0",
            "RangeError",
            "3",
        ]
    );
    Ok(())
}

#[test]
fn uncaught_errors_record_the_innermost_host_callee() -> Result<()> {
    let report = ExecutionHarness::new(AnalysisConfig::default())?
        .run("fetch('https://a.test'); JSON.parse('{broken');");
    let Some(fault) = report.fault else {
        panic!("expected a thrown fault");
    };
    assert_eq!(fault.kind, FaultKind::Thrown);
    assert!(fault.message.starts_with("SyntaxError"), "message: {}", fault.message);
    assert_eq!(fault.callee.as_deref(), Some("JSON.parse"));
    assert_eq!(report.verdicts.len(), 1);
    assert!(report.complete);
    Ok(())
}

#[test]
fn callback_errors_are_logged_and_the_run_continues() -> Result<()> {
    let report = ExecutionHarness::new(AnalysisConfig::default())?.run(
        "setTimeout(function () { throw new Error('late'); }, 1);\
         setTimeout(function () { fetch('https://a.test/after'); }, 2);",
    );
    assert!(report.fault.is_none(), "unexpected fault: {:?}", report.fault);
    assert_eq!(report.console_lines(), vec!["Uncaught Error: late"]);
    assert_eq!(report.verdicts.len(), 1);
    Ok(())
}

#[test]
fn wall_clock_limit_aborts_long_runs() -> Result<()> {
    let harness = limited(ExecutionLimits {
        wall_clock: Some(Duration::from_millis(20)),
        ..ExecutionLimits::default()
    })?;
    let report = harness.run("while (true) { Math.abs(-1); }");
    assert!(!report.complete);
    let fault = report.fault.as_ref().map(|fault| fault.kind);
    assert_eq!(fault, Some(FaultKind::Aborted));
    Ok(())
}

#[test]
fn cancellation_from_another_thread_stops_the_run() -> Result<()> {
    let harness = ExecutionHarness::new(AnalysisConfig::default())?;
    let cancel = harness.cancel_handle();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        cancel.cancel();
    });
    let report = harness.run("while (true) { Math.abs(-1); }");
    canceller
        .join()
        .map_err(|_| Error::ScriptRuntime("canceller thread panicked".into()))?;
    assert!(!report.complete);
    assert!(
        report
            .fault
            .as_ref()
            .is_some_and(|fault| fault.message.contains("cancelled"))
    );
    Ok(())
}

#[test]
fn console_capture_is_bounded() -> Result<()> {
    let harness = limited(ExecutionLimits {
        max_console_messages: 3,
        ..ExecutionLimits::default()
    })?;
    let report = harness.run("for (var i = 0; i < 10; i++) { console.log(i); }");
    assert_eq!(report.console_lines(), vec!["7", "8", "9"]);
    assert_eq!(report.console_dropped, 7);
    Ok(())
}

#[test]
fn reports_serialize_to_json() -> Result<()> {
    let report = ExecutionHarness::new(AnalysisConfig::default())?
        .run("window.nope.call(); fetch('https://a.test', { method: 'put', body: 'token=1' });");
    let json = report
        .to_json()
        .map_err(|err| Error::ScriptRuntime(err.to_string()))?;
    assert!(json.contains(r#""sink":"fetch""#));
    assert!(json.contains(r#""method":"PUT""#));
    assert!(json.contains(r#""sensitive_keywords":["token"]"#));
    let summary = report.summary();
    assert_eq!(summary.sinks["fetch"].verdicts, 1);
    assert_eq!(summary.stub_count, report.stub_count);
    Ok(())
}
