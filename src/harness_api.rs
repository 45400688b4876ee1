use crate::config::{AnalysisConfig, CancelHandle};
use crate::core_impl::runtime::{Runtime, describe_thrown};
use crate::report::{ExecutionFault, ExecutionReport, FaultKind};
use crate::{Error, Result};

/// Runs scripts against a validated configuration. Every [`run`] builds a
/// fresh runtime, so counters, taint and stubs never leak between runs.
///
/// [`run`]: ExecutionHarness::run
#[derive(Debug, Clone)]
pub struct ExecutionHarness {
    config: AnalysisConfig,
}

impl ExecutionHarness {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Handle that aborts the in-flight run from another thread. The flag
    /// stays raised until [`CancelHandle::reset`] is called.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.config.cancel.clone()
    }

    /// Executes `script` to completion, then drains microtasks, lifecycle
    /// events and timers. Faults end the run but never discard verdicts
    /// already produced.
    pub fn run(&self, script: &str) -> ExecutionReport {
        tracing::info!(bytes = script.len(), "script run started");
        let mut rt = Runtime::new(&self.config);
        let outcome = rt.run_script(script).and_then(|()| rt.run_event_loop());
        let fault = outcome.err().map(|err| fault_from_error(&rt, err));
        let report = collect_report(&mut rt, fault);
        tracing::info!(
            verdicts = report.verdicts.len(),
            chains = report.chains.len(),
            calls = report.call_count,
            taints = report.taint_count,
            stubs = report.stub_count,
            complete = report.complete,
            "script run finished"
        );
        report
    }
}

fn fault_from_error(rt: &Runtime, err: Error) -> ExecutionFault {
    let (kind, message) = match err {
        Error::ScriptParse(message) => (FaultKind::Parse, message),
        Error::ScriptRuntime(message) | Error::Config(message) => (FaultKind::Runtime, message),
        Error::ScriptThrown(thrown) => (FaultKind::Thrown, describe_thrown(thrown.value())),
        Error::Aborted(reason) => {
            tracing::warn!(%reason, calls = rt.calls.count(), "script run aborted");
            (FaultKind::Aborted, reason.to_string())
        }
    };
    ExecutionFault {
        kind,
        message,
        call_count: rt.calls.count(),
        taint_count: rt.taint.count(),
        callee: rt.innermost_callee(),
    }
}

fn collect_report(rt: &mut Runtime, fault: Option<ExecutionFault>) -> ExecutionReport {
    let complete = !matches!(
        fault,
        Some(ExecutionFault {
            kind: FaultKind::Aborted,
            ..
        })
    );
    ExecutionReport {
        verdicts: rt.sinks.take_verdicts(),
        call_count: rt.calls.count(),
        taint_count: rt.taint.count(),
        stub_count: rt.fallback.stub_count(),
        stub_paths: rt.fallback.stub_paths(),
        taint_sources: rt.taint.per_source().clone(),
        taint_records: rt.taint.take_records(),
        chains: rt.chains.take_chains(),
        hook_events: rt.events.take_events(),
        hook_events_dropped: rt.events.dropped(),
        console: rt.console.messages.iter().cloned().collect(),
        console_dropped: rt.console.dropped,
        complete,
        fault,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionLimits;

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let config = AnalysisConfig::default().with_call_volume_threshold(-1);
        assert!(matches!(ExecutionHarness::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn parse_errors_produce_an_empty_report() -> Result<()> {
        let harness = ExecutionHarness::new(AnalysisConfig::default())?;
        let report = harness.run("fetch('https://a.test'); var = ;");
        assert!(report.verdicts.is_empty());
        let fault = report.fault.as_ref().map(|fault| fault.kind);
        assert_eq!(fault, Some(FaultKind::Parse));
        assert!(report.complete);
        assert_eq!(report.call_count, 0);
        Ok(())
    }

    #[test]
    fn thrown_errors_keep_earlier_verdicts() -> Result<()> {
        let harness = ExecutionHarness::new(AnalysisConfig::default())?;
        let report = harness.run("fetch('https://a.test/x'); throw new TypeError('boom');");
        assert_eq!(report.verdicts.len(), 1);
        let Some(fault) = report.fault else {
            panic!("expected a fault");
        };
        assert_eq!(fault.kind, FaultKind::Thrown);
        assert_eq!(fault.message, "TypeError: boom");
        assert_eq!(fault.call_count, report.call_count);
        Ok(())
    }

    #[test]
    fn step_limit_marks_the_run_incomplete() -> Result<()> {
        let limits = ExecutionLimits {
            max_steps: 5_000,
            ..ExecutionLimits::default()
        };
        let harness = ExecutionHarness::new(AnalysisConfig::default().with_limits(limits))?;
        let report = harness.run("fetch('https://a.test'); while (true) {}");
        assert!(!report.complete);
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.fault.map(|fault| fault.kind), Some(FaultKind::Aborted));
        Ok(())
    }

    #[test]
    fn runs_do_not_share_state() -> Result<()> {
        let harness = ExecutionHarness::new(AnalysisConfig::default())?;
        let script = "atob('YQ=='); navigator.plugins.refresh(); fetch('https://a.test');";
        let first = harness.run(script);
        let second = harness.run(script);
        assert_eq!(first, second);
        assert_eq!(first.taint_count, 1);
        assert_eq!(first.verdicts[0].seq, 0);
        Ok(())
    }

    #[test]
    fn cancelled_runs_stop_at_the_next_interception_point() -> Result<()> {
        let harness = ExecutionHarness::new(AnalysisConfig::default())?;
        let cancel = harness.cancel_handle();
        cancel.cancel();
        let report = harness.run("for (var i = 0; i < 10; i++) { fetch('https://a.test'); }");
        assert!(!report.complete);
        assert!(report.verdicts.is_empty());
        cancel.reset();
        assert!(harness.run("fetch('https://a.test');").complete);
        Ok(())
    }
}
