use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::runtime_values::{TaintSourceKind, TaintTagId};

/// One `console.*` line captured from the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleMessage {
    pub level: String,
    pub text: String,
}

/// Detection rules evaluated at every sink call, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RuleId {
    #[serde(rename = "excessive_function_calls")]
    CallVolume,
    #[serde(rename = "excessive_taints")]
    TaintVolume,
}

impl RuleId {
    pub const ALL: [RuleId; 2] = [RuleId::CallVolume, RuleId::TaintVolume];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallVolume => "excessive_function_calls",
            Self::TaintVolume => "excessive_taints",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one sink invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Zero-based position in invocation order.
    pub seq: usize,
    pub sink: String,
    pub url: Option<String>,
    pub method: Option<String>,
    /// The destination host differs from the document's host. Relative
    /// URLs are never external.
    pub external: bool,
    /// Crossings that preceded the sink's own crossing.
    pub call_count: u64,
    pub taint_count: u64,
    pub rules: Vec<RuleId>,
    /// `0` benign, `1` suspicious.
    pub status: u8,
    pub evidence: Vec<String>,
    pub arguments: Vec<String>,
    pub taint_tags: Vec<TaintTagId>,
    pub sensitive_keywords: Vec<String>,
}

impl Verdict {
    pub fn is_suspicious(&self) -> bool {
        self.status == 1
    }

    pub fn has_evidence(&self, needle: &str) -> bool {
        self.evidence.iter().any(|line| line.contains(needle))
    }
}

/// Provenance of one minted taint tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaintRecord {
    pub tag: TaintTagId,
    pub source: String,
    pub kind: TaintSourceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// Source calls feeding each other, not (yet) executed.
    Decoding,
    /// Decoded data reached `eval`, `Function` or a string timer.
    DangerousExecution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainStep {
    pub function: String,
    pub severity: u8,
    /// Tag minted by this step; execution steps mint none.
    pub taint_tag: Option<TaintTagId>,
}

/// Lineage of one piece of decoded data, from the source call that first
/// produced it to the code executor that ran it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttackChain {
    pub id: usize,
    pub kind: ChainKind,
    pub steps: Vec<ChainStep>,
    /// Source calls in the chain.
    pub layers: usize,
    /// Highest step severity.
    pub severity: u8,
    pub completed: bool,
    pub reason: Option<String>,
    pub dangerous_keywords: Vec<String>,
}

impl AttackChain {
    pub fn is_multi_layer(&self) -> bool {
        self.layers > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookCategory {
    FunctionCall,
    CryptoOperation,
    NetworkRequest,
}

/// One hooked host call, scored `0..=10`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookEvent {
    pub seq: u64,
    pub category: HookCategory,
    pub name: String,
    pub severity: u8,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Parse,
    Runtime,
    Thrown,
    Aborted,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Parse => "parse",
            Self::Runtime => "runtime",
            Self::Thrown => "thrown",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Top-level failure that ended a run early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionFault {
    pub kind: FaultKind,
    pub message: String,
    pub call_count: u64,
    pub taint_count: u64,
    /// Innermost callee being executed when the fault surfaced.
    pub callee: Option<String>,
}

impl fmt::Display for ExecutionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fault after {} calls and {} taint tags: {}",
            self.kind, self.call_count, self.taint_count, self.message
        )?;
        if let Some(callee) = &self.callee {
            write!(f, " (in {callee})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub verdicts: Vec<Verdict>,
    pub call_count: u64,
    pub taint_count: u64,
    pub stub_count: usize,
    pub stub_paths: Vec<String>,
    /// Minted tag count per taint-source path.
    pub taint_sources: BTreeMap<String, u64>,
    /// Per-tag provenance, capped at `taint_record_limit`.
    pub taint_records: Vec<TaintRecord>,
    pub chains: Vec<AttackChain>,
    pub hook_events: Vec<HookEvent>,
    pub hook_events_dropped: u64,
    pub console: Vec<ConsoleMessage>,
    pub console_dropped: usize,
    pub complete: bool,
    pub fault: Option<ExecutionFault>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkSummary {
    pub verdicts: usize,
    pub max_status: u8,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub sinks: BTreeMap<String, SinkSummary>,
    pub call_count: u64,
    pub taint_count: u64,
    pub stub_count: usize,
    pub suspicious: bool,
    pub external_sinks: usize,
    pub executed_chains: usize,
    pub complete: bool,
}

impl ExecutionReport {
    pub fn is_suspicious(&self) -> bool {
        self.verdicts.iter().any(Verdict::is_suspicious)
    }

    pub fn verdicts_for<'a>(&'a self, sink: &'a str) -> impl Iterator<Item = &'a Verdict> + 'a {
        self.verdicts.iter().filter(move |verdict| verdict.sink == sink)
    }

    /// Chains whose decoded data was executed as code.
    pub fn executed_chains(&self) -> impl Iterator<Item = &AttackChain> + '_ {
        self.chains.iter().filter(|chain| chain.completed)
    }

    pub fn events_at_least(&self, severity: u8) -> impl Iterator<Item = &HookEvent> + '_ {
        self.hook_events.iter().filter(move |event| event.severity >= severity)
    }

    pub fn console_lines(&self) -> Vec<&str> {
        self.console
            .iter()
            .map(|message| message.text.as_str())
            .collect()
    }

    pub fn summary(&self) -> ReportSummary {
        let mut grouped: BTreeMap<String, (usize, u8, BTreeSet<String>)> = BTreeMap::new();
        for verdict in &self.verdicts {
            let entry = grouped.entry(verdict.sink.clone()).or_default();
            entry.0 += 1;
            entry.1 = entry.1.max(verdict.status);
            entry.2.extend(verdict.evidence.iter().cloned());
        }
        let sinks = grouped
            .into_iter()
            .map(|(sink, (verdicts, max_status, evidence))| {
                (
                    sink,
                    SinkSummary {
                        verdicts,
                        max_status,
                        evidence: evidence.into_iter().collect(),
                    },
                )
            })
            .collect();
        ReportSummary {
            sinks,
            call_count: self.call_count,
            taint_count: self.taint_count,
            stub_count: self.stub_count,
            suspicious: self.is_suspicious(),
            external_sinks: self.verdicts.iter().filter(|verdict| verdict.external).count(),
            executed_chains: self.executed_chains().count(),
            complete: self.complete,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(seq: usize, sink: &str, status: u8, evidence: &[&str]) -> Verdict {
        Verdict {
            seq,
            sink: sink.to_string(),
            url: None,
            method: None,
            external: false,
            call_count: 0,
            taint_count: 0,
            rules: Vec::new(),
            status,
            evidence: evidence.iter().map(|line| line.to_string()).collect(),
            arguments: Vec::new(),
            taint_tags: Vec::new(),
            sensitive_keywords: Vec::new(),
        }
    }

    fn report(verdicts: Vec<Verdict>) -> ExecutionReport {
        ExecutionReport {
            verdicts,
            call_count: 12,
            taint_count: 3,
            stub_count: 0,
            stub_paths: Vec::new(),
            taint_sources: BTreeMap::new(),
            taint_records: Vec::new(),
            chains: Vec::new(),
            hook_events: Vec::new(),
            hook_events_dropped: 0,
            console: Vec::new(),
            console_dropped: 0,
            complete: true,
            fault: None,
        }
    }

    #[test]
    fn summary_groups_by_sink_and_keeps_max_status() {
        let report = report(vec![
            verdict(0, "fetch", 0, &[]),
            verdict(1, "fetch", 1, &["high call volume preceding sink"]),
            verdict(2, "navigator.sendBeacon", 0, &[]),
        ]);
        let summary = report.summary();
        assert!(summary.suspicious);
        assert_eq!(summary.sinks["fetch"].verdicts, 2);
        assert_eq!(summary.sinks["fetch"].max_status, 1);
        assert_eq!(summary.sinks["navigator.sendBeacon"].max_status, 0);
        assert_eq!(summary.call_count, 12);
    }

    #[test]
    fn summary_counts_external_sinks_and_executed_chains() {
        let mut outbound = verdict(0, "fetch", 0, &[]);
        outbound.external = true;
        let mut report = report(vec![outbound, verdict(1, "fetch", 0, &[])]);
        let chain = |id, completed| AttackChain {
            id,
            kind: if completed { ChainKind::DangerousExecution } else { ChainKind::Decoding },
            steps: Vec::new(),
            layers: 1,
            severity: 6,
            completed,
            reason: None,
            dangerous_keywords: Vec::new(),
        };
        report.chains = vec![chain(0, false), chain(1, true)];
        let summary = report.summary();
        assert_eq!(summary.external_sinks, 1);
        assert_eq!(summary.executed_chains, 1);
        assert_eq!(report.executed_chains().map(|chain| chain.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn rules_serialize_with_metadata_names() -> serde_json::Result<()> {
        let mut flagged = verdict(0, "fetch", 1, &[]);
        flagged.rules = vec![RuleId::CallVolume, RuleId::TaintVolume];
        let json = report(vec![flagged]).to_json()?;
        assert!(json.contains(r#""rules":["excessive_function_calls","excessive_taints"]"#));
        assert!(json.contains(r#""complete":true"#));
        Ok(())
    }

    #[test]
    fn fault_display_carries_counters() {
        let fault = ExecutionFault {
            kind: FaultKind::Thrown,
            message: "TypeError: boom".into(),
            call_count: 4,
            taint_count: 1,
            callee: Some("window.run".into()),
        };
        assert_eq!(
            fault.to_string(),
            "thrown fault after 4 calls and 1 taint tags: TypeError: boom (in window.run)"
        );
    }
}
