//! Deterministic JavaScript triage runtime.
//!
//! A script is executed against an emulated browser host. Unimplemented host
//! APIs resolve to inert fallback stubs instead of failing, every function
//! boundary crossing is counted, values produced by decode/encode/synthesis
//! primitives carry taint tags, and each outbound network sink produces a
//! [`Verdict`] from the counters observed just before it fired. Decoded data
//! that ends up executed as code is reported as an [`AttackChain`].
//!
//! ```no_run
//! use script_sentinel::{AnalysisConfig, ExecutionHarness};
//!
//! let harness = ExecutionHarness::new(AnalysisConfig::default())?;
//! let report = harness.run("fetch('https://example.net/collect', { method: 'POST' });");
//! assert_eq!(report.verdicts.len(), 1);
//! # Ok::<(), script_sentinel::Error>(())
//! ```

use std::error::Error as StdError;
use std::fmt;

mod config;
mod core_impl;
mod harness_api;
mod js_regex;
mod report;
mod runtime_state;
mod runtime_values;
mod script_ast;

pub use config::{
    AnalysisConfig, BrowserProfile, CancelHandle, ExecutionLimits, HostManifest, RuleCombination,
};
pub use harness_api::ExecutionHarness;
pub use report::{
    AttackChain, ChainKind, ChainStep, ConsoleMessage, ExecutionFault, ExecutionReport, FaultKind,
    HookCategory, HookEvent, ReportSummary, RuleId, SinkSummary, TaintRecord, Verdict,
};
pub use runtime_values::{IdentifierPath, PathSegment, TaintSourceKind, TaintTagId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ScriptParse(String),
    ScriptRuntime(String),
    ScriptThrown(ThrownValue),
    Config(String),
    Aborted(AbortReason),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScriptParse(msg) => write!(f, "script parse error: {msg}"),
            Self::ScriptRuntime(msg) => write!(f, "script runtime error: {msg}"),
            Self::ScriptThrown(value) => write!(f, "uncaught exception: {}", value.as_string()),
            Self::Config(msg) => write!(f, "invalid analysis config: {msg}"),
            Self::Aborted(reason) => write!(f, "execution aborted: {reason}"),
        }
    }
}

impl StdError for Error {}

/// A value thrown by script code that escaped every `try` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrownValue {
    value: runtime_values::Value,
}

impl ThrownValue {
    pub(crate) fn new(value: runtime_values::Value) -> Self {
        Self { value }
    }

    pub(crate) fn value(&self) -> &runtime_values::Value {
        &self.value
    }

    pub(crate) fn into_value(self) -> runtime_values::Value {
        self.value
    }

    /// Renders the thrown value the way a browser console would print it.
    pub fn as_string(&self) -> String {
        core_impl::runtime::describe_thrown(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    StepLimit(u64),
    TimerLimit(usize),
    WallClock(std::time::Duration),
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepLimit(limit) => write!(f, "evaluation step limit of {limit} exceeded"),
            Self::TimerLimit(limit) => write!(f, "timer step limit of {limit} exceeded"),
            Self::WallClock(limit) => write!(f, "wall clock limit of {}ms exceeded", limit.as_millis()),
            Self::Cancelled => write!(f, "cancelled by caller"),
        }
    }
}
