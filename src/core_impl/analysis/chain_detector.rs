use super::*;

const DANGEROUS_KEYWORDS: &[&str] = &["eval", "script", "function", "ActiveX"];
const CODE_EXECUTORS: &[&str] = &["eval", "Function", "setTimeout", "setInterval"];
const MAX_CHAINS: usize = 1000;
const KEYWORD_ESCALATION: u8 = 3;
pub(crate) const EXECUTION_SEVERITY: u8 = 10;

/// Callees that run a string argument as code.
pub(crate) fn is_code_executor(name: &str) -> bool {
    CODE_EXECUTORS.contains(&canonical_name(name))
}

/// Base severity of a source call, before keyword escalation.
fn source_severity(kind: TaintSourceKind) -> u8 {
    match kind {
        TaintSourceKind::Decode | TaintSourceKind::Custom => 6,
        TaintSourceKind::Encode | TaintSourceKind::CharSynthesis => 5,
    }
}

fn dangerous_keywords(text: &str) -> Vec<String> {
    DANGEROUS_KEYWORDS
        .iter()
        .filter(|keyword| text.contains(*keyword))
        .map(|keyword| keyword.to_string())
        .collect()
}

/// Follows tagged data from the source call that first produced it,
/// through further source calls, to a code executor.
///
/// Decode, encode and custom sources start a chain when their input carries
/// no chain's tag; char synthesis only extends existing chains.
#[derive(Default)]
pub(crate) struct ChainDetector {
    chains: Vec<AttackChain>,
    owners: HashMap<TaintTagId, usize>,
}

impl ChainDetector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Latest open chain owning any of `taint`'s tags.
    fn open_chain(&self, taint: &TaintSet) -> Option<usize> {
        taint
            .iter()
            .filter_map(|tag| self.owners.get(&tag).copied())
            .filter(|idx| !self.chains[*idx].completed)
            .max()
    }

    /// A source call minted `minted` for `output` from arguments carrying
    /// `input`. Returns the step severity.
    pub(crate) fn observe_source(
        &mut self,
        name: &str,
        kind: TaintSourceKind,
        input: &TaintSet,
        minted: TaintTagId,
        output: &str,
    ) -> u8 {
        let keywords = dangerous_keywords(output);
        let mut severity = source_severity(kind);
        if !keywords.is_empty() {
            severity += KEYWORD_ESCALATION;
        }
        let idx = match self.open_chain(input) {
            Some(idx) => idx,
            None if kind == TaintSourceKind::CharSynthesis => return severity,
            None if self.chains.len() >= MAX_CHAINS => return severity,
            None => {
                self.chains.push(AttackChain {
                    id: self.chains.len(),
                    kind: ChainKind::Decoding,
                    steps: Vec::new(),
                    layers: 0,
                    severity: 0,
                    completed: false,
                    reason: None,
                    dangerous_keywords: Vec::new(),
                });
                tracing::debug!(chain = self.chains.len() - 1, source = name, "chain started");
                self.chains.len() - 1
            }
        };
        let chain = &mut self.chains[idx];
        chain.steps.push(ChainStep {
            function: name.to_string(),
            severity,
            taint_tag: Some(minted),
        });
        chain.layers += 1;
        chain.severity = chain.severity.max(severity);
        for keyword in keywords {
            if !chain.dangerous_keywords.contains(&keyword) {
                chain.dangerous_keywords.push(keyword);
            }
        }
        if chain.layers > 1 {
            tracing::debug!(chain = idx, layers = chain.layers, source = name, "multi-layer decoding");
        }
        self.owners.insert(minted, idx);
        severity
    }

    /// A code executor ran a string carrying `code`. Completes the chain
    /// that owns it; returns that chain's id.
    pub(crate) fn observe_execution(&mut self, name: &str, code: &TaintSet) -> Option<usize> {
        let Some(idx) = self.open_chain(code) else {
            if !code.is_empty() {
                tracing::debug!(executor = name, "tainted code outside any chain");
            }
            return None;
        };
        let chain = &mut self.chains[idx];
        chain.steps.push(ChainStep {
            function: name.to_string(),
            severity: EXECUTION_SEVERITY,
            taint_tag: None,
        });
        chain.kind = ChainKind::DangerousExecution;
        chain.severity = EXECUTION_SEVERITY;
        chain.completed = true;
        chain.reason = Some(format!("dangerous function '{name}' executed with decoded input"));
        tracing::warn!(chain = idx, executor = name, layers = chain.layers, "decoded data executed as code");
        Some(idx)
    }

    pub(crate) fn take_chains(&mut self) -> Vec<AttackChain> {
        self.owners.clear();
        std::mem::take(&mut self.chains)
    }
}
