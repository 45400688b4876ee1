use super::*;

const SENSITIVE_KEYWORDS: &[&str] = &[
    "password",
    "passwd",
    "token",
    "auth",
    "credential",
    "cookie",
    "session",
    "secret",
    "apikey",
    "api_key",
    "credit",
    "ssn",
];

/// Everything captured at the moment a sink is invoked.
#[derive(Debug, Clone, Default)]
pub(crate) struct SinkObservation {
    pub(crate) sink: String,
    pub(crate) url: Option<String>,
    pub(crate) method: Option<String>,
    pub(crate) preceding_calls: u64,
    pub(crate) taint_count: u64,
    /// Full argument renderings; truncated when stored in the verdict.
    pub(crate) arguments: Vec<String>,
    pub(crate) taint: TaintSet,
}

pub(crate) struct SinkMonitor {
    call_threshold: u64,
    taint_threshold: u64,
    combination: RuleCombination,
    max_arg_preview: usize,
    document_host: Option<String>,
    verdicts: Vec<Verdict>,
}

impl SinkMonitor {
    pub(crate) fn new(config: &AnalysisConfig) -> Self {
        Self {
            call_threshold: u64::try_from(config.call_volume_threshold).unwrap_or(0),
            taint_threshold: u64::try_from(config.taint_volume_threshold).unwrap_or(0),
            combination: config.rule_combination,
            max_arg_preview: config.max_arg_preview,
            document_host: destination_host(&config.document_url),
            verdicts: Vec::new(),
        }
    }

    fn rule_fires(&self, rule: RuleId, observation: &SinkObservation) -> Option<String> {
        match rule {
            RuleId::CallVolume => (observation.preceding_calls >= self.call_threshold).then(|| {
                format!(
                    "high call volume preceding sink ({} calls >= {})",
                    observation.preceding_calls, self.call_threshold
                )
            }),
            RuleId::TaintVolume => (observation.taint_count >= self.taint_threshold).then(|| {
                format!(
                    "high taint volume preceding sink ({} taint tags >= {})",
                    observation.taint_count, self.taint_threshold
                )
            }),
        }
    }

    /// Appends exactly one verdict for the observed sink call.
    pub(crate) fn evaluate(&mut self, observation: SinkObservation) -> &Verdict {
        let mut rules = Vec::new();
        let mut evidence = Vec::new();
        for rule in RuleId::ALL {
            if let Some(line) = self.rule_fires(rule, &observation) {
                rules.push(rule);
                evidence.push(line);
            }
        }
        let suspicious = match self.combination {
            RuleCombination::Any => !rules.is_empty(),
            RuleCombination::All => rules.len() == RuleId::ALL.len(),
        };

        let sensitive_keywords = find_sensitive_keywords(&observation.arguments);
        for keyword in &sensitive_keywords {
            evidence.push(format!("sensitive keyword '{keyword}' in request data"));
        }

        let external = observation
            .url
            .as_deref()
            .and_then(destination_host)
            .is_some_and(|host| self.document_host.as_deref() != Some(host.as_str()));
        let verdict = Verdict {
            seq: self.verdicts.len(),
            sink: observation.sink,
            url: observation.url,
            method: observation.method,
            external,
            call_count: observation.preceding_calls,
            taint_count: observation.taint_count,
            rules,
            status: u8::from(suspicious),
            evidence,
            arguments: observation
                .arguments
                .iter()
                .map(|text| truncate_preview(text, self.max_arg_preview))
                .collect(),
            taint_tags: observation.taint.iter().collect(),
            sensitive_keywords,
        };
        if verdict.is_suspicious() {
            tracing::warn!(
                sink = %verdict.sink,
                url = verdict.url.as_deref().unwrap_or(""),
                calls = verdict.call_count,
                taints = verdict.taint_count,
                "suspicious sink invocation"
            );
        } else {
            tracing::debug!(sink = %verdict.sink, "benign sink invocation");
        }
        self.verdicts.push(verdict);
        let last = self.verdicts.len() - 1;
        &self.verdicts[last]
    }

    #[cfg(test)]
    pub(crate) fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    pub(crate) fn take_verdicts(&mut self) -> Vec<Verdict> {
        std::mem::take(&mut self.verdicts)
    }
}

fn find_sensitive_keywords(arguments: &[String]) -> Vec<String> {
    let haystack = arguments.join("\n").to_ascii_lowercase();
    SENSITIVE_KEYWORDS
        .iter()
        .filter(|keyword| haystack.contains(*keyword))
        .map(|keyword| keyword.to_string())
        .collect()
}

/// Lowercased host of an absolute or protocol-relative URL, without port or
/// a leading `www.`. Relative and scheme-only URLs (`data:`, `blob:`) have
/// no destination host.
pub(crate) fn destination_host(url: &str) -> Option<String> {
    let url = url.trim();
    let rest = match url.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() && !scheme.contains(['/', '?', '#']) => rest,
        _ => url.strip_prefix("//")?,
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    };
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    (!host.is_empty()).then_some(host)
}

pub(crate) fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
