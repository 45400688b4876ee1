use super::*;

mod call_interceptor;
mod chain_detector;
mod hook_events;
mod sink_monitor;
mod taint_tracker;

pub(crate) use call_interceptor::CallInterceptor;
pub(crate) use chain_detector::{ChainDetector, EXECUTION_SEVERITY, is_code_executor};
pub(crate) use hook_events::HookEventLog;
pub(crate) use sink_monitor::{SinkMonitor, SinkObservation, truncate_preview};
pub(crate) use taint_tracker::TaintTracker;

/// Canonicalized source and sink manifests used at every crossing.
pub(crate) struct InterceptionManifest {
    sources: HashMap<String, TaintSourceKind>,
    sinks: BTreeSet<String>,
}

impl InterceptionManifest {
    pub(crate) fn from_config(config: &AnalysisConfig) -> Self {
        let sources = config
            .taint_sources
            .iter()
            .map(|(name, kind)| (canonical_name(name.trim()).to_string(), *kind))
            .collect();
        let sinks = config
            .sinks
            .iter()
            .map(|name| canonical_name(name.trim()).to_string())
            .collect();
        Self { sources, sinks }
    }

    pub(crate) fn source_kind(&self, name: &str) -> Option<TaintSourceKind> {
        self.sources.get(canonical_name(name)).copied()
    }

    pub(crate) fn is_sink(&self, name: &str) -> bool {
        self.sinks.contains(canonical_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_matches_global_aliases() {
        let config = AnalysisConfig::default().with_sink("window.exfil");
        let manifest = InterceptionManifest::from_config(&config);
        assert!(manifest.is_sink("exfil"));
        assert!(manifest.is_sink("self.fetch"));
        assert!(!manifest.is_sink("fetchLater"));
        assert_eq!(
            manifest.source_kind("globalThis.atob"),
            Some(TaintSourceKind::Decode)
        );
        assert_eq!(manifest.source_kind("eval"), None);
    }
}
