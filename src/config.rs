use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::runtime_values::{IdentifierPath, TaintSourceKind, canonical_name};
use crate::{Error, Result};

pub const DEFAULT_CALL_VOLUME_THRESHOLD: i64 = 1000;
pub const DEFAULT_TAINT_VOLUME_THRESHOLD: i64 = 100;

/// How the volume rules combine into a verdict status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCombination {
    /// Any triggered rule marks the sink call suspicious.
    #[default]
    Any,
    /// Every rule must trigger.
    All,
}

/// Navigator, screen and document values exposed to the script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub app_version: String,
    pub app_name: String,
    pub app_code_name: String,
    pub platform: String,
    pub vendor: String,
    pub product: String,
    pub language: String,
    pub languages: Vec<String>,
    pub cookie_enabled: bool,
    pub do_not_track: bool,
    pub on_line: bool,
    pub webdriver: bool,
    pub hardware_concurrency: u32,
    pub device_memory: u32,
    pub max_touch_points: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub screen_avail_width: u32,
    pub screen_avail_height: u32,
    pub color_depth: u32,
    pub device_pixel_ratio: f64,
    pub inner_width: u32,
    pub inner_height: u32,
    pub document_title: String,
    pub document_referrer: String,
    pub document_cookie: String,
    pub character_set: String,
}

impl Default for BrowserProfile {
    fn default() -> Self {
        Self::desktop()
    }
}

impl BrowserProfile {
    /// Chrome 120 on 64-bit Windows.
    pub fn desktop() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            app_version: "5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            app_name: "Netscape".to_string(),
            app_code_name: "Mozilla".to_string(),
            platform: "Win32".to_string(),
            vendor: "Google Inc.".to_string(),
            product: "Gecko".to_string(),
            language: "en-US".to_string(),
            languages: vec!["en-US".to_string(), "en".to_string()],
            cookie_enabled: true,
            do_not_track: false,
            on_line: true,
            webdriver: false,
            hardware_concurrency: 8,
            device_memory: 8,
            max_touch_points: 0,
            screen_width: 1920,
            screen_height: 1080,
            screen_avail_width: 1920,
            screen_avail_height: 1040,
            color_depth: 24,
            device_pixel_ratio: 1.0,
            inner_width: 1920,
            inner_height: 1080,
            document_title: "Example Page".to_string(),
            document_referrer: String::new(),
            document_cookie: String::new(),
            character_set: "UTF-8".to_string(),
        }
    }

    /// Chrome on Android.
    pub fn mobile() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36".to_string(),
            app_version: "5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36".to_string(),
            platform: "Linux armv8l".to_string(),
            hardware_concurrency: 8,
            device_memory: 4,
            max_touch_points: 5,
            screen_width: 412,
            screen_height: 915,
            screen_avail_width: 412,
            screen_avail_height: 915,
            device_pixel_ratio: 2.625,
            inner_width: 412,
            inner_height: 839,
            ..Self::desktop()
        }
    }
}

/// Which built-in host APIs are implemented. Every built-in is implemented
/// unless withdrawn; withdrawn paths resolve through the fallback layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostManifest {
    pub withdrawn: BTreeSet<String>,
}

impl HostManifest {
    pub fn withdraw(mut self, path: &str) -> Self {
        self.withdrawn.insert(canonical_name(path.trim()).to_string());
        self
    }

    /// False when `path` or any of its prefixes has been withdrawn.
    pub fn is_implemented(&self, path: &str) -> bool {
        if self.withdrawn.is_empty() {
            return true;
        }
        let path = canonical_name(path);
        if self.withdrawn.contains(path) {
            return false;
        }
        path.match_indices('.')
            .all(|(idx, _)| !self.withdrawn.contains(&path[..idx]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    pub max_steps: u64,
    pub max_call_depth: usize,
    pub timer_step_limit: usize,
    #[serde(with = "duration_millis")]
    pub wall_clock: Option<Duration>,
    pub max_console_messages: usize,
    /// Hook events kept for the report; older ones are evicted.
    pub max_hook_events: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: 5_000_000,
            max_call_depth: 256,
            timer_step_limit: 10_000,
            wall_clock: None,
            max_console_messages: 1000,
            max_hook_events: 10_000,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Shared flag that aborts a running analysis from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub(crate) fn default_taint_sources() -> BTreeMap<String, TaintSourceKind> {
    let mut sources = BTreeMap::new();
    for name in ["atob", "unescape", "decodeURI", "decodeURIComponent"] {
        sources.insert(name.to_string(), TaintSourceKind::Decode);
    }
    for name in ["btoa", "escape", "encodeURI", "encodeURIComponent"] {
        sources.insert(name.to_string(), TaintSourceKind::Encode);
    }
    for name in ["String.fromCharCode", "String.fromCodePoint"] {
        sources.insert(name.to_string(), TaintSourceKind::CharSynthesis);
    }
    sources
}

pub(crate) fn default_sinks() -> BTreeSet<String> {
    [
        "fetch",
        "XMLHttpRequest.prototype.send",
        "navigator.sendBeacon",
        "WebSocket.prototype.send",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub call_volume_threshold: i64,
    pub taint_volume_threshold: i64,
    pub rule_combination: RuleCombination,
    pub taint_sources: BTreeMap<String, TaintSourceKind>,
    pub sinks: BTreeSet<String>,
    pub host: HostManifest,
    pub browser: BrowserProfile,
    pub document_url: String,
    pub limits: ExecutionLimits,
    pub max_arg_preview: usize,
    pub taint_record_limit: usize,
    pub rng_seed: u64,
    #[serde(skip)]
    pub cancel: CancelHandle,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            call_volume_threshold: DEFAULT_CALL_VOLUME_THRESHOLD,
            taint_volume_threshold: DEFAULT_TAINT_VOLUME_THRESHOLD,
            rule_combination: RuleCombination::Any,
            taint_sources: default_taint_sources(),
            sinks: default_sinks(),
            host: HostManifest::default(),
            browser: BrowserProfile::default(),
            document_url: "https://example.com/".to_string(),
            limits: ExecutionLimits::default(),
            max_arg_preview: 240,
            taint_record_limit: 50_000,
            rng_seed: 0x2545_f491_4f6c_dd1d,
            cancel: CancelHandle::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parses a JSON manifest. Missing fields keep their defaults; the result
    /// is validated before it is returned.
    pub fn from_json(src: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(src)
            .map_err(|err| Error::Config(format!("malformed analysis manifest: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_call_volume_threshold(mut self, threshold: i64) -> Self {
        self.call_volume_threshold = threshold;
        self
    }

    pub fn with_taint_volume_threshold(mut self, threshold: i64) -> Self {
        self.taint_volume_threshold = threshold;
        self
    }

    pub fn with_rule_combination(mut self, combination: RuleCombination) -> Self {
        self.rule_combination = combination;
        self
    }

    pub fn with_taint_source(mut self, path: &str, kind: TaintSourceKind) -> Self {
        self.taint_sources.insert(path.to_string(), kind);
        self
    }

    pub fn without_taint_source(mut self, path: &str) -> Self {
        let wanted = canonical_name(path);
        self.taint_sources
            .retain(|name, _| canonical_name(name) != wanted);
        self
    }

    pub fn with_sink(mut self, path: &str) -> Self {
        self.sinks.insert(path.to_string());
        self
    }

    pub fn without_sink(mut self, path: &str) -> Self {
        let wanted = canonical_name(path);
        self.sinks.retain(|name| canonical_name(name) != wanted);
        self
    }

    pub fn with_host_manifest(mut self, host: HostManifest) -> Self {
        self.host = host;
        self
    }

    pub fn with_browser_profile(mut self, browser: BrowserProfile) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_document_url(mut self, url: &str) -> Self {
        self.document_url = url.to_string();
        self
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_arg_preview(mut self, chars: usize) -> Self {
        self.max_arg_preview = chars;
        self
    }

    pub fn with_taint_record_limit(mut self, limit: usize) -> Self {
        self.taint_record_limit = limit;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.call_volume_threshold < 0 {
            return Err(Error::Config(format!(
                "call_volume_threshold must not be negative (got {})",
                self.call_volume_threshold
            )));
        }
        if self.taint_volume_threshold < 0 {
            return Err(Error::Config(format!(
                "taint_volume_threshold must not be negative (got {})",
                self.taint_volume_threshold
            )));
        }
        if self.limits.max_steps == 0 {
            return Err(Error::Config("limits.max_steps must be positive".into()));
        }
        if self.limits.max_call_depth == 0 {
            return Err(Error::Config(
                "limits.max_call_depth must be positive".into(),
            ));
        }

        let mut source_names = BTreeSet::new();
        for name in self.taint_sources.keys() {
            let path = IdentifierPath::parse(name)
                .map_err(|err| Error::Config(format!("taint source: {err}")))?;
            source_names.insert(path.canonical().to_string());
        }
        for name in &self.sinks {
            let path = IdentifierPath::parse(name)
                .map_err(|err| Error::Config(format!("sink: {err}")))?;
            if source_names.contains(path.canonical()) {
                return Err(Error::Config(format!(
                    "'{name}' is registered as both a sink and a taint source"
                )));
            }
        }
        for name in &self.host.withdrawn {
            IdentifierPath::parse(name)
                .map_err(|err| Error::Config(format!("host manifest: {err}")))?;
        }
        if self.document_url.split_once("://").is_none() {
            return Err(Error::Config(format!(
                "document_url '{}' is not an absolute URL",
                self.document_url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() -> Result<()> {
        let config = AnalysisConfig::default();
        config.validate()?;
        assert_eq!(config.call_volume_threshold, 1000);
        assert_eq!(config.taint_volume_threshold, 100);
        assert_eq!(config.rule_combination, RuleCombination::Any);
        assert_eq!(
            config.taint_sources.get("String.fromCharCode"),
            Some(&TaintSourceKind::CharSynthesis)
        );
        assert_eq!(
            config.taint_sources.get("String.fromCodePoint"),
            Some(&TaintSourceKind::CharSynthesis)
        );
        assert_eq!(config.limits.max_hook_events, 10_000);
        assert!(config.sinks.contains("fetch"));
        assert!(!config.taint_sources.contains_key("eval"));
        Ok(())
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let config = AnalysisConfig::default().with_call_volume_threshold(-1);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn sink_and_source_overlap_is_rejected() {
        let config = AnalysisConfig::default().with_sink("window.atob");
        assert!(matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("both")));
    }

    #[test]
    fn invalid_paths_are_rejected() {
        let config = AnalysisConfig::default().with_sink("fetch..x");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        let config = AnalysisConfig::default().with_taint_source("", TaintSourceKind::Custom);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = AnalysisConfig::default().with_limits(ExecutionLimits {
            max_call_depth: 0,
            ..ExecutionLimits::default()
        });
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn json_manifest_overrides_defaults() -> Result<()> {
        let config = AnalysisConfig::from_json(
            r#"{
                "call_volume_threshold": 50,
                "rule_combination": "all",
                "sinks": ["fetch", "navigator.sendBeacon", "exfil"],
                "host": { "withdrawn": ["atob"] },
                "limits": { "wall_clock": 2000 }
            }"#,
        )?;
        assert_eq!(config.call_volume_threshold, 50);
        assert_eq!(config.taint_volume_threshold, 100);
        assert_eq!(config.rule_combination, RuleCombination::All);
        assert!(config.sinks.contains("exfil"));
        assert!(!config.host.is_implemented("window.atob"));
        assert_eq!(config.limits.wall_clock, Some(Duration::from_millis(2000)));
        assert_eq!(config.limits.max_steps, 5_000_000);
        Ok(())
    }

    #[test]
    fn json_manifest_with_negative_threshold_is_a_config_error() {
        let result = AnalysisConfig::from_json(r#"{ "taint_volume_threshold": -5 }"#);
        assert!(matches!(result, Err(Error::Config(_))));
        let result = AnalysisConfig::from_json("{ not json");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn withdrawn_prefix_covers_members() {
        let host = HostManifest::default().withdraw("navigator");
        assert!(!host.is_implemented("navigator.sendBeacon"));
        assert!(!host.is_implemented("window.navigator"));
        assert!(host.is_implemented("navigatorExtra"));
        assert!(host.is_implemented("fetch"));
    }

    #[test]
    fn cancel_handle_is_shared_between_clones() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
        handle.reset();
        assert!(!clone.is_cancelled());
    }
}
