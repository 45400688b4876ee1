use super::analysis::{
    CallInterceptor, ChainDetector, EXECUTION_SEVERITY, HookEventLog, InterceptionManifest,
    SinkMonitor, SinkObservation, TaintTracker, is_code_executor, truncate_preview,
};
use super::parser::{parse_function_constructor, parse_script};
use super::*;

mod builtins;
mod expression_eval;
mod function_calls;
mod host_environment;
mod interception;
mod operators;
mod promises;
mod proxy_fallback;
mod scheduler;
mod scope;
mod statement_execution;

pub(crate) use expression_eval::syntactic_path;
pub(crate) use function_calls::CallSite;
pub(crate) use host_environment::{HostEnvironmentEmulator, Realm};
pub(crate) use proxy_fallback::{ProxyFallbackLayer, array_index};
pub(crate) use scope::{Scope, ScopeKind, ScopeRef};

pub(crate) enum ExecFlow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

#[derive(Default)]
pub(crate) struct DocumentState {
    pub(crate) cookies: Vec<(String, JsString)>,
    pub(crate) elements: Vec<ObjectRef>,
    pub(crate) written: Vec<JsString>,
}

/// One isolated execution of one script: the emulated host, the fallback
/// layer and every interception counter live here and nowhere else.
pub(crate) struct Runtime {
    pub(crate) config: AnalysisConfig,
    pub(crate) realm: Realm,
    pub(crate) global: ObjectRef,
    pub(crate) global_scope: ScopeRef,
    pub(crate) fallback: ProxyFallbackLayer,
    pub(crate) calls: CallInterceptor,
    pub(crate) taint: TaintTracker,
    pub(crate) sinks: SinkMonitor,
    pub(crate) chains: ChainDetector,
    pub(crate) events: HookEventLog,
    pub(crate) manifest: InterceptionManifest,
    pub(crate) scheduler: SchedulerState,
    pub(crate) console: ConsoleState,
    pub(crate) budget: ExecutionBudget,
    pub(crate) rng_state: u64,
    pub(crate) listeners: Vec<(String, Value)>,
    pub(crate) document: DocumentState,
    /// Canonical names of the callees currently executing, innermost last.
    pub(crate) callee_stack: Vec<String>,
}

impl Runtime {
    pub(crate) fn new(config: &AnalysisConfig) -> Self {
        let realm = Realm::new();
        let global = ObjectValue::host(
            IdentifierPath::root("window"),
            Some(realm.object_proto.clone()),
        )
        .with_kind(ObjectKind::Global)
        .into_ref();
        let global_scope = Scope::global(Value::Object(global.clone()));
        let mut runtime = Self {
            config: config.clone(),
            realm,
            global,
            global_scope,
            fallback: ProxyFallbackLayer::new(),
            calls: CallInterceptor::new(),
            taint: TaintTracker::new(config.taint_record_limit),
            sinks: SinkMonitor::new(config),
            chains: ChainDetector::new(),
            events: HookEventLog::new(config.limits.max_hook_events),
            manifest: InterceptionManifest::from_config(config),
            scheduler: SchedulerState::new(config.limits.timer_step_limit),
            console: ConsoleState::new(config.limits.max_console_messages),
            budget: ExecutionBudget::new(&config.limits, config.cancel.clone()),
            rng_state: config.rng_seed.max(1),
            listeners: Vec::new(),
            document: DocumentState::default(),
            callee_stack: Vec::new(),
        };
        HostEnvironmentEmulator::new(&mut runtime).install();
        runtime
    }

    /// Parses and runs top-level script code against the global scope.
    pub(crate) fn run_script(&mut self, src: &str) -> Result<()> {
        let scope = self.global_scope.clone();
        stacker::grow(32 * 1024 * 1024, || {
            let program = parse_script(src)?;
            self.eval_program(&program, &scope).map(|_| ())
        })
    }

    pub(crate) fn global_value(&self) -> Value {
        Value::Object(self.global.clone())
    }

    pub(crate) fn make_error(&self, name: &str, message: &str) -> Value {
        let proto = self
            .realm
            .error_protos
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.realm.error_proto.clone());
        let mut object = ObjectValue::new(Some(proto)).with_kind(ObjectKind::Error);
        object.set("message", Value::string(message));
        object.set("stack", Value::string(format!("{name}: {message}\n    at <anonymous>")));
        Value::Object(object.into_ref())
    }

    pub(crate) fn throw_error(&self, name: &str, message: impl AsRef<str>) -> Error {
        Error::ScriptThrown(ThrownValue::new(self.make_error(name, message.as_ref())))
    }

    pub(crate) fn type_error(&self, message: impl AsRef<str>) -> Error {
        self.throw_error("TypeError", message)
    }

    pub(crate) fn range_error(&self, message: impl AsRef<str>) -> Error {
        self.throw_error("RangeError", message)
    }

    pub(crate) fn syntax_error(&self, message: impl AsRef<str>) -> Error {
        self.throw_error("SyntaxError", message)
    }

    pub(crate) fn check_string_length(&self, len: usize) -> Result<()> {
        if len > MAX_STRING_LENGTH {
            return Err(self.range_error("Invalid string length"));
        }
        Ok(())
    }

    pub(crate) fn check_array_length(&self, len: usize) -> Result<()> {
        if len > MAX_ARRAY_LENGTH {
            return Err(self.range_error("Invalid array length"));
        }
        Ok(())
    }

    /// xorshift64*, seeded per run.
    pub(crate) fn next_random(&mut self) -> f64 {
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = x;
        let bits = x.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }

    pub(crate) fn innermost_callee(&self) -> Option<String> {
        self.callee_stack.last().cloned()
    }
}

/// Renders a value for the console and for sink evidence.
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.as_str().to_string(),
        Value::Stub(stub) => format!("<fallback:{}>", stub.path),
        Value::Function(function) => format!("function {}()", function.short_name()),
        Value::Object(object) if object.borrow().is_error() => error_to_string(object),
        Value::Object(_) | Value::Array(_) => match builtins::json_stringify(value, "") {
            Ok(Some(text)) => text.as_str().to_string(),
            _ => value.as_string(),
        },
        _ => value.as_string(),
    }
}

pub(crate) fn describe_thrown(value: &Value) -> String {
    match value {
        Value::Object(object) if object.borrow().is_error() => error_to_string(object),
        other => render_value(other),
    }
}
