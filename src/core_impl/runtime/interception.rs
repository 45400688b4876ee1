use super::*;

impl Runtime {
    /// Builds the observation for one sink call and hands it to the
    /// sink monitor. Never alters the call.
    pub(crate) fn observe_sink(&mut self, name: &str, this: &Value, args: &[Value], preceding: u64) {
        let sink = canonical_name(name);
        let (url, method) = self.sink_endpoint(sink, this, args);
        let mut taint = TaintSet::default();
        for arg in args {
            arg.collect_taint(&mut taint);
        }
        if let Value::Object(object) = this {
            match &object.borrow().kind {
                ObjectKind::Xhr(state) => {
                    if let Some(url) = &state.url {
                        taint.extend(url.taint());
                    }
                }
                ObjectKind::WebSocket { url } => taint.extend(url.taint()),
                _ => {}
            }
        }
        let observation = SinkObservation {
            sink: sink.to_string(),
            url,
            method,
            preceding_calls: preceding,
            taint_count: self.taint.count(),
            arguments: args.iter().map(render_value).collect(),
            taint,
        };
        let verdict = self.sinks.evaluate(observation);
        let severity = if verdict.is_suspicious() {
            9
        } else if verdict.external {
            6
        } else {
            3
        };
        let detail = verdict.url.clone();
        self.events.record(HookCategory::NetworkRequest, sink, severity, detail);
    }

    /// `eval`, `Function` and the timers: completes the chain owning the
    /// code string, if any, and logs the call.
    pub(crate) fn observe_code_execution(&mut self, name: &str, args: &[Value]) {
        let executor = canonical_name(name);
        let code: Vec<&JsString> = match executor {
            "Function" => args
                .iter()
                .filter_map(|arg| match arg {
                    Value::String(text) => Some(text),
                    _ => None,
                })
                .collect(),
            _ => match args.first() {
                Some(Value::String(text)) => vec![text],
                _ => Vec::new(),
            },
        };
        let mut taint = TaintSet::default();
        for text in &code {
            taint.extend(text.taint());
        }
        self.chains.observe_execution(executor, &taint);
        let severity = match executor {
            "eval" | "Function" => EXECUTION_SEVERITY,
            _ if code.is_empty() => 4,
            _ => 8,
        };
        let detail = code
            .last()
            .map(|text| truncate_preview(text.as_str(), self.config.max_arg_preview));
        self.events
            .record(HookCategory::FunctionCall, executor, severity, detail);
    }

    fn sink_endpoint(
        &self,
        sink: &str,
        this: &Value,
        args: &[Value],
    ) -> (Option<String>, Option<String>) {
        match sink {
            "fetch" => {
                let url = args.first().map(fetch_target_url);
                let method = match args.get(1) {
                    Some(Value::Object(options)) => lookup_property(options, "method")
                        .filter(|method| !method.is_nullish())
                        .map(|method| method.as_string().to_ascii_uppercase()),
                    _ => None,
                };
                (url, Some(method.unwrap_or_else(|| "GET".to_string())))
            }
            "navigator.sendBeacon" => (
                args.first().map(Value::as_string),
                Some("POST".to_string()),
            ),
            _ => match this {
                Value::Object(object) => match &object.borrow().kind {
                    ObjectKind::Xhr(state) => (
                        state.url.as_ref().map(|url| url.as_str().to_string()),
                        state.method.clone(),
                    ),
                    ObjectKind::WebSocket { url } => (Some(url.as_str().to_string()), None),
                    _ => (None, None),
                },
                _ => (None, None),
            },
        }
    }

    /// Mints a fresh tag for one successful source call and attaches it,
    /// together with the string arguments' tags, to a string result.
    pub(crate) fn mint_source(
        &mut self,
        name: &str,
        kind: TaintSourceKind,
        argument_taint: TaintSet,
        value: Value,
    ) -> Value {
        let source = canonical_name(name);
        let tag = self.taint.mint(source, kind);
        let output = match &value {
            Value::String(text) => Some(text.as_str()),
            _ => None,
        };
        let severity =
            self.chains
                .observe_source(source, kind, &argument_taint, tag, output.unwrap_or_default());
        let detail = output.map(|text| truncate_preview(text, self.config.max_arg_preview));
        self.events
            .record(HookCategory::CryptoOperation, source, severity, detail);
        match value {
            Value::String(text) => {
                Value::String(text.with_taint(&TaintSet::single(tag).union(&argument_taint)))
            }
            other => other,
        }
    }
}

fn fetch_target_url(target: &Value) -> String {
    if let Value::Object(object) = target {
        if let Some(url) = lookup_property(object, "url") {
            return url.as_string();
        }
    }
    target.as_string()
}
