use super::object_json::from_json;
use super::*;

/// Body every emulated endpoint answers with.
const MOCK_BODY: &str = "{}";

pub(super) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    env.global_function("fetch", fetch);

    let response_proto = env.realm().response_proto.clone();
    env.method(&response_proto, "text", "Response.prototype.text", response_text);
    env.method(&response_proto, "json", "Response.prototype.json", response_json);

    let xhr_proto = env.realm().xhr_proto.clone();
    if env
        .constructor("XMLHttpRequest", xhr_constructor, &xhr_proto)
        .is_some()
    {
        let methods: [(&str, NativeHandler); 8] = [
            ("open", xhr_open),
            ("setRequestHeader", xhr_set_request_header),
            ("send", xhr_send),
            ("abort", xhr_abort),
            ("getResponseHeader", xhr_get_response_header),
            ("getAllResponseHeaders", xhr_get_all_response_headers),
            ("addEventListener", xhr_add_event_listener),
            ("overrideMimeType", xhr_noop),
        ];
        for (key, handler) in methods {
            env.method(&xhr_proto, key, &format!("XMLHttpRequest.prototype.{key}"), handler);
        }
    }

    let websocket_proto = env.realm().websocket_proto.clone();
    if env
        .constructor("WebSocket", websocket_constructor, &websocket_proto)
        .is_some()
    {
        env.method(&websocket_proto, "send", "WebSocket.prototype.send", websocket_send);
        env.method(&websocket_proto, "close", "WebSocket.prototype.close", websocket_close);
    }

    install_navigator(env);
}

fn install_navigator(env: &mut HostEnvironmentEmulator<'_>) {
    let Some(navigator) = env.global_object("navigator", ObjectKind::Host) else {
        return;
    };
    let profile = env.rt.config.browser.clone();
    let strings = [
        ("userAgent", profile.user_agent.as_str()),
        ("appVersion", profile.app_version.as_str()),
        ("appName", profile.app_name.as_str()),
        ("appCodeName", profile.app_code_name.as_str()),
        ("platform", profile.platform.as_str()),
        ("vendor", profile.vendor.as_str()),
        ("product", profile.product.as_str()),
        ("language", profile.language.as_str()),
    ];
    for (key, value) in strings {
        env.value(&navigator, key, &format!("navigator.{key}"), Value::string(value));
    }
    let languages = profile
        .languages
        .iter()
        .map(|language| Value::string(language.as_str()))
        .collect();
    env.value(&navigator, "languages", "navigator.languages", Value::array(languages));
    env.value(&navigator, "cookieEnabled", "navigator.cookieEnabled", Value::Bool(profile.cookie_enabled));
    env.value(
        &navigator,
        "doNotTrack",
        "navigator.doNotTrack",
        if profile.do_not_track { Value::string("1") } else { Value::Null },
    );
    env.value(&navigator, "onLine", "navigator.onLine", Value::Bool(profile.on_line));
    env.value(&navigator, "webdriver", "navigator.webdriver", Value::Bool(profile.webdriver));
    let counts = [
        ("hardwareConcurrency", profile.hardware_concurrency),
        ("deviceMemory", profile.device_memory),
        ("maxTouchPoints", profile.max_touch_points),
    ];
    for (key, value) in counts {
        env.value(&navigator, key, &format!("navigator.{key}"), Value::Number(f64::from(value)));
    }
    env.method(&navigator, "sendBeacon", "navigator.sendBeacon", send_beacon);
    env.method(&navigator, "javaEnabled", "navigator.javaEnabled", java_enabled);
}

fn fetch(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let url = match call.arg(0) {
        Value::Object(request) => lookup_property(&request, "url")
            .map(|url| url.as_js_string())
            .unwrap_or_else(|| JsString::new("")),
        other => other.as_js_string(),
    };
    tracing::debug!(url = url.as_str(), "fetch emulated");
    let response = rt.new_host_object(
        IdentifierPath::root("window").child("fetch").called(),
        &rt.realm.response_proto.clone(),
        ObjectKind::Response {
            body: JsString::new(MOCK_BODY),
        },
    );
    {
        let mut borrowed = response.borrow_mut();
        borrowed.set("ok", Value::Bool(true));
        borrowed.set("status", Value::Number(200.0));
        borrowed.set("statusText", Value::string("OK"));
        borrowed.set("url", Value::String(url));
        borrowed.set("redirected", Value::Bool(false));
        borrowed.set("type", Value::string("basic"));
    }
    let promise = rt.promise_resolved_with(Value::Object(response))?;
    Ok(Value::Promise(promise))
}

fn response_body(rt: &Runtime, call: &NativeCall) -> Result<JsString> {
    if let Value::Object(object) = &call.this {
        if let ObjectKind::Response { body } = &object.borrow().kind {
            return Ok(body.clone());
        }
    }
    Err(rt.type_error("Illegal invocation"))
}

fn response_text(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let body = response_body(rt, call)?;
    Ok(Value::Promise(rt.promise_resolved_with(Value::String(body))?))
}

fn response_json(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let body = response_body(rt, call)?;
    let parsed = match serde_json::from_str::<serde_json::Value>(body.as_str()) {
        Ok(json) => from_json(rt, &json, body.taint()),
        Err(err) => {
            let reason = rt.make_error("SyntaxError", &format!("Unexpected response body: {err}"));
            return Ok(Value::Promise(rt.promise_rejected_with(reason)));
        }
    };
    Ok(Value::Promise(rt.promise_resolved_with(parsed)?))
}

fn this_xhr(rt: &Runtime, call: &NativeCall) -> Result<ObjectRef> {
    match &call.this {
        Value::Object(object) if matches!(object.borrow().kind, ObjectKind::Xhr(_)) => {
            Ok(object.clone())
        }
        _ => Err(rt.type_error("Illegal invocation")),
    }
}

fn with_xhr_state<T>(object: &ObjectRef, update: impl FnOnce(&mut XhrState) -> T) -> Option<T> {
    match &mut object.borrow_mut().kind {
        ObjectKind::Xhr(state) => Some(update(state)),
        _ => None,
    }
}

fn xhr_constructor(rt: &mut Runtime, _call: &NativeCall) -> Result<Value> {
    let xhr = rt.new_host_object(
        IdentifierPath::root("window").child("XMLHttpRequest").called(),
        &rt.realm.xhr_proto.clone(),
        ObjectKind::Xhr(XhrState::default()),
    );
    {
        let mut borrowed = xhr.borrow_mut();
        borrowed.set("readyState", Value::Number(0.0));
        borrowed.set("status", Value::Number(0.0));
        borrowed.set("responseText", Value::string(""));
        borrowed.set("response", Value::string(""));
        borrowed.set("onreadystatechange", Value::Null);
        borrowed.set("onload", Value::Null);
        borrowed.set("onerror", Value::Null);
    }
    Ok(Value::Object(xhr))
}

fn xhr_open(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let xhr = this_xhr(rt, call)?;
    let method = arg_string(call, 0).as_str().to_ascii_uppercase();
    let url = arg_string(call, 1);
    with_xhr_state(&xhr, |state| {
        state.method = Some(method);
        state.url = Some(url);
        state.headers.clear();
        state.sent = false;
    });
    xhr.borrow_mut().set("readyState", Value::Number(1.0));
    Ok(Value::Undefined)
}

fn xhr_set_request_header(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let xhr = this_xhr(rt, call)?;
    let name = arg_string(call, 0).as_str().to_string();
    let value = arg_string(call, 1).as_str().to_string();
    with_xhr_state(&xhr, |state| state.headers.push((name, value)));
    Ok(Value::Undefined)
}

/// Completes the request immediately and queues the script's completion
/// handlers as a zero-delay task, each called with the request as `this`.
fn xhr_send(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let xhr = this_xhr(rt, call)?;
    let opened = with_xhr_state(&xhr, |state| {
        let opened = state.url.is_some();
        state.sent = opened;
        opened
    })
    .unwrap_or(false);
    if !opened {
        return Err(rt.throw_error(
            "InvalidStateError",
            "Failed to execute 'send' on 'XMLHttpRequest': The object's state must be OPENED.",
        ));
    }
    {
        let mut borrowed = xhr.borrow_mut();
        borrowed.set("readyState", Value::Number(4.0));
        borrowed.set("status", Value::Number(200.0));
        borrowed.set("statusText", Value::string("OK"));
        borrowed.set("responseText", Value::string(MOCK_BODY));
        borrowed.set("response", Value::string(MOCK_BODY));
    }

    let mut handlers = Vec::new();
    for (event_type, property) in [("readystatechange", "onreadystatechange"), ("load", "onload")] {
        if let Some(handler) = xhr.borrow().get_own(property).filter(|value| value.is_callable()) {
            handlers.push((event_type, handler.clone()));
        }
        let listeners = with_xhr_state(&xhr, |state| {
            state
                .listeners
                .iter()
                .filter(|(kind, _)| kind == event_type)
                .map(|(_, listener)| listener.clone())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
        handlers.extend(listeners.into_iter().map(|listener| (event_type, listener)));
    }
    for (event_type, handler) in handlers {
        let event = rt.new_object();
        {
            let mut borrowed = event.borrow_mut();
            borrowed.set("type", Value::string(event_type));
            borrowed.set("target", Value::Object(xhr.clone()));
        }
        let callback = bind_this(rt, handler, Value::Object(xhr.clone()));
        rt.scheduler
            .schedule(callback, vec![Value::Object(event)], 0, false);
    }
    Ok(Value::Undefined)
}

fn bind_this(rt: &Runtime, callback: Value, this: Value) -> Value {
    match callback {
        Value::Function(target) => Value::Function(Rc::new(FunctionValue {
            kind: FunctionKind::Bound {
                target,
                this,
                args: Vec::new(),
            },
            props: RefCell::new(ObjectValue::new(Some(rt.realm.function_proto.clone()))),
        })),
        other => other,
    }
}

fn xhr_abort(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let xhr = this_xhr(rt, call)?;
    with_xhr_state(&xhr, |state| state.sent = false);
    xhr.borrow_mut().set("readyState", Value::Number(0.0));
    Ok(Value::Undefined)
}

fn xhr_get_response_header(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let xhr = this_xhr(rt, call)?;
    let sent = with_xhr_state(&xhr, |state| state.sent).unwrap_or(false);
    let name = arg_string(call, 0).as_str().to_ascii_lowercase();
    Ok(if sent && name == "content-type" {
        Value::string("application/json")
    } else {
        Value::Null
    })
}

fn xhr_get_all_response_headers(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let xhr = this_xhr(rt, call)?;
    let sent = with_xhr_state(&xhr, |state| state.sent).unwrap_or(false);
    Ok(Value::string(if sent {
        "content-type: application/json\r\n"
    } else {
        ""
    }))
}

fn xhr_add_event_listener(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let xhr = this_xhr(rt, call)?;
    let listener = call.arg(1);
    if listener.is_callable() {
        let event_type = arg_string(call, 0).as_str().to_string();
        with_xhr_state(&xhr, |state| state.listeners.push((event_type, listener)));
    }
    Ok(Value::Undefined)
}

fn xhr_noop(_rt: &mut Runtime, _call: &NativeCall) -> Result<Value> {
    Ok(Value::Undefined)
}

fn websocket_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let url = arg_string(call, 0);
    if !(url.as_str().starts_with("ws://") || url.as_str().starts_with("wss://")) {
        return Err(rt.syntax_error(format!(
            "Failed to construct 'WebSocket': The URL '{}' is invalid.",
            url.as_str()
        )));
    }
    tracing::debug!(url = url.as_str(), "websocket emulated");
    let socket = rt.new_host_object(
        IdentifierPath::root("window").child("WebSocket").called(),
        &rt.realm.websocket_proto.clone(),
        ObjectKind::WebSocket { url: url.clone() },
    );
    {
        let mut borrowed = socket.borrow_mut();
        borrowed.set("url", Value::String(url));
        borrowed.set("readyState", Value::Number(1.0));
        borrowed.set("protocol", Value::string(""));
        borrowed.set("bufferedAmount", Value::Number(0.0));
    }
    Ok(Value::Object(socket))
}

fn this_websocket(rt: &Runtime, call: &NativeCall) -> Result<ObjectRef> {
    match &call.this {
        Value::Object(object) if matches!(object.borrow().kind, ObjectKind::WebSocket { .. }) => {
            Ok(object.clone())
        }
        _ => Err(rt.type_error("Illegal invocation")),
    }
}

fn websocket_send(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    this_websocket(rt, call)?;
    Ok(Value::Undefined)
}

fn websocket_close(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let socket = this_websocket(rt, call)?;
    socket.borrow_mut().set("readyState", Value::Number(3.0));
    Ok(Value::Undefined)
}

fn send_beacon(_rt: &mut Runtime, _call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(true))
}

fn java_enabled(_rt: &mut Runtime, _call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdicts_after(src: &str) -> Result<Runtime> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(src)?;
        rt.run_event_loop()?;
        Ok(rt)
    }

    #[test]
    fn fetch_is_observed_with_url_and_method() -> Result<()> {
        let rt = verdicts_after("fetch('https://collector.test/p', { method: 'post', body: 'x' });")?;
        let verdicts = rt.sinks.verdicts();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].sink, "fetch");
        assert_eq!(verdicts[0].url.as_deref(), Some("https://collector.test/p"));
        assert_eq!(verdicts[0].method.as_deref(), Some("POST"));
        Ok(())
    }

    #[test]
    fn fetch_resolves_with_a_response() -> Result<()> {
        let rt = verdicts_after(
            "var seen = null; fetch('/a').then(function (r) { seen = r.status; return r.text(); })\
             .then(function (body) { console.log(body); });",
        )?;
        assert_eq!(rt.global.borrow().get_own("seen"), Some(&Value::Number(200.0)));
        assert_eq!(rt.console.messages.back().map(|m| m.text.as_str()), Some("{}"));
        Ok(())
    }

    #[test]
    fn xhr_send_records_open_arguments_and_fires_handlers() -> Result<()> {
        let rt = verdicts_after(
            "var x = new XMLHttpRequest(); var state = 0;\
             x.onreadystatechange = function () { state = this.readyState; };\
             x.open('put', 'https://h.test/up'); x.send('data');",
        )?;
        let verdicts = rt.sinks.verdicts();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].sink, "XMLHttpRequest.prototype.send");
        assert_eq!(verdicts[0].method.as_deref(), Some("PUT"));
        assert_eq!(verdicts[0].url.as_deref(), Some("https://h.test/up"));
        assert_eq!(rt.global.borrow().get_own("state"), Some(&Value::Number(4.0)));
        Ok(())
    }

    #[test]
    fn send_before_open_throws() {
        let result = verdicts_after("new XMLHttpRequest().send();");
        assert!(matches!(result, Err(Error::ScriptThrown(_))));
    }

    #[test]
    fn websocket_and_beacon_are_sinks() -> Result<()> {
        let rt = verdicts_after(
            "var ws = new WebSocket('wss://relay.test/s'); ws.send('hi');\
             navigator.sendBeacon('https://b.test/', 'payload');",
        )?;
        let sinks = rt
            .sinks
            .verdicts()
            .iter()
            .map(|verdict| (verdict.sink.clone(), verdict.url.clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            sinks,
            vec![
                ("WebSocket.prototype.send".to_string(), Some("wss://relay.test/s".to_string())),
                ("navigator.sendBeacon".to_string(), Some("https://b.test/".to_string())),
            ]
        );
        Ok(())
    }

    #[test]
    fn navigator_reflects_the_browser_profile() -> Result<()> {
        let mut config = AnalysisConfig::default();
        config.browser.user_agent = "UnitAgent/1.0".to_string();
        let mut rt = Runtime::new(&config);
        rt.run_script("var ua = navigator.userAgent;")?;
        assert_eq!(
            rt.global.borrow().get_own("ua").map(Value::as_string),
            Some("UnitAgent/1.0".to_string())
        );
        Ok(())
    }
}
