use super::*;

const CONSOLE_LEVELS: [&str; 6] = ["log", "info", "warn", "error", "debug", "trace"];

pub(super) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    env.global_function("setTimeout", set_timeout);
    env.global_function("setInterval", set_interval);
    env.global_function("clearTimeout", clear_timer);
    env.global_function("clearInterval", clear_timer);
    env.global_function("queueMicrotask", queue_microtask);
    env.global_function("addEventListener", add_event_listener);
    env.global_function("removeEventListener", remove_event_listener);

    if let Some(console) = env.global_object("console", ObjectKind::Host) {
        let handlers: [NativeHandler; 6] = [
            console_log,
            console_info,
            console_warn,
            console_error,
            console_debug,
            console_debug,
        ];
        for (level, handler) in CONSOLE_LEVELS.into_iter().zip(handlers) {
            env.method(&console, level, &format!("console.{level}"), handler);
        }
    }
}

fn timer_delay(call: &NativeCall) -> i64 {
    let delay = call.arg(1).as_number();
    if delay.is_finite() { delay.max(0.0) as i64 } else { 0 }
}

fn schedule_timer(rt: &mut Runtime, call: &NativeCall, interval: bool) -> Result<Value> {
    let callback = match call.arg(0) {
        callback @ Value::String(_) => callback,
        callback if callback.is_callable() => callback,
        other => {
            return Err(rt.type_error(format!(
                "{} is not a function",
                render_value(&other)
            )));
        }
    };
    let args = call.args.iter().skip(2).cloned().collect();
    let id = rt
        .scheduler
        .schedule(callback, args, timer_delay(call), interval);
    tracing::trace!(id, interval, "timer scheduled");
    Ok(Value::Number(id as f64))
}

fn set_timeout(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    schedule_timer(rt, call, false)
}

fn set_interval(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    schedule_timer(rt, call, true)
}

fn clear_timer(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    if let Value::Number(id) = call.arg(0) {
        rt.scheduler.clear(id as i64);
    }
    Ok(Value::Undefined)
}

fn queue_microtask(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let callback = callback_arg(rt, call, 0, "queueMicrotask")?;
    rt.scheduler.microtask_queue.push_back(Microtask::Callback {
        callback,
        args: Vec::new(),
    });
    Ok(Value::Undefined)
}

/// Listener registration shared by `window` and `document`; both feed the
/// single lifecycle event list.
pub(super) fn add_event_listener(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let listener = call.arg(1);
    if listener.is_callable() {
        let event_type = arg_string(call, 0).as_str().to_string();
        rt.listeners.push((event_type, listener));
    }
    Ok(Value::Undefined)
}

pub(super) fn remove_event_listener(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let event_type = arg_string(call, 0);
    let listener = call.arg(1);
    if let Some(idx) = rt
        .listeners
        .iter()
        .position(|(kind, callback)| kind == event_type.as_str() && callback.strict_equals(&listener))
    {
        rt.listeners.remove(idx);
    }
    Ok(Value::Undefined)
}

fn log_at(rt: &mut Runtime, call: &NativeCall, level: &str) -> Result<Value> {
    let text = call
        .args
        .iter()
        .map(render_value)
        .collect::<Vec<_>>()
        .join(" ");
    rt.console.push(level, text);
    Ok(Value::Undefined)
}

fn console_log(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    log_at(rt, call, "log")
}

fn console_info(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    log_at(rt, call, "info")
}

fn console_warn(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    log_at(rt, call, "warn")
}

fn console_error(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    log_at(rt, call, "error")
}

fn console_debug(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    log_at(rt, call, "debug")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console_texts(rt: &Runtime) -> Vec<String> {
        rt.console
            .messages
            .iter()
            .map(|message| format!("{}:{}", message.level, message.text))
            .collect()
    }

    #[test]
    fn console_joins_rendered_arguments() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script("console.warn('n', 1, [1, 'a'], { k: true });")?;
        assert_eq!(console_texts(&rt), vec![r#"warn:n 1 [1,"a"] {"k":true}"#]);
        Ok(())
    }

    #[test]
    fn intervals_repeat_until_cleared() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(
            "var n = 0; var id = setInterval(function () { n += 1; if (n === 3) clearInterval(id); }, 10);",
        )?;
        rt.run_event_loop()?;
        assert_eq!(rt.get_member(&rt.global_value(), "n", None)?, Value::Number(3.0));
        Ok(())
    }

    #[test]
    fn cleared_timeouts_never_fire() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script("var id = setTimeout(function () { console.log('x'); }, 5); clearTimeout(id);")?;
        rt.run_event_loop()?;
        assert!(rt.console.messages.is_empty());
        Ok(())
    }

    #[test]
    fn microtasks_run_before_timers_and_extra_args_are_forwarded() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(
            "setTimeout(function (a, b) { console.log(a + b); }, 0, 'x', 'y');\
             queueMicrotask(function () { console.log('micro'); });",
        )?;
        rt.run_event_loop()?;
        assert_eq!(console_texts(&rt), vec!["log:micro", "log:xy"]);
        Ok(())
    }

    #[test]
    fn removed_listeners_do_not_fire() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(
            "function onLoad() { console.log('loaded'); }\
             addEventListener('load', onLoad); removeEventListener('load', onLoad);",
        )?;
        rt.run_event_loop()?;
        assert!(rt.console.messages.is_empty());
        Ok(())
    }
}
