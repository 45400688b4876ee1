use super::string_methods::{byte_to_char, char_to_byte};
use super::*;

pub(super) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    let function_proto = env.realm().function_proto.clone();
    env.method(&function_proto, "call", "Function.prototype.call", function_call);
    env.method(&function_proto, "apply", "Function.prototype.apply", function_apply);
    env.method(&function_proto, "bind", "Function.prototype.bind", function_bind);
    env.method(&function_proto, "toString", "Function.prototype.toString", function_to_string);

    let regexp_proto = env.realm().regexp_proto.clone();
    env.constructor("RegExp", regexp_constructor, &regexp_proto);
    env.method(&regexp_proto, "test", "RegExp.prototype.test", regexp_test);
    env.method(&regexp_proto, "exec", "RegExp.prototype.exec", regexp_exec);
    env.method(&regexp_proto, "toString", "RegExp.prototype.toString", regexp_to_string);
}

impl Runtime {
    pub(crate) fn new_regexp(&self, pattern: &str, flags: &str) -> Result<Value> {
        let regex = JsRegex::compile(pattern, flags).map_err(|err| {
            self.syntax_error(format!("Invalid regular expression: /{pattern}/: {err}"))
        })?;
        Ok(Value::RegExp(Rc::new(RefCell::new(RegExpValue {
            regex,
            last_index: 0,
        }))))
    }
}

fn callable_this(rt: &Runtime, call: &NativeCall, api: &str) -> Result<Value> {
    if call.this.is_callable() {
        Ok(call.this.clone())
    } else {
        Err(rt.type_error(format!("{api} called on a value that is not a function")))
    }
}

/// `f.call(thisArg, ...args)`. The forwarded invocation shares the crossing
/// already counted for `call` itself.
fn function_call(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let target = callable_this(rt, call, "Function.prototype.call")?;
    let args = call.args.iter().skip(1).cloned().collect();
    rt.invoke(&target, call.arg(0), args, CallSite::Native, call.preceding_calls)
}

fn function_apply(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let target = callable_this(rt, call, "Function.prototype.apply")?;
    let args = match call.arg(1) {
        Value::Undefined | Value::Null => Vec::new(),
        Value::Array(items) => items.borrow().clone(),
        Value::Object(object) => {
            let len = lookup_property(&object, "length").map_or(0.0, |len| len.as_number());
            let len = to_integer(len).clamp(0.0, 65_535.0) as usize;
            (0..len)
                .map(|idx| lookup_property(&object, &idx.to_string()).unwrap_or(Value::Undefined))
                .collect()
        }
        _ => {
            return Err(rt.type_error("CreateListFromArrayLike called on non-object"));
        }
    };
    rt.invoke(&target, call.arg(0), args, CallSite::Native, call.preceding_calls)
}

fn function_bind(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let target = callable_this(rt, call, "Function.prototype.bind")?;
    let Value::Function(target) = target else {
        return Ok(target);
    };
    Ok(Value::Function(Rc::new(FunctionValue {
        kind: FunctionKind::Bound {
            target,
            this: call.arg(0),
            args: call.args.iter().skip(1).cloned().collect(),
        },
        props: RefCell::new(ObjectValue::new(Some(rt.realm.function_proto.clone()))),
    })))
}

fn function_to_string(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    match &call.this {
        Value::Function(function) => Ok(Value::string(match &function.kind {
            FunctionKind::Script { def, .. } => {
                let params = def
                    .params
                    .iter()
                    .map(|param| param.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("function {}({params}) {{ [script code] }}", function.short_name())
            }
            _ => format!("function {}() {{ [native code] }}", function.short_name()),
        })),
        Value::Stub(_) => Ok(Value::string("function () { [native code] }")),
        _ => Err(rt.type_error("Function.prototype.toString requires that 'this' be a Function")),
    }
}

fn regexp_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let flags = match call.arg(1) {
        Value::Undefined => None,
        other => Some(other.as_string()),
    };
    match call.arg(0) {
        Value::RegExp(existing) => {
            let existing = existing.borrow();
            let flags = flags.unwrap_or_else(|| existing.regex.flags().to_string());
            rt.new_regexp(existing.regex.source(), &flags)
        }
        Value::Undefined => rt.new_regexp("(?:)", flags.as_deref().unwrap_or("")),
        other => rt.new_regexp(&other.as_string(), flags.as_deref().unwrap_or("")),
    }
}

fn this_regexp(rt: &Runtime, call: &NativeCall, api: &str) -> Result<Rc<RefCell<RegExpValue>>> {
    match &call.this {
        Value::RegExp(regex) => Ok(regex.clone()),
        _ => Err(rt.type_error(format!("{api} called on incompatible receiver"))),
    }
}

/// Runs one match honouring `lastIndex` for global and sticky patterns.
/// Indices are in characters.
fn exec_at_last_index(
    rt: &Runtime,
    regex: &Rc<RefCell<RegExpValue>>,
    text: &str,
) -> Result<Option<Captures>> {
    let (compiled, last_index) = {
        let borrowed = regex.borrow();
        (borrowed.regex.clone(), borrowed.last_index)
    };
    let uses_last_index = compiled.global() || compiled.sticky();
    let start = if uses_last_index { last_index } else { 0 };
    if start > text.chars().count() {
        regex.borrow_mut().last_index = 0;
        return Ok(None);
    }
    let byte_start = char_to_byte(text, start);
    let found = compiled
        .captures_from_pos(text, byte_start)
        .map_err(|err| rt.syntax_error(format!("Invalid regular expression: {err}")))?;
    let found = found.and_then(|captures| {
        let whole = captures.get(0)?;
        if compiled.sticky() && whole.start() != byte_start {
            return None;
        }
        Some((byte_to_char(text, whole.start()), byte_to_char(text, whole.end()), captures))
    });
    match found {
        Some((start_char, end_char, captures)) => {
            if uses_last_index {
                regex.borrow_mut().last_index = if end_char == start_char {
                    end_char + 1
                } else {
                    end_char
                };
            }
            Ok(Some(captures))
        }
        None => {
            if uses_last_index {
                regex.borrow_mut().last_index = 0;
            }
            Ok(None)
        }
    }
}

fn regexp_test(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let regex = this_regexp(rt, call, "RegExp.prototype.test")?;
    let text = arg_string(call, 0);
    Ok(Value::Bool(exec_at_last_index(rt, &regex, text.as_str())?.is_some()))
}

fn regexp_exec(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let regex = this_regexp(rt, call, "RegExp.prototype.exec")?;
    let text = arg_string(call, 0);
    let Some(captures) = exec_at_last_index(rt, &regex, text.as_str())? else {
        return Ok(Value::Null);
    };
    let groups = (0..captures.len())
        .map(|idx| match captures.get(idx) {
            Some(found) => Value::String(JsString::tainted(found.as_str(), text.taint().clone())),
            None => Value::Undefined,
        })
        .collect::<Vec<_>>();
    Ok(Value::array(groups))
}

fn regexp_to_string(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let regex = this_regexp(rt, call, "RegExp.prototype.toString")?;
    let regex = regex.borrow();
    Ok(Value::string(format!("/{}/{}", regex.regex.source(), regex.regex.flags())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<Value> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(&format!("var out = {src};"))?;
        rt.get_member(&rt.global_value(), "out", None)
    }

    #[test]
    fn call_apply_and_bind_forward_this_and_arguments() -> Result<()> {
        assert_eq!(
            run("(function (a, b) { return this.base + a + b; }).call({ base: 1 }, 2, 3)")?,
            Value::Number(6.0)
        );
        assert_eq!(
            run("(function (a, b) { return this.base + a + b; }).apply({ base: 1 }, [2, 3])")?,
            Value::Number(6.0)
        );
        assert_eq!(
            run("(function (a, b) { return this.base + a + b; }).bind({ base: 10 }, 1)(2)")?,
            Value::Number(13.0)
        );
        Ok(())
    }

    #[test]
    fn call_does_not_count_a_second_crossing() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script("function f() {} f.call(null);")?;
        assert_eq!(rt.calls.count(), 1);
        Ok(())
    }

    #[test]
    fn global_regexps_advance_last_index() -> Result<()> {
        assert_eq!(
            run("(function () { var r = /a/g; var s = 'aXa'; return [r.test(s), r.lastIndex, r.test(s), r.lastIndex, r.test(s), r.lastIndex].join(); })()")?
                .as_string(),
            "true,1,true,3,false,0"
        );
        Ok(())
    }

    #[test]
    fn exec_reports_capture_groups() -> Result<()> {
        assert_eq!(run("/(\\d+)-(\\d+)/.exec('id 12-34')[2]")?.as_string(), "34");
        assert_eq!(run("/zz/.exec('abc')")?, Value::Null);
        assert_eq!(run("new RegExp('a+', 'gi').toString()")?.as_string(), "/a+/gi");
        assert!(matches!(run("new RegExp('(')"), Err(Error::ScriptThrown(_))));
        Ok(())
    }

    #[test]
    fn sticky_patterns_match_only_at_last_index() -> Result<()> {
        assert_eq!(run("/b/y.test('ab')")?, Value::Bool(false));
        assert_eq!(
            run("(function () { var r = /b/y; r.lastIndex = 1; return r.test('ab'); })()")?,
            Value::Bool(true)
        );
        Ok(())
    }
}
