use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Number, Serializer};
use serde::Serialize;

use super::*;

const MAX_JSON_DEPTH: usize = 256;

pub(super) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    let object_proto = env.realm().object_proto.clone();
    env.method(&object_proto, "hasOwnProperty", "Object.prototype.hasOwnProperty", has_own_property);
    env.method(&object_proto, "toString", "Object.prototype.toString", object_to_string);
    env.method(&object_proto, "valueOf", "Object.prototype.valueOf", value_of);
    env.method(&object_proto, "isPrototypeOf", "Object.prototype.isPrototypeOf", is_prototype_of);
    env.method(
        &object_proto,
        "propertyIsEnumerable",
        "Object.prototype.propertyIsEnumerable",
        has_own_property,
    );

    if let Some(object) = env.constructor("Object", object_constructor, &object_proto) {
        let statics: [(&str, NativeHandler); 13] = [
            ("keys", keys),
            ("values", values),
            ("entries", entries),
            ("assign", assign),
            ("freeze", freeze),
            ("isFrozen", is_frozen),
            ("create", create),
            ("getPrototypeOf", get_prototype_of),
            ("setPrototypeOf", set_prototype_of),
            ("defineProperty", define_property),
            ("getOwnPropertyNames", keys),
            ("fromEntries", from_entries),
            ("is", object_is),
        ];
        for (key, handler) in statics {
            env.static_method(&object, key, &format!("Object.{key}"), handler);
        }
    }

    if let Some(json) = env.global_object("JSON", ObjectKind::Host) {
        env.method(&json, "stringify", "JSON.stringify", json_stringify_native);
        env.method(&json, "parse", "JSON.parse", json_parse);
    }
}

fn own_has(target: &Value, key: &str) -> bool {
    match target {
        Value::Object(object) => {
            object.borrow().has_own(key)
                || match &object.borrow().kind {
                    ObjectKind::Storage(items) => items.iter().any(|(name, _)| name == key),
                    ObjectKind::Document => key == "cookie",
                    _ => false,
                }
        }
        Value::Array(items) => {
            key == "length" || array_index(key).is_some_and(|idx| idx < items.borrow().len())
        }
        Value::Function(function) => function.props.borrow().has_own(key),
        Value::String(text) => {
            key == "length"
                || array_index(key).is_some_and(|idx| idx < text.as_str().chars().count())
        }
        _ => false,
    }
}

fn has_own_property(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let key = property_key(&call.arg(0));
    Ok(Value::Bool(own_has(&call.this, &key)))
}

fn object_to_string(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let tag = match &call.this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Array(_) => "Array",
        Value::Function(_) | Value::Stub(_) => "Function",
        Value::String(_) => "String",
        Value::Number(_) => "Number",
        Value::Bool(_) => "Boolean",
        Value::RegExp(_) => "RegExp",
        Value::Promise(_) => "Promise",
        Value::Object(object) if object.borrow().is_error() => "Error",
        Value::Object(_) => "Object",
    };
    Ok(Value::string(format!("[object {tag}]")))
}

fn value_of(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(call.this.clone())
}

fn is_prototype_of(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let (Value::Object(proto), Value::Object(object)) = (&call.this, call.arg(0)) else {
        return Ok(Value::Bool(false));
    };
    let mut current = object.borrow().proto.clone();
    while let Some(node) = current {
        if Rc::ptr_eq(&node, proto) {
            return Ok(Value::Bool(true));
        }
        current = node.borrow().proto.clone();
    }
    Ok(Value::Bool(false))
}

fn object_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    match call.arg(0) {
        value @ (Value::Object(_) | Value::Array(_) | Value::Function(_)) => Ok(value),
        _ => Ok(Value::Object(rt.new_object())),
    }
}

fn keys(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::array(
        own_enumerable_entries(&call.arg(0))
            .into_iter()
            .map(|(key, _)| Value::string(key))
            .collect(),
    ))
}

fn values(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::array(
        own_enumerable_entries(&call.arg(0))
            .into_iter()
            .map(|(_, value)| value)
            .collect(),
    ))
}

fn entries(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::array(
        own_enumerable_entries(&call.arg(0))
            .into_iter()
            .map(|(key, value)| Value::array(vec![Value::string(key), value]))
            .collect(),
    ))
}

fn assign(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let target = call.arg(0);
    if target.is_nullish() {
        return Err(rt.type_error("Cannot convert undefined or null to object"));
    }
    for source in call.args.iter().skip(1) {
        for (key, value) in own_enumerable_entries(source) {
            rt.set_member(&target, &key, value, None)?;
        }
    }
    Ok(target)
}

fn freeze(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let target = call.arg(0);
    match &target {
        Value::Object(object) => object.borrow_mut().frozen = true,
        Value::Function(function) => function.props.borrow_mut().frozen = true,
        _ => {}
    }
    Ok(target)
}

fn is_frozen(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(match call.arg(0) {
        Value::Object(object) => object.borrow().frozen,
        Value::Function(function) => function.props.borrow().frozen,
        Value::Array(_) => false,
        _ => true,
    }))
}

fn create(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let proto = match call.arg(0) {
        Value::Object(proto) => Some(proto),
        Value::Null => None,
        other => {
            return Err(rt.type_error(format!(
                "Object prototype may only be an Object or null: {}",
                render_value(&other)
            )));
        }
    };
    Ok(Value::Object(ObjectValue::new(proto).into_ref()))
}

fn get_prototype_of(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let proto = match call.arg(0) {
        Value::Object(object) => object.borrow().proto.clone(),
        Value::Array(_) => Some(rt.realm.array_proto.clone()),
        Value::Function(function) => function.props.borrow().proto.clone(),
        Value::String(_) => Some(rt.realm.string_proto.clone()),
        Value::Number(_) => Some(rt.realm.number_proto.clone()),
        Value::Bool(_) => Some(rt.realm.boolean_proto.clone()),
        Value::RegExp(_) => Some(rt.realm.regexp_proto.clone()),
        Value::Promise(_) => Some(rt.realm.promise_proto.clone()),
        Value::Stub(_) => None,
        Value::Undefined | Value::Null => {
            return Err(rt.type_error("Cannot convert undefined or null to object"));
        }
    };
    Ok(proto.map_or(Value::Null, Value::Object))
}

fn set_prototype_of(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let target = call.arg(0);
    if let Value::Object(object) = &target {
        match call.arg(1) {
            Value::Object(proto) if !Rc::ptr_eq(&proto, object) => {
                object.borrow_mut().proto = Some(proto);
            }
            Value::Null => object.borrow_mut().proto = None,
            _ => {}
        }
    }
    Ok(target)
}

/// Data descriptors only; accessor descriptors store `undefined`.
fn define_property(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let target = call.arg(0);
    if !matches!(target, Value::Object(_) | Value::Array(_) | Value::Function(_)) {
        return Err(rt.type_error("Object.defineProperty called on non-object"));
    }
    let key = property_key(&call.arg(1));
    let value = object_arg(call, 2)
        .and_then(|descriptor| lookup_property(&descriptor, "value"))
        .unwrap_or(Value::Undefined);
    rt.set_member(&target, &key, value, None)?;
    Ok(target)
}

fn from_entries(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let object = rt.new_object();
    if let Value::Array(pairs) = call.arg(0) {
        for pair in pairs.borrow().iter() {
            if let Value::Array(pair) = pair {
                let pair = pair.borrow();
                let key = pair.first().map(property_key).unwrap_or_default();
                let value = pair.get(1).cloned().unwrap_or(Value::Undefined);
                object.borrow_mut().set(&key, value);
            }
        }
    }
    Ok(Value::Object(object))
}

fn object_is(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let (left, right) = (call.arg(0), call.arg(1));
    Ok(Value::Bool(match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => {
            (a.is_nan() && b.is_nan()) || (a == b && a.is_sign_negative() == b.is_sign_negative())
        }
        _ => left.strict_equals(&right),
    }))
}

/// Why `JSON.stringify` gave up on a value.
#[derive(Debug)]
pub(crate) enum JsonFailure {
    Cycle,
    TooLong,
}

/// `JSON.stringify` without replacer support. `Ok(None)` is the
/// `undefined` result for values JSON cannot represent.
pub(crate) fn json_stringify(value: &Value, indent: &str) -> std::result::Result<Option<JsString>, JsonFailure> {
    let mut walk = JsonWalk::default();
    let Some(json) = walk.convert(value)? else {
        return Ok(None);
    };
    let text = if indent.is_empty() {
        serde_json::to_string(&json).map_err(|_| JsonFailure::TooLong)?
    } else {
        let mut out = Vec::new();
        let formatter = PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = Serializer::with_formatter(&mut out, formatter);
        json.serialize(&mut serializer).map_err(|_| JsonFailure::TooLong)?;
        String::from_utf8(out).map_err(|_| JsonFailure::TooLong)?
    };
    if text.len() > MAX_STRING_LENGTH {
        return Err(JsonFailure::TooLong);
    }
    Ok(Some(JsString::tainted(text, walk.taint)))
}

/// Conversion state: taint seen so far, the container stack for cycle
/// detection, and a running estimate of the output size.
#[derive(Default)]
struct JsonWalk {
    taint: TaintSet,
    stack: Vec<usize>,
    size: usize,
}

impl JsonWalk {
    fn grow(&mut self, bytes: usize) -> std::result::Result<(), JsonFailure> {
        self.size = self.size.saturating_add(bytes + 1);
        if self.size > MAX_STRING_LENGTH {
            return Err(JsonFailure::TooLong);
        }
        Ok(())
    }

    fn enter(&mut self, id: usize) -> std::result::Result<(), JsonFailure> {
        if self.stack.contains(&id) || self.stack.len() >= MAX_JSON_DEPTH {
            return Err(JsonFailure::Cycle);
        }
        self.stack.push(id);
        Ok(())
    }

    fn convert(&mut self, value: &Value) -> std::result::Result<Option<serde_json::Value>, JsonFailure> {
        let json = match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(flag) => serde_json::Value::Bool(*flag),
            Value::Number(number) => json_number(*number),
            Value::String(text) => {
                self.grow(text.as_str().len())?;
                self.taint.extend(text.taint());
                serde_json::Value::String(text.as_str().to_string())
            }
            Value::Array(items) => {
                self.enter(Rc::as_ptr(items) as *const () as usize)?;
                let mut out = Vec::new();
                for item in items.borrow().iter() {
                    self.grow(0)?;
                    out.push(self.convert(item)?.unwrap_or(serde_json::Value::Null));
                }
                self.stack.pop();
                serde_json::Value::Array(out)
            }
            Value::Object(object) => {
                self.enter(Rc::as_ptr(object) as *const () as usize)?;
                let entries = match &object.borrow().kind {
                    ObjectKind::Error => Vec::new(),
                    ObjectKind::Storage(items) => items.clone(),
                    _ => object.borrow().entries().to_vec(),
                };
                let mut map = Map::new();
                for (key, item) in &entries {
                    self.grow(key.len())?;
                    if let Some(json) = self.convert(item)? {
                        map.insert(key.clone(), json);
                    }
                }
                self.stack.pop();
                serde_json::Value::Object(map)
            }
            Value::RegExp(_) | Value::Promise(_) => serde_json::Value::Object(Map::new()),
            Value::Undefined | Value::Function(_) | Value::Stub(_) => return Ok(None),
        };
        Ok(Some(json))
    }
}

fn json_number(number: f64) -> serde_json::Value {
    if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::Number(Number::from(number as i64));
    }
    Number::from_f64(number).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn json_indent(space: &Value) -> String {
    match space {
        Value::Number(count) => " ".repeat(count.clamp(0.0, 10.0) as usize),
        Value::String(text) => text.as_str().chars().take(10).collect(),
        _ => String::new(),
    }
}

fn json_stringify_native(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let indent = json_indent(&call.arg(2));
    match json_stringify(&call.arg(0), &indent) {
        Ok(Some(text)) => Ok(Value::String(text)),
        Ok(None) => Ok(Value::Undefined),
        Err(JsonFailure::Cycle) => Err(rt.type_error("Converting circular structure to JSON")),
        Err(JsonFailure::TooLong) => Err(rt.range_error("Invalid string length")),
    }
}

fn json_parse(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let source = arg_string(call, 0);
    let parsed: serde_json::Value = serde_json::from_str(source.as_str())
        .map_err(|err| rt.syntax_error(format!("JSON.parse: {err}")))?;
    Ok(from_json(rt, &parsed, source.taint()))
}

/// Strings in the parsed structure inherit the taint of the source text.
pub(super) fn from_json(rt: &Runtime, json: &serde_json::Value, taint: &TaintSet) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(flag) => Value::Bool(*flag),
        serde_json::Value::Number(number) => Value::Number(number.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(text) => {
            Value::String(JsString::tainted(text.as_str(), taint.clone()))
        }
        serde_json::Value::Array(items) => Value::array(
            items
                .iter()
                .map(|item| from_json(rt, item, taint))
                .collect(),
        ),
        serde_json::Value::Object(map) => {
            let object = rt.new_object();
            for (key, item) in map {
                let value = from_json(rt, item, taint);
                object.borrow_mut().set(key, value);
            }
            Value::Object(object)
        }
    }
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
    fn stringify_keeps_insertion_order_and_skips_undefined() -> Result<()> {
        assert_eq!(
            run("JSON.stringify({ b: 1, a: [1, undefined, 'x'], f: function () {}, u: undefined })")?
                .as_string(),
            r#"{"b":1,"a":[1,null,"x"]}"#
        );
        assert_eq!(run("JSON.stringify(undefined)")?, Value::Undefined);
        assert_eq!(run("JSON.stringify({ a: 1 }, null, 2)")?.as_string(), "{\n  \"a\": 1\n}");
        assert_eq!(run("JSON.stringify(1.5)")?.as_string(), "1.5");
        Ok(())
    }

    #[test]
    fn circular_structures_throw() {
        let Err(Error::ScriptThrown(thrown)) = run("(function () { var o = {}; o.self = o; return JSON.stringify(o); })()") else {
            panic!("expected a TypeError");
        };
        assert_eq!(thrown.as_string(), "TypeError: Converting circular structure to JSON");
    }

    #[test]
    fn parse_builds_objects_and_rejects_bad_input() -> Result<()> {
        assert_eq!(run("JSON.parse('{\"k\": [1, 2, {\"z\": true}]}').k[2].z")?, Value::Bool(true));
        assert!(matches!(run("JSON.parse('{bad')"), Err(Error::ScriptThrown(_))));
        Ok(())
    }

    #[test]
    fn object_statics() -> Result<()> {
        assert_eq!(run("Object.keys({ x: 1, y: 2 }).join()")?.as_string(), "x,y");
        assert_eq!(run("Object.assign({ a: 1 }, { b: 2 }).b")?, Value::Number(2.0));
        assert_eq!(run("({ a: 1 }).hasOwnProperty('a')")?, Value::Bool(true));
        assert_eq!(run("Object.prototype.toString.call([])")?.as_string(), "[object Array]");
        assert_eq!(
            run("(function () { var o = Object.freeze({ a: 1 }); o.a = 2; return o.a; })()")?,
            Value::Number(1.0)
        );
        Ok(())
    }

    #[test]
    fn stringified_payload_keeps_taint() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script("var out = JSON.stringify({ data: atob('c2VjcmV0') });")?;
        let Value::String(text) = rt.get_member(&rt.global_value(), "out", None)? else {
            panic!("expected a string");
        };
        assert_eq!(text.as_str(), r#"{"data":"secret"}"#);
        assert!(!text.taint().is_empty());
        Ok(())
    }
}
