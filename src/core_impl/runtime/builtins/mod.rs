use super::expression_eval::{own_enumerable_entries, property_key, to_uint32};
use super::*;

mod array_methods;
mod document;
mod function_regexp;
mod globals;
mod math_number;
mod network;
mod object_json;
mod string_methods;
mod timers_console;

pub(crate) use object_json::json_stringify;

/// Installs every implemented host API. Each installer skips the paths the
/// host manifest withdrew.
pub(crate) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    globals::install(env);
    object_json::install(env);
    function_regexp::install(env);
    string_methods::install(env);
    array_methods::install(env);
    math_number::install(env);
    super::promises::install(env);
    timers_console::install(env);
    network::install(env);
    document::install(env);
}

fn arg_string(call: &NativeCall, index: usize) -> JsString {
    call.arg(index).as_js_string()
}

/// ToIntegerOrInfinity.
fn to_integer(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.trunc() }
}

/// Resolves a possibly negative relative index against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let index = to_integer(value.as_number());
    if index < 0.0 {
        (len as f64 + index).max(0.0) as usize
    } else {
        index.min(len as f64) as usize
    }
}

fn bool_arg(call: &NativeCall, index: usize) -> bool {
    call.arg(index).truthy()
}

fn object_arg(call: &NativeCall, index: usize) -> Option<ObjectRef> {
    match call.arg(index) {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

/// Callable check used by natives that take callbacks.
fn callback_arg(rt: &Runtime, call: &NativeCall, index: usize, api: &str) -> Result<Value> {
    let callback = call.arg(index);
    if callback.is_callable() {
        Ok(callback)
    } else {
        Err(rt.type_error(format!(
            "{} is not a function (in {api})",
            render_value(&callback)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_indices_clamp_to_bounds() {
        assert_eq!(relative_index(&Value::Number(-2.0), 5, 0), 3);
        assert_eq!(relative_index(&Value::Number(-9.0), 5, 0), 0);
        assert_eq!(relative_index(&Value::Number(9.0), 5, 0), 5);
        assert_eq!(relative_index(&Value::Undefined, 5, 5), 5);
        assert_eq!(relative_index(&Value::Number(f64::NAN), 5, 5), 0);
    }
}
