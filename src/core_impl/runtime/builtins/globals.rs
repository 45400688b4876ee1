use base64::Engine as _;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use super::*;

const URI_UNRESERVED_MARKS: &str = "-_.!~*'()";
const URI_RESERVED: &str = ";/?:@&=+$,#";
const ESCAPE_SAFE: &str = "@*_+-./";

/// `atob` accepts input with or without `=` padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

pub(super) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    let global = env.global();
    env.value(&global, "NaN", "NaN", Value::Number(f64::NAN));
    env.value(&global, "Infinity", "Infinity", Value::Number(f64::INFINITY));
    env.value(&global, "undefined", "undefined", Value::Undefined);

    env.global_function("eval", global_eval);
    env.global_function("Function", function_constructor);
    env.global_function("parseInt", parse_int);
    env.global_function("parseFloat", parse_float);
    env.global_function("isNaN", is_nan);
    env.global_function("isFinite", is_finite);
    env.global_function("atob", atob);
    env.global_function("btoa", btoa);
    env.global_function("escape", escape);
    env.global_function("unescape", unescape);
    env.global_function("encodeURI", encode_uri);
    env.global_function("encodeURIComponent", encode_uri_component);
    env.global_function("decodeURI", decode_uri);
    env.global_function("decodeURIComponent", decode_uri_component);

    let string_proto = env.realm().string_proto.clone();
    if let Some(string) = env.constructor("String", string_constructor, &string_proto) {
        super::string_methods::install_statics(env, &string);
    }
    let number_proto = env.realm().number_proto.clone();
    if let Some(number) = env.constructor("Number", number_constructor, &number_proto) {
        super::math_number::install_statics(env, &number);
    }
    let boolean_proto = env.realm().boolean_proto.clone();
    env.constructor("Boolean", boolean_constructor, &boolean_proto);

    let error_proto = env.realm().error_proto.clone();
    env.constructor("Error", error_constructor, &error_proto);
    let handlers: [(&str, NativeHandler); 6] = [
        ("TypeError", type_error_constructor),
        ("RangeError", range_error_constructor),
        ("SyntaxError", syntax_error_constructor),
        ("ReferenceError", reference_error_constructor),
        ("URIError", uri_error_constructor),
        ("EvalError", eval_error_constructor),
    ];
    for (name, handler) in handlers {
        if let Some(proto) = env.realm().error_protos.get(name).cloned() {
            env.constructor(name, handler, &proto);
        }
    }
}

/// Indirect eval: the code runs in the global scope and its `var`
/// declarations land on the global object.
fn global_eval(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let Value::String(code) = call.arg(0) else {
        return Ok(call.arg(0));
    };
    rt.enter_frame(|rt| {
        let program = match parse_script(code.as_str()) {
            Ok(program) => program,
            Err(Error::ScriptParse(message)) => return Err(rt.syntax_error(message)),
            Err(err) => return Err(err),
        };
        let scope = rt.global_scope.clone();
        rt.eval_program(&program, &scope)
    })
}

fn function_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let (body, params) = match call.args.split_last() {
        Some((body, params)) => (body.as_string(), params),
        None => (String::new(), &[][..]),
    };
    let params = params
        .iter()
        .map(Value::as_string)
        .collect::<Vec<_>>()
        .join(",");
    rt.enter_frame(|rt| match parse_function_constructor(&params, &body) {
        Ok(def) => {
            let scope = rt.global_scope.clone();
            Ok(rt.make_closure(def, &scope))
        }
        Err(Error::ScriptParse(message)) => Err(rt.syntax_error(message)),
        Err(err) => Err(err),
    })
}

pub(super) fn parse_int(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = arg_string(call, 0);
    let mut text = text.as_str().trim_start();
    let mut sign = 1.0;
    if let Some(rest) = text.strip_prefix('-') {
        sign = -1.0;
        text = rest;
    } else if let Some(rest) = text.strip_prefix('+') {
        text = rest;
    }
    let mut radix = to_uint32(call.arg(1).as_number());
    if radix != 0 && !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    if radix == 0 || radix == 16 {
        if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            text = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    let mut value = 0f64;
    let mut any = false;
    for ch in text.chars() {
        let Some(digit) = ch.to_digit(radix) else {
            break;
        };
        value = value * f64::from(radix) + f64::from(digit);
        any = true;
    }
    Ok(Value::Number(if any { sign * value } else { f64::NAN }))
}

pub(super) fn parse_float(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = arg_string(call, 0);
    let text = text.as_str().trim_start();
    for prefix in ["Infinity", "+Infinity"] {
        if text.starts_with(prefix) {
            return Ok(Value::Number(f64::INFINITY));
        }
    }
    if text.starts_with("-Infinity") {
        return Ok(Value::Number(f64::NEG_INFINITY));
    }
    let bytes = text.as_bytes();
    let mut end = 0usize;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let byte = bytes[end];
        match byte {
            b'0'..=b'9' => seen_digit = true,
            b'+' | b'-' if end == 0 || matches!(bytes[end - 1], b'e' | b'E') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }
    let mut candidate = &text[..end];
    while !candidate.is_empty() {
        if let Ok(value) = candidate.parse::<f64>() {
            return Ok(Value::Number(value));
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    Ok(Value::Number(f64::NAN))
}

fn is_nan(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(call.arg(0).as_number().is_nan()))
}

fn is_finite(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(call.arg(0).as_number().is_finite()))
}

fn invalid_character(rt: &Runtime, api: &str, detail: &str) -> Error {
    let error = rt.make_error("Error", &format!("Failed to execute '{api}' on 'Window': {detail}"));
    if let Value::Object(object) = &error {
        object
            .borrow_mut()
            .set("name", Value::string("InvalidCharacterError"));
    }
    Error::ScriptThrown(ThrownValue::new(error))
}

fn atob(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let input = arg_string(call, 0);
    let compact = input
        .as_str()
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '\t' | '\n' | '\x0c' | '\r'))
        .collect::<String>();
    let trimmed = compact.trim_end_matches('=');
    let padding = compact.len() - trimmed.len();
    let malformed = trimmed.len() % 4 == 1
        || padding > 2
        || (padding > 0 && compact.len() % 4 != 0)
        || !trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/');
    if malformed {
        return Err(invalid_character(
            rt,
            "atob",
            "The string to be decoded is not correctly encoded.",
        ));
    }
    let bytes = LENIENT_BASE64.decode(trimmed).map_err(|_| {
        invalid_character(rt, "atob", "The string to be decoded is not correctly encoded.")
    })?;
    let text = bytes.iter().map(|byte| char::from(*byte)).collect::<String>();
    Ok(Value::string(text))
}

fn btoa(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let input = arg_string(call, 0);
    let mut bytes = Vec::with_capacity(input.as_str().len());
    for ch in input.as_str().chars() {
        let Ok(byte) = u8::try_from(u32::from(ch)) else {
            return Err(invalid_character(
                rt,
                "btoa",
                "The string to be encoded contains characters outside of the Latin1 range.",
            ));
        };
        bytes.push(byte);
    }
    Ok(Value::string(
        base64::engine::general_purpose::STANDARD.encode(bytes),
    ))
}

fn escape(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let input = arg_string(call, 0);
    let mut out = String::with_capacity(input.as_str().len());
    let mut units = [0u16; 2];
    for ch in input.as_str().chars() {
        if ch.is_ascii_alphanumeric() || ESCAPE_SAFE.contains(ch) {
            out.push(ch);
            continue;
        }
        for unit in ch.encode_utf16(&mut units) {
            if *unit < 256 {
                out.push_str(&format!("%{unit:02X}"));
            } else {
                out.push_str(&format!("%u{unit:04X}"));
            }
        }
    }
    Ok(Value::string(out))
}

fn unescape(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let input = arg_string(call, 0);
    let chars = input.as_str().chars().collect::<Vec<_>>();
    let mut units = Vec::with_capacity(chars.len());
    let mut i = 0usize;
    let mut buf = [0u16; 2];
    while i < chars.len() {
        if chars[i] == '%' {
            if chars.get(i + 1) == Some(&'u') {
                if let Some(unit) = hex_value(&chars, i + 2, 4) {
                    units.push(unit as u16);
                    i += 6;
                    continue;
                }
            } else if let Some(unit) = hex_value(&chars, i + 1, 2) {
                units.push(unit as u16);
                i += 3;
                continue;
            }
        }
        units.extend_from_slice(chars[i].encode_utf16(&mut buf));
        i += 1;
    }
    Ok(Value::string(String::from_utf16_lossy(&units)))
}

fn hex_value(chars: &[char], start: usize, len: usize) -> Option<u32> {
    let digits = chars.get(start..start + len)?;
    digits
        .iter()
        .try_fold(0u32, |acc, ch| ch.to_digit(16).map(|digit| acc * 16 + digit))
}

fn uri_encode(input: &str, keep: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut buf = [0u8; 4];
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || URI_UNRESERVED_MARKS.contains(ch) || keep.contains(ch) {
            out.push(ch);
            continue;
        }
        for byte in ch.encode_utf8(&mut buf).bytes() {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Percent-decoding; escapes that decode to a character in `preserve` are
/// left as written.
fn uri_decode(input: &str, preserve: &str) -> Option<String> {
    let chars = input.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(input.len());
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let first = hex_value(&chars, i + 1, 2)? as u8;
        if first < 0x80 {
            let ch = char::from(first);
            if preserve.contains(ch) {
                out.extend(&chars[i..i + 3]);
            } else {
                out.push(ch);
            }
            i += 3;
            continue;
        }
        let width = match first {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return None,
        };
        let mut bytes = vec![first];
        for extra in 1..width {
            let at = i + extra * 3;
            if chars.get(at) != Some(&'%') {
                return None;
            }
            bytes.push(hex_value(&chars, at + 1, 2)? as u8);
        }
        out.push_str(std::str::from_utf8(&bytes).ok()?);
        i += width * 3;
    }
    Some(out)
}

fn encode_uri(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::string(uri_encode(arg_string(call, 0).as_str(), URI_RESERVED)))
}

fn encode_uri_component(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::string(uri_encode(arg_string(call, 0).as_str(), "")))
}

fn decode_uri(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    match uri_decode(arg_string(call, 0).as_str(), URI_RESERVED) {
        Some(text) => Ok(Value::string(text)),
        None => Err(rt.throw_error("URIError", "URI malformed")),
    }
}

fn decode_uri_component(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    match uri_decode(arg_string(call, 0).as_str(), "") {
        Some(text) => Ok(Value::string(text)),
        None => Err(rt.throw_error("URIError", "URI malformed")),
    }
}

/// `String(x)` keeps the taint of a string argument.
fn string_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    if call.args.is_empty() {
        return Ok(Value::string(""));
    }
    Ok(Value::String(rt.to_js_string(&call.arg(0))?))
}

fn number_constructor(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    if call.args.is_empty() {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number(call.arg(0).as_number()))
}

fn boolean_constructor(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(bool_arg(call, 0)))
}

fn construct_error(rt: &Runtime, call: &NativeCall, name: &str) -> Value {
    let message = match call.arg(0) {
        Value::Undefined => String::new(),
        other => other.as_string(),
    };
    rt.make_error(name, &message)
}

fn error_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(construct_error(rt, call, "Error"))
}

fn type_error_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(construct_error(rt, call, "TypeError"))
}

fn range_error_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(construct_error(rt, call, "RangeError"))
}

fn syntax_error_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(construct_error(rt, call, "SyntaxError"))
}

fn reference_error_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(construct_error(rt, call, "ReferenceError"))
}

fn uri_error_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(construct_error(rt, call, "URIError"))
}

fn eval_error_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(construct_error(rt, call, "EvalError"))
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
    fn base64_round_trips_latin1_and_tolerates_missing_padding() -> Result<()> {
        assert_eq!(run("btoa('hello')")?.as_string(), "aGVsbG8=");
        assert_eq!(run("atob('aGVsbG8')")?.as_string(), "hello");
        assert_eq!(run("atob(' aGVs bG8= ')")?.as_string(), "hello");
        assert_eq!(run("atob(btoa('\\xff\\x00'))")?.as_string(), "\u{ff}\u{0}");
        Ok(())
    }

    #[test]
    fn malformed_base64_throws_invalid_character() {
        let Err(Error::ScriptThrown(thrown)) = run("atob('a')") else {
            panic!("expected a throw");
        };
        assert!(thrown.as_string().starts_with("InvalidCharacterError"));
        assert!(matches!(run("btoa('\\u0100')"), Err(Error::ScriptThrown(_))));
    }

    #[test]
    fn uri_coding_matches_browser_behaviour() -> Result<()> {
        assert_eq!(run("encodeURIComponent('a b&c/é')")?.as_string(), "a%20b%26c%2F%C3%A9");
        assert_eq!(run("encodeURI('http://x/a b?q=1')")?.as_string(), "http://x/a%20b?q=1");
        assert_eq!(run("decodeURIComponent('%C3%A9%2F')")?.as_string(), "é/");
        assert_eq!(run("decodeURI('%2F%20')")?.as_string(), "%2F ");
        let Err(Error::ScriptThrown(thrown)) = run("decodeURIComponent('%E0%A4%A')") else {
            panic!("expected URIError");
        };
        assert_eq!(thrown.as_string(), "URIError: URI malformed");
        Ok(())
    }

    #[test]
    fn escape_and_unescape_use_percent_u_for_wide_units() -> Result<()> {
        assert_eq!(run("escape('a b\\u0100')")?.as_string(), "a%20b%u0100");
        assert_eq!(run("unescape('%41%u0042%zz')")?.as_string(), "AB%zz");
        Ok(())
    }

    #[test]
    fn number_parsing_helpers() -> Result<()> {
        assert_eq!(run("parseInt('  42px')")?, Value::Number(42.0));
        assert_eq!(run("parseInt('0x1f')")?, Value::Number(31.0));
        assert_eq!(run("parseInt('101', 2)")?, Value::Number(5.0));
        assert!(run("parseInt('z')")?.as_number().is_nan());
        assert_eq!(run("parseFloat('3.5e2abc')")?, Value::Number(350.0));
        assert_eq!(run("parseFloat('.5')")?, Value::Number(0.5));
        assert_eq!(run("isNaN('abc')")?, Value::Bool(true));
        Ok(())
    }

    #[test]
    fn eval_defines_globals_and_returns_completion_value() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script("var r = eval('var x7 = 7; x7 * 2'); var f = Function('a', 'b', 'return a + b');")?;
        let global = rt.global_value();
        assert_eq!(rt.get_member(&global, "x7", None)?, Value::Number(7.0));
        assert_eq!(rt.get_member(&global, "r", None)?, Value::Number(14.0));
        rt.run_script("var s = f(2, 3);")?;
        assert_eq!(rt.get_member(&global, "s", None)?, Value::Number(5.0));
        Ok(())
    }

    #[test]
    fn error_constructors_link_prototypes() -> Result<()> {
        assert_eq!(run("new TypeError('x') instanceof Error")?, Value::Bool(true));
        assert_eq!(run("String(new RangeError('r'))")?.as_string(), "RangeError: r");
        assert_eq!(run("Error('plain').message")?.as_string(), "plain");
        Ok(())
    }
}
