use unicode_normalization::UnicodeNormalization;

use super::*;

pub(super) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    let proto = env.realm().string_proto.clone();
    let methods: [(&str, NativeHandler); 33] = [
        ("charAt", char_at),
        ("charCodeAt", char_code_at),
        ("codePointAt", code_point_at),
        ("at", at),
        ("indexOf", index_of),
        ("lastIndexOf", last_index_of),
        ("includes", includes),
        ("startsWith", starts_with),
        ("endsWith", ends_with),
        ("slice", slice),
        ("substring", substring),
        ("substr", substr),
        ("toUpperCase", to_upper_case),
        ("toLowerCase", to_lower_case),
        ("toLocaleUpperCase", to_upper_case),
        ("toLocaleLowerCase", to_lower_case),
        ("trim", trim),
        ("trimStart", trim_start),
        ("trimEnd", trim_end),
        ("padStart", pad_start),
        ("padEnd", pad_end),
        ("repeat", repeat),
        ("split", split),
        ("replace", replace),
        ("replaceAll", replace_all),
        ("match", match_regexp),
        ("search", search),
        ("concat", concat),
        ("normalize", normalize),
        ("localeCompare", locale_compare),
        ("toString", to_string),
        ("valueOf", to_string),
        ("trimLeft", trim_start),
    ];
    for (key, handler) in methods {
        env.method(&proto, key, &format!("String.prototype.{key}"), handler);
    }
}

pub(super) fn install_statics(env: &mut HostEnvironmentEmulator<'_>, string: &Rc<FunctionValue>) {
    env.static_method(string, "fromCharCode", "String.fromCharCode", from_char_code);
    env.static_method(string, "fromCodePoint", "String.fromCodePoint", from_code_point);
}

fn this_string(rt: &Runtime, call: &NativeCall) -> Result<JsString> {
    match &call.this {
        Value::String(text) => Ok(text.clone()),
        Value::Undefined | Value::Null => Err(rt.type_error(
            "String.prototype method called on null or undefined",
        )),
        other => Ok(other.as_js_string()),
    }
}

/// A string derived from `source`; it keeps every tag of its source.
fn derived(text: impl Into<Rc<str>>, source: &JsString) -> Value {
    Value::String(JsString::tainted(text, source.taint().clone()))
}

pub(super) fn char_to_byte(text: &str, index: usize) -> usize {
    text.char_indices()
        .nth(index)
        .map_or(text.len(), |(offset, _)| offset)
}

pub(super) fn byte_to_char(text: &str, offset: usize) -> usize {
    text[..offset].chars().count()
}

fn char_at(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let index = to_integer(call.arg(0).as_number());
    let ch = (index >= 0.0)
        .then(|| text.as_str().chars().nth(index as usize))
        .flatten();
    Ok(derived(ch.map(String::from).unwrap_or_default(), &text))
}

fn char_code_at(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let index = to_integer(call.arg(0).as_number());
    let ch = (index >= 0.0)
        .then(|| text.as_str().chars().nth(index as usize))
        .flatten();
    let mut units = [0u16; 2];
    Ok(Value::Number(ch.map_or(f64::NAN, |ch| {
        f64::from(ch.encode_utf16(&mut units)[0])
    })))
}

fn code_point_at(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let index = to_integer(call.arg(0).as_number());
    let ch = (index >= 0.0)
        .then(|| text.as_str().chars().nth(index as usize))
        .flatten();
    Ok(ch.map_or(Value::Undefined, |ch| Value::Number(f64::from(u32::from(ch)))))
}

fn at(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let len = text.as_str().chars().count();
    let index = to_integer(call.arg(0).as_number());
    let index = if index < 0.0 { len as f64 + index } else { index };
    if index < 0.0 || index >= len as f64 {
        return Ok(Value::Undefined);
    }
    let ch = text.as_str().chars().nth(index as usize);
    Ok(ch.map_or(Value::Undefined, |ch| derived(ch.to_string(), &text)))
}

fn index_of(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let needle = arg_string(call, 0);
    let len = text.as_str().chars().count();
    let from = relative_index(&call.arg(1), len, 0).min(len);
    let start = char_to_byte(text.as_str(), from);
    let found = text.as_str()[start..]
        .find(needle.as_str())
        .map(|offset| byte_to_char(text.as_str(), start + offset));
    Ok(Value::Number(found.map_or(-1.0, |idx| idx as f64)))
}

fn last_index_of(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let needle = arg_string(call, 0);
    let len = text.as_str().chars().count();
    let from = match call.arg(1).as_number() {
        value if value.is_nan() => len,
        value => to_integer(value).clamp(0.0, len as f64) as usize,
    };
    let end = char_to_byte(text.as_str(), from) + needle.as_str().len();
    let end = end.min(text.as_str().len());
    let haystack = text.as_str().get(..end).unwrap_or(text.as_str());
    let found = haystack
        .rfind(needle.as_str())
        .map(|offset| byte_to_char(text.as_str(), offset));
    Ok(Value::Number(found.map_or(-1.0, |idx| idx as f64)))
}

fn includes(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    if matches!(call.arg(0), Value::RegExp(_)) {
        return Err(rt.type_error(
            "First argument to String.prototype.includes must not be a regular expression",
        ));
    }
    let needle = arg_string(call, 0);
    let from = relative_index(&call.arg(1), text.as_str().chars().count(), 0);
    let start = char_to_byte(text.as_str(), from);
    Ok(Value::Bool(text.as_str()[start..].contains(needle.as_str())))
}

fn starts_with(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let needle = arg_string(call, 0);
    let from = relative_index(&call.arg(1), text.as_str().chars().count(), 0);
    let start = char_to_byte(text.as_str(), from);
    Ok(Value::Bool(text.as_str()[start..].starts_with(needle.as_str())))
}

fn ends_with(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let needle = arg_string(call, 0);
    let len = text.as_str().chars().count();
    let end = relative_index(&call.arg(1), len, len);
    let end = char_to_byte(text.as_str(), end);
    Ok(Value::Bool(text.as_str()[..end].ends_with(needle.as_str())))
}

fn char_range(text: &JsString, start: usize, end: usize) -> Value {
    if start >= end {
        return derived("", text);
    }
    let from = char_to_byte(text.as_str(), start);
    let to = char_to_byte(text.as_str(), end);
    derived(&text.as_str()[from..to], text)
}

fn slice(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let len = text.as_str().chars().count();
    let start = relative_index(&call.arg(0), len, 0);
    let end = relative_index(&call.arg(1), len, len);
    Ok(char_range(&text, start, end))
}

fn substring(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let len = text.as_str().chars().count();
    let clamp = |value: Value, default: usize| match value {
        Value::Undefined => default,
        other => to_integer(other.as_number()).clamp(0.0, len as f64) as usize,
    };
    let start = clamp(call.arg(0), 0);
    let end = clamp(call.arg(1), len);
    Ok(char_range(&text, start.min(end), start.max(end)))
}

fn substr(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let len = text.as_str().chars().count();
    let start = relative_index(&call.arg(0), len, 0);
    let count = match call.arg(1) {
        Value::Undefined => len.saturating_sub(start),
        other => to_integer(other.as_number()).max(0.0) as usize,
    };
    Ok(char_range(&text, start, start.saturating_add(count).min(len)))
}

fn to_upper_case(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    Ok(derived(text.as_str().to_uppercase(), &text))
}

fn to_lower_case(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    Ok(derived(text.as_str().to_lowercase(), &text))
}

fn trim(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    Ok(derived(text.as_str().trim(), &text))
}

fn trim_start(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    Ok(derived(text.as_str().trim_start(), &text))
}

fn trim_end(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    Ok(derived(text.as_str().trim_end(), &text))
}

/// The filler `padStart`/`padEnd` add to reach the requested length, or
/// `None` when the string is already long enough.
fn padding(rt: &Runtime, call: &NativeCall, text: &JsString) -> Result<Option<JsString>> {
    let len = text.as_str().chars().count();
    let target = to_integer(call.arg(0).as_number());
    if target <= len as f64 {
        return Ok(None);
    }
    let filler = match call.arg(1) {
        Value::Undefined => JsString::new(" "),
        other => other.as_js_string(),
    };
    if filler.as_str().is_empty() {
        return Ok(None);
    }
    if target - len as f64 + text.as_str().len() as f64 > MAX_STRING_LENGTH as f64 {
        return Err(rt.range_error("Invalid string length"));
    }
    let missing = target as usize - len;
    let pad: String = filler.as_str().chars().cycle().take(missing).collect();
    Ok(Some(JsString::tainted(pad, filler.taint().clone())))
}

fn pad_start(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    Ok(Value::String(match padding(rt, call, &text)? {
        Some(pad) => pad.concat(&text),
        None => text,
    }))
}

fn pad_end(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    Ok(Value::String(match padding(rt, call, &text)? {
        Some(pad) => text.concat(&pad),
        None => text,
    }))
}

fn repeat(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let count = to_integer(call.arg(0).as_number());
    if count < 0.0 || count.is_infinite() {
        return Err(rt.range_error(format!("Invalid count value: {}", format_number(count))));
    }
    if text.as_str().len() as f64 * count > MAX_STRING_LENGTH as f64 {
        return Err(rt.range_error("Invalid string length"));
    }
    Ok(derived(text.as_str().repeat(count as usize), &text))
}

fn regex_arg(rt: &Runtime, value: &Value) -> Result<JsRegex> {
    match value {
        Value::RegExp(regex) => Ok(regex.borrow().regex.clone()),
        Value::Undefined => JsRegex::compile("(?:)", "")
            .map_err(|err| rt.syntax_error(format!("Invalid regular expression: {err}"))),
        other => JsRegex::compile(&other.as_string(), "")
            .map_err(|err| rt.syntax_error(format!("Invalid regular expression: {err}"))),
    }
}

fn regex_failure(rt: &Runtime, err: RegexError) -> Error {
    rt.syntax_error(format!("Invalid regular expression: {err}"))
}

fn split(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let limit = match call.arg(1) {
        Value::Undefined => usize::MAX,
        other => to_uint32(other.as_number()) as usize,
    };
    // One piece past the cap is enough to tell the result is too long.
    let take = limit.min(MAX_ARRAY_LENGTH + 1);
    let pieces: Vec<String> = match call.arg(0) {
        Value::Undefined => vec![text.as_str().to_string()],
        Value::RegExp(regex) => {
            let regex = regex.borrow().regex.clone();
            regex
                .split_all(text.as_str(), take)
                .map_err(|err| regex_failure(rt, err))?
        }
        separator => {
            let separator = separator.as_js_string();
            if separator.as_str().is_empty() {
                text.as_str().chars().take(take).map(String::from).collect()
            } else {
                text.as_str()
                    .split(separator.as_str())
                    .take(take)
                    .map(str::to_string)
                    .collect()
            }
        }
    };
    rt.check_array_length(pieces.len())?;
    Ok(Value::array(
        pieces
            .into_iter()
            .map(|piece| derived(piece, &text))
            .collect(),
    ))
}

struct MatchInfo {
    start: usize,
    end: usize,
    groups: Vec<Option<String>>,
}

impl MatchInfo {
    fn from_captures(captures: &Captures) -> Option<Self> {
        let whole = captures.get(0)?;
        Some(Self {
            start: whole.start(),
            end: whole.end(),
            groups: (0..captures.len())
                .map(|idx| captures.get(idx).map(|m| m.as_str().to_string()))
                .collect(),
        })
    }
}

fn literal_matches(subject: &str, needle: &str, all: bool) -> Vec<MatchInfo> {
    let mut out = Vec::new();
    let mut from = 0usize;
    while from <= subject.len() {
        let Some(offset) = subject[from..].find(needle) else {
            break;
        };
        let start = from + offset;
        out.push(MatchInfo {
            start,
            end: start + needle.len(),
            groups: vec![Some(needle.to_string())],
        });
        if !all {
            break;
        }
        from = if needle.is_empty() {
            match subject[start..].chars().next() {
                Some(ch) => start + ch.len_utf8(),
                None => break,
            }
        } else {
            start + needle.len()
        };
    }
    out
}

/// Expands `$&`, `$1`, ... in a replacement template. `None` once the
/// expansion grows past `MAX_STRING_LENGTH`.
fn expand_replacement(template: &str, subject: &str, info: &MatchInfo) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let chars = template.chars().collect::<Vec<_>>();
    let mut i = 0usize;
    while i < chars.len() {
        if out.len() > MAX_STRING_LENGTH {
            return None;
        }
        if chars[i] != '$' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        match chars[i + 1] {
            '$' => out.push('$'),
            '&' => out.push_str(&subject[info.start..info.end]),
            '`' => out.push_str(&subject[..info.start]),
            '\'' => out.push_str(&subject[info.end..]),
            digit if digit.is_ascii_digit() => {
                let two = chars
                    .get(i + 2)
                    .filter(|next| next.is_ascii_digit())
                    .and_then(|next| format!("{digit}{next}").parse::<usize>().ok())
                    .filter(|group| *group > 0 && *group < info.groups.len());
                let (group, consumed) = match two {
                    Some(group) => (group, 3),
                    None => (digit.to_digit(10).unwrap_or(0) as usize, 2),
                };
                if group == 0 || group >= info.groups.len() {
                    out.push('$');
                    out.push(digit);
                    i += 2;
                    continue;
                }
                if let Some(Some(text)) = info.groups.get(group) {
                    out.push_str(text);
                }
                i += consumed;
                continue;
            }
            other => {
                out.push('$');
                out.push(other);
            }
        }
        i += 2;
    }
    (out.len() <= MAX_STRING_LENGTH).then_some(out)
}

fn replace_impl(rt: &mut Runtime, call: &NativeCall, all: bool) -> Result<Value> {
    let text = this_string(rt, call)?;
    let subject = text.as_str();
    let matches = match call.arg(0) {
        Value::RegExp(regex) => {
            let regex = regex.borrow().regex.clone();
            if all && !regex.global() {
                return Err(rt.type_error("replaceAll must be called with a global RegExp"));
            }
            let captures = if regex.global() {
                regex.captures_all(subject)
            } else {
                regex
                    .captures_from_pos(subject, 0)
                    .map(|found| found.into_iter().collect())
            }
            .map_err(|err| regex_failure(rt, err))?;
            captures
                .iter()
                .filter_map(MatchInfo::from_captures)
                .collect::<Vec<_>>()
        }
        pattern => literal_matches(subject, pattern.as_js_string().as_str(), all),
    };
    let replacement = call.arg(1);
    let mut out = JsStringBuilder::with_taint(text.taint());
    let mut last = 0usize;
    for info in &matches {
        out.push_str(rt, &subject[last..info.start])?;
        let piece = if replacement.is_callable() {
            let mut args = info
                .groups
                .iter()
                .map(|group| group.as_deref().map_or(Value::Undefined, |g| derived(g, &text)))
                .collect::<Vec<_>>();
            args.push(Value::Number(byte_to_char(subject, info.start) as f64));
            args.push(Value::String(text.clone()));
            let result = rt.call_function(&replacement, Value::Undefined, args)?;
            rt.to_js_string(&result)?
        } else {
            let template = replacement.as_js_string();
            let Some(expanded) = expand_replacement(template.as_str(), subject, info) else {
                return Err(rt.range_error("Invalid string length"));
            };
            JsString::tainted(expanded, template.taint().clone())
        };
        out.push(rt, &piece)?;
        last = info.end;
    }
    out.push_str(rt, &subject[last..])?;
    Ok(Value::String(out.finish()))
}

fn replace(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    replace_impl(rt, call, false)
}

fn replace_all(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    replace_impl(rt, call, true)
}

fn match_regexp(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let regex = regex_arg(rt, &call.arg(0))?;
    if regex.global() {
        let found = regex
            .captures_all(text.as_str())
            .map_err(|err| regex_failure(rt, err))?;
        if let Value::RegExp(original) = call.arg(0) {
            original.borrow_mut().last_index = 0;
        }
        if found.is_empty() {
            return Ok(Value::Null);
        }
        return Ok(Value::array(
            found
                .iter()
                .filter_map(|captures| captures.get(0))
                .map(|m| derived(m.as_str(), &text))
                .collect(),
        ));
    }
    let found = regex
        .captures_from_pos(text.as_str(), 0)
        .map_err(|err| regex_failure(rt, err))?;
    Ok(match found.as_ref().and_then(MatchInfo::from_captures) {
        Some(info) => Value::array(
            info.groups
                .iter()
                .map(|group| group.as_deref().map_or(Value::Undefined, |g| derived(g, &text)))
                .collect(),
        ),
        None => Value::Null,
    })
}

fn search(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let regex = regex_arg(rt, &call.arg(0))?;
    let found = regex
        .captures_from_pos(text.as_str(), 0)
        .map_err(|err| regex_failure(rt, err))?;
    Ok(Value::Number(
        found
            .as_ref()
            .and_then(|captures| captures.get(0))
            .map_or(-1.0, |m| byte_to_char(text.as_str(), m.start()) as f64),
    ))
}

fn concat(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let mut out = JsStringBuilder::default();
    out.push(rt, &text)?;
    for arg in &call.args {
        let piece = rt.to_js_string(arg)?;
        out.push(rt, &piece)?;
    }
    Ok(Value::String(out.finish()))
}

fn normalize(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let form = match call.arg(0) {
        Value::Undefined => "NFC".to_string(),
        other => other.as_string(),
    };
    let normalized: String = match form.as_str() {
        "NFC" => text.as_str().nfc().collect(),
        "NFD" => text.as_str().nfd().collect(),
        "NFKC" => text.as_str().nfkc().collect(),
        "NFKD" => text.as_str().nfkd().collect(),
        _ => {
            return Err(rt.range_error(format!(
                "The normalization form should be one of NFC, NFD, NFKC, NFKD. Got {form}"
            )));
        }
    };
    Ok(derived(normalized, &text))
}

fn locale_compare(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let text = this_string(rt, call)?;
    let other = arg_string(call, 0);
    Ok(Value::Number(match text.as_str().cmp(other.as_str()) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    }))
}

fn to_string(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::String(this_string(rt, call)?))
}

fn from_char_code(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let units = call
        .args
        .iter()
        .map(|arg| (to_uint32(arg.as_number()) & 0xFFFF) as u16)
        .collect::<Vec<_>>();
    Ok(Value::string(String::from_utf16_lossy(&units)))
}

fn from_code_point(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let mut out = String::with_capacity(call.args.len());
    for arg in &call.args {
        let number = arg.as_number();
        let ch = (number.fract() == 0.0 && (0.0..=1_114_111.0).contains(&number))
            .then(|| char::from_u32(number as u32))
            .flatten();
        match ch {
            Some(ch) => out.push(ch),
            None => {
                return Err(rt.range_error(format!(
                    "Invalid code point {}",
                    format_number(number)
                )));
            }
        }
    }
    Ok(Value::string(out))
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
    fn slicing_uses_character_indices() -> Result<()> {
        assert_eq!(run("'héllo'.slice(1, 3)")?.as_string(), "él");
        assert_eq!(run("'héllo'.slice(-2)")?.as_string(), "lo");
        assert_eq!(run("'abcdef'.substring(4, 1)")?.as_string(), "bcd");
        assert_eq!(run("'abcdef'.substr(-3, 2)")?.as_string(), "de");
        assert_eq!(run("'abc'.charAt(5)")?.as_string(), "");
        assert_eq!(run("'abc'.charCodeAt(1)")?, Value::Number(98.0));
        assert_eq!(run("'abcabc'.indexOf('c', 3)")?, Value::Number(5.0));
        assert_eq!(run("'abcabc'.lastIndexOf('a')")?, Value::Number(3.0));
        Ok(())
    }

    #[test]
    fn replace_supports_patterns_groups_and_callbacks() -> Result<()> {
        assert_eq!(run("'a-b-c'.replace('-', '+')")?.as_string(), "a+b-c");
        assert_eq!(run("'a-b-c'.replaceAll('-', '+')")?.as_string(), "a+b+c");
        assert_eq!(run("'john smith'.replace(/(\\w+) (\\w+)/, '$2, $1')")?.as_string(), "smith, john");
        assert_eq!(
            run("'a1b2'.replace(/\\d/g, function (d) { return d * 2; })")?.as_string(),
            "a2b4"
        );
        assert!(matches!(run("'aa'.replaceAll(/a/, 'b')"), Err(Error::ScriptThrown(_))));
        Ok(())
    }

    #[test]
    fn split_and_match() -> Result<()> {
        assert_eq!(run("'a,b,,c'.split(',').length")?, Value::Number(4.0));
        assert_eq!(run("'abc'.split('').join('|')")?.as_string(), "a|b|c");
        assert_eq!(run("'a1b22c'.split(/\\d+/).join('|')")?.as_string(), "a|b|c");
        assert_eq!(run("'x1y23'.match(/\\d+/g).join(',')")?.as_string(), "1,23");
        assert_eq!(run("'key=val'.match(/(\\w+)=(\\w+)/)[2]")?.as_string(), "val");
        assert_eq!(run("'abc'.match(/z/)")?, Value::Null);
        assert_eq!(run("'hello'.search(/l+/)")?, Value::Number(2.0));
        Ok(())
    }

    #[test]
    fn char_code_synthesis_and_normalization() -> Result<()> {
        assert_eq!(run("String.fromCharCode(72, 105)")?.as_string(), "Hi");
        assert_eq!(run("String.fromCodePoint(128512).length")?, Value::Number(1.0));
        assert_eq!(run("'e\\u0301'.normalize('NFC')")?.as_string(), "\u{e9}");
        assert!(matches!(run("'x'.normalize('bad')"), Err(Error::ScriptThrown(_))));
        assert_eq!(run("'7'.padStart(3, '0')")?.as_string(), "007");
        assert_eq!(run("'ab'.repeat(3)")?.as_string(), "ababab");
        Ok(())
    }

    #[test]
    fn derived_strings_keep_receiver_taint() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script("var out = atob('aGVsbG8gd29ybGQ=').toUpperCase().slice(0, 5);")?;
        let Value::String(text) = rt.get_member(&rt.global_value(), "out", None)? else {
            panic!("expected a string");
        };
        assert_eq!(text.as_str(), "HELLO");
        assert_eq!(text.taint().iter().count(), 1);
        Ok(())
    }
}
