use super::*;

type ArrayRef = Rc<RefCell<Vec<Value>>>;

pub(super) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    let proto = env.realm().array_proto.clone();
    let methods: [(&str, NativeHandler); 29] = [
        ("push", push),
        ("pop", pop),
        ("shift", shift),
        ("unshift", unshift),
        ("slice", slice),
        ("splice", splice),
        ("concat", concat),
        ("join", join),
        ("toString", to_string),
        ("reverse", reverse),
        ("indexOf", index_of),
        ("lastIndexOf", last_index_of),
        ("includes", includes),
        ("find", find),
        ("findIndex", find_index),
        ("filter", filter),
        ("map", map),
        ("forEach", for_each),
        ("reduce", reduce),
        ("reduceRight", reduce_right),
        ("some", some),
        ("every", every),
        ("sort", sort),
        ("fill", fill),
        ("flat", flat),
        ("at", at),
        ("keys", keys),
        ("findLast", find_last),
        ("entries", entries),
    ];
    for (key, handler) in methods {
        env.method(&proto, key, &format!("Array.prototype.{key}"), handler);
    }
    let Some(array) = env.constructor("Array", array_constructor, &proto) else {
        return;
    };
    env.static_method(&array, "isArray", "Array.isArray", is_array);
    env.static_method(&array, "from", "Array.from", array_from);
    env.static_method(&array, "of", "Array.of", array_of);
}

fn this_array(rt: &Runtime, call: &NativeCall) -> Result<ArrayRef> {
    match &call.this {
        Value::Array(items) => Ok(items.clone()),
        other => Err(rt.type_error(format!(
            "Array.prototype method called on incompatible receiver {}",
            render_value(other)
        ))),
    }
}

fn item_at(items: &ArrayRef, index: usize) -> Value {
    items.borrow().get(index).cloned().unwrap_or(Value::Undefined)
}

fn push(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let mut items = items.borrow_mut();
    rt.check_array_length(items.len().saturating_add(call.args.len()))?;
    items.extend(call.args.iter().cloned());
    Ok(Value::Number(items.len() as f64))
}

fn pop(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let popped = items.borrow_mut().pop();
    Ok(popped.unwrap_or(Value::Undefined))
}

fn shift(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let mut items = items.borrow_mut();
    if items.is_empty() {
        return Ok(Value::Undefined);
    }
    Ok(items.remove(0))
}

fn unshift(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let mut items = items.borrow_mut();
    rt.check_array_length(items.len().saturating_add(call.args.len()))?;
    items.splice(0..0, call.args.iter().cloned());
    Ok(Value::Number(items.len() as f64))
}

fn slice(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let items = items.borrow();
    let start = relative_index(&call.arg(0), items.len(), 0);
    let end = relative_index(&call.arg(1), items.len(), items.len());
    Ok(Value::array(
        items.get(start..end.max(start)).map(<[Value]>::to_vec).unwrap_or_default(),
    ))
}

fn splice(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let mut items = items.borrow_mut();
    let len = items.len();
    let start = relative_index(&call.arg(0), len, 0);
    let delete = match call.args.len() {
        0 => 0,
        1 => len - start,
        _ => (to_integer(call.arg(1).as_number()).max(0.0) as usize).min(len - start),
    };
    rt.check_array_length(len.saturating_add(call.args.len().saturating_sub(2)))?;
    let inserted = call.args.iter().skip(2).cloned();
    let removed = items.splice(start..start + delete, inserted).collect();
    Ok(Value::array(removed))
}

fn concat(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let mut out = items.borrow().clone();
    for arg in &call.args {
        match arg {
            Value::Array(more) => {
                let more = more.borrow();
                rt.check_array_length(out.len().saturating_add(more.len()))?;
                out.extend(more.iter().cloned());
            }
            other => out.push(other.clone()),
        }
    }
    Ok(Value::array(out))
}

/// Joined text carries the union of the elements' taint.
fn join_values(rt: &mut Runtime, items: &ArrayRef, separator: &JsString) -> Result<JsString> {
    let snapshot = items.borrow().clone();
    let mut out = JsStringBuilder::default();
    for (idx, item) in snapshot.iter().enumerate() {
        if idx > 0 {
            out.push(rt, separator)?;
        }
        if item.is_nullish() {
            continue;
        }
        let piece = match item {
            Value::Array(nested) if Rc::ptr_eq(nested, items) => continue,
            other => rt.to_js_string(other)?,
        };
        out.push(rt, &piece)?;
    }
    Ok(out.finish())
}

fn join(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let separator = match call.arg(0) {
        Value::Undefined => JsString::new(","),
        other => other.as_js_string(),
    };
    Ok(Value::String(join_values(rt, &items, &separator)?))
}

fn to_string(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    Ok(Value::String(join_values(rt, &items, &JsString::new(","))?))
}

fn reverse(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    items.borrow_mut().reverse();
    Ok(Value::Array(items))
}

fn index_of(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let items = items.borrow();
    let needle = call.arg(0);
    let start = relative_index(&call.arg(1), items.len(), 0);
    let found = items
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, item)| item.strict_equals(&needle))
        .map(|(idx, _)| idx);
    Ok(Value::Number(found.map_or(-1.0, |idx| idx as f64)))
}

fn last_index_of(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let items = items.borrow();
    let needle = call.arg(0);
    let found = items.iter().rposition(|item| item.strict_equals(&needle));
    Ok(Value::Number(found.map_or(-1.0, |idx| idx as f64)))
}

fn includes(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let needle = call.arg(0);
    Ok(Value::Bool(
        items.borrow().iter().any(|item| item.same_value_zero(&needle)),
    ))
}

/// Calls `callback(item, index, array)` for each index present when the
/// iteration started, reading elements live. Stops when `visit` says so.
fn iterate(
    rt: &mut Runtime,
    call: &NativeCall,
    api: &str,
    mut visit: impl FnMut(usize, Value, Value) -> bool,
) -> Result<()> {
    let items = this_array(rt, call)?;
    let callback = callback_arg(rt, call, 0, api)?;
    let this_arg = call.arg(1);
    let len = items.borrow().len();
    for idx in 0..len {
        let item = item_at(&items, idx);
        let result = rt.call_function(
            &callback,
            this_arg.clone(),
            vec![item.clone(), Value::Number(idx as f64), Value::Array(items.clone())],
        )?;
        if !visit(idx, item, result) {
            break;
        }
    }
    Ok(())
}

fn find(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let mut found = Value::Undefined;
    iterate(rt, call, "Array.prototype.find", |_, item, result| {
        if result.truthy() {
            found = item;
            return false;
        }
        true
    })?;
    Ok(found)
}

fn find_last(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let mut found = Value::Undefined;
    iterate(rt, call, "Array.prototype.findLast", |_, item, result| {
        if result.truthy() {
            found = item;
        }
        true
    })?;
    Ok(found)
}

fn find_index(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let mut found = -1.0;
    iterate(rt, call, "Array.prototype.findIndex", |idx, _, result| {
        if result.truthy() {
            found = idx as f64;
            return false;
        }
        true
    })?;
    Ok(Value::Number(found))
}

fn filter(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let mut kept = Vec::new();
    iterate(rt, call, "Array.prototype.filter", |_, item, result| {
        if result.truthy() {
            kept.push(item);
        }
        true
    })?;
    Ok(Value::array(kept))
}

fn map(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let mut mapped = Vec::new();
    iterate(rt, call, "Array.prototype.map", |_, _, result| {
        mapped.push(result);
        true
    })?;
    Ok(Value::array(mapped))
}

fn for_each(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    iterate(rt, call, "Array.prototype.forEach", |_, _, _| true)?;
    Ok(Value::Undefined)
}

fn some(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let mut any = false;
    iterate(rt, call, "Array.prototype.some", |_, _, result| {
        any = result.truthy();
        !any
    })?;
    Ok(Value::Bool(any))
}

fn every(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let mut all = true;
    iterate(rt, call, "Array.prototype.every", |_, _, result| {
        all = result.truthy();
        all
    })?;
    Ok(Value::Bool(all))
}

fn reduce_impl(rt: &mut Runtime, call: &NativeCall, from_right: bool) -> Result<Value> {
    let items = this_array(rt, call)?;
    let callback = callback_arg(rt, call, 0, "Array.prototype.reduce")?;
    let len = items.borrow().len();
    let mut order: Box<dyn Iterator<Item = usize>> = if from_right {
        Box::new((0..len).rev())
    } else {
        Box::new(0..len)
    };
    let mut acc = if call.args.len() > 1 {
        call.arg(1)
    } else {
        match order.next() {
            Some(idx) => item_at(&items, idx),
            None => return Err(rt.type_error("Reduce of empty array with no initial value")),
        }
    };
    for idx in order {
        let item = item_at(&items, idx);
        acc = rt.call_function(
            &callback,
            Value::Undefined,
            vec![acc, item, Value::Number(idx as f64), Value::Array(items.clone())],
        )?;
    }
    Ok(acc)
}

fn reduce(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    reduce_impl(rt, call, false)
}

fn reduce_right(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    reduce_impl(rt, call, true)
}

fn compare_for_sort(rt: &mut Runtime, comparator: &Value, a: &Value, b: &Value) -> Result<bool> {
    match (a, b) {
        (Value::Undefined, _) => return Ok(false),
        (_, Value::Undefined) => return Ok(true),
        _ => {}
    }
    if comparator.is_callable() {
        let order = rt
            .call_function(comparator, Value::Undefined, vec![a.clone(), b.clone()])?
            .as_number();
        return Ok(order <= 0.0 || order.is_nan());
    }
    let left = rt.to_js_string(a)?;
    let right = rt.to_js_string(b)?;
    Ok(left.as_str() <= right.as_str())
}

/// Stable merge sort; the comparator may call back into script and fail.
fn merge_sort(rt: &mut Runtime, items: Vec<Value>, comparator: &Value) -> Result<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(rt, left, comparator)?;
    let right = merge_sort(rt, right, comparator)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => compare_for_sort(rt, comparator, a, b)?,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        out.extend(next);
    }
    Ok(out)
}

fn sort(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let comparator = call.arg(0);
    if !comparator.is_callable() && !matches!(comparator, Value::Undefined) {
        return Err(rt.type_error(
            "The comparison function must be either a function or undefined",
        ));
    }
    let snapshot = items.borrow().clone();
    let sorted = merge_sort(rt, snapshot, &comparator)?;
    *items.borrow_mut() = sorted;
    Ok(Value::Array(items))
}

fn fill(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    {
        let mut borrowed = items.borrow_mut();
        let len = borrowed.len();
        let start = relative_index(&call.arg(1), len, 0);
        let end = relative_index(&call.arg(2), len, len);
        for slot in borrowed.iter_mut().take(end).skip(start) {
            *slot = call.arg(0);
        }
    }
    Ok(Value::Array(items))
}

fn flatten_into(out: &mut Vec<Value>, items: &[Value], depth: f64) {
    for item in items {
        match item {
            Value::Array(nested) if depth >= 1.0 => {
                flatten_into(out, &nested.borrow(), depth - 1.0);
            }
            other => out.push(other.clone()),
        }
    }
}

fn flat(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let depth = match call.arg(0) {
        Value::Undefined => 1.0,
        other => to_integer(other.as_number()).min(64.0),
    };
    let mut out = Vec::new();
    flatten_into(&mut out, &items.borrow(), depth);
    Ok(Value::array(out))
}

fn at(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let items = items.borrow();
    let index = to_integer(call.arg(0).as_number());
    let index = if index < 0.0 { items.len() as f64 + index } else { index };
    if index < 0.0 {
        return Ok(Value::Undefined);
    }
    Ok(items.get(index as usize).cloned().unwrap_or(Value::Undefined))
}

fn keys(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let len = items.borrow().len();
    Ok(Value::array((0..len).map(|idx| Value::Number(idx as f64)).collect()))
}

fn entries(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let items = this_array(rt, call)?;
    let pairs = items
        .borrow()
        .iter()
        .enumerate()
        .map(|(idx, item)| Value::array(vec![Value::Number(idx as f64), item.clone()]))
        .collect();
    Ok(Value::array(pairs))
}

fn array_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    if let [Value::Number(len)] = call.args.as_slice() {
        if *len < 0.0 || len.fract() != 0.0 || *len > MAX_ARRAY_LENGTH as f64 {
            return Err(rt.range_error("Invalid array length"));
        }
        return Ok(Value::array(vec![Value::Undefined; *len as usize]));
    }
    Ok(Value::array(call.args.clone()))
}

fn is_array(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Bool(matches!(call.arg(0), Value::Array(_))))
}

fn array_from(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let source = call.arg(0);
    let items = match &source {
        Value::Array(items) => items.borrow().clone(),
        Value::String(_) => rt.spread_items(&source)?,
        Value::Object(object) => {
            let len = lookup_property(object, "length")
                .map(|len| to_integer(len.as_number()).clamp(0.0, MAX_ARRAY_LENGTH as f64) as usize)
                .unwrap_or(0);
            (0..len)
                .map(|idx| lookup_property(object, &idx.to_string()).unwrap_or(Value::Undefined))
                .collect()
        }
        _ => Vec::new(),
    };
    let mapper = call.arg(1);
    if !mapper.is_callable() {
        return Ok(Value::array(items));
    }
    let mut mapped = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        mapped.push(rt.call_function(
            &mapper,
            Value::Undefined,
            vec![item, Value::Number(idx as f64)],
        )?);
    }
    Ok(Value::array(mapped))
}

fn array_of(_rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::array(call.args.clone()))
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
    fn mutators_and_accessors() -> Result<()> {
        assert_eq!(run("[1, 2, 3].slice(-2).join('-')")?.as_string(), "2-3");
        assert_eq!(run("(function () { var a = [1, 2, 3, 4]; a.splice(1, 2, 'x'); return a.join(); })()")?.as_string(), "1,x,4");
        assert_eq!(run("[3, 1, 2].concat([4], 5).length")?, Value::Number(5.0));
        assert_eq!(run("[1, [2, [3]]].flat().length")?, Value::Number(3.0));
        assert_eq!(run("[NaN].includes(NaN)")?, Value::Bool(true));
        assert_eq!(run("[NaN].indexOf(NaN)")?, Value::Number(-1.0));
        Ok(())
    }

    #[test]
    fn callbacks_and_sort() -> Result<()> {
        assert_eq!(run("[1, 2, 3].map(function (x) { return x * 2; }).join()")?.as_string(), "2,4,6");
        assert_eq!(run("[1, 2, 3, 4].filter(function (x) { return x % 2; }).join()")?.as_string(), "1,3");
        assert_eq!(run("[1, 2, 3].reduce(function (a, b) { return a + b; })")?, Value::Number(6.0));
        assert_eq!(run("[10, 9, 1].sort().join()")?.as_string(), "1,10,9");
        assert_eq!(run("[10, 9, 1].sort(function (a, b) { return a - b; }).join()")?.as_string(), "1,9,10");
        assert!(matches!(run("[].reduce(function () {})"), Err(Error::ScriptThrown(_))));
        Ok(())
    }

    #[test]
    fn callbacks_count_as_crossings() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script("[1, 2, 3].forEach(function () {});")?;
        // forEach itself plus one crossing per element
        assert_eq!(rt.calls.count(), 4);
        Ok(())
    }
}
