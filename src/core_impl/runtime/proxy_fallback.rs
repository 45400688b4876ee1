use super::*;

const MAX_COOKIE_BYTES: usize = 4096;
const MAX_COOKIES: usize = 180;

/// Memoized placeholders for unresolved paths plus the real values that
/// replaced them once a script assigned to the path.
pub(crate) struct ProxyFallbackLayer {
    stubs: HashMap<String, Rc<FallbackStub>>,
    graduated: HashMap<String, Value>,
}

impl ProxyFallbackLayer {
    pub(crate) fn new() -> Self {
        Self {
            stubs: HashMap::new(),
            graduated: HashMap::new(),
        }
    }

    /// The stub for `path`, created on first use. Repeated requests return
    /// the same `Rc`.
    pub(crate) fn stub(&mut self, path: IdentifierPath) -> Rc<FallbackStub> {
        if let Some(stub) = self.stubs.get(path.as_str()) {
            return stub.clone();
        }
        tracing::debug!(path = %path, "created fallback stub");
        let key = path.as_str().to_string();
        let stub = Rc::new(FallbackStub { path });
        self.stubs.insert(key, stub.clone());
        stub
    }

    /// Graduated value for `path` if one was assigned, otherwise its stub.
    pub(crate) fn resolve(&mut self, path: IdentifierPath) -> Value {
        if let Some(value) = self.graduated.get(path.as_str()) {
            return value.clone();
        }
        Value::Stub(self.stub(path))
    }

    pub(crate) fn graduate(&mut self, path: &IdentifierPath, value: Value) {
        tracing::debug!(path = %path, "fallback slot assigned a real value");
        self.graduated.insert(path.as_str().to_string(), value);
    }

    pub(crate) fn stub_count(&self) -> usize {
        self.stubs.len()
    }

    pub(crate) fn stub_paths(&self) -> Vec<String> {
        let mut paths = self.stubs.keys().cloned().collect::<Vec<_>>();
        paths.sort();
        paths
    }
}

/// Canonical array index form of a property key.
pub(crate) fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<usize>().ok()
}

fn receiver_path(path: Option<&IdentifierPath>, base: &Value) -> IdentifierPath {
    path.cloned().unwrap_or_else(|| {
        IdentifierPath::root(if matches!(base, Value::Null) {
            "null"
        } else {
            "undefined"
        })
    })
}

impl Runtime {
    /// Unresolved identifiers resolve through the global object, so `foo`
    /// and `window.foo` share one stub.
    pub(crate) fn lookup_identifier(&mut self, name: &str, scope: &ScopeRef) -> Value {
        if let Some(value) = scope::lookup_lexical(scope, name) {
            return value;
        }
        if let Some(value) = lookup_property(&self.global, name) {
            return value;
        }
        self.fallback
            .resolve(IdentifierPath::root("window").child(name))
    }

    pub(crate) fn assign_identifier(
        &mut self,
        name: &str,
        value: Value,
        scope: &ScopeRef,
    ) -> Result<()> {
        match scope::assign_lexical(scope, name, value.clone()) {
            scope::AssignOutcome::Assigned => Ok(()),
            scope::AssignOutcome::Constant => {
                Err(self.type_error("Assignment to constant variable."))
            }
            scope::AssignOutcome::Unbound => {
                self.global.borrow_mut().set(name, value);
                Ok(())
            }
        }
    }

    /// Property read with fallback. `path` is the syntactic path of the
    /// receiver and is only consulted for `undefined`/`null` receivers.
    pub(crate) fn get_member(
        &mut self,
        base: &Value,
        key: &str,
        path: Option<&IdentifierPath>,
    ) -> Result<Value> {
        match base {
            Value::String(text) => {
                if key == "length" {
                    return Ok(Value::Number(text.as_str().chars().count() as f64));
                }
                if let Some(idx) = array_index(key) {
                    return Ok(text
                        .as_str()
                        .chars()
                        .nth(idx)
                        .map(|ch| {
                            Value::String(JsString::tainted(ch.to_string(), text.taint().clone()))
                        })
                        .unwrap_or(Value::Undefined));
                }
                Ok(lookup_property(&self.realm.string_proto, key).unwrap_or(Value::Undefined))
            }
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                if let Some(idx) = array_index(key) {
                    return Ok(items.borrow().get(idx).cloned().unwrap_or(Value::Undefined));
                }
                Ok(lookup_property(&self.realm.array_proto, key).unwrap_or(Value::Undefined))
            }
            Value::Object(object) => {
                if let Some(value) = self.special_object_member(object, key) {
                    return Ok(value);
                }
                if let Some(value) = lookup_property(object, key) {
                    return Ok(value);
                }
                let host_path = object.borrow().host_path.clone();
                Ok(match host_path {
                    Some(host_path) => self.fallback.resolve(host_path.child(key)),
                    None => Value::Undefined,
                })
            }
            Value::Function(function) => {
                let props = function.props.borrow();
                if let Some(value) = props.get_own(key) {
                    return Ok(value.clone());
                }
                match key {
                    "name" => return Ok(Value::string(function.short_name())),
                    "length" => {
                        let arity = match &function.kind {
                            FunctionKind::Script { def, .. } => def
                                .params
                                .iter()
                                .take_while(|param| param.default.is_none() && !param.is_rest)
                                .count(),
                            _ => 0,
                        };
                        return Ok(Value::Number(arity as f64));
                    }
                    _ => {}
                }
                if let Some(value) = props
                    .proto
                    .as_ref()
                    .and_then(|proto| lookup_property(proto, key))
                {
                    return Ok(value);
                }
                let host_path = props.host_path.clone();
                drop(props);
                Ok(match host_path {
                    Some(host_path) => self.fallback.resolve(host_path.child(key)),
                    None => Value::Undefined,
                })
            }
            Value::Stub(stub) => Ok(self.fallback.resolve(stub.path.child(key))),
            Value::Undefined | Value::Null => Ok(self
                .fallback
                .resolve(receiver_path(path, base).child(key))),
            Value::Number(_) => {
                Ok(lookup_property(&self.realm.number_proto, key).unwrap_or(Value::Undefined))
            }
            Value::Bool(_) => {
                Ok(lookup_property(&self.realm.boolean_proto, key).unwrap_or(Value::Undefined))
            }
            Value::RegExp(regex) => {
                let regex_ref = regex.borrow();
                let value = match key {
                    "source" => Value::string(regex_ref.regex.source()),
                    "flags" => Value::string(regex_ref.regex.flags()),
                    "global" => Value::Bool(regex_ref.regex.global()),
                    "sticky" => Value::Bool(regex_ref.regex.sticky()),
                    "ignoreCase" => Value::Bool(regex_ref.regex.flags().contains('i')),
                    "multiline" => Value::Bool(regex_ref.regex.flags().contains('m')),
                    "lastIndex" => Value::Number(regex_ref.last_index as f64),
                    _ => lookup_property(&self.realm.regexp_proto, key).unwrap_or(Value::Undefined),
                };
                Ok(value)
            }
            Value::Promise(_) => {
                Ok(lookup_property(&self.realm.promise_proto, key).unwrap_or(Value::Undefined))
            }
        }
    }

    /// Host object slots computed from runtime state instead of entries.
    fn special_object_member(&self, object: &ObjectRef, key: &str) -> Option<Value> {
        let borrowed = object.borrow();
        match &borrowed.kind {
            ObjectKind::Document if key == "cookie" => {
                let mut text = JsString::new("");
                for (idx, (name, value)) in self.document.cookies.iter().enumerate() {
                    if idx > 0 {
                        text = text.concat(&JsString::new("; "));
                    }
                    text = text.concat(&JsString::new(format!("{name}=")));
                    text = text.concat(value);
                }
                Some(Value::String(text))
            }
            ObjectKind::Storage(items) => {
                if key == "length" {
                    return Some(Value::Number(items.len() as f64));
                }
                if borrowed.has_own(key) || lookup_property(object, key).is_some() {
                    return None;
                }
                items
                    .iter()
                    .find(|(name, _)| name == key)
                    .map(|(_, value)| value.clone())
            }
            ObjectKind::Element(element) => match key {
                "tagName" | "nodeName" => Some(Value::string(element.tag.to_ascii_uppercase())),
                _ => None,
            },
            _ => None,
        }
    }

    /// Property write. Writes below a stub or a nullish receiver graduate
    /// that path out of fallback.
    pub(crate) fn set_member(
        &mut self,
        base: &Value,
        key: &str,
        value: Value,
        path: Option<&IdentifierPath>,
    ) -> Result<()> {
        match base {
            Value::Object(object) => {
                if key == "cookie" && matches!(object.borrow().kind, ObjectKind::Document) {
                    self.write_cookie(&value);
                    return Ok(());
                }
                let kind_handled = {
                    let mut borrowed = object.borrow_mut();
                    match &mut borrowed.kind {
                        ObjectKind::Storage(items) if !matches!(key, "length") => {
                            let stored = Value::String(value.as_js_string());
                            match items.iter_mut().find(|(name, _)| name == key) {
                                Some(slot) => slot.1 = stored,
                                None => items.push((key.to_string(), stored)),
                            }
                            true
                        }
                        ObjectKind::Element(element) if matches!(key, "id" | "className") => {
                            let attr = if key == "className" { "class" } else { key };
                            let text = value.as_js_string();
                            match element.attributes.iter_mut().find(|(name, _)| name == attr) {
                                Some(slot) => slot.1 = text,
                                None => element.attributes.push((attr.to_string(), text)),
                            }
                            false
                        }
                        _ => false,
                    }
                };
                if !kind_handled {
                    object.borrow_mut().set(key, value);
                }
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let len = value.as_number();
                    if !(len >= 0.0 && len.fract() == 0.0 && len <= MAX_ARRAY_LENGTH as f64) {
                        return Err(self.range_error("Invalid array length"));
                    }
                    items.borrow_mut().resize(len as usize, Value::Undefined);
                    return Ok(());
                }
                if let Some(idx) = array_index(key) {
                    let mut items = items.borrow_mut();
                    if idx >= items.len() {
                        self.check_array_length(idx.saturating_add(1))?;
                        items.resize(idx + 1, Value::Undefined);
                    }
                    items[idx] = value;
                }
                Ok(())
            }
            Value::Function(function) => {
                function.props.borrow_mut().set(key, value);
                Ok(())
            }
            Value::Stub(stub) => {
                let target = stub.path.child(key);
                self.fallback.graduate(&target, value);
                Ok(())
            }
            Value::Undefined | Value::Null => {
                let target = receiver_path(path, base).child(key);
                self.fallback.graduate(&target, value);
                Ok(())
            }
            Value::RegExp(regex) => {
                if key == "lastIndex" {
                    regex.borrow_mut().last_index = value.as_number().max(0.0) as usize;
                }
                Ok(())
            }
            Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Promise(_) => Ok(()),
        }
    }

    pub(crate) fn delete_member(&mut self, base: &Value, key: &str) -> bool {
        match base {
            Value::Object(object) => object.borrow_mut().remove(key),
            Value::Array(items) => {
                if let Some(idx) = array_index(key) {
                    if let Some(slot) = items.borrow_mut().get_mut(idx) {
                        *slot = Value::Undefined;
                    }
                }
                true
            }
            Value::Function(function) => function.props.borrow_mut().remove(key),
            _ => true,
        }
    }

    pub(crate) fn has_member(&self, base: &Value, key: &str) -> Option<bool> {
        match base {
            Value::Object(object) => Some(
                lookup_property(object, key).is_some()
                    || self.special_object_member(object, key).is_some(),
            ),
            Value::Array(items) => Some(
                key == "length"
                    || array_index(key).is_some_and(|idx| idx < items.borrow().len())
                    || lookup_property(&self.realm.array_proto, key).is_some(),
            ),
            Value::Function(function) => Some(
                function.props.borrow().has_own(key)
                    || function
                        .props
                        .borrow()
                        .proto
                        .as_ref()
                        .is_some_and(|proto| lookup_property(proto, key).is_some()),
            ),
            Value::Stub(_) | Value::Promise(_) | Value::RegExp(_) => Some(false),
            _ => None,
        }
    }

    /// Oversized pairs are dropped and the jar stops growing at `MAX_COOKIES`.
    fn write_cookie(&mut self, value: &Value) {
        let text = value.as_js_string();
        let Some(pair) = text.as_str().split(';').next() else {
            return;
        };
        if pair.len() > MAX_COOKIE_BYTES {
            return;
        }
        let (name, cookie_value) = pair.split_once('=').unwrap_or(("", pair));
        let name = name.trim().to_string();
        let stored = JsString::tainted(cookie_value.trim(), text.taint().clone());
        let cookie_count = self.document.cookies.len();
        match self.document.cookies.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = stored,
            None if cookie_count < MAX_COOKIES => self.document.cookies.push((name, stored)),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stubs_are_memoized_per_path() {
        let mut layer = ProxyFallbackLayer::new();
        let path = IdentifierPath::root("window").child("crypto");
        let first = layer.stub(path.clone());
        let second = layer.stub(path.clone());
        assert!(Rc::ptr_eq(&first, &second));
        layer.stub(path.child("subtle"));
        assert_eq!(layer.stub_count(), 2);
        assert_eq!(
            layer.stub_paths(),
            vec!["window.crypto".to_string(), "window.crypto.subtle".to_string()]
        );
    }

    #[test]
    fn graduated_paths_stop_resolving_to_stubs() {
        let mut layer = ProxyFallbackLayer::new();
        let path = IdentifierPath::root("window").child("tracker").child("id");
        assert!(matches!(layer.resolve(path.clone()), Value::Stub(_)));
        layer.graduate(&path, Value::Number(7.0));
        assert_eq!(layer.resolve(path), Value::Number(7.0));
    }

    #[test]
    fn array_index_accepts_canonical_integers_only() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("042"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("1.5"), None);
        assert_eq!(array_index(""), None);
    }
}
