use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::core_impl::parser::is_ident;
use crate::core_impl::runtime::{Runtime, ScopeRef};
use crate::js_regex::JsRegex;
use crate::script_ast::FunctionDef;
use crate::{Error, Result};

/// Identifier of one minted taint tag. Tags are never reused within a run.
pub type TaintTagId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaintSourceKind {
    Decode,
    Encode,
    CharSynthesis,
    Custom,
}

impl fmt::Display for TaintSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Decode => "decode",
            Self::Encode => "encode",
            Self::CharSynthesis => "char-synthesis",
            Self::Custom => "custom",
        };
        f.write_str(label)
    }
}

/// Set of taint tags attached to a string. Shared between derived values
/// until a union actually adds tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TaintSet {
    tags: Option<Rc<BTreeSet<TaintTagId>>>,
}

impl TaintSet {
    pub(crate) fn single(tag: TaintTagId) -> Self {
        Self {
            tags: Some(Rc::new(BTreeSet::from([tag]))),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tags.as_ref().is_none_or(|tags| tags.is_empty())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = TaintTagId> + '_ {
        self.tags.iter().flat_map(|tags| tags.iter().copied())
    }

    pub(crate) fn union(&self, other: &TaintSet) -> TaintSet {
        match (&self.tags, &other.tags) {
            (_, None) => self.clone(),
            (None, _) => other.clone(),
            (Some(left), Some(right)) => {
                if Rc::ptr_eq(left, right) || left.is_superset(right) {
                    self.clone()
                } else if right.is_superset(left) {
                    other.clone()
                } else {
                    let merged = left.union(right).copied().collect::<BTreeSet<_>>();
                    Self {
                        tags: Some(Rc::new(merged)),
                    }
                }
            }
        }
    }

    pub(crate) fn extend(&mut self, other: &TaintSet) {
        if !other.is_empty() {
            *self = self.union(other);
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct JsString {
    text: Rc<str>,
    taint: TaintSet,
}

impl JsString {
    pub(crate) fn new(text: impl Into<Rc<str>>) -> Self {
        Self {
            text: text.into(),
            taint: TaintSet::default(),
        }
    }

    pub(crate) fn tainted(text: impl Into<Rc<str>>, taint: TaintSet) -> Self {
        Self {
            text: text.into(),
            taint,
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.text
    }

    pub(crate) fn taint(&self) -> &TaintSet {
        &self.taint
    }

    pub(crate) fn with_taint(mut self, taint: &TaintSet) -> Self {
        self.taint.extend(taint);
        self
    }

    pub(crate) fn concat(&self, other: &JsString) -> JsString {
        let mut text = String::with_capacity(self.text.len() + other.text.len());
        text.push_str(&self.text);
        text.push_str(&other.text);
        JsString::tainted(text, self.taint.union(&other.taint))
    }
}

/// Longest string, in UTF-8 bytes, a script may build.
pub(crate) const MAX_STRING_LENGTH: usize = 100_000_000;
/// Longest array a script may build.
pub(crate) const MAX_ARRAY_LENGTH: usize = 10_000_000;

/// Accumulates pieces into one string, unioning their taint. Every push is
/// checked against `MAX_STRING_LENGTH`.
#[derive(Default)]
pub(crate) struct JsStringBuilder {
    text: String,
    taint: TaintSet,
}

impl JsStringBuilder {
    pub(crate) fn with_taint(taint: &TaintSet) -> Self {
        Self {
            text: String::new(),
            taint: taint.clone(),
        }
    }

    pub(crate) fn push(&mut self, rt: &Runtime, piece: &JsString) -> Result<()> {
        self.push_str(rt, piece.as_str())?;
        self.taint.extend(piece.taint());
        Ok(())
    }

    pub(crate) fn push_str(&mut self, rt: &Runtime, text: &str) -> Result<()> {
        rt.check_string_length(self.text.len().saturating_add(text.len()))?;
        self.text.push_str(text);
        Ok(())
    }

    pub(crate) fn finish(self) -> JsString {
        JsString::tainted(self.text, self.taint)
    }
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathSegment {
    Property(String),
    Call,
}

/// Dotted access path such as `window.crypto.subtle.encrypt()`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentifierPath {
    segments: Vec<PathSegment>,
    rendered: String,
}

impl IdentifierPath {
    pub fn root(name: &str) -> Self {
        Self {
            segments: vec![PathSegment::Property(name.to_string())],
            rendered: name.to_string(),
        }
    }

    /// Parses a manifest path. Segments must be identifiers, each optionally
    /// followed by `()` call markers.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Config("empty identifier path".into()));
        }
        let mut path: Option<IdentifierPath> = None;
        for raw in text.split('.') {
            let mut name = raw;
            let mut calls = 0usize;
            while let Some(stripped) = name.strip_suffix("()") {
                name = stripped;
                calls += 1;
            }
            if !is_ident(name) {
                return Err(Error::Config(format!(
                    "invalid identifier path '{text}': bad segment '{raw}'"
                )));
            }
            let mut next = match path {
                Some(parent) => parent.child(name),
                None => IdentifierPath::root(name),
            };
            for _ in 0..calls {
                next = next.called();
            }
            path = Some(next);
        }
        path.ok_or_else(|| Error::Config(format!("invalid identifier path '{text}'")))
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Property(name.to_string()));
        Self {
            segments,
            rendered: format!("{}.{name}", self.rendered),
        }
    }

    pub fn called(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Call);
        Self {
            segments,
            rendered: format!("{}()", self.rendered),
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// The path with a leading global alias (`window.`, `self.`,
    /// `globalThis.`) removed, used to match manifest entries.
    pub fn canonical(&self) -> &str {
        canonical_name(&self.rendered)
    }
}

pub(crate) fn canonical_name(path: &str) -> &str {
    for prefix in ["window.", "globalThis.", "self."] {
        if let Some(rest) = path.strip_prefix(prefix) {
            return canonical_name(rest);
        }
    }
    path
}

impl fmt::Display for IdentifierPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl fmt::Debug for IdentifierPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentifierPath({})", self.rendered)
    }
}

impl Serialize for IdentifierPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.rendered)
    }
}

/// Inert placeholder for an unimplemented global, member or call result.
#[derive(Debug)]
pub(crate) struct FallbackStub {
    pub(crate) path: IdentifierPath,
}

#[derive(Debug, Clone)]
pub(crate) struct ElementState {
    pub(crate) tag: String,
    pub(crate) attributes: Vec<(String, JsString)>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct XhrState {
    pub(crate) method: Option<String>,
    pub(crate) url: Option<JsString>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) sent: bool,
    pub(crate) listeners: Vec<(String, Value)>,
}

#[derive(Debug, Clone)]
pub(crate) enum ObjectKind {
    Plain,
    Global,
    Error,
    Host,
    Document,
    Element(ElementState),
    Storage(Vec<(String, Value)>),
    Xhr(XhrState),
    WebSocket { url: JsString },
    Response { body: JsString },
}

pub(crate) type ObjectRef = Rc<RefCell<ObjectValue>>;

pub(crate) struct ObjectValue {
    entries: Vec<(String, Value)>,
    index_by_key: HashMap<String, usize>,
    pub(crate) proto: Option<ObjectRef>,
    pub(crate) kind: ObjectKind,
    /// Present on host objects; misses on them fall back to stubs.
    pub(crate) host_path: Option<IdentifierPath>,
    pub(crate) frozen: bool,
}

impl ObjectValue {
    pub(crate) fn new(proto: Option<ObjectRef>) -> Self {
        Self {
            entries: Vec::new(),
            index_by_key: HashMap::new(),
            proto,
            kind: ObjectKind::Plain,
            host_path: None,
            frozen: false,
        }
    }

    pub(crate) fn host(path: IdentifierPath, proto: Option<ObjectRef>) -> Self {
        let mut object = Self::new(proto);
        object.kind = ObjectKind::Host;
        object.host_path = Some(path);
        object
    }

    pub(crate) fn with_kind(mut self, kind: ObjectKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn into_ref(self) -> ObjectRef {
        Rc::new(RefCell::new(self))
    }

    pub(crate) fn get_own(&self, key: &str) -> Option<&Value> {
        self.index_by_key
            .get(key)
            .and_then(|idx| self.entries.get(*idx))
            .map(|(_, value)| value)
    }

    pub(crate) fn has_own(&self, key: &str) -> bool {
        self.index_by_key.contains_key(key)
    }

    pub(crate) fn set(&mut self, key: &str, value: Value) {
        if self.frozen {
            return;
        }
        if let Some(idx) = self.index_by_key.get(key) {
            self.entries[*idx].1 = value;
            return;
        }
        self.index_by_key.insert(key.to_string(), self.entries.len());
        self.entries.push((key.to_string(), value));
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        if self.frozen {
            return false;
        }
        let Some(idx) = self.index_by_key.remove(key) else {
            return true;
        };
        self.entries.remove(idx);
        for slot in self.index_by_key.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        true
    }

    /// Drops every entry and the prototype link, ignoring `frozen`.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.index_by_key.clear();
        self.proto = None;
    }

    pub(crate) fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub(crate) fn is_error(&self) -> bool {
        matches!(self.kind, ObjectKind::Error)
    }
}

/// Own-then-prototype lookup without fallback.
pub(crate) fn lookup_property(object: &ObjectRef, key: &str) -> Option<Value> {
    let mut current = Some(object.clone());
    let mut depth = 0usize;
    while let Some(node) = current {
        let borrowed = node.borrow();
        if let Some(value) = borrowed.get_own(key) {
            return Some(value.clone());
        }
        depth += 1;
        if depth > 256 {
            return None;
        }
        current = borrowed.proto.clone();
    }
    None
}

pub(crate) type NativeHandler = fn(&mut Runtime, &NativeCall) -> Result<Value>;

pub(crate) struct NativeCall {
    pub(crate) this: Value,
    pub(crate) args: Vec<Value>,
    pub(crate) data: Option<Value>,
    pub(crate) is_construct: bool,
    /// Crossings counted before this call's own crossing.
    pub(crate) preceding_calls: u64,
}

impl NativeCall {
    pub(crate) fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Undefined)
    }
}

pub(crate) struct NativeFunction {
    /// Canonical API name (`atob`, `XMLHttpRequest.prototype.send`) used for
    /// source and sink manifest matching.
    pub(crate) name: Rc<str>,
    pub(crate) handler: NativeHandler,
    pub(crate) data: Option<Value>,
}

pub(crate) enum FunctionKind {
    Script { def: Rc<FunctionDef>, env: ScopeRef },
    Native(NativeFunction),
    Bound {
        target: Rc<FunctionValue>,
        this: Value,
        args: Vec<Value>,
    },
}

pub(crate) struct FunctionValue {
    pub(crate) kind: FunctionKind,
    pub(crate) props: RefCell<ObjectValue>,
}

impl FunctionValue {
    pub(crate) fn display_name(&self) -> String {
        match &self.kind {
            FunctionKind::Script { def, .. } => {
                def.name.clone().unwrap_or_else(|| "anonymous".to_string())
            }
            FunctionKind::Native(native) => native.name.to_string(),
            FunctionKind::Bound { target, .. } => format!("bound {}", target.display_name()),
        }
    }

    /// Short `name` property value.
    pub(crate) fn short_name(&self) -> String {
        match &self.kind {
            FunctionKind::Native(native) => native
                .name
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_string(),
            _ => self.display_name(),
        }
    }
}

pub(crate) struct RegExpValue {
    pub(crate) regex: JsRegex,
    pub(crate) last_index: usize,
}

#[derive(Clone)]
pub(crate) enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

pub(crate) enum ReactionKind {
    Then {
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
    },
    Finally(Option<Value>),
    Adopt,
}

pub(crate) struct PromiseReaction {
    pub(crate) kind: ReactionKind,
    pub(crate) derived: PromiseRef,
}

pub(crate) struct PromiseValue {
    pub(crate) state: PromiseState,
    pub(crate) reactions: Vec<PromiseReaction>,
}

pub(crate) type PromiseRef = Rc<RefCell<PromiseValue>>;

#[derive(Clone)]
pub(crate) enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(JsString),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(ObjectRef),
    Function(Rc<FunctionValue>),
    Stub(Rc<FallbackStub>),
    RegExp(Rc<RefCell<RegExpValue>>),
    Promise(PromiseRef),
}

impl Value {
    pub(crate) fn string(text: impl Into<Rc<str>>) -> Self {
        Self::String(JsString::new(text))
    }

    pub(crate) fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub(crate) fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub(crate) fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Stub(_))
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0.0 && !value.is_nan(),
            Self::String(value) => !value.as_str().is_empty(),
            _ => true,
        }
    }

    pub(crate) fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) | Self::Stub(_) => "function",
            Self::Array(_) | Self::Object(_) | Self::RegExp(_) | Self::Promise(_) => "object",
        }
    }

    pub(crate) fn as_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(value) => f64::from(u8::from(*value)),
            Self::Number(value) => *value,
            Self::String(value) => string_to_number(value.as_str()),
            Self::Array(_) => string_to_number(self.as_js_string().as_str()),
            _ => f64::NAN,
        }
    }

    /// ToString. Array text past `MAX_STRING_LENGTH` is cut at the limit;
    /// `try_as_js_string` reports that case instead.
    pub(crate) fn as_js_string(&self) -> JsString {
        self.string_conversion().0
    }

    pub(crate) fn try_as_js_string(&self) -> Option<JsString> {
        let (text, complete) = self.string_conversion();
        complete.then_some(text)
    }

    pub(crate) fn as_string(&self) -> String {
        self.as_js_string().as_str().to_string()
    }

    fn string_conversion(&self) -> (JsString, bool) {
        match self {
            Self::Array(items) => {
                let mut writer = ArrayTextWriter::default();
                let complete = writer.write(items);
                (JsString::tainted(writer.text, writer.taint), complete)
            }
            other => (other.scalar_js_string(), true),
        }
    }

    fn scalar_js_string(&self) -> JsString {
        match self {
            Self::Undefined => JsString::new("undefined"),
            Self::Null => JsString::new("null"),
            Self::Bool(value) => JsString::new(if *value { "true" } else { "false" }),
            Self::Number(value) => JsString::new(format_number(*value)),
            Self::String(value) => value.clone(),
            Self::Array(_) => self.as_js_string(),
            Self::Object(object) => {
                let borrowed = object.borrow();
                if borrowed.is_error() {
                    drop(borrowed);
                    return JsString::new(error_to_string(object));
                }
                JsString::new("[object Object]")
            }
            Self::Function(function) => JsString::new(format!(
                "function {}() {{ [native code] }}",
                function.short_name()
            )),
            Self::Stub(_) => JsString::new(""),
            Self::RegExp(regex) => {
                let regex = regex.borrow();
                JsString::new(format!("/{}/{}", regex.regex.source(), regex.regex.flags()))
            }
            Self::Promise(_) => JsString::new("[object Promise]"),
        }
    }

    /// Union of every taint tag reachable from this value, following arrays
    /// and plain objects.
    pub(crate) fn collect_taint(&self, out: &mut TaintSet) {
        self.collect_taint_at_depth(out, &mut HashSet::new(), 0);
    }

    fn collect_taint_at_depth(&self, out: &mut TaintSet, seen: &mut HashSet<usize>, depth: usize) {
        if depth > 32 {
            return;
        }
        match self {
            Self::String(value) => out.extend(value.taint()),
            Self::Array(items) => {
                if !seen.insert(Rc::as_ptr(items) as *const () as usize) {
                    return;
                }
                for item in items.borrow().iter() {
                    item.collect_taint_at_depth(out, seen, depth + 1);
                }
            }
            Self::Object(object) => {
                if !seen.insert(Rc::as_ptr(object) as *const () as usize) {
                    return;
                }
                for (_, value) in object.borrow().entries() {
                    value.collect_taint_at_depth(out, seen, depth + 1);
                }
            }
            _ => {}
        }
    }

    pub(crate) fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Stub(a), Self::Stub(b)) => Rc::ptr_eq(a, b),
            (Self::RegExp(a), Self::RegExp(b)) => Rc::ptr_eq(a, b),
            (Self::Promise(a), Self::Promise(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// SameValueZero, used by `includes`.
    pub(crate) fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }
}

/// Array-to-string writer. Arrays already on the stack render empty, as in
/// `join`, and output stops at `MAX_STRING_LENGTH`.
#[derive(Default)]
struct ArrayTextWriter {
    text: String,
    taint: TaintSet,
    stack: Vec<*const RefCell<Vec<Value>>>,
}

impl ArrayTextWriter {
    fn write(&mut self, items: &Rc<RefCell<Vec<Value>>>) -> bool {
        let ptr = Rc::as_ptr(items);
        if self.stack.contains(&ptr) || self.stack.len() > 32 {
            return true;
        }
        self.stack.push(ptr);
        let complete = self.write_items(items);
        self.stack.pop();
        complete
    }

    fn write_items(&mut self, items: &Rc<RefCell<Vec<Value>>>) -> bool {
        for (idx, item) in items.borrow().iter().enumerate() {
            if idx > 0 {
                self.text.push(',');
            }
            match item {
                Value::Undefined | Value::Null => {}
                Value::Array(nested) => {
                    if !self.write(nested) {
                        return false;
                    }
                }
                other => {
                    let piece = other.scalar_js_string();
                    self.taint.extend(piece.taint());
                    self.text.push_str(piece.as_str());
                }
            }
            if self.text.len() > MAX_STRING_LENGTH {
                let mut cut = MAX_STRING_LENGTH;
                while !self.text.is_char_boundary(cut) {
                    cut -= 1;
                }
                self.text.truncate(cut);
                return false;
            }
        }
        true
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(value) => write!(f, "Bool({value})"),
            Self::Number(value) => write!(f, "Number({value})"),
            Self::String(value) => write!(f, "String({:?})", value.as_str()),
            Self::Array(items) => write!(f, "Array(len={})", items.borrow().len()),
            Self::Object(object) => match &object.borrow().host_path {
                Some(path) => write!(f, "Object({path})"),
                None => write!(f, "Object({} keys)", object.borrow().entries().len()),
            },
            Self::Function(function) => write!(f, "Function({})", function.display_name()),
            Self::Stub(stub) => write!(f, "Stub({})", stub.path),
            Self::RegExp(regex) => write!(f, "RegExp(/{}/)", regex.borrow().regex.source()),
            Self::Promise(_) => f.write_str("Promise"),
        }
    }
}

pub(crate) fn error_to_string(object: &ObjectRef) -> String {
    let name = lookup_property(object, "name")
        .map(|value| value.as_string())
        .unwrap_or_else(|| "Error".to_string());
    let message = lookup_property(object, "message")
        .map(|value| value.as_string())
        .unwrap_or_default();
    if message.is_empty() {
        name
    } else if name.is_empty() {
        message
    } else {
        format!("{name}: {message}")
    }
}

pub(crate) fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let (sign, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (-1.0, &trimmed[1..]),
        b'+' => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }
    let radix = match unsigned.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        if sign < 0.0 || unsigned.len() == 2 {
            return f64::NAN;
        }
        return unsigned[2..].chars().try_fold(0f64, |acc, ch| {
            ch.to_digit(radix).map(|digit| acc * f64::from(radix) + f64::from(digit))
        })
        .unwrap_or(f64::NAN);
    }
    let valid = unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !valid || unsigned.starts_with(['e', 'E']) {
        return f64::NAN;
    }
    unsigned
        .parse::<f64>()
        .map(|value| sign * value)
        .unwrap_or(f64::NAN)
}

/// Number to string in the shortest round-trip form.
pub(crate) fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e21 {
        return format!("{value:.0}");
    }
    let magnitude = value.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let out = format!("{value:e}");
        let Some((mantissa, exponent)) = out.split_once('e') else {
            return out;
        };
        let sign = if exponent.starts_with('-') { "" } else { "+" };
        return format!("{mantissa}e{sign}{exponent}");
    }
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taint_union_shares_or_merges() {
        let a = TaintSet::single(1);
        let b = TaintSet::single(2);
        let ab = a.union(&b);
        assert_eq!(ab.iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(ab.union(&a), ab);
        assert!(TaintSet::default().union(&TaintSet::default()).is_empty());
        assert_eq!(TaintSet::default().union(&a), a);
    }

    #[test]
    fn concat_carries_union_of_operand_tags() {
        let tainted = JsString::tainted("abc", TaintSet::single(7));
        let plain = JsString::new("-suffix");
        let joined = tainted.concat(&plain);
        assert_eq!(joined.as_str(), "abc-suffix");
        assert_eq!(joined.taint().iter().collect::<Vec<_>>(), vec![7]);
        assert!(plain.concat(&plain).taint().is_empty());
    }

    #[test]
    fn paths_render_properties_and_calls() -> Result<()> {
        let path = IdentifierPath::root("window")
            .child("crypto")
            .child("subtle")
            .child("encrypt")
            .called();
        assert_eq!(path.as_str(), "window.crypto.subtle.encrypt()");
        assert_eq!(path.canonical(), "crypto.subtle.encrypt()");
        assert_eq!(path.segments().len(), 5);
        assert_eq!(IdentifierPath::parse("window.foo().bar")?.as_str(), "window.foo().bar");
        assert!(IdentifierPath::parse("a..b").is_err());
        assert!(IdentifierPath::parse("").is_err());
        assert!(IdentifierPath::parse("a b").is_err());
        Ok(())
    }

    #[test]
    fn numbers_format_like_javascript() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(123456789.0), "123456789");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn strings_convert_to_numbers() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("e5").is_nan());
    }

    #[test]
    fn truthiness_and_typeof() {
        assert!(!Value::string("").truthy());
        assert!(Value::string("0").truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert_eq!(Value::Null.type_of(), "object");
        let stub = Value::Stub(Rc::new(FallbackStub {
            path: IdentifierPath::root("window").child("x"),
        }));
        assert!(stub.truthy());
        assert_eq!(stub.type_of(), "function");
        assert_eq!(stub.as_string(), "");
        assert!(stub.as_number().is_nan());
    }

    #[test]
    fn array_to_string_unions_element_taint() {
        let array = Value::array(vec![
            Value::String(JsString::tainted("a", TaintSet::single(3))),
            Value::Null,
            Value::Number(2.0),
        ]);
        let rendered = array.as_js_string();
        assert_eq!(rendered.as_str(), "a,,2");
        assert_eq!(rendered.taint().iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn array_text_skips_cycles_and_stops_at_the_length_cap() {
        let cyclic = Value::array(vec![Value::Number(1.0)]);
        if let Value::Array(items) = &cyclic {
            items.borrow_mut().push(cyclic.clone());
        }
        assert_eq!(cyclic.as_string(), "1,");

        let chunk = Value::string("x".repeat(MAX_STRING_LENGTH / 2));
        let mut wide = Value::array(vec![chunk.clone(), chunk]);
        for _ in 0..2 {
            wide = Value::array(vec![wide.clone(), wide]);
        }
        assert!(wide.try_as_js_string().is_none());
        assert_eq!(wide.as_js_string().as_str().len(), MAX_STRING_LENGTH);
        if let Value::Array(items) = &cyclic {
            items.borrow_mut().clear();
        }
    }

    #[test]
    fn object_entries_keep_insertion_order_after_removal() {
        let mut object = ObjectValue::new(None);
        object.set("a", Value::Number(1.0));
        object.set("b", Value::Number(2.0));
        object.set("c", Value::Number(3.0));
        assert!(object.remove("b"));
        object.set("a", Value::Number(9.0));
        let keys = object.entries().iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(object.get_own("c"), Some(&Value::Number(3.0)));
    }
}
