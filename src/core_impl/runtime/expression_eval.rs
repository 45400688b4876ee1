use super::*;

/// Result of evaluating one link of an optional chain.
enum Chain {
    Value(Value),
    /// A `?.` link met `undefined`/`null`; the whole chain is `undefined`.
    Short,
}

/// Dotted path of an access expression as written (`a.b.c()`), used to
/// key stubs produced from `undefined` receivers and non-callable callees.
pub(crate) fn syntactic_path(expr: &Expr) -> Option<IdentifierPath> {
    match expr {
        Expr::Ident(name) => Some(match name.as_str() {
            "window" | "self" | "globalThis" => IdentifierPath::root("window"),
            _ => IdentifierPath::root(name),
        }),
        Expr::This => Some(IdentifierPath::root("this")),
        Expr::Member {
            object, property, ..
        } => {
            let parent = syntactic_path(object)?;
            Some(match property {
                MemberProp::Named(name) => parent.child(name),
                MemberProp::Computed(key) => match key.as_ref() {
                    Expr::String(text) => parent.child(text),
                    Expr::Number(number) => parent.child(&format_number(*number)),
                    _ => parent.child("[]"),
                },
            })
        }
        Expr::Call { callee, .. } => syntactic_path(callee).map(|path| path.called()),
        Expr::New { callee, .. } => syntactic_path(callee).map(|path| path.called()),
        _ => None,
    }
}

impl Runtime {
    pub(crate) fn eval_expr(&mut self, expr: &Expr, scope: &ScopeRef) -> Result<Value> {
        match expr {
            Expr::Number(value) => Ok(Value::Number(*value)),
            Expr::String(value) => Ok(Value::string(value.as_str())),
            Expr::Template { quasis, exprs } => self.eval_template(quasis, exprs, scope),
            Expr::Regex { pattern, flags } => self.new_regexp(pattern, flags),
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::This => Ok(scope::this_value(scope)),
            Expr::Ident(name) => Ok(self.lookup_identifier(name, scope)),
            Expr::Array(elements) => self.eval_array_literal(elements, scope),
            Expr::Object(props) => self.eval_object_literal(props, scope),
            Expr::Function(def) => Ok(self.make_closure(def.clone(), scope)),
            Expr::Member { .. } | Expr::Call { .. } => match self.eval_chain(expr, scope)? {
                Chain::Value(value) => Ok(value),
                Chain::Short => Ok(Value::Undefined),
            },
            Expr::New { callee, args } => {
                let constructor = self.eval_expr(callee, scope)?;
                let args = self.eval_args(args, scope)?;
                let preceding = self.cross()?;
                self.construct(&constructor, args, CallSite::Syntax(expr), preceding)
            }
            Expr::Unary { op, expr } => self.eval_unary(*op, expr, scope),
            Expr::Update {
                op,
                prefix,
                target,
            } => {
                let old = self.eval_expr(target, scope)?.as_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.assign_to_target(target, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval_expr(left, scope)?;
                let right = self.eval_expr(right, scope)?;
                self.binary_op(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval_expr(left, scope)?;
                if logical_short_circuits(*op, &left) {
                    return Ok(left);
                }
                self.eval_expr(right, scope)
            }
            Expr::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval_expr(cond, scope)?.truthy() {
                    self.eval_expr(then_expr, scope)
                } else {
                    self.eval_expr(else_expr, scope)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval_expr(item, scope)?;
                }
                Ok(last)
            }
        }
    }

    fn eval_chain(&mut self, expr: &Expr, scope: &ScopeRef) -> Result<Chain> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Chain::Value(base) = self.eval_chain(object, scope)? else {
                    return Ok(Chain::Short);
                };
                if *optional && base.is_nullish() {
                    return Ok(Chain::Short);
                }
                let key = self.member_key(property, scope)?;
                let receiver = base.is_nullish().then(|| syntactic_path(object)).flatten();
                Ok(Chain::Value(self.get_member(&base, &key, receiver.as_ref())?))
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let (function, this) = match callee.as_ref() {
                    Expr::Member {
                        object,
                        property,
                        optional: member_optional,
                    } => {
                        let Chain::Value(base) = self.eval_chain(object, scope)? else {
                            return Ok(Chain::Short);
                        };
                        if *member_optional && base.is_nullish() {
                            return Ok(Chain::Short);
                        }
                        let key = self.member_key(property, scope)?;
                        let receiver = base.is_nullish().then(|| syntactic_path(object)).flatten();
                        let function = self.get_member(&base, &key, receiver.as_ref())?;
                        (function, base)
                    }
                    other => {
                        let Chain::Value(function) = self.eval_chain(other, scope)? else {
                            return Ok(Chain::Short);
                        };
                        (function, Value::Undefined)
                    }
                };
                if *optional && function.is_nullish() {
                    return Ok(Chain::Short);
                }
                let args = self.eval_args(args, scope)?;
                let value = self.call_value(&function, this, args, CallSite::Syntax(callee))?;
                Ok(Chain::Value(value))
            }
            other => Ok(Chain::Value(self.eval_expr(other, scope)?)),
        }
    }

    pub(crate) fn member_key(&mut self, property: &MemberProp, scope: &ScopeRef) -> Result<String> {
        match property {
            MemberProp::Named(name) => Ok(name.clone()),
            MemberProp::Computed(expr) => {
                let key = self.eval_expr(expr, scope)?;
                Ok(property_key(&key))
            }
        }
    }

    pub(crate) fn eval_args(&mut self, args: &[CallArg], scope: &ScopeRef) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                CallArg::Item(expr) => out.push(self.eval_expr(expr, scope)?),
                CallArg::Spread(expr) => {
                    let value = self.eval_expr(expr, scope)?;
                    let spread = self.spread_items(&value)?;
                    self.check_array_length(out.len().saturating_add(spread.len()))?;
                    out.extend(spread);
                }
            }
        }
        Ok(out)
    }

    pub(crate) fn spread_items(&self, value: &Value) -> Result<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::String(text) => {
                self.check_array_length(text.as_str().chars().count())?;
                Ok(text
                    .as_str()
                    .chars()
                    .map(|ch| Value::String(JsString::tainted(ch.to_string(), text.taint().clone())))
                    .collect())
            }
            Value::Stub(_) => Ok(Vec::new()),
            other => Err(self.type_error(format!("{} is not iterable", render_value(other)))),
        }
    }

    fn eval_template(&mut self, quasis: &[String], exprs: &[Expr], scope: &ScopeRef) -> Result<Value> {
        let mut out = JsStringBuilder::default();
        out.push_str(self, quasis.first().map(String::as_str).unwrap_or_default())?;
        for (idx, expr) in exprs.iter().enumerate() {
            let value = self.eval_expr(expr, scope)?;
            let piece = self.to_js_string(&value)?;
            out.push(self, &piece)?;
            if let Some(quasi) = quasis.get(idx + 1) {
                out.push_str(self, quasi)?;
            }
        }
        Ok(Value::String(out.finish()))
    }

    fn eval_array_literal(&mut self, elements: &[ArrayElement], scope: &ScopeRef) -> Result<Value> {
        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                ArrayElement::Hole => items.push(Value::Undefined),
                ArrayElement::Item(expr) => items.push(self.eval_expr(expr, scope)?),
                ArrayElement::Spread(expr) => {
                    let value = self.eval_expr(expr, scope)?;
                    let spread = self.spread_items(&value)?;
                    self.check_array_length(items.len().saturating_add(spread.len()))?;
                    items.extend(spread);
                }
            }
        }
        Ok(Value::array(items))
    }

    fn eval_object_literal(&mut self, props: &[ObjectProp], scope: &ScopeRef) -> Result<Value> {
        let object = self.new_object();
        for prop in props {
            match prop {
                ObjectProp::KeyValue(key, expr) => {
                    let key = match key {
                        PropKey::Named(name) => name.clone(),
                        PropKey::Computed(expr) => {
                            let key = self.eval_expr(expr, scope)?;
                            property_key(&key)
                        }
                    };
                    let value = self.eval_expr(expr, scope)?;
                    if key == "__proto__" {
                        match value {
                            Value::Object(proto) => object.borrow_mut().proto = Some(proto),
                            Value::Null => object.borrow_mut().proto = None,
                            _ => {}
                        }
                        continue;
                    }
                    object.borrow_mut().set(&key, value);
                }
                ObjectProp::Spread(expr) => {
                    let value = self.eval_expr(expr, scope)?;
                    for (key, value) in own_enumerable_entries(&value) {
                        object.borrow_mut().set(&key, value);
                    }
                }
            }
        }
        Ok(Value::Object(object))
    }

    fn eval_unary(&mut self, op: UnaryOp, expr: &Expr, scope: &ScopeRef) -> Result<Value> {
        match op {
            UnaryOp::Delete => {
                let Expr::Member {
                    object, property, ..
                } = expr
                else {
                    return Ok(Value::Bool(!matches!(expr, Expr::Ident(_))));
                };
                let base = self.eval_expr(object, scope)?;
                let key = self.member_key(property, scope)?;
                Ok(Value::Bool(self.delete_member(&base, &key)))
            }
            UnaryOp::TypeOf => {
                let value = self.eval_expr(expr, scope)?;
                Ok(Value::string(value.type_of()))
            }
            _ => {
                let value = self.eval_expr(expr, scope)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.as_number()),
                    UnaryOp::Plus => Value::Number(value.as_number()),
                    UnaryOp::BitNot => Value::Number(f64::from(!to_int32(value.as_number()))),
                    _ => Value::Undefined,
                })
            }
        }
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        scope: &ScopeRef,
    ) -> Result<Value> {
        match target {
            Expr::Ident(name) => {
                let result = match op {
                    AssignOp::Assign => self.eval_expr(value, scope)?,
                    AssignOp::Arithmetic(binary) => {
                        let current = self.lookup_identifier(name, scope);
                        let rhs = self.eval_expr(value, scope)?;
                        self.binary_op(binary, &current, &rhs)?
                    }
                    AssignOp::Logical(logical) => {
                        let current = self.lookup_identifier(name, scope);
                        if logical_short_circuits(logical, &current) {
                            return Ok(current);
                        }
                        self.eval_expr(value, scope)?
                    }
                };
                self.assign_identifier(name, result.clone(), scope)?;
                Ok(result)
            }
            Expr::Member {
                object, property, ..
            } => {
                let base = self.eval_expr(object, scope)?;
                let key = self.member_key(property, scope)?;
                let receiver = base.is_nullish().then(|| syntactic_path(object)).flatten();
                let result = match op {
                    AssignOp::Assign => self.eval_expr(value, scope)?,
                    AssignOp::Arithmetic(binary) => {
                        let current = self.get_member(&base, &key, receiver.as_ref())?;
                        let rhs = self.eval_expr(value, scope)?;
                        self.binary_op(binary, &current, &rhs)?
                    }
                    AssignOp::Logical(logical) => {
                        let current = self.get_member(&base, &key, receiver.as_ref())?;
                        if logical_short_circuits(logical, &current) {
                            return Ok(current);
                        }
                        self.eval_expr(value, scope)?
                    }
                };
                self.set_member(&base, &key, result.clone(), receiver.as_ref())?;
                Ok(result)
            }
            _ => Err(Error::ScriptRuntime("invalid assignment target".into())),
        }
    }

    /// Stores `value` into an identifier or member target.
    pub(crate) fn assign_to_target(&mut self, target: &Expr, value: Value, scope: &ScopeRef) -> Result<()> {
        match target {
            Expr::Ident(name) => self.assign_identifier(name, value, scope),
            Expr::Member {
                object, property, ..
            } => {
                let base = self.eval_expr(object, scope)?;
                let key = self.member_key(property, scope)?;
                let receiver = base.is_nullish().then(|| syntactic_path(object)).flatten();
                self.set_member(&base, &key, value, receiver.as_ref())
            }
            _ => Err(Error::ScriptRuntime("invalid assignment target".into())),
        }
    }

    /// ToString that honours a script-defined `toString` on plain objects.
    pub(crate) fn to_js_string(&mut self, value: &Value) -> Result<JsString> {
        if let Value::Object(object) = value {
            if !object.borrow().is_error() {
                let method = lookup_property(object, "toString");
                if let Some(Value::Function(function)) = &method {
                    if matches!(function.kind, FunctionKind::Script { .. }) {
                        let callee = Value::Function(function.clone());
                        let result = self.call_function(&callee, value.clone(), Vec::new())?;
                        return self.bounded_js_string(&result);
                    }
                }
            }
        }
        self.bounded_js_string(value)
    }

    fn bounded_js_string(&self, value: &Value) -> Result<JsString> {
        value
            .try_as_js_string()
            .ok_or_else(|| self.range_error("Invalid string length"))
    }
}

fn logical_short_circuits(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => !left.truthy(),
        LogicalOp::Or => left.truthy(),
        LogicalOp::Nullish => !left.is_nullish(),
    }
}

pub(crate) fn property_key(value: &Value) -> String {
    match value {
        Value::String(text) => text.as_str().to_string(),
        Value::Number(number) => format_number(*number),
        other => other.as_string(),
    }
}

/// Own enumerable entries in insertion order, as seen by spread and
/// `Object.keys`.
pub(crate) fn own_enumerable_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(object) => {
            let borrowed = object.borrow();
            match &borrowed.kind {
                ObjectKind::Storage(items) => items.clone(),
                _ => borrowed.entries().to_vec(),
            }
        }
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(idx, item)| (idx.to_string(), item.clone()))
            .collect(),
        Value::String(text) => text
            .as_str()
            .chars()
            .enumerate()
            .map(|(idx, ch)| {
                (
                    idx.to_string(),
                    Value::String(JsString::tainted(ch.to_string(), text.taint().clone())),
                )
            })
            .collect(),
        Value::Function(function) => function.props.borrow().entries().to_vec(),
        _ => Vec::new(),
    }
}

pub(crate) fn to_int32(value: f64) -> i32 {
    to_uint32(value) as i32
}

pub(crate) fn to_uint32(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    value.trunc().rem_euclid(4_294_967_296.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_impl::parser::parse_script;

    fn first_expr(src: &str) -> Result<Expr> {
        match parse_script(src)?.into_iter().next() {
            Some(Stmt::Expr(expr)) => Ok(expr),
            _ => Err(Error::ScriptRuntime("expected an expression".into())),
        }
    }

    #[test]
    fn syntactic_paths_follow_member_chains() -> Result<()> {
        let expr = first_expr("window.crypto.subtle['encrypt']()")?;
        assert_eq!(
            syntactic_path(&expr).map(|path| path.to_string()),
            Some("window.crypto.subtle.encrypt()".to_string())
        );
        let expr = first_expr("self.a[0].b")?;
        assert_eq!(
            syntactic_path(&expr).map(|path| path.to_string()),
            Some("window.a.0.b".to_string())
        );
        assert!(syntactic_path(&first_expr("(1 + 2).x")?).is_none());
        Ok(())
    }

    #[test]
    fn int32_conversion_wraps() {
        assert_eq!(to_int32(4_294_967_295.0), -1);
        assert_eq!(to_int32(2_147_483_648.0), -2_147_483_648);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_uint32(-1.0), 4_294_967_295);
        assert_eq!(to_int32(f64::NAN), 0);
    }
}
