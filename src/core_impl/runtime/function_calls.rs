use super::*;

/// Where a call came from; used to name stubs for non-callable callees.
#[derive(Clone, Copy)]
pub(crate) enum CallSite<'a> {
    Syntax(&'a Expr),
    Native,
}

impl CallSite<'_> {
    fn path(self) -> Option<IdentifierPath> {
        match self {
            Self::Syntax(expr) => syntactic_path(expr),
            Self::Native => None,
        }
    }
}

impl Runtime {
    /// Counts one boundary crossing and polls cancellation. Returns the
    /// number of crossings that preceded this one.
    pub(crate) fn cross(&mut self) -> Result<u64> {
        let preceding = self.calls.enter();
        self.budget.check_interrupts()?;
        Ok(preceding)
    }

    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
        site: CallSite<'_>,
    ) -> Result<Value> {
        let preceding = self.cross()?;
        self.invoke(callee, this, args, site, preceding)
    }

    /// Callback invoked by a native: array iteration, timers, listeners and
    /// promise reactions each count as a crossing.
    pub(crate) fn call_function(
        &mut self,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.call_value(callee, this, args, CallSite::Native)
    }

    /// Runs `callee` without counting a new crossing.
    pub(crate) fn invoke(
        &mut self,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
        site: CallSite<'_>,
        preceding: u64,
    ) -> Result<Value> {
        match callee {
            Value::Function(function) => {
                self.invoke_function(function, this, args, site, preceding)
            }
            Value::Stub(stub) => self.invoke_stub(stub, this, args, preceding),
            _ => {
                let path = site
                    .path()
                    .unwrap_or_else(|| IdentifierPath::root("anonymous"));
                Ok(self.fallback.resolve(path.called()))
            }
        }
    }

    fn invoke_stub(
        &mut self,
        stub: &Rc<FallbackStub>,
        this: Value,
        args: Vec<Value>,
        preceding: u64,
    ) -> Result<Value> {
        let name: Rc<str> = Rc::from(stub.path.canonical());
        self.intercepted(Some(name), this, args, preceding, |rt, _, _| {
            Ok(rt.fallback.resolve(stub.path.called()))
        })
    }

    fn invoke_function(
        &mut self,
        function: &Rc<FunctionValue>,
        this: Value,
        args: Vec<Value>,
        site: CallSite<'_>,
        preceding: u64,
    ) -> Result<Value> {
        match &function.kind {
            FunctionKind::Native(native) => {
                let handler = native.handler;
                let data = native.data.clone();
                self.intercepted(
                    Some(native.name.clone()),
                    this,
                    args,
                    preceding,
                    |rt, this, args| {
                        handler(
                            rt,
                            &NativeCall {
                                this,
                                args,
                                data,
                                is_construct: false,
                                preceding_calls: preceding,
                            },
                        )
                    },
                )
            }
            FunctionKind::Script { def, env } => {
                let name = script_function_name(def, site);
                self.intercepted(name, this, args, preceding, |rt, this, args| {
                    rt.call_script(function, def, env, this, args)
                })
            }
            FunctionKind::Bound {
                target,
                this: bound_this,
                args: bound_args,
            } => {
                let mut all = bound_args.clone();
                all.extend(args);
                self.invoke_function(target, bound_this.clone(), all, CallSite::Native, preceding)
            }
        }
    }

    /// Sink and code-execution observation before `run`, taint minting
    /// after it succeeds.
    fn intercepted(
        &mut self,
        name: Option<Rc<str>>,
        this: Value,
        args: Vec<Value>,
        preceding: u64,
        run: impl FnOnce(&mut Self, Value, Vec<Value>) -> Result<Value>,
    ) -> Result<Value> {
        let Some(name) = name else {
            return run(self, this, args);
        };
        if self.manifest.is_sink(&name) {
            self.observe_sink(&name, &this, &args, preceding);
        }
        if is_code_executor(&name) {
            self.observe_code_execution(&name, &args);
        }
        let source = self
            .manifest
            .source_kind(&name)
            .map(|kind| (kind, string_argument_taint(&args)));
        self.callee_stack.push(name.to_string());
        let value = run(self, this, args)?;
        self.callee_stack.pop();
        Ok(match source {
            Some((kind, taint)) => self.mint_source(&name, kind, taint, value),
            None => value,
        })
    }

    pub(crate) fn call_script(
        &mut self,
        function: &Rc<FunctionValue>,
        def: &Rc<FunctionDef>,
        env: &ScopeRef,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.enter_frame(|rt| rt.run_function_body(function, def, env, this, args))
    }

    /// Runs `body` one script frame deeper: past `max_call_depth` it raises a
    /// RangeError, otherwise the native stack is grown on demand.
    pub(crate) fn enter_frame<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.budget.call_depth >= self.budget.max_call_depth {
            return Err(self.range_error("Maximum call stack size exceeded"));
        }
        self.budget.call_depth += 1;
        let result = stacker::maybe_grow(256 * 1024, 4 * 1024 * 1024, || body(self));
        self.budget.call_depth -= 1;
        result
    }

    fn run_function_body(
        &mut self,
        function: &Rc<FunctionValue>,
        def: &Rc<FunctionDef>,
        env: &ScopeRef,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value> {
        let this_binding = if def.is_arrow {
            None
        } else if this.is_nullish() {
            Some(self.global_value())
        } else {
            Some(this)
        };
        let scope = Scope::function(env, this_binding);
        if !def.is_arrow {
            if let Some(name) = &def.name {
                scope
                    .borrow_mut()
                    .declare(name, Value::Function(function.clone()), true);
            }
            scope
                .borrow_mut()
                .declare("arguments", Value::array(args.clone()), true);
        }
        for (idx, param) in def.params.iter().enumerate() {
            let value = if param.is_rest {
                Value::array(args.get(idx..).map(<[Value]>::to_vec).unwrap_or_default())
            } else {
                let value = args.get(idx).cloned().unwrap_or(Value::Undefined);
                match (&value, &param.default) {
                    (Value::Undefined, Some(default)) => self.eval_expr(default, &scope)?,
                    _ => value,
                }
            };
            scope.borrow_mut().declare(&param.name, value, true);
        }
        self.hoist_declarations(&def.body, &scope);
        match self.exec_statements(&def.body, &scope)? {
            ExecFlow::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    /// `new callee(...args)`; the crossing was already counted.
    pub(crate) fn construct(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        site: CallSite<'_>,
        preceding: u64,
    ) -> Result<Value> {
        let Value::Function(function) = callee else {
            return self.invoke(callee, Value::Undefined, args, site, preceding);
        };
        match &function.kind {
            FunctionKind::Script { def, env } => {
                if def.is_arrow {
                    return Err(self.type_error(format!(
                        "{} is not a constructor",
                        function.display_name()
                    )));
                }
                let proto = self.prototype_object_of(function);
                let instance = Value::Object(ObjectValue::new(Some(proto)).into_ref());
                let name = script_function_name(def, site);
                let result = self.intercepted(name, instance.clone(), args, preceding, |rt, this, args| {
                    rt.call_script(function, def, env, this, args)
                })?;
                Ok(match result {
                    Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::Promise(_) => {
                        result
                    }
                    _ => instance,
                })
            }
            FunctionKind::Native(native) => {
                let handler = native.handler;
                let data = native.data.clone();
                self.intercepted(
                    Some(native.name.clone()),
                    Value::Undefined,
                    args,
                    preceding,
                    |rt, this, args| {
                        handler(
                            rt,
                            &NativeCall {
                                this,
                                args,
                                data,
                                is_construct: true,
                                preceding_calls: preceding,
                            },
                        )
                    },
                )
            }
            FunctionKind::Bound {
                target,
                args: bound_args,
                ..
            } => {
                let mut all = bound_args.clone();
                all.extend(args);
                self.construct(&Value::Function(target.clone()), all, CallSite::Native, preceding)
            }
        }
    }

    /// The object `new f()` instances inherit from, created on first use.
    pub(crate) fn prototype_object_of(&self, function: &Rc<FunctionValue>) -> ObjectRef {
        if let Some(Value::Object(proto)) = function.props.borrow().get_own("prototype").cloned() {
            return proto;
        }
        let proto = self.new_object();
        proto
            .borrow_mut()
            .set("constructor", Value::Function(function.clone()));
        function
            .props
            .borrow_mut()
            .set("prototype", Value::Object(proto.clone()));
        proto
    }
}

fn script_function_name(def: &FunctionDef, site: CallSite<'_>) -> Option<Rc<str>> {
    match &def.name {
        Some(name) => Some(Rc::from(name.as_str())),
        None => site.path().map(|path| Rc::from(path.canonical())),
    }
}

fn string_argument_taint(args: &[Value]) -> TaintSet {
    let mut taint = TaintSet::default();
    for arg in args {
        if let Value::String(text) = arg {
            taint.extend(text.taint());
        }
    }
    taint
}
