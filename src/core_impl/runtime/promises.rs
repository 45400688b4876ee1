use super::*;

impl Runtime {
    pub(crate) fn new_promise(&self) -> PromiseRef {
        Rc::new(RefCell::new(PromiseValue {
            state: PromiseState::Pending,
            reactions: Vec::new(),
        }))
    }

    pub(crate) fn promise_resolved_with(&mut self, value: Value) -> Result<PromiseRef> {
        let promise = self.new_promise();
        self.resolve_promise(&promise, value)?;
        Ok(promise)
    }

    pub(crate) fn promise_rejected_with(&mut self, reason: Value) -> PromiseRef {
        let promise = self.new_promise();
        self.settle_promise(&promise, PromiseState::Rejected(reason));
        promise
    }

    /// Resolves `promise` with `value`, adopting the state of another
    /// promise when `value` is one.
    pub(crate) fn resolve_promise(&mut self, promise: &PromiseRef, value: Value) -> Result<()> {
        if !matches!(promise.borrow().state, PromiseState::Pending) {
            return Ok(());
        }
        match value {
            Value::Promise(inner) if Rc::ptr_eq(&inner, promise) => {
                let reason = self.make_error("TypeError", "Chaining cycle detected for promise");
                self.settle_promise(promise, PromiseState::Rejected(reason));
            }
            Value::Promise(inner) => {
                self.subscribe(&inner, ReactionKind::Adopt, promise.clone());
            }
            other => self.settle_promise(promise, PromiseState::Fulfilled(other)),
        }
        Ok(())
    }

    pub(crate) fn reject_promise(&mut self, promise: &PromiseRef, reason: Value) {
        self.settle_promise(promise, PromiseState::Rejected(reason));
    }

    fn settle_promise(&mut self, promise: &PromiseRef, state: PromiseState) {
        let reactions = {
            let mut borrowed = promise.borrow_mut();
            if !matches!(borrowed.state, PromiseState::Pending) {
                return;
            }
            borrowed.state = state.clone();
            std::mem::take(&mut borrowed.reactions)
        };
        for reaction in reactions {
            self.scheduler.microtask_queue.push_back(Microtask::Reaction {
                kind: reaction.kind,
                derived: reaction.derived,
                settled: state.clone(),
            });
        }
    }

    fn subscribe(&mut self, promise: &PromiseRef, kind: ReactionKind, derived: PromiseRef) {
        let settled = promise.borrow().state.clone();
        match settled {
            PromiseState::Pending => promise
                .borrow_mut()
                .reactions
                .push(PromiseReaction { kind, derived }),
            settled => self.scheduler.microtask_queue.push_back(Microtask::Reaction {
                kind,
                derived,
                settled,
            }),
        }
    }

    /// Registers a reaction and returns the derived promise.
    pub(crate) fn promise_then(&mut self, promise: &PromiseRef, kind: ReactionKind) -> PromiseRef {
        let derived = self.new_promise();
        self.subscribe(promise, kind, derived.clone());
        derived
    }

    pub(crate) fn run_microtask(&mut self, task: Microtask) -> Result<()> {
        match task {
            Microtask::Callback { callback, args } => {
                self.call_function(&callback, Value::Undefined, args)?;
                Ok(())
            }
            Microtask::Reaction {
                kind,
                derived,
                settled,
            } => self.run_reaction(kind, &derived, settled),
        }
    }

    fn run_reaction(
        &mut self,
        kind: ReactionKind,
        derived: &PromiseRef,
        settled: PromiseState,
    ) -> Result<()> {
        match kind {
            ReactionKind::Adopt => match settled {
                PromiseState::Fulfilled(value) => self.resolve_promise(derived, value),
                PromiseState::Rejected(reason) => {
                    self.reject_promise(derived, reason);
                    Ok(())
                }
                PromiseState::Pending => Ok(()),
            },
            ReactionKind::Then {
                on_fulfilled,
                on_rejected,
            } => {
                let (handler, value, fulfilled) = match settled {
                    PromiseState::Fulfilled(value) => (on_fulfilled, value, true),
                    PromiseState::Rejected(reason) => (on_rejected, reason, false),
                    PromiseState::Pending => return Ok(()),
                };
                match handler.filter(Value::is_callable) {
                    Some(handler) => match self.call_guarded(&handler, vec![value])? {
                        Ok(result) => self.resolve_promise(derived, result),
                        Err(reason) => {
                            self.reject_promise(derived, reason);
                            Ok(())
                        }
                    },
                    None if fulfilled => self.resolve_promise(derived, value),
                    None => {
                        self.reject_promise(derived, value);
                        Ok(())
                    }
                }
            }
            ReactionKind::Finally(handler) => {
                if let Some(handler) = handler.filter(Value::is_callable) {
                    if let Err(reason) = self.call_guarded(&handler, Vec::new())? {
                        self.reject_promise(derived, reason);
                        return Ok(());
                    }
                }
                self.settle_promise(derived, settled);
                Ok(())
            }
        }
    }

    /// Calls a reaction handler, turning a script throw into the rejection
    /// reason. Aborts and internal faults still propagate.
    fn call_guarded(
        &mut self,
        handler: &Value,
        args: Vec<Value>,
    ) -> Result<std::result::Result<Value, Value>> {
        let depth = self.callee_stack.len();
        match self.call_function(handler, Value::Undefined, args) {
            Ok(value) => Ok(Ok(value)),
            Err(Error::ScriptThrown(thrown)) => {
                self.callee_stack.truncate(depth);
                Ok(Err(thrown.into_value()))
            }
            Err(err) => Err(err),
        }
    }
}

fn this_promise(rt: &Runtime, call: &NativeCall) -> Result<PromiseRef> {
    match &call.this {
        Value::Promise(promise) => Ok(promise.clone()),
        other => Err(rt.type_error(format!(
            "Method Promise.prototype.then called on incompatible receiver {}",
            render_value(other)
        ))),
    }
}

fn data_promise(call: &NativeCall) -> Option<PromiseRef> {
    match &call.data {
        Some(Value::Promise(promise)) => Some(promise.clone()),
        _ => None,
    }
}

fn promise_constructor(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    if !call.is_construct {
        return Err(rt.type_error("Promise constructor cannot be invoked without 'new'"));
    }
    let executor = call.arg(0);
    if !executor.is_callable() {
        return Err(rt.type_error(format!(
            "Promise resolver {} is not a function",
            render_value(&executor)
        )));
    }
    let promise = rt.new_promise();
    let data = Some(Value::Promise(promise.clone()));
    let resolve = rt.make_native("Promise.resolveFunction", resolve_function, data.clone());
    let reject = rt.make_native("Promise.rejectFunction", reject_function, data);
    let args = vec![Value::Function(resolve), Value::Function(reject)];
    let depth = rt.callee_stack.len();
    match rt.call_function(&executor, Value::Undefined, args) {
        Ok(_) => {}
        Err(Error::ScriptThrown(thrown)) => {
            rt.callee_stack.truncate(depth);
            rt.reject_promise(&promise, thrown.into_value());
        }
        Err(err) => return Err(err),
    }
    Ok(Value::Promise(promise))
}

fn resolve_function(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    if let Some(promise) = data_promise(call) {
        rt.resolve_promise(&promise, call.arg(0))?;
    }
    Ok(Value::Undefined)
}

fn reject_function(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    if let Some(promise) = data_promise(call) {
        rt.reject_promise(&promise, call.arg(0));
    }
    Ok(Value::Undefined)
}

fn promise_then_native(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let promise = this_promise(rt, call)?;
    let derived = rt.promise_then(
        &promise,
        ReactionKind::Then {
            on_fulfilled: Some(call.arg(0)),
            on_rejected: Some(call.arg(1)),
        },
    );
    Ok(Value::Promise(derived))
}

fn promise_catch(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let promise = this_promise(rt, call)?;
    let derived = rt.promise_then(
        &promise,
        ReactionKind::Then {
            on_fulfilled: None,
            on_rejected: Some(call.arg(0)),
        },
    );
    Ok(Value::Promise(derived))
}

fn promise_finally(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    let promise = this_promise(rt, call)?;
    let derived = rt.promise_then(&promise, ReactionKind::Finally(Some(call.arg(0))));
    Ok(Value::Promise(derived))
}

fn promise_resolve_static(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    match call.arg(0) {
        Value::Promise(promise) => Ok(Value::Promise(promise)),
        value => Ok(Value::Promise(rt.promise_resolved_with(value)?)),
    }
}

fn promise_reject_static(rt: &mut Runtime, call: &NativeCall) -> Result<Value> {
    Ok(Value::Promise(rt.promise_rejected_with(call.arg(0))))
}

pub(crate) fn install(env: &mut HostEnvironmentEmulator<'_>) {
    let proto = env.realm().promise_proto.clone();
    env.method(&proto, "then", "Promise.prototype.then", promise_then_native);
    env.method(&proto, "catch", "Promise.prototype.catch", promise_catch);
    env.method(&proto, "finally", "Promise.prototype.finally", promise_finally);
    let Some(constructor) = env.constructor("Promise", promise_constructor, &proto) else {
        return;
    };
    env.static_method(&constructor, "resolve", "Promise.resolve", promise_resolve_static);
    env.static_method(&constructor, "reject", "Promise.reject", promise_reject_static);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reactions_run_only_when_microtasks_drain() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(
            "var order = [];\
             Promise.resolve(1).then(function (v) { order.push('then:' + v); });\
             order.push('sync');",
        )?;
        let order = rt.global_value();
        let order = rt.get_member(&order, "order", None)?;
        assert_eq!(order.as_string(), "sync");
        rt.drain_microtasks()?;
        assert_eq!(rt.get_member(&rt.global_value(), "order", None)?.as_string(), "sync,then:1");
        Ok(())
    }

    #[test]
    fn self_resolution_rejects_with_type_error() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        let promise = rt.new_promise();
        rt.resolve_promise(&promise, Value::Promise(promise.clone()))?;
        let state = promise.borrow().state.clone();
        let PromiseState::Rejected(Value::Object(reason)) = state else {
            panic!("expected a rejection");
        };
        assert_eq!(
            error_to_string(&reason),
            "TypeError: Chaining cycle detected for promise"
        );
        Ok(())
    }

    #[test]
    fn thrown_handler_rejects_the_derived_promise() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(
            "var seen = '';\
             new Promise(function (resolve) { resolve(2); })\
               .then(function () { throw new Error('boom'); })\
               .catch(function (e) { seen = e.message; });",
        )?;
        rt.drain_microtasks()?;
        assert_eq!(rt.get_member(&rt.global_value(), "seen", None)?.as_string(), "boom");
        Ok(())
    }
}
