use super::*;

pub(crate) const ERROR_TYPES: [&str; 6] = [
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "URIError",
    "EvalError",
];

const GLOBAL_ALIASES: [&str; 6] = ["window", "self", "globalThis", "top", "parent", "frames"];

/// Prototype objects shared by every value of one run.
pub(crate) struct Realm {
    pub(crate) object_proto: ObjectRef,
    pub(crate) function_proto: ObjectRef,
    pub(crate) array_proto: ObjectRef,
    pub(crate) string_proto: ObjectRef,
    pub(crate) number_proto: ObjectRef,
    pub(crate) boolean_proto: ObjectRef,
    pub(crate) regexp_proto: ObjectRef,
    pub(crate) promise_proto: ObjectRef,
    pub(crate) error_proto: ObjectRef,
    pub(crate) error_protos: HashMap<String, ObjectRef>,
    pub(crate) xhr_proto: ObjectRef,
    pub(crate) websocket_proto: ObjectRef,
    pub(crate) element_proto: ObjectRef,
    pub(crate) storage_proto: ObjectRef,
    pub(crate) response_proto: ObjectRef,
}

impl Realm {
    pub(crate) fn new() -> Self {
        let object_proto = ObjectValue::new(None).into_ref();
        let derived = |proto: &ObjectRef| ObjectValue::new(Some(proto.clone())).into_ref();
        let error_proto = derived(&object_proto);
        {
            let mut error = error_proto.borrow_mut();
            error.set("name", Value::string("Error"));
            error.set("message", Value::string(""));
        }
        let error_protos = ERROR_TYPES
            .iter()
            .map(|name| {
                let proto = derived(&error_proto);
                proto.borrow_mut().set("name", Value::string(*name));
                (name.to_string(), proto)
            })
            .collect();
        Self {
            function_proto: derived(&object_proto),
            array_proto: derived(&object_proto),
            string_proto: derived(&object_proto),
            number_proto: derived(&object_proto),
            boolean_proto: derived(&object_proto),
            regexp_proto: derived(&object_proto),
            promise_proto: derived(&object_proto),
            xhr_proto: derived(&object_proto),
            websocket_proto: derived(&object_proto),
            element_proto: derived(&object_proto),
            storage_proto: derived(&object_proto),
            response_proto: derived(&object_proto),
            error_proto,
            error_protos,
            object_proto,
        }
    }

    fn all_protos(&self) -> Vec<ObjectRef> {
        let mut protos = vec![
            self.object_proto.clone(),
            self.function_proto.clone(),
            self.array_proto.clone(),
            self.string_proto.clone(),
            self.number_proto.clone(),
            self.boolean_proto.clone(),
            self.regexp_proto.clone(),
            self.promise_proto.clone(),
            self.error_proto.clone(),
            self.xhr_proto.clone(),
            self.websocket_proto.clone(),
            self.element_proto.clone(),
            self.storage_proto.clone(),
            self.response_proto.clone(),
        ];
        protos.extend(self.error_protos.values().cloned());
        protos
    }
}

/// Registers the implemented host APIs on the global object. Paths the
/// host manifest withdrew are skipped and resolve through fallback.
pub(crate) struct HostEnvironmentEmulator<'a> {
    pub(crate) rt: &'a mut Runtime,
}

impl<'a> HostEnvironmentEmulator<'a> {
    pub(crate) fn new(rt: &'a mut Runtime) -> Self {
        Self { rt }
    }

    pub(crate) fn install(mut self) {
        let global = self.rt.global.clone();
        for alias in GLOBAL_ALIASES {
            global.borrow_mut().set(alias, Value::Object(global.clone()));
        }
        builtins::install(&mut self);
        tracing::debug!(
            globals = global.borrow().entries().len(),
            withdrawn = self.rt.config.host.withdrawn.len(),
            "host environment installed"
        );
    }

    pub(crate) fn implements(&self, path: &str) -> bool {
        self.rt.config.host.is_implemented(path)
    }

    pub(crate) fn global(&self) -> ObjectRef {
        self.rt.global.clone()
    }

    pub(crate) fn realm(&self) -> &Realm {
        &self.rt.realm
    }

    /// Adds a native method to `target` under the canonical API name
    /// `canonical`, unless that name was withdrawn.
    pub(crate) fn method(
        &mut self,
        target: &ObjectRef,
        key: &str,
        canonical: &str,
        handler: NativeHandler,
    ) {
        if !self.implements(canonical) {
            return;
        }
        let function = self.rt.make_native(canonical, handler, None);
        target.borrow_mut().set(key, Value::Function(function));
    }

    /// Adds a static native to a constructor function.
    pub(crate) fn static_method(
        &mut self,
        target: &Rc<FunctionValue>,
        key: &str,
        canonical: &str,
        handler: NativeHandler,
    ) {
        if !self.implements(canonical) {
            return;
        }
        let function = self.rt.make_native(canonical, handler, None);
        target.props.borrow_mut().set(key, Value::Function(function));
    }

    /// Registers a global native function (`window.<name>`).
    pub(crate) fn global_function(
        &mut self,
        name: &str,
        handler: NativeHandler,
    ) -> Option<Rc<FunctionValue>> {
        if !self.implements(name) {
            return None;
        }
        let function = self.rt.make_native(name, handler, None);
        function.props.borrow_mut().host_path =
            Some(IdentifierPath::root("window").child(name));
        self.rt
            .global
            .borrow_mut()
            .set(name, Value::Function(function.clone()));
        Some(function)
    }

    /// Registers a global constructor whose `prototype` is `proto`.
    pub(crate) fn constructor(
        &mut self,
        name: &str,
        handler: NativeHandler,
        proto: &ObjectRef,
    ) -> Option<Rc<FunctionValue>> {
        let function = self.global_function(name, handler)?;
        function
            .props
            .borrow_mut()
            .set("prototype", Value::Object(proto.clone()));
        proto
            .borrow_mut()
            .set("constructor", Value::Function(function.clone()));
        Some(function)
    }

    /// Registers a global host object (`window.<name>`).
    pub(crate) fn global_object(&mut self, name: &str, kind: ObjectKind) -> Option<ObjectRef> {
        if !self.implements(name) {
            return None;
        }
        let object = ObjectValue::host(
            IdentifierPath::root("window").child(name),
            Some(self.rt.realm.object_proto.clone()),
        )
        .with_kind(kind)
        .into_ref();
        self.rt
            .global
            .borrow_mut()
            .set(name, Value::Object(object.clone()));
        Some(object)
    }

    pub(crate) fn value(&mut self, target: &ObjectRef, key: &str, canonical: &str, value: Value) {
        if self.implements(canonical) {
            target.borrow_mut().set(key, value);
        }
    }
}

impl Runtime {
    pub(crate) fn make_native(
        &self,
        name: &str,
        handler: NativeHandler,
        data: Option<Value>,
    ) -> Rc<FunctionValue> {
        Rc::new(FunctionValue {
            kind: FunctionKind::Native(NativeFunction {
                name: Rc::from(name),
                handler,
                data,
            }),
            props: RefCell::new(ObjectValue::new(Some(self.realm.function_proto.clone()))),
        })
    }

    pub(crate) fn make_closure(&self, def: Rc<FunctionDef>, scope: &ScopeRef) -> Value {
        Value::Function(Rc::new(FunctionValue {
            kind: FunctionKind::Script {
                def,
                env: scope.clone(),
            },
            props: RefCell::new(ObjectValue::new(Some(self.realm.function_proto.clone()))),
        }))
    }

    pub(crate) fn new_object(&self) -> ObjectRef {
        ObjectValue::new(Some(self.realm.object_proto.clone())).into_ref()
    }

    pub(crate) fn new_host_object(&self, path: IdentifierPath, proto: &ObjectRef, kind: ObjectKind) -> ObjectRef {
        ObjectValue::host(path, Some(proto.clone()))
            .with_kind(kind)
            .into_ref()
    }
}

impl Drop for Runtime {
    /// Breaks the reference cycles between the global object, prototypes,
    /// constructors and closures so a finished run frees its heap.
    fn drop(&mut self) {
        for proto in self.realm.all_protos() {
            proto.borrow_mut().clear();
        }
        self.global.borrow_mut().clear();
        self.global_scope.borrow_mut().clear();
        self.scheduler.task_queue.clear();
        self.scheduler.microtask_queue.clear();
        self.listeners.clear();
        self.document.elements.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn withdrawn_globals_are_not_registered() {
        let config = AnalysisConfig::default()
            .with_host_manifest(HostManifest::default().withdraw("atob").withdraw("navigator"));
        let runtime = Runtime::new(&config);
        assert!(lookup_property(&runtime.global, "atob").is_none());
        assert!(lookup_property(&runtime.global, "navigator").is_none());
        assert!(lookup_property(&runtime.global, "btoa").is_some());
    }

    #[test]
    fn global_aliases_point_at_the_global_object() {
        let runtime = Runtime::new(&AnalysisConfig::default());
        for alias in GLOBAL_ALIASES {
            let Some(Value::Object(object)) = lookup_property(&runtime.global, alias) else {
                panic!("{alias} is not registered");
            };
            assert!(Rc::ptr_eq(&object, &runtime.global));
        }
    }
}
