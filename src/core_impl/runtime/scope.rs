use super::*;

pub(crate) type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    /// Backed by the global object for `var` and undeclared names.
    Global,
    Function,
    Block,
}

#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) value: Value,
    pub(crate) mutable: bool,
}

pub(crate) struct Scope {
    vars: HashMap<String, Binding>,
    pub(crate) parent: Option<ScopeRef>,
    pub(crate) kind: ScopeKind,
    /// `None` for arrow functions and blocks, which inherit `this`.
    pub(crate) this_value: Option<Value>,
}

impl Scope {
    pub(crate) fn global(this_value: Value) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            vars: HashMap::new(),
            parent: None,
            kind: ScopeKind::Global,
            this_value: Some(this_value),
        }))
    }

    pub(crate) fn function(parent: &ScopeRef, this_value: Option<Value>) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
            kind: ScopeKind::Function,
            this_value,
        }))
    }

    pub(crate) fn block(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
            kind: ScopeKind::Block,
            this_value: None,
        }))
    }

    /// Sibling scope with copies of this scope's bindings, used to give each
    /// loop iteration its own `let` bindings.
    pub(crate) fn copy_for_iteration(scope: &ScopeRef) -> ScopeRef {
        let source = scope.borrow();
        Rc::new(RefCell::new(Self {
            vars: source.vars.clone(),
            parent: source.parent.clone(),
            kind: source.kind,
            this_value: source.this_value.clone(),
        }))
    }

    pub(crate) fn declare(&mut self, name: &str, value: Value, mutable: bool) {
        self.vars
            .insert(name.to_string(), Binding { value, mutable });
    }

    pub(crate) fn clear(&mut self) {
        self.vars.clear();
        self.parent = None;
    }

    pub(crate) fn has_own(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub(crate) fn get_own(&self, name: &str) -> Option<Value> {
        self.vars.get(name).map(|binding| binding.value.clone())
    }
}

pub(crate) enum AssignOutcome {
    Assigned,
    Constant,
    Unbound,
}

/// Looks `name` up through the lexical chain, ignoring the global object.
pub(crate) fn lookup_lexical(scope: &ScopeRef, name: &str) -> Option<Value> {
    let mut current = Some(scope.clone());
    while let Some(node) = current {
        let borrowed = node.borrow();
        if let Some(value) = borrowed.get_own(name) {
            return Some(value);
        }
        current = borrowed.parent.clone();
    }
    None
}

pub(crate) fn assign_lexical(scope: &ScopeRef, name: &str, value: Value) -> AssignOutcome {
    let mut current = Some(scope.clone());
    while let Some(node) = current {
        let mut borrowed = node.borrow_mut();
        if let Some(binding) = borrowed.vars.get_mut(name) {
            if !binding.mutable {
                return AssignOutcome::Constant;
            }
            binding.value = value;
            return AssignOutcome::Assigned;
        }
        current = borrowed.parent.clone();
    }
    AssignOutcome::Unbound
}

/// Nearest scope that owns `var` declarations.
pub(crate) fn var_scope(scope: &ScopeRef) -> ScopeRef {
    let mut current = scope.clone();
    loop {
        let parent = {
            let borrowed = current.borrow();
            if borrowed.kind != ScopeKind::Block {
                return current.clone();
            }
            borrowed.parent.clone()
        };
        match parent {
            Some(parent) => current = parent,
            None => return current,
        }
    }
}

pub(crate) fn this_value(scope: &ScopeRef) -> Value {
    let mut current = Some(scope.clone());
    while let Some(node) = current {
        let borrowed = node.borrow();
        if let Some(value) = &borrowed.this_value {
            return value.clone();
        }
        current = borrowed.parent.clone();
    }
    Value::Undefined
}

/// Names declared with `var` anywhere in `stmts`, not descending into
/// nested functions.
pub(crate) fn collect_var_names(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        collect_var_names_in(stmt, out);
    }
}

fn collect_var_names_in(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::VarDecl {
            kind: DeclKind::Var,
            declarations,
        } => {
            for declarator in declarations {
                if !out.contains(&declarator.name) {
                    out.push(declarator.name.clone());
                }
            }
        }
        Stmt::Block(body) => collect_var_names(body, out),
        Stmt::If {
            then_stmt,
            else_stmt,
            ..
        } => {
            collect_var_names_in(then_stmt, out);
            if let Some(else_stmt) = else_stmt {
                collect_var_names_in(else_stmt, out);
            }
        }
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                collect_var_names_in(init, out);
            }
            collect_var_names_in(body, out);
        }
        Stmt::ForIn { binding, body, .. } | Stmt::ForOf { binding, body, .. } => {
            if let ForBinding::Declared(DeclKind::Var, name) = binding {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            collect_var_names_in(body, out);
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_var_names_in(body, out),
        Stmt::Switch { cases, .. } => {
            for case in cases {
                collect_var_names(&case.body, out);
            }
        }
        Stmt::Try {
            try_stmts,
            catch_stmts,
            finally_stmts,
            ..
        } => {
            collect_var_names(try_stmts, out);
            if let Some(catch_stmts) = catch_stmts {
                collect_var_names(catch_stmts, out);
            }
            if let Some(finally_stmts) = finally_stmts {
                collect_var_names(finally_stmts, out);
            }
        }
        _ => {}
    }
}

/// True when a block needs its own scope.
pub(crate) fn has_lexical_declarations(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| {
        matches!(
            stmt,
            Stmt::VarDecl {
                kind: DeclKind::Let | DeclKind::Const,
                ..
            } | Stmt::FunctionDecl(_)
        )
    })
}
