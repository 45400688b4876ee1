use super::expression_eval::own_enumerable_entries;
use super::*;

impl Runtime {
    /// Runs a whole program body and returns the value of its last
    /// top-level expression statement (the completion value `eval` reports).
    pub(crate) fn eval_program(&mut self, stmts: &[Stmt], scope: &ScopeRef) -> Result<Value> {
        self.hoist_declarations(stmts, scope);
        let mut completion = Value::Undefined;
        for stmt in stmts {
            if let Stmt::Expr(expr) = stmt {
                self.budget.tick()?;
                completion = self.eval_expr(expr, scope)?;
                continue;
            }
            match self.exec_stmt(stmt, scope)? {
                ExecFlow::Normal => {}
                _ => break,
            }
        }
        Ok(completion)
    }

    /// `var` names and function declarations become bindings before the
    /// body runs.
    pub(crate) fn hoist_declarations(&mut self, stmts: &[Stmt], scope: &ScopeRef) {
        let mut names = Vec::new();
        scope::collect_var_names(stmts, &mut names);
        let target = scope::var_scope(scope);
        let is_global = target.borrow().kind == ScopeKind::Global;
        for name in names {
            if is_global {
                if !self.global.borrow().has_own(&name) {
                    self.global.borrow_mut().set(&name, Value::Undefined);
                }
            } else if !target.borrow().has_own(&name) {
                target.borrow_mut().declare(&name, Value::Undefined, true);
            }
        }
        self.hoist_functions(stmts, scope);
    }

    fn hoist_functions(&mut self, stmts: &[Stmt], scope: &ScopeRef) {
        for stmt in stmts {
            let Stmt::FunctionDecl(def) = stmt else {
                continue;
            };
            let Some(name) = &def.name else {
                continue;
            };
            let closure = self.make_closure(def.clone(), scope);
            self.declare_in(scope, name, closure);
        }
    }

    fn declare_in(&mut self, scope: &ScopeRef, name: &str, value: Value) {
        if scope.borrow().kind == ScopeKind::Global {
            self.global.borrow_mut().set(name, value);
        } else {
            scope.borrow_mut().declare(name, value, true);
        }
    }

    pub(crate) fn exec_statements(&mut self, stmts: &[Stmt], scope: &ScopeRef) -> Result<ExecFlow> {
        for stmt in stmts {
            match self.exec_stmt(stmt, scope)? {
                ExecFlow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(ExecFlow::Normal)
    }

    fn exec_block(&mut self, stmts: &[Stmt], scope: &ScopeRef) -> Result<ExecFlow> {
        if !scope::has_lexical_declarations(stmts) {
            return self.exec_statements(stmts, scope);
        }
        let block = Scope::block(scope);
        self.hoist_functions(stmts, &block);
        self.exec_statements(stmts, &block)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &ScopeRef) -> Result<ExecFlow> {
        self.budget.tick()?;
        match stmt {
            Stmt::VarDecl { kind, declarations } => {
                for declarator in declarations {
                    self.exec_declarator(*kind, declarator, scope)?;
                }
                Ok(ExecFlow::Normal)
            }
            Stmt::FunctionDecl(_) | Stmt::Empty => Ok(ExecFlow::Normal),
            Stmt::Expr(expr) => {
                self.eval_expr(expr, scope)?;
                Ok(ExecFlow::Normal)
            }
            Stmt::Block(body) => self.exec_block(body, scope),
            Stmt::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                if self.eval_expr(cond, scope)?.truthy() {
                    self.exec_stmt(then_stmt, scope)
                } else if let Some(else_stmt) = else_stmt {
                    self.exec_stmt(else_stmt, scope)
                } else {
                    Ok(ExecFlow::Normal)
                }
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => self.exec_for(init.as_deref(), cond.as_ref(), update.as_ref(), body, scope),
            Stmt::ForIn {
                binding,
                object,
                body,
            } => {
                let object = self.eval_expr(object, scope)?;
                let keys = match &object {
                    Value::Stub(_) => Vec::new(),
                    other => own_enumerable_entries(other)
                        .into_iter()
                        .map(|(key, _)| Value::string(key))
                        .collect(),
                };
                self.exec_for_each(binding, keys.into_iter(), body, scope)
            }
            Stmt::ForOf {
                binding,
                iterable,
                body,
            } => {
                let iterable = self.eval_expr(iterable, scope)?;
                if let Value::Array(items) = &iterable {
                    let items = items.clone();
                    let live = (0usize..).map_while(move |idx| items.borrow().get(idx).cloned());
                    return self.exec_for_each(binding, live, body, scope);
                }
                let items = self.spread_items(&iterable)?;
                self.exec_for_each(binding, items.into_iter(), body, scope)
            }
            Stmt::While { cond, body } => {
                while self.eval_expr(cond, scope)?.truthy() {
                    match self.exec_stmt(body, scope)? {
                        ExecFlow::Break => break,
                        ExecFlow::Return(value) => return Ok(ExecFlow::Return(value)),
                        ExecFlow::Normal | ExecFlow::Continue => {}
                    }
                }
                Ok(ExecFlow::Normal)
            }
            Stmt::DoWhile { body, cond } => {
                loop {
                    match self.exec_stmt(body, scope)? {
                        ExecFlow::Break => break,
                        ExecFlow::Return(value) => return Ok(ExecFlow::Return(value)),
                        ExecFlow::Normal | ExecFlow::Continue => {}
                    }
                    if !self.eval_expr(cond, scope)?.truthy() {
                        break;
                    }
                }
                Ok(ExecFlow::Normal)
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => self.exec_switch(discriminant, cases, scope),
            Stmt::Break => Ok(ExecFlow::Break),
            Stmt::Continue => Ok(ExecFlow::Continue),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval_expr(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(ExecFlow::Return(value))
            }
            Stmt::Throw(expr) => {
                let value = self.eval_expr(expr, scope)?;
                Err(Error::ScriptThrown(ThrownValue::new(value)))
            }
            Stmt::Try {
                try_stmts,
                catch_binding,
                catch_stmts,
                finally_stmts,
            } => self.exec_try(
                try_stmts,
                catch_binding.as_deref(),
                catch_stmts.as_deref(),
                finally_stmts.as_deref(),
                scope,
            ),
        }
    }

    fn exec_declarator(
        &mut self,
        kind: DeclKind,
        declarator: &VarDeclarator,
        scope: &ScopeRef,
    ) -> Result<()> {
        match kind {
            DeclKind::Var => {
                let Some(init) = &declarator.init else {
                    return Ok(());
                };
                let value = self.eval_expr(init, scope)?;
                self.assign_identifier(&declarator.name, value, scope)
            }
            DeclKind::Let | DeclKind::Const => {
                let value = match &declarator.init {
                    Some(init) => self.eval_expr(init, scope)?,
                    None => Value::Undefined,
                };
                scope
                    .borrow_mut()
                    .declare(&declarator.name, value, kind == DeclKind::Let);
                Ok(())
            }
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        scope: &ScopeRef,
    ) -> Result<ExecFlow> {
        let lexical = matches!(
            init,
            Some(Stmt::VarDecl {
                kind: DeclKind::Let | DeclKind::Const,
                ..
            })
        );
        let mut iteration = if lexical {
            Scope::block(scope)
        } else {
            scope.clone()
        };
        if let Some(init) = init {
            self.exec_stmt(init, &iteration)?;
        }
        loop {
            if let Some(cond) = cond {
                if !self.eval_expr(cond, &iteration)?.truthy() {
                    break;
                }
            }
            match self.exec_stmt(body, &iteration)? {
                ExecFlow::Break => break,
                ExecFlow::Return(value) => return Ok(ExecFlow::Return(value)),
                ExecFlow::Normal | ExecFlow::Continue => {}
            }
            if lexical {
                iteration = Scope::copy_for_iteration(&iteration);
            }
            if let Some(update) = update {
                self.eval_expr(update, &iteration)?;
            }
        }
        Ok(ExecFlow::Normal)
    }

    fn exec_for_each(
        &mut self,
        binding: &ForBinding,
        items: impl Iterator<Item = Value>,
        body: &Stmt,
        scope: &ScopeRef,
    ) -> Result<ExecFlow> {
        for item in items {
            let iteration = match binding {
                ForBinding::Declared(kind @ (DeclKind::Let | DeclKind::Const), name) => {
                    let iteration = Scope::block(scope);
                    iteration
                        .borrow_mut()
                        .declare(name, item, *kind == DeclKind::Let);
                    iteration
                }
                ForBinding::Declared(DeclKind::Var, name) => {
                    self.assign_identifier(name, item, scope)?;
                    scope.clone()
                }
                ForBinding::Target(target) => {
                    self.assign_to_target(target, item, scope)?;
                    scope.clone()
                }
            };
            match self.exec_stmt(body, &iteration)? {
                ExecFlow::Break => break,
                ExecFlow::Return(value) => return Ok(ExecFlow::Return(value)),
                ExecFlow::Normal | ExecFlow::Continue => {}
            }
        }
        Ok(ExecFlow::Normal)
    }

    fn exec_switch(
        &mut self,
        discriminant: &Expr,
        cases: &[SwitchCase],
        scope: &ScopeRef,
    ) -> Result<ExecFlow> {
        let value = self.eval_expr(discriminant, scope)?;
        let block = Scope::block(scope);
        let mut start = None;
        for (idx, case) in cases.iter().enumerate() {
            let Some(test) = &case.test else {
                continue;
            };
            if self.eval_expr(test, &block)?.strict_equals(&value) {
                start = Some(idx);
                break;
            }
        }
        let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));
        let Some(start) = start else {
            return Ok(ExecFlow::Normal);
        };
        for case in &cases[start..] {
            self.hoist_functions(&case.body, &block);
        }
        for case in &cases[start..] {
            match self.exec_statements(&case.body, &block)? {
                ExecFlow::Normal => {}
                ExecFlow::Break => return Ok(ExecFlow::Normal),
                flow => return Ok(flow),
            }
        }
        Ok(ExecFlow::Normal)
    }

    fn exec_try(
        &mut self,
        try_stmts: &[Stmt],
        catch_binding: Option<&str>,
        catch_stmts: Option<&[Stmt]>,
        finally_stmts: Option<&[Stmt]>,
        scope: &ScopeRef,
    ) -> Result<ExecFlow> {
        let depth = self.callee_stack.len();
        let result = match (self.exec_block(try_stmts, scope), catch_stmts) {
            (Err(Error::ScriptThrown(thrown)), Some(catch_stmts)) => {
                self.callee_stack.truncate(depth);
                let catch_scope = Scope::block(scope);
                if let Some(name) = catch_binding {
                    catch_scope
                        .borrow_mut()
                        .declare(name, thrown.into_value(), true);
                }
                self.hoist_functions(catch_stmts, &catch_scope);
                self.exec_statements(catch_stmts, &catch_scope)
            }
            (result, _) => result,
        };
        let Some(finally_stmts) = finally_stmts else {
            return result;
        };
        if matches!(result, Err(Error::Aborted(_))) {
            return result;
        }
        if result.is_err() {
            self.callee_stack.truncate(depth);
        }
        match self.exec_block(finally_stmts, scope)? {
            ExecFlow::Normal => result,
            flow => Ok(flow),
        }
    }
}
