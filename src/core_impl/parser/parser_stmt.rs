use super::*;

impl Parser {
    pub(super) fn parse_program(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.at_eof() {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    /// Parses statements up to and including the closing `}`.
    pub(super) fn parse_statements_until_close(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("expected '}'"));
            }
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_punct("{")?;
        self.parse_statements_until_close()
    }

    pub(super) fn parse_statement(&mut self) -> Result<Stmt> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt> {
        if self.eat_punct("{") {
            return Ok(Stmt::Block(self.parse_statements_until_close()?));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        let keyword = match &self.peek().kind {
            TokenKind::Ident(ident) => Some(ident.clone()),
            _ => None,
        };
        let Some(keyword) = keyword else {
            return self.parse_expression_statement();
        };
        if self.is_punct_at(1, ":") && !is_reserved_word(&keyword) {
            return Err(self.unsupported("labeled statements"));
        }

        match keyword.as_str() {
            "var" | "let" | "const" => {
                let stmt = self.parse_var_decl()?;
                self.consume_semicolon()?;
                Ok(stmt)
            }
            "function" => {
                self.advance();
                Ok(Stmt::FunctionDecl(self.parse_function_rest(true)?))
            }
            "if" => self.parse_if(),
            "for" => self.parse_for(),
            "while" => {
                self.advance();
                self.expect_punct("(")?;
                let cond = self.parse_expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { cond, body })
            }
            "do" => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                self.expect_keyword("while")?;
                self.expect_punct("(")?;
                let cond = self.parse_expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                Ok(Stmt::DoWhile { body, cond })
            }
            "switch" => self.parse_switch(),
            "break" | "continue" => {
                self.advance();
                if let TokenKind::Ident(_) = self.peek().kind {
                    if !self.peek().newline_before {
                        return Err(self.unsupported("labeled jumps"));
                    }
                }
                self.consume_semicolon()?;
                Ok(if keyword == "break" {
                    Stmt::Break
                } else {
                    Stmt::Continue
                })
            }
            "return" => {
                self.advance();
                if self.function_depth == 0 {
                    return Err(self.unexpected("return outside of function"));
                }
                let value = if self.is_punct(";")
                    || self.is_punct("}")
                    || self.at_eof()
                    || self.peek().newline_before
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(value))
            }
            "throw" => {
                self.advance();
                if self.peek().newline_before {
                    return Err(self.unexpected("line break after 'throw'"));
                }
                let value = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(value))
            }
            "try" => self.parse_try(),
            "debugger" => {
                self.advance();
                self.consume_semicolon()?;
                Ok(Stmt::Empty)
            }
            "class" => Err(self.unsupported("classes")),
            "with" => Err(self.unsupported("with statements")),
            "import" | "export" => Err(self.unsupported("modules")),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt> {
        let expr = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_decl_kind(&mut self) -> Result<DeclKind> {
        let kind = if self.eat_keyword("var") {
            DeclKind::Var
        } else if self.eat_keyword("let") {
            DeclKind::Let
        } else if self.eat_keyword("const") {
            DeclKind::Const
        } else {
            return Err(self.unexpected("expected declaration"));
        };
        Ok(kind)
    }

    fn parse_var_decl(&mut self) -> Result<Stmt> {
        let kind = self.parse_decl_kind()?;
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_binding_name()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            declarations.push(VarDeclarator { name, init });
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::VarDecl { kind, declarations })
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.expect_keyword("if")?;
        self.expect_punct("(")?;
        let cond = self.parse_expression()?;
        self.expect_punct(")")?;
        let then_stmt = Box::new(self.parse_statement()?);
        let else_stmt = if self.eat_keyword("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_stmt,
            else_stmt,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.expect_keyword("for")?;
        if self.is_keyword("await") {
            return Err(self.unsupported("for await loops"));
        }
        self.expect_punct("(")?;

        if self.eat_punct(";") {
            return self.parse_for_rest(None);
        }

        let declared = self.is_keyword("var") || self.is_keyword("let") || self.is_keyword("const");
        if declared && matches!(self.peek_at(1).kind, TokenKind::Ident(_)) {
            if self.is_keyword_at(2, "in") || self.is_keyword_at(2, "of") {
                let kind = self.parse_decl_kind()?;
                let name = self.expect_binding_name()?;
                return self.parse_for_each(ForBinding::Declared(kind, name));
            }
        }

        self.no_in = true;
        let parsed = if declared {
            self.parse_var_decl()
        } else {
            self.parse_expression().map(Stmt::Expr)
        };
        self.no_in = false;
        let parsed = parsed?;

        if let Stmt::Expr(target) = &parsed {
            if self.is_keyword("in") || self.is_keyword("of") {
                if !matches!(target, Expr::Ident(_) | Expr::Member { .. }) {
                    return Err(self.unexpected("invalid for-in/of target"));
                }
                return self.parse_for_each(ForBinding::Target(target.clone()));
            }
        }
        self.expect_punct(";")?;
        self.parse_for_rest(Some(Box::new(parsed)))
    }

    fn parse_for_each(&mut self, binding: ForBinding) -> Result<Stmt> {
        if self.eat_keyword("in") {
            let object = self.parse_expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Stmt::ForIn {
                binding,
                object,
                body,
            });
        }
        self.expect_keyword("of")?;
        let iterable = self.parse_assignment()?;
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::ForOf {
            binding,
            iterable,
            body,
        })
    }

    /// Parses `cond; update) body` of a classic `for` loop.
    fn parse_for_rest(&mut self, init: Option<Box<Stmt>>) -> Result<Stmt> {
        let cond = if self.is_punct(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt> {
        self.expect_keyword("switch")?;
        self.expect_punct("(")?;
        let discriminant = self.parse_expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.eat_punct("}") {
            let test = if self.eat_keyword("case") {
                Some(self.parse_expression()?)
            } else if self.eat_keyword("default") {
                if seen_default {
                    return Err(self.unexpected("duplicate default clause"));
                }
                seen_default = true;
                None
            } else {
                return Err(self.unexpected("expected 'case' or 'default'"));
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !self.is_keyword("case") && !self.is_keyword("default") && !self.is_punct("}") {
                if self.at_eof() {
                    return Err(self.unexpected("expected '}'"));
                }
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Stmt::Switch {
            discriminant,
            cases,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt> {
        self.expect_keyword("try")?;
        let try_stmts = self.parse_block()?;
        let mut catch_binding = None;
        let mut catch_stmts = None;
        if self.eat_keyword("catch") {
            if self.eat_punct("(") {
                catch_binding = Some(self.expect_binding_name()?);
                self.expect_punct(")")?;
            }
            catch_stmts = Some(self.parse_block()?);
        }
        let finally_stmts = if self.eat_keyword("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };
        if catch_stmts.is_none() && finally_stmts.is_none() {
            return Err(self.unexpected("expected 'catch' or 'finally'"));
        }
        Ok(Stmt::Try {
            try_stmts,
            catch_binding,
            catch_stmts,
            finally_stmts,
        })
    }
}
