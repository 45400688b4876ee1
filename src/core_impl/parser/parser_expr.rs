use super::*;

fn binary_precedence(punct: &str) -> Option<(u8, BinaryOp)> {
    let entry = match punct {
        "|" => (3, BinaryOp::BitOr),
        "^" => (4, BinaryOp::BitXor),
        "&" => (5, BinaryOp::BitAnd),
        "==" => (6, BinaryOp::Eq),
        "!=" => (6, BinaryOp::Ne),
        "===" => (6, BinaryOp::StrictEq),
        "!==" => (6, BinaryOp::StrictNe),
        "<" => (7, BinaryOp::Lt),
        ">" => (7, BinaryOp::Gt),
        "<=" => (7, BinaryOp::Le),
        ">=" => (7, BinaryOp::Ge),
        "<<" => (8, BinaryOp::Shl),
        ">>" => (8, BinaryOp::Shr),
        ">>>" => (8, BinaryOp::UShr),
        "+" => (9, BinaryOp::Add),
        "-" => (9, BinaryOp::Sub),
        "*" => (10, BinaryOp::Mul),
        "/" => (10, BinaryOp::Div),
        "%" => (10, BinaryOp::Mod),
        "**" => (11, BinaryOp::Pow),
        _ => return None,
    };
    Some(entry)
}

fn assign_operator(punct: &str) -> Option<AssignOp> {
    let op = match punct {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::Arithmetic(BinaryOp::Add),
        "-=" => AssignOp::Arithmetic(BinaryOp::Sub),
        "*=" => AssignOp::Arithmetic(BinaryOp::Mul),
        "/=" => AssignOp::Arithmetic(BinaryOp::Div),
        "%=" => AssignOp::Arithmetic(BinaryOp::Mod),
        "**=" => AssignOp::Arithmetic(BinaryOp::Pow),
        "<<=" => AssignOp::Arithmetic(BinaryOp::Shl),
        ">>=" => AssignOp::Arithmetic(BinaryOp::Shr),
        ">>>=" => AssignOp::Arithmetic(BinaryOp::UShr),
        "&=" => AssignOp::Arithmetic(BinaryOp::BitAnd),
        "|=" => AssignOp::Arithmetic(BinaryOp::BitOr),
        "^=" => AssignOp::Arithmetic(BinaryOp::BitXor),
        "&&=" => AssignOp::Logical(LogicalOp::And),
        "||=" => AssignOp::Logical(LogicalOp::Or),
        "??=" => AssignOp::Logical(LogicalOp::Nullish),
        _ => return None,
    };
    Some(op)
}

fn is_assignment_target(expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(_) | Expr::Member { optional: false, .. })
}

impl Parser {
    pub(crate) fn parse_expression(&mut self) -> Result<Expr> {
        let first = self.parse_assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat_punct(",") {
            exprs.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(exprs))
    }

    /// Parses an expression where `in` is a binary operator again, as inside
    /// brackets or call arguments nested in a `for` head.
    fn parse_nested_expression(&mut self) -> Result<Expr> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let result = self.parse_expression();
        self.no_in = saved;
        result
    }

    fn parse_nested_assignment(&mut self) -> Result<Expr> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let result = self.parse_assignment();
        self.no_in = saved;
        result
    }

    pub(crate) fn parse_assignment(&mut self) -> Result<Expr> {
        self.nested(Self::parse_assignment_inner)
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        if self.is_keyword("async")
            && (self.is_keyword_at(1, "function") || self.is_punct_at(2, "=>"))
            && !self.peek_at(1).newline_before
        {
            return Err(self.unsupported("async functions"));
        }
        if self.is_keyword("yield") || self.is_keyword("await") {
            if let TokenKind::Ident(_) | TokenKind::Number(_) | TokenKind::String(_) =
                self.peek_at(1).kind
            {
                return Err(self.unsupported("generators and async functions"));
            }
        }

        let target = self.parse_conditional()?;
        let op = match &self.peek().kind {
            TokenKind::Punct(p) => assign_operator(p),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(target);
        };
        if !is_assignment_target(&target) {
            if matches!(target, Expr::Array(_) | Expr::Object(_)) {
                return Err(self.unsupported("destructuring assignments"));
            }
            return Err(self.unexpected("invalid assignment target"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let cond = self.parse_logical_or()?;
        if !self.eat_punct("?") {
            return Ok(cond);
        }
        let then_expr = self.parse_nested_assignment()?;
        self.expect_punct(":")?;
        let else_expr = self.parse_assignment()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    fn parse_logical_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_logical_and()?;
        loop {
            let op = if self.is_punct("||") {
                LogicalOp::Or
            } else if self.is_punct("??") {
                LogicalOp::Nullish
            } else {
                return Ok(left);
            };
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_logical_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_binary(0)?;
        while self.eat_punct("&&") {
            let right = self.parse_binary(0)?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn peek_binary_operator(&self) -> Option<(u8, BinaryOp)> {
        match &self.peek().kind {
            TokenKind::Punct(p) => binary_precedence(p),
            TokenKind::Ident(ident) if ident == "instanceof" => Some((7, BinaryOp::InstanceOf)),
            TokenKind::Ident(ident) if ident == "in" && !self.no_in => Some((7, BinaryOp::In)),
            _ => None,
        }
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((precedence, op)) = self.peek_binary_operator() {
            if precedence <= min_precedence {
                break;
            }
            self.advance();
            // `**` is right associative.
            let next_min = if op == BinaryOp::Pow {
                precedence - 1
            } else {
                precedence
            };
            let right = self.parse_binary(next_min)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.nested(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> Result<Expr> {
        let op = match &self.peek().kind {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Punct("~") => Some(UnaryOp::BitNot),
            TokenKind::Ident(ident) if ident == "typeof" => Some(UnaryOp::TypeOf),
            TokenKind::Ident(ident) if ident == "void" => Some(UnaryOp::Void),
            TokenKind::Ident(ident) if ident == "delete" => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }

        let update = if self.is_punct("++") {
            Some(UpdateOp::Increment)
        } else if self.is_punct("--") {
            Some(UpdateOp::Decrement)
        } else {
            None
        };
        if let Some(op) = update {
            self.advance();
            let target = self.parse_unary()?;
            if !is_assignment_target(&target) {
                return Err(self.unexpected("invalid update target"));
            }
            return Ok(Expr::Update {
                op,
                prefix: true,
                target: Box::new(target),
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let expr = self.parse_call_member()?;
        if self.peek().newline_before {
            return Ok(expr);
        }
        let op = if self.is_punct("++") {
            UpdateOp::Increment
        } else if self.is_punct("--") {
            UpdateOp::Decrement
        } else {
            return Ok(expr);
        };
        if !is_assignment_target(&expr) {
            return Err(self.unexpected("invalid update target"));
        }
        self.advance();
        Ok(Expr::Update {
            op,
            prefix: false,
            target: Box::new(expr),
        })
    }

    fn parse_call_member(&mut self) -> Result<Expr> {
        let mut expr = if self.is_keyword("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(".") {
                let name = self.expect_property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProp::Named(name),
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                if self.eat_punct("(") {
                    let args = self.parse_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                    };
                } else if self.eat_punct("[") {
                    let property = self.parse_nested_expression()?;
                    self.expect_punct("]")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Computed(Box::new(property)),
                        optional: true,
                    };
                } else {
                    let name = self.expect_property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Named(name),
                        optional: true,
                    };
                }
            } else if self.eat_punct("[") {
                let property = self.parse_nested_expression()?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProp::Computed(Box::new(property)),
                    optional: false,
                };
            } else if self.eat_punct("(") {
                let args = self.parse_arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                };
            } else if matches!(self.peek().kind, TokenKind::Template { .. }) {
                return Err(self.unsupported("tagged templates"));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_new(&mut self) -> Result<Expr> {
        self.expect_keyword("new")?;
        if self.eat_punct(".") {
            return Err(self.unsupported("new.target expressions"));
        }
        let mut callee = if self.is_keyword("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(".") {
                let name = self.expect_property_name()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: MemberProp::Named(name),
                    optional: false,
                };
            } else if self.eat_punct("[") {
                let property = self.parse_nested_expression()?;
                self.expect_punct("]")?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: MemberProp::Computed(Box::new(property)),
                    optional: false,
                };
            } else {
                break;
            }
        }
        let args = if self.eat_punct("(") {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    /// Parses call arguments after the opening parenthesis.
    fn parse_arguments(&mut self) -> Result<Vec<CallArg>> {
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                args.push(CallArg::Spread(self.parse_nested_assignment()?));
            } else {
                args.push(CallArg::Item(self.parse_nested_assignment()?));
            }
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::String(value) => Ok(Expr::String(value)),
            TokenKind::Regex { pattern, flags } => Ok(Expr::Regex { pattern, flags }),
            TokenKind::Template { quasis, exprs } => {
                let mut parsed = Vec::with_capacity(exprs.len());
                for tokens in exprs {
                    let mut inner = Parser::new(tokens);
                    inner.function_depth = self.function_depth;
                    inner.nesting = self.nesting;
                    let expr = inner.parse_expression()?;
                    inner.expect_eof()?;
                    parsed.push(expr);
                }
                Ok(Expr::Template {
                    quasis,
                    exprs: parsed,
                })
            }
            TokenKind::Punct("(") => {
                let expr = self.parse_nested_expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => self.parse_array_literal(),
            TokenKind::Punct("{") => self.parse_object_literal(),
            TokenKind::Ident(ident) => match ident.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                "this" => Ok(Expr::This),
                "function" => self.parse_function_rest(false).map(Expr::Function),
                "class" => Err(Error::ScriptParse(format!(
                    "classes are not supported at {}",
                    token.pos
                ))),
                "super" | "import" => Err(Error::ScriptParse(format!(
                    "'{ident}' is not supported at {}",
                    token.pos
                ))),
                name if is_reserved_word(name) => Err(Error::ScriptParse(format!(
                    "unexpected keyword '{name}' at {}",
                    token.pos
                ))),
                _ => Ok(Expr::Ident(ident)),
            },
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected("expected expression"))
            }
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr> {
        let mut elements = Vec::new();
        loop {
            if self.eat_punct("]") {
                return Ok(Expr::Array(elements));
            }
            if self.eat_punct(",") {
                elements.push(ArrayElement::Hole);
                continue;
            }
            if self.eat_punct("...") {
                elements.push(ArrayElement::Spread(self.parse_nested_assignment()?));
            } else {
                elements.push(ArrayElement::Item(self.parse_nested_assignment()?));
            }
            if !self.is_punct("]") {
                self.expect_punct(",")?;
            }
        }
    }

    fn parse_object_literal(&mut self) -> Result<Expr> {
        let mut props = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                props.push(ObjectProp::Spread(self.parse_nested_assignment()?));
            } else {
                props.push(self.parse_object_property()?);
            }
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(props))
    }

    fn parse_object_property(&mut self) -> Result<ObjectProp> {
        if self.is_punct("*") {
            return Err(self.unsupported("generator methods"));
        }
        let key_is_ident = matches!(self.peek().kind, TokenKind::Ident(_));
        if key_is_ident
            && (self.is_keyword("get") || self.is_keyword("set") || self.is_keyword("async"))
            && !self.is_punct_at(1, ",")
            && !self.is_punct_at(1, ":")
            && !self.is_punct_at(1, "(")
            && !self.is_punct_at(1, "}")
        {
            return Err(self.unsupported("accessor and async methods in object literals"));
        }

        let token = self.advance();
        let (key, shorthand_name) = match token.kind {
            TokenKind::Ident(name) => (PropKey::Named(name.clone()), Some(name)),
            TokenKind::String(name) => (PropKey::Named(name), None),
            TokenKind::Number(value) => (PropKey::Named(format_number(value)), None),
            TokenKind::Punct("[") => {
                let expr = self.parse_nested_assignment()?;
                self.expect_punct("]")?;
                (PropKey::Computed(Box::new(expr)), None)
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.unexpected("expected property key"));
            }
        };

        if self.eat_punct(":") {
            let value = self.parse_nested_assignment()?;
            return Ok(ObjectProp::KeyValue(key, value));
        }
        if self.is_punct("(") {
            let name = match &key {
                PropKey::Named(name) => Some(name.clone()),
                PropKey::Computed(_) => None,
            };
            let def = self.parse_function_signature_and_body(name, false)?;
            return Ok(ObjectProp::KeyValue(key, Expr::Function(def)));
        }
        match shorthand_name {
            Some(name) if !is_reserved_word(&name) => {
                Ok(ObjectProp::KeyValue(key, Expr::Ident(name)))
            }
            _ => Err(self.unexpected("expected ':' after property key")),
        }
    }

    /// Parses `function` declarations and expressions after the keyword.
    pub(super) fn parse_function_rest(&mut self, require_name: bool) -> Result<Rc<FunctionDef>> {
        if self.is_punct("*") {
            return Err(self.unsupported("generators"));
        }
        let name = if matches!(self.peek().kind, TokenKind::Ident(_)) {
            Some(self.expect_binding_name()?)
        } else if require_name {
            return Err(self.unexpected("expected function name"));
        } else {
            None
        };
        self.parse_function_signature_and_body(name, false)
    }

    fn parse_function_signature_and_body(
        &mut self,
        name: Option<String>,
        is_arrow: bool,
    ) -> Result<Rc<FunctionDef>> {
        self.expect_punct("(")?;
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        Ok(Rc::new(FunctionDef {
            name,
            params,
            body,
            is_arrow,
        }))
    }

    /// Parses a parameter list after the opening parenthesis.
    fn parse_params(&mut self) -> Result<Vec<FunctionParam>> {
        let mut params = Vec::new();
        while !self.eat_punct(")") {
            let is_rest = self.eat_punct("...");
            let name = self.expect_binding_name()?;
            let default = if !is_rest && self.eat_punct("=") {
                Some(self.parse_nested_assignment()?)
            } else {
                None
            };
            params.push(FunctionParam {
                name,
                default,
                is_rest,
            });
            if is_rest && !self.is_punct(")") {
                return Err(self.unexpected("rest parameter must be last"));
            }
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(params)
    }

    fn parse_function_body(&mut self) -> Result<Vec<Stmt>> {
        self.expect_punct("{")?;
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        self.function_depth += 1;
        let body = self.parse_statements_until_close();
        self.function_depth -= 1;
        self.no_in = saved_no_in;
        body
    }

    fn try_parse_arrow(&mut self) -> Result<Option<Expr>> {
        let params = match &self.peek().kind {
            TokenKind::Ident(name)
                if !is_reserved_word(name) && self.is_punct_at(1, "=>") =>
            {
                let name = name.clone();
                self.advance();
                vec![FunctionParam {
                    name,
                    default: None,
                    is_rest: false,
                }]
            }
            TokenKind::Punct("(") => {
                let Some(close) = self.matching_paren_offset() else {
                    return Ok(None);
                };
                if !self.is_punct_at(close + 1, "=>") {
                    return Ok(None);
                }
                self.advance();
                self.parse_params()?
            }
            _ => return Ok(None),
        };
        if self.peek().newline_before {
            return Err(self.unexpected("line break before '=>'"));
        }
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            self.parse_function_body()?
        } else {
            let nested = self.function_depth + 1;
            let saved_depth = std::mem::replace(&mut self.function_depth, nested);
            let expr = self.parse_assignment();
            self.function_depth = saved_depth;
            vec![Stmt::Return(Some(expr?))]
        };
        Ok(Some(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
            is_arrow: true,
        }))))
    }

    /// Offset from the current `(` to its matching `)`.
    fn matching_paren_offset(&self) -> Option<usize> {
        let mut depth = 0usize;
        let mut offset = 0usize;
        loop {
            match &self.peek_at(offset).kind {
                TokenKind::Punct("(" | "[" | "{") => depth += 1,
                TokenKind::Punct(")" | "]" | "}") => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(offset);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
            offset += 1;
        }
    }
}
