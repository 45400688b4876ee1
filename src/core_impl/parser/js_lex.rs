use super::*;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Number(f64),
    String(String),
    Template {
        quasis: Vec<String>,
        exprs: Vec<Vec<Token>>,
    },
    Regex {
        pattern: String,
        flags: String,
    },
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) pos: usize,
    pub(crate) newline_before: bool,
}

const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".",
];

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut lexer = JsLexer {
        cursor: Cursor::new(src),
        tokens: Vec::new(),
        template_depth: 0,
    };
    lexer.run(false)?;
    Ok(lexer.tokens)
}

struct JsLexer<'a> {
    cursor: Cursor<'a>,
    tokens: Vec<Token>,
    template_depth: usize,
}

impl JsLexer<'_> {
    /// Lexes until EOF, or until the `}` closing a template substitution when
    /// `in_template` is set. The closing brace is consumed but not emitted.
    fn run(&mut self, in_template: bool) -> Result<()> {
        let mut brace_depth = 0usize;
        loop {
            let newline_before = self.cursor.skip_ws_and_comments()?;
            let pos = self.cursor.pos();
            let Some(b) = self.cursor.peek() else {
                if in_template {
                    return Err(self.cursor.error("unterminated template substitution"));
                }
                self.tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos,
                    newline_before: true,
                });
                return Ok(());
            };

            if in_template && b == b'}' && brace_depth == 0 {
                self.cursor.consume_byte(b'}');
                self.tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos,
                    newline_before: true,
                });
                return Ok(());
            }

            let kind = if b == b'\'' || b == b'"' {
                TokenKind::String(self.cursor.parse_string_literal()?)
            } else if b == b'`' {
                self.lex_template()?
            } else if b.is_ascii_digit()
                || (b == b'.' && self.cursor.peek_at(1).is_some_and(|n| n.is_ascii_digit()))
            {
                TokenKind::Number(self.cursor.parse_number_literal()?)
            } else if b == b'/' && self.regex_allowed() {
                self.lex_regex()?
            } else if let Some(ident) = self.cursor.parse_identifier() {
                TokenKind::Ident(ident)
            } else if b == b'\\' {
                return Err(self.cursor.error("unicode escapes in identifiers are not supported"));
            } else {
                let punct = self.lex_punct()?;
                match punct {
                    "{" => brace_depth += 1,
                    "}" => brace_depth = brace_depth.saturating_sub(1),
                    _ => {}
                }
                TokenKind::Punct(punct)
            };
            self.tokens.push(Token {
                kind,
                pos,
                newline_before,
            });
        }
    }

    fn lex_punct(&mut self) -> Result<&'static str> {
        for punct in PUNCTUATORS {
            if !self.cursor.starts_with(punct) {
                continue;
            }
            // `a?.5:1` is a conditional, not optional chaining.
            if *punct == "?."
                && self
                    .cursor
                    .peek_at(2)
                    .is_some_and(|b| b.is_ascii_digit())
            {
                continue;
            }
            self.cursor.consume_ascii(punct);
            return Ok(punct);
        }
        let found = self.cursor.peek_char().unwrap_or(' ');
        Err(self.cursor.error(&format!("unexpected character '{found}'")))
    }

    fn regex_allowed(&self) -> bool {
        let Some(previous) = self.tokens.last() else {
            return true;
        };
        match &previous.kind {
            TokenKind::Punct(p) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
            TokenKind::Ident(ident) => {
                let after_dot = self
                    .tokens
                    .len()
                    .checked_sub(2)
                    .and_then(|idx| self.tokens.get(idx))
                    .is_some_and(|token| {
                        matches!(token.kind, TokenKind::Punct("." | "?."))
                    });
                identifier_allows_regex_start(ident, after_dot)
            }
            TokenKind::Eof => true,
            _ => false,
        }
    }

    fn lex_regex(&mut self) -> Result<TokenKind> {
        self.cursor.consume_byte(b'/');
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            let Some(ch) = self.cursor.next_char() else {
                return Err(self.cursor.error("unterminated regular expression"));
            };
            match ch {
                '\\' => {
                    pattern.push('\\');
                    match self.cursor.next_char() {
                        Some(next) if !is_line_terminator(next) => pattern.push(next),
                        _ => return Err(self.cursor.error("unterminated regular expression")),
                    }
                }
                '[' => {
                    in_class = true;
                    pattern.push(ch);
                }
                ']' => {
                    in_class = false;
                    pattern.push(ch);
                }
                '/' if !in_class => break,
                ch if is_line_terminator(ch) => {
                    return Err(self.cursor.error("unterminated regular expression"));
                }
                ch => pattern.push(ch),
            }
        }
        let mut flags = String::new();
        while let Some(ch) = self.cursor.peek_char() {
            if !is_ident_part(ch) {
                break;
            }
            if !"dgimsuy".contains(ch) || flags.contains(ch) {
                return Err(self.cursor.error(&format!("invalid regular expression flag '{ch}'")));
            }
            flags.push(ch);
            self.cursor.next_char();
        }
        Ok(TokenKind::Regex { pattern, flags })
    }

    fn lex_template(&mut self) -> Result<TokenKind> {
        self.cursor.consume_byte(b'`');
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut current = String::new();
        loop {
            let Some(ch) = self.cursor.next_char() else {
                return Err(self.cursor.error("unterminated template literal"));
            };
            match ch {
                '`' => {
                    quasis.push(current);
                    return Ok(TokenKind::Template { quasis, exprs });
                }
                '\\' => self.cursor.read_escape(&mut current)?,
                '$' if self.cursor.consume_byte(b'{') => {
                    quasis.push(std::mem::take(&mut current));
                    if self.template_depth >= super::MAX_NESTING {
                        return Err(self.cursor.error("template literals nested too deeply"));
                    }
                    let mut inner = JsLexer {
                        cursor: Cursor {
                            src: self.cursor.src,
                            i: self.cursor.pos(),
                        },
                        tokens: Vec::new(),
                        template_depth: self.template_depth + 1,
                    };
                    stacker::maybe_grow(128 * 1024, 2 * 1024 * 1024, || inner.run(true))?;
                    self.cursor.i = inner.cursor.pos();
                    exprs.push(inner.tokens);
                }
                '\r' => {
                    self.cursor.consume_byte(b'\n');
                    current.push('\n');
                }
                ch => current.push(ch),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Result<Vec<TokenKind>> {
        Ok(tokenize(src)?.into_iter().map(|token| token.kind).collect())
    }

    #[test]
    fn slash_after_identifier_is_division() -> Result<()> {
        let tokens = kinds("a / b / c")?;
        assert_eq!(tokens[1], TokenKind::Punct("/"));
        assert_eq!(tokens[3], TokenKind::Punct("/"));
        Ok(())
    }

    #[test]
    fn slash_after_operator_or_keyword_is_regex() -> Result<()> {
        let tokens = kinds("x = /a[/]b/gi; return /z/")?;
        assert_eq!(
            tokens[2],
            TokenKind::Regex {
                pattern: "a[/]b".into(),
                flags: "gi".into()
            }
        );
        assert!(matches!(tokens[5], TokenKind::Regex { .. }));
        Ok(())
    }

    #[test]
    fn template_substitutions_are_tokenized() -> Result<()> {
        let tokens = kinds("`a${ {k: 1}.k }b${x}`")?;
        let TokenKind::Template { quasis, exprs } = &tokens[0] else {
            panic!("expected template token, got {:?}", tokens[0]);
        };
        assert_eq!(quasis, &vec!["a".to_string(), "b".to_string(), String::new()]);
        assert_eq!(exprs.len(), 2);
        assert_eq!(exprs[1][0].kind, TokenKind::Ident("x".into()));
        Ok(())
    }

    #[test]
    fn newline_flag_tracks_line_breaks() -> Result<()> {
        let tokens = tokenize("a\nb c")?;
        assert!(tokens[1].newline_before);
        assert!(!tokens[2].newline_before);
        Ok(())
    }

    #[test]
    fn optional_chain_does_not_swallow_conditional_number() -> Result<()> {
        let tokens = kinds("a?.5:1")?;
        assert_eq!(tokens[1], TokenKind::Punct("?"));
        Ok(())
    }
}
