use super::*;

#[derive(Debug)]
pub(crate) struct Cursor<'a> {
    pub(crate) src: &'a str,
    pub(crate) i: usize,
}

impl<'a> Cursor<'a> {
    pub(super) fn new(src: &'a str) -> Self {
        Self { src, i: 0 }
    }

    pub(super) fn pos(&self) -> usize {
        self.i
    }

    pub(super) fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    pub(super) fn peek(&self) -> Option<u8> {
        self.bytes().get(self.i).copied()
    }

    pub(super) fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes().get(self.i + offset).copied()
    }

    pub(super) fn peek_char(&self) -> Option<char> {
        self.src.get(self.i..).and_then(|rest| rest.chars().next())
    }

    pub(super) fn next_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.i += ch.len_utf8();
        Some(ch)
    }

    pub(super) fn consume_byte(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    pub(super) fn consume_ascii(&mut self, token: &str) -> bool {
        if self.starts_with(token) {
            self.i += token.len();
            true
        } else {
            false
        }
    }

    pub(super) fn starts_with(&self, token: &str) -> bool {
        self.bytes()
            .get(self.i..self.i + token.len())
            .is_some_and(|got| got == token.as_bytes())
    }

    pub(super) fn error(&self, msg: &str) -> Error {
        Error::ScriptParse(format!("{msg} at {}", self.i))
    }

    /// Skips whitespace and comments. Returns whether a line terminator was
    /// crossed, which drives automatic semicolon insertion.
    pub(super) fn skip_ws_and_comments(&mut self) -> Result<bool> {
        let mut saw_newline = false;
        loop {
            saw_newline |= self.skip_plain_ws();
            if self.consume_ascii("//") {
                while let Some(ch) = self.peek_char() {
                    if is_line_terminator(ch) {
                        break;
                    }
                    self.i += ch.len_utf8();
                }
                continue;
            }
            if self.consume_ascii("/*") {
                let mut closed = false;
                while let Some(ch) = self.peek_char() {
                    if self.consume_ascii("*/") {
                        closed = true;
                        break;
                    }
                    if is_line_terminator(ch) {
                        saw_newline = true;
                    }
                    self.i += ch.len_utf8();
                }
                if !closed {
                    return Err(self.error("unclosed block comment"));
                }
                continue;
            }
            break;
        }
        Ok(saw_newline)
    }

    fn skip_plain_ws(&mut self) -> bool {
        let mut saw_newline = false;
        while let Some(ch) = self.peek_char() {
            if is_line_terminator(ch) {
                saw_newline = true;
            } else if !ch.is_whitespace() && ch != '\u{feff}' {
                break;
            }
            self.i += ch.len_utf8();
        }
        saw_newline
    }

    pub(super) fn parse_identifier(&mut self) -> Option<String> {
        let start = self.i;
        let first = self.peek_char()?;
        if !is_ident_start(first) {
            return None;
        }
        self.i += first.len_utf8();
        while let Some(ch) = self.peek_char() {
            if is_ident_part(ch) {
                self.i += ch.len_utf8();
            } else {
                break;
            }
        }
        self.src.get(start..self.i).map(str::to_string)
    }

    pub(super) fn parse_number_literal(&mut self) -> Result<f64> {
        let start = self.i;
        if self.peek() == Some(b'0') {
            let radix = match self.peek_at(1) {
                Some(b'x' | b'X') => Some(16),
                Some(b'o' | b'O') => Some(8),
                Some(b'b' | b'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.i += 2;
                let digits = self.take_digits(|b| (b as char).is_digit(radix));
                if digits.is_empty() {
                    return Err(self.error("missing digits in numeric literal"));
                }
                self.reject_bigint_suffix()?;
                let mut value = 0f64;
                for ch in digits.chars() {
                    value = value * f64::from(radix) + f64::from(ch.to_digit(radix).unwrap_or(0));
                }
                return Ok(value);
            }
        }

        let mut text = self.take_digits(|b| b.is_ascii_digit());
        if self.peek() == Some(b'.') {
            self.i += 1;
            text.push('.');
            text.push_str(&self.take_digits(|b| b.is_ascii_digit()));
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let save = self.i;
            self.i += 1;
            let mut exponent = String::from("e");
            if let Some(sign @ (b'+' | b'-')) = self.peek() {
                exponent.push(sign as char);
                self.i += 1;
            }
            let digits = self.take_digits(|b| b.is_ascii_digit());
            if digits.is_empty() {
                self.i = save;
            } else {
                exponent.push_str(&digits);
                text.push_str(&exponent);
            }
        }
        self.reject_bigint_suffix()?;
        if self.peek_char().is_some_and(is_ident_start) {
            return Err(self.error("identifier starts immediately after numeric literal"));
        }
        if text.is_empty() || text == "." {
            self.i = start;
            return Err(self.error("invalid numeric literal"));
        }
        text.parse::<f64>()
            .map_err(|_| Error::ScriptParse(format!("invalid numeric literal at {start}")))
    }

    fn take_digits(&mut self, accept: impl Fn(u8) -> bool) -> String {
        let mut out = String::new();
        while let Some(b) = self.peek() {
            if accept(b) {
                out.push(b as char);
                self.i += 1;
            } else if b == b'_' && self.peek_at(1).is_some_and(&accept) {
                self.i += 1;
            } else {
                break;
            }
        }
        out
    }

    fn reject_bigint_suffix(&self) -> Result<()> {
        if self.peek() == Some(b'n') {
            return Err(self.error("BigInt literals are not supported"));
        }
        Ok(())
    }

    pub(super) fn parse_string_literal(&mut self) -> Result<String> {
        let quote = self
            .peek()
            .ok_or_else(|| self.error("expected string literal"))?;
        if quote != b'\'' && quote != b'"' {
            return Err(self.error("expected string literal"));
        }
        self.i += 1;

        let mut out = String::new();
        while let Some(ch) = self.next_char() {
            if ch as u32 == u32::from(quote) {
                return Ok(out);
            }
            match ch {
                '\\' => self.read_escape(&mut out)?,
                '\n' | '\r' => return Err(self.error("unterminated string literal")),
                _ => out.push(ch),
            }
        }
        Err(self.error("unclosed string literal"))
    }

    /// Reads the escape sequence following a consumed backslash.
    pub(super) fn read_escape(&mut self, out: &mut String) -> Result<()> {
        let Some(ch) = self.next_char() else {
            return Err(self.error("unterminated escape sequence"));
        };
        match ch {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek().is_some_and(|b| b.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let code = self.read_hex_digits(2)?;
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            'u' => {
                let code = self.read_unicode_escape()?;
                if (0xD800..0xDC00).contains(&code) && self.starts_with("\\u") {
                    let save = self.i;
                    self.i += 2;
                    let low = self.read_unicode_escape()?;
                    if (0xDC00..0xE000).contains(&low) {
                        let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                        out.push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
                        return Ok(());
                    }
                    self.i = save;
                }
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            '\r' => {
                self.consume_byte(b'\n');
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            other => out.push(other),
        }
        Ok(())
    }

    fn read_unicode_escape(&mut self) -> Result<u32> {
        if self.consume_byte(b'{') {
            let start = self.i;
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.i += 1;
            }
            let digits = &self.src[start..self.i];
            if digits.is_empty() || !self.consume_byte(b'}') {
                return Err(self.error("invalid unicode escape"));
            }
            return u32::from_str_radix(digits, 16)
                .ok()
                .filter(|code| *code <= 0x10FFFF)
                .ok_or_else(|| self.error("unicode escape out of range"));
        }
        self.read_hex_digits(4)
    }

    fn read_hex_digits(&mut self, count: usize) -> Result<u32> {
        let digits = self
            .src
            .get(self.i..self.i + count)
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| self.error("invalid hexadecimal escape"))?;
        let code = u32::from_str_radix(digits, 16).map_err(|_| self.error("invalid escape"))?;
        self.i += count;
        Ok(code)
    }
}

pub(super) fn is_line_terminator(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_literal_decodes_escapes() -> Result<()> {
        let mut cursor = Cursor::new(r#"'a\x41B\u{43}\n\'' rest"#);
        assert_eq!(cursor.parse_string_literal()?, "aABC\n'");
        assert_eq!(cursor.peek(), Some(b' '));
        Ok(())
    }

    #[test]
    fn surrogate_pairs_combine() -> Result<()> {
        let mut cursor = Cursor::new(r#""😀""#);
        assert_eq!(cursor.parse_string_literal()?, "\u{1F600}");
        Ok(())
    }

    #[test]
    fn numbers_cover_radix_exponent_and_separators() -> Result<()> {
        for (src, expected) in [
            ("0x1F", 31.0),
            ("0b101", 5.0),
            ("0o17", 15.0),
            ("1_000", 1000.0),
            ("1.5e3", 1500.0),
            (".25", 0.25),
        ] {
            let mut cursor = Cursor::new(src);
            assert_eq!(cursor.parse_number_literal()?, expected, "{src}");
        }
        Ok(())
    }

    #[test]
    fn bigint_literal_is_rejected() {
        let mut cursor = Cursor::new("10n");
        assert!(matches!(
            cursor.parse_number_literal(),
            Err(Error::ScriptParse(_))
        ));
    }

    #[test]
    fn comments_report_newlines() -> Result<()> {
        let mut cursor = Cursor::new("  /* a\n b */ // tail\nx");
        assert!(cursor.skip_ws_and_comments()?);
        assert_eq!(cursor.peek(), Some(b'x'));
        let mut cursor = Cursor::new("  /* same line */ x");
        assert!(!cursor.skip_ws_and_comments()?);
        Ok(())
    }
}
