use std::borrow::Cow;
use std::fmt;

/// A compiled JavaScript regular expression literal.
#[derive(Debug, Clone)]
pub(crate) struct JsRegex {
    backend: fancy_regex::Regex,
    source: String,
    flags: String,
}

impl JsRegex {
    pub(crate) fn compile(source: &str, flags: &str) -> Result<Self, RegexError> {
        for flag in flags.chars() {
            if !"dgimsuy".contains(flag) || flags.matches(flag).count() > 1 {
                return Err(RegexError {
                    message: format!("invalid regular expression flags '{flags}'"),
                });
            }
        }
        let mut builder = fancy_regex::RegexBuilder::new(&translate_pattern(source));
        builder.case_insensitive(flags.contains('i'));
        builder.multi_line(flags.contains('m'));
        builder.dot_matches_new_line(flags.contains('s'));
        let backend = builder.build().map_err(RegexError::from)?;
        Ok(Self {
            backend,
            source: source.to_string(),
            flags: flags.to_string(),
        })
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn flags(&self) -> &str {
        &self.flags
    }

    pub(crate) fn global(&self) -> bool {
        self.flags.contains('g')
    }

    pub(crate) fn sticky(&self) -> bool {
        self.flags.contains('y')
    }

    /// First match starting at or after byte offset `start`.
    pub(crate) fn captures_from_pos(
        &self,
        input: &str,
        start: usize,
    ) -> Result<Option<Captures>, RegexError> {
        if start > input.len() {
            return Ok(None);
        }
        let captures = self
            .backend
            .captures_from_pos(input, start)
            .map_err(RegexError::from)?;
        Ok(captures.as_ref().map(Captures::from_backend))
    }

    pub(crate) fn captures_all(&self, input: &str) -> Result<Vec<Captures>, RegexError> {
        let mut out = Vec::new();
        for captures in self.backend.captures_iter(input) {
            let captures = captures.map_err(RegexError::from)?;
            out.push(Captures::from_backend(&captures));
        }
        Ok(out)
    }

    /// Splits `input` at every match, stopping after `limit` pieces.
    pub(crate) fn split_all(&self, input: &str, limit: usize) -> Result<Vec<String>, RegexError> {
        let mut out = Vec::new();
        for part in self.backend.split(input).take(limit) {
            out.push(part.map_err(RegexError::from)?.to_string());
        }
        Ok(out)
    }
}

/// Rewrites JavaScript-only escapes into the backend's syntax.
fn translate_pattern(source: &str) -> Cow<'_, str> {
    if !source.contains("\\/") && !source.contains("\\u") && !source.contains("(?<") {
        return Cow::Borrowed(source);
    }
    let chars = source.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(source.len());
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if next == '/' {
                out.push('/');
                i += 2;
                continue;
            }
            if next == 'u' && i + 5 < chars.len() {
                let hex = chars[i + 2..i + 6].iter().collect::<String>();
                if hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    out.push_str("\\x{");
                    out.push_str(&hex);
                    out.push('}');
                    i += 6;
                    continue;
                }
            }
            out.push(ch);
            out.push(next);
            i += 2;
            continue;
        }
        if ch == '(' && chars.get(i + 1) == Some(&'?') && chars.get(i + 2) == Some(&'<') {
            let lookbehind = matches!(chars.get(i + 3), Some('=' | '!'));
            if !lookbehind {
                out.push_str("(?P<");
                i += 3;
                continue;
            }
        }
        out.push(ch);
        i += 1;
    }
    Cow::Owned(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Captures {
    groups: Vec<Option<Match>>,
}

impl Captures {
    fn from_backend(captures: &fancy_regex::Captures<'_>) -> Self {
        let mut groups = Vec::with_capacity(captures.len());
        for idx in 0..captures.len() {
            groups.push(captures.get(idx).map(Match::from_backend));
        }
        Self { groups }
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Match> {
        self.groups.get(index).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Match {
    start: usize,
    end: usize,
    text: String,
}

impl Match {
    fn from_backend(matched: fancy_regex::Match<'_>) -> Self {
        Self {
            start: matched.start(),
            end: matched.end(),
            text: matched.as_str().to_string(),
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.text
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegexError {
    message: String,
}

impl fmt::Display for RegexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RegexError {}

impl From<fancy_regex::Error> for RegexError {
    fn from(value: fancy_regex::Error) -> Self {
        Self {
            message: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_backend_options() -> Result<(), RegexError> {
        let regex = JsRegex::compile("^abc$", "im")?;
        assert!(regex.captures_from_pos("x\nABC\ny", 0)?.is_some());
        assert!(!regex.global());
        assert!(JsRegex::compile("a", "gg").is_err());
        assert!(JsRegex::compile("a", "q").is_err());
        Ok(())
    }

    #[test]
    fn javascript_escapes_are_translated() -> Result<(), RegexError> {
        let regex = JsRegex::compile(r"https:\/\/(?<host>[a-z.]+)/", "")?;
        let captures = regex
            .captures_from_pos("see https://evil.example/", 0)?
            .ok_or_else(|| RegexError {
                message: "no match".into(),
            })?;
        assert_eq!(captures.get(1).map(Match::as_str), Some("evil.example"));
        assert_eq!(regex.source(), r"https:\/\/(?<host>[a-z.]+)/");
        Ok(())
    }
}
