pub(crate) fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_ascii_alphabetic() || (!ch.is_ascii() && ch.is_alphabetic())
}

pub(crate) fn is_ident_part(ch: char) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit() || ch == '\u{200c}' || ch == '\u{200d}'
}

pub(crate) fn is_ident(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    is_ident_start(first) && chars.all(is_ident_part)
}

/// Keywords after which a `/` opens a regular expression literal.
pub(crate) fn identifier_allows_regex_start(ident: &str, after_dot: bool) -> bool {
    if after_dot {
        return false;
    }
    matches!(
        ident,
        "return"
            | "throw"
            | "case"
            | "delete"
            | "typeof"
            | "void"
            | "new"
            | "else"
            | "do"
            | "in"
            | "of"
            | "instanceof"
    )
}

pub(crate) fn is_reserved_word(ident: &str) -> bool {
    matches!(
        ident,
        "break"
            | "case"
            | "catch"
            | "class"
            | "const"
            | "continue"
            | "debugger"
            | "default"
            | "delete"
            | "do"
            | "else"
            | "export"
            | "extends"
            | "finally"
            | "for"
            | "function"
            | "if"
            | "import"
            | "in"
            | "instanceof"
            | "let"
            | "new"
            | "return"
            | "super"
            | "switch"
            | "this"
            | "throw"
            | "try"
            | "typeof"
            | "var"
            | "void"
            | "while"
            | "with"
            | "null"
            | "true"
            | "false"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_accept_dollar_underscore_and_unicode() {
        assert!(is_ident("$jq"));
        assert!(is_ident("_x1"));
        assert!(is_ident("données"));
        assert!(!is_ident("1abc"));
        assert!(!is_ident(""));
        assert!(!is_ident("a-b"));
    }

    #[test]
    fn regex_start_depends_on_keyword_and_dot() {
        assert!(identifier_allows_regex_start("return", false));
        assert!(!identifier_allows_regex_start("return", true));
        assert!(!identifier_allows_regex_start("value", false));
    }
}
