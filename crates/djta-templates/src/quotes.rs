/// Split `s` on whitespace while respecting single- or double-quoted
/// regions. A `\` inside a quoted region escapes the next character, so
/// `\"` does not close the quote.
pub(crate) fn split_on_whitespace(s: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start: Option<usize> = None;
    let mut quote: Option<char> = None;
    let mut escape = false;

    for (idx, ch) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if ch.is_whitespace() && quote.is_none() {
            if let Some(piece_start) = start.take() {
                pieces.push(s[piece_start..idx].to_owned());
            }
            continue;
        }
        if start.is_none() {
            start = Some(idx);
        }
        match ch {
            '\\' if quote.is_some() => escape = true,
            '"' | '\'' if quote == Some(ch) => quote = None,
            '"' | '\'' if quote.is_none() => quote = Some(ch),
            _ => {}
        }
    }
    if let Some(piece_start) = start {
        pieces.push(s[piece_start..].to_owned());
    }
    pieces
}

/// Split a filter expression on `|`, skipping pipes inside quoted
/// filter arguments. Always yields at least one segment.
pub(crate) fn split_filters(s: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut seg_start = 0;
    let mut quote: Option<char> = None;

    for (idx, ch) in s.char_indices() {
        match ch {
            '"' | '\'' if quote == Some(ch) => quote = None,
            '"' | '\'' if quote.is_none() => quote = Some(ch),
            '|' if quote.is_none() => {
                segments.push(&s[seg_start..idx]);
                seg_start = idx + 1;
            }
            _ => {}
        }
    }
    segments.push(&s[seg_start..]);
    segments
}

/// Strip a matching pair of surrounding quotes, returning the inner
/// text. Returns `None` when `s` is not a quoted string literal.
#[must_use]
pub fn unquote(s: &str) -> Option<&str> {
    let first = s.chars().next()?;
    if (first == '"' || first == '\'') && s.len() >= 2 && s.ends_with(first) {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_whitespace_simple() {
        assert_eq!(
            split_on_whitespace("include \"partial.html\" only"),
            vec!["include", "\"partial.html\"", "only"]
        );
    }

    #[test]
    fn split_whitespace_quoted_spaces() {
        assert_eq!(
            split_on_whitespace(r#"placeholder 'main content'"#),
            vec!["placeholder", "'main content'"]
        );
    }

    #[test]
    fn split_whitespace_escaped_quote() {
        assert_eq!(
            split_on_whitespace(r#"placeholder "it\"s fine""#),
            vec!["placeholder", r#""it\"s fine""#]
        );
    }

    #[test]
    fn split_whitespace_empty() {
        assert!(split_on_whitespace("").is_empty());
        assert!(split_on_whitespace("   ").is_empty());
    }

    #[test]
    fn split_filters_plain() {
        assert_eq!(
            split_filters("base_template|default:\"base.html\""),
            vec!["base_template", "default:\"base.html\""]
        );
    }

    #[test]
    fn split_filters_quoted_pipe() {
        assert_eq!(
            split_filters(r#"name|default:"a|b"|title"#),
            vec!["name", r#"default:"a|b""#, "title"]
        );
    }

    #[test]
    fn split_filters_no_pipe() {
        assert_eq!(split_filters("base_template"), vec!["base_template"]);
    }

    #[test]
    fn unquote_double() {
        assert_eq!(unquote("\"base.html\""), Some("base.html"));
    }

    #[test]
    fn unquote_single() {
        assert_eq!(unquote("'one'"), Some("one"));
    }

    #[test]
    fn unquote_rejects_bare_and_mismatched() {
        assert_eq!(unquote("base.html"), None);
        assert_eq!(unquote("\"open"), None);
        assert_eq!(unquote("'mixed\""), None);
        assert_eq!(unquote("\""), None);
        assert_eq!(unquote(""), None);
    }
}
