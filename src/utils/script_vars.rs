//! Variable extraction from inline script text.
//!
//! Scrapers often find their data in a `<script>` block such as
//! `var chapterImages = ["a.jpg", "b.jpg"];`. [`extract_variable`] tokenizes
//! the text (so brackets inside strings and comments never confuse it),
//! finds the first declaration of a name and returns its value.

use std::ops::Range;

use serde_json::Value;

/// Value found for a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// A literal that could be expressed as JSON.
    Json(Value),
    /// Source text of an expression that is not a plain literal.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Punct(char),
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or(self.src.len())
    }

    fn tokenize(mut self) -> Vec<(Token, Range<usize>)> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek(0) {
            let start = self.offset();
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '/' && self.peek(1) == Some('/') {
                while let Some(c) = self.peek(0) {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if c == '/' && self.peek(1) == Some('*') {
                self.pos += 2;
                while self.peek(0).is_some() && !(self.peek(0) == Some('*') && self.peek(1) == Some('/')) {
                    self.pos += 1;
                }
                self.pos = (self.pos + 2).min(self.chars.len());
            } else if c == '"' || c == '\'' || c == '`' {
                let value = self.string(c);
                tokens.push((Token::Str(value), start..self.offset()));
            } else if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) {
                let value = self.number();
                tokens.push((Token::Number(value), start..self.offset()));
            } else if c.is_alphanumeric() || c == '_' || c == '$' {
                let mut ident = String::new();
                while let Some(c) = self.peek(0) {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        ident.push(c);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(ident), start..self.offset()));
            } else {
                self.pos += 1;
                tokens.push((Token::Punct(c), start..self.offset()));
            }
        }
        tokens
    }

    fn string(&mut self, quote: char) -> String {
        let mut value = String::new();
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            self.pos += 1;
            match c {
                '\\' => {
                    if let Some(escaped) = self.peek(0) {
                        self.pos += 1;
                        match escaped {
                            'n' => value.push('\n'),
                            't' => value.push('\t'),
                            'r' => value.push('\r'),
                            'u' => value.push(self.unicode_escape()),
                            other => value.push(other),
                        }
                    }
                }
                c if c == quote => break,
                c => value.push(c),
            }
        }
        value
    }

    fn unicode_escape(&mut self) -> char {
        let hex: String = (0..4).filter_map(|i| self.peek(i)).collect();
        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
            Some(c) if hex.len() == 4 => {
                self.pos += 4;
                c
            }
            _ => 'u',
        }
    }

    fn number(&mut self) -> String {
        let mut value = String::new();
        while let Some(c) = self.peek(0) {
            let exponent_sign = (c == '+' || c == '-') && value.ends_with(['e', 'E']);
            if c.is_ascii_alphanumeric() || c == '.' || exponent_sign {
                value.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        value
    }
}

fn is_punct(tokens: &[(Token, Range<usize>)], idx: usize, expected: char) -> bool {
    matches!(tokens.get(idx), Some((Token::Punct(c), _)) if *c == expected)
}

fn is_ident(tokens: &[(Token, Range<usize>)], idx: usize, expected: &str) -> bool {
    matches!(tokens.get(idx), Some((Token::Ident(s), _)) if s == expected)
}

/// `=` that is an assignment, not `==`, `=>` or part of `+=`.
fn is_assignment(tokens: &[(Token, Range<usize>)], idx: usize) -> bool {
    is_punct(tokens, idx, '=') && !is_punct(tokens, idx + 1, '=') && !is_punct(tokens, idx + 1, '>')
}

fn find_value_start(tokens: &[(Token, Range<usize>)], name: &str) -> Option<usize> {
    let declared = (0..tokens.len()).find(|&i| {
        ["var", "let", "const"].iter().any(|kw| is_ident(tokens, i, kw))
            && is_ident(tokens, i + 1, name)
            && is_assignment(tokens, i + 2)
    });
    if let Some(i) = declared {
        return Some(i + 3);
    }

    (0..tokens.len())
        .find(|&i| {
            is_ident(tokens, i, name)
                && is_assignment(tokens, i + 1)
                && !(i > 0 && is_punct(tokens, i - 1, '.'))
        })
        .map(|i| i + 2)
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::from(n));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Index one past the bracket matching the opener at `start`.
fn matching_close(tokens: &[(Token, Range<usize>)], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, (token, _)) in tokens.iter().enumerate().skip(start) {
        match token {
            Token::Punct('{' | '[' | '(') => depth += 1,
            Token::Punct('}' | ']' | ')') => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Re-emit a JS object/array literal as JSON: quote keys and strings, drop trailing commas.
fn literal_to_json(tokens: &[(Token, Range<usize>)]) -> Option<String> {
    let mut out = String::new();
    for (i, (token, _)) in tokens.iter().enumerate() {
        match token {
            Token::Str(s) => out.push_str(&serde_json::to_string(s).ok()?),
            Token::Number(n) => out.push_str(&parse_number(n)?.to_string()),
            Token::Ident(id) if matches!(id.as_str(), "true" | "false" | "null") => out.push_str(id),
            Token::Ident(id) if is_punct(tokens, i + 1, ':') => {
                out.push_str(&serde_json::to_string(id).ok()?)
            }
            Token::Ident(_) => return None,
            Token::Punct(',') if is_punct(tokens, i + 1, '}') || is_punct(tokens, i + 1, ']') => {}
            Token::Punct(c) => out.push(*c),
        }
    }
    Some(out)
}

/// Find the first declaration of `name` in `text` and return its value.
///
/// `var`/`let`/`const` declarations are preferred over bare assignments.
/// Strings, numbers, booleans and `null` come back as JSON; object and array
/// literals come back as JSON when they are data-only, otherwise as raw
/// source text. Any other expression is returned raw, up to the end of the
/// statement.
pub fn extract_variable(text: &str, name: &str) -> Option<ScriptValue> {
    let tokens = Lexer::new(text).tokenize();
    let start = find_value_start(&tokens, name)?;
    let (first, range) = tokens.get(start)?;

    match first {
        Token::Str(s) => return Some(ScriptValue::Json(Value::String(s.clone()))),
        Token::Number(n) if !is_punct(&tokens, start + 1, '.') => {
            if let Some(v) = parse_number(n) {
                return Some(ScriptValue::Json(v));
            }
        }
        Token::Ident(id) if matches!(id.as_str(), "true" | "false" | "null") => {
            if let Ok(v) = serde_json::from_str(id) {
                return Some(ScriptValue::Json(v));
            }
        }
        Token::Punct('-') => {
            if let Some((Token::Number(n), _)) = tokens.get(start + 1) {
                if let Some(v) = parse_number(&format!("-{}", n)) {
                    return Some(ScriptValue::Json(v));
                }
            }
        }
        Token::Punct('{' | '[') => {
            let end = matching_close(&tokens, start)?;
            let raw = &text[range.start..tokens[end - 1].1.end];
            if let Ok(v) = serde_json::from_str(raw) {
                return Some(ScriptValue::Json(v));
            }
            if let Some(v) = literal_to_json(&tokens[start..end])
                .and_then(|json| serde_json::from_str(&json).ok())
            {
                return Some(ScriptValue::Json(v));
            }
            return Some(ScriptValue::Raw(raw.to_string()));
        }
        _ => {}
    }

    // Arbitrary expression: everything up to `;` or a newline at bracket depth zero.
    let mut depth = 0i32;
    let mut end = text.len();
    for (token, r) in &tokens[start..] {
        match token {
            Token::Punct('{' | '[' | '(') => depth += 1,
            Token::Punct('}' | ']' | ')') => depth -= 1,
            Token::Punct(';') if depth <= 0 => {
                end = r.start;
                break;
            }
            _ => {}
        }
        if depth < 0 {
            end = r.start;
            break;
        }
    }
    let raw = &text[range.start..end];
    let raw = if depth <= 0 {
        raw.lines().next().unwrap_or(raw)
    } else {
        raw
    };
    Some(ScriptValue::Raw(raw.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_literal() {
        let text = r#"var title = 'One \'Piece\''; var other = "x";"#;
        assert_eq!(
            extract_variable(text, "title"),
            Some(ScriptValue::Json(json!("One 'Piece'")))
        );
    }

    #[test]
    fn test_numbers_and_keywords() {
        let text = "let count = 42; const ratio = 1.5e2; var neg = -3; var ok = true; var none = null;";
        assert_eq!(extract_variable(text, "count"), Some(ScriptValue::Json(json!(42))));
        assert_eq!(extract_variable(text, "ratio"), Some(ScriptValue::Json(json!(150.0))));
        assert_eq!(extract_variable(text, "neg"), Some(ScriptValue::Json(json!(-3))));
        assert_eq!(extract_variable(text, "ok"), Some(ScriptValue::Json(json!(true))));
        assert_eq!(extract_variable(text, "none"), Some(ScriptValue::Json(Value::Null)));
    }

    #[test]
    fn test_array_with_brackets_in_strings() {
        let text = r#"
            // var images = ["commented"];
            var images = ["a]b.jpg", "c[d.jpg"];
        "#;
        assert_eq!(
            extract_variable(text, "images"),
            Some(ScriptValue::Json(json!(["a]b.jpg", "c[d.jpg"])))
        );
    }

    #[test]
    fn test_js_object_literal_is_normalized() {
        let text = "const chapter = {id: 12, name: 'Ch. 1', pages: [1, 2,], };";
        assert_eq!(
            extract_variable(text, "chapter"),
            Some(ScriptValue::Json(json!({"id": 12, "name": "Ch. 1", "pages": [1, 2]})))
        );
    }

    #[test]
    fn test_object_with_code_stays_raw() {
        let text = "var cfg = { onLoad: init, size: 2 };";
        assert_eq!(
            extract_variable(text, "cfg"),
            Some(ScriptValue::Raw("{ onLoad: init, size: 2 }".to_string()))
        );
    }

    #[test]
    fn test_declaration_preferred_over_assignment() {
        let text = "pages = [1]; var pages = [2];";
        assert_eq!(extract_variable(text, "pages"), Some(ScriptValue::Json(json!([2]))));
    }

    #[test]
    fn test_bare_assignment_ignores_properties_and_comparisons() {
        let text = "if (server == 'x') {} window.server = 'no'; server = 'https://cdn.example.com/';";
        assert_eq!(
            extract_variable(text, "server"),
            Some(ScriptValue::Json(json!("https://cdn.example.com/")))
        );
    }

    #[test]
    fn test_expression_is_raw_until_semicolon() {
        let text = "var key = atob(data).split(',');\nvar next = 1;";
        assert_eq!(
            extract_variable(text, "key"),
            Some(ScriptValue::Raw("atob(data).split(',')".to_string()))
        );
    }

    #[test]
    fn test_missing_variable() {
        assert_eq!(extract_variable("var a = 1;", "b"), None);
        assert_eq!(extract_variable("", "b"), None);
    }

    #[test]
    fn test_unicode_escape() {
        let text = r#"var s = "café";"#;
        assert_eq!(extract_variable(text, "s"), Some(ScriptValue::Json(json!("café"))));
    }
}
