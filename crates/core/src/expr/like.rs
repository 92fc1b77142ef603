//! LIKE pattern matching.
//!
//! `%` matches any run of characters, `_` exactly one, and `\` escapes
//! the next character. Both operands must be Text; anything else is Null.

use stratadb_types::Value;

pub fn eval(value: &Value, pattern: &Value) -> Value {
    match (value, pattern) {
        (Value::Text(v), Value::Text(p)) => Value::Boolean(matches(v, p)),
        _ => Value::Null,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Any,
    One,
    Literal(char),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut out = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let tok = match c {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => match chars.next() {
                Some(next) => Token::Literal(next),
                // Trailing escape matches a literal backslash.
                None => Token::Literal('\\'),
            },
            other => Token::Literal(other),
        };
        out.push(tok);
    }
    out
}

/// Iterative glob match with single-star backtracking.
fn matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pat = tokenize(pattern);

    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pat.len() && (pat[p] == Token::One || pat[p] == Token::Literal(text[t])) {
            t += 1;
            p += 1;
        } else if p < pat.len() && pat[p] == Token::Any {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            // Let the last `%` absorb one more character and retry.
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == Token::Any {
        p += 1;
    }
    p == pat.len()
}
