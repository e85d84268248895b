//! The tiny filter grammar spec §4.7 step 4 and §9 ("do not add loops,
//! conditionals, or arithmetic") deliberately limit to: `payload.a.b.c ==
//! 'x'`, `!=`, or a bare truthy `payload.a`. An empty filter always passes.

use serde_json::Value;

use crate::payload::{get_path, is_truthy};

/// Evaluate a parsed filter expression against a payload. `expr` is
/// re-parsed on every call rather than compiled once — filters are short
/// and evaluated once per incoming request, so there's no hot loop to
/// optimize for.
pub fn evaluate(expr: &str, payload: &Value) -> bool {
    let expr = expr.trim();
    if expr.is_empty() {
        return true;
    }

    if let Some((path, literal)) = split_on(expr, "==") {
        return get_path(payload, strip_prefix(path)).map(|v| values_eq(v, literal)).unwrap_or(false);
    }
    if let Some((path, literal)) = split_on(expr, "!=") {
        return !get_path(payload, strip_prefix(path)).map(|v| values_eq(v, literal)).unwrap_or(false);
    }

    // Bare truthy form: `payload.a.b`.
    get_path(payload, strip_prefix(expr)).map(is_truthy).unwrap_or(false)
}

fn split_on<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let idx = expr.find(op)?;
    let (lhs, rhs) = expr.split_at(idx);
    Some((lhs.trim(), rhs[op.len()..].trim()))
}

/// Expressions reference the payload as `payload.a.b`; the path helper
/// only wants the dotted tail after that namespace.
fn strip_prefix(path: &str) -> &str {
    path.strip_prefix("payload.").unwrap_or(path)
}

fn values_eq(value: &Value, literal: &str) -> bool {
    let unquoted = literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| literal.strip_prefix('"').and_then(|s| s.strip_suffix('"')));

    match (value, unquoted) {
        (Value::String(s), Some(lit)) => s == lit,
        (Value::String(s), None) => s == literal,
        (Value::Bool(b), _) => literal.parse::<bool>().map(|l| *b == l).unwrap_or(false),
        (Value::Number(n), _) => literal.parse::<f64>().ok().and_then(|l| n.as_f64().map(|v| v == l)).unwrap_or(false),
        _ => false,
    }
}
