//! Dotted-path access into an unstructured JSON payload (spec §9:
//! "keep them as a tagged tree ... do path access with a small helper; do
//! not attempt to bind them to static types").

use serde_json::Value;

/// Resolve `a.b.c` against `root`, stepping through object keys only
/// (arrays are not indexable by this grammar). Returns `None` if any
/// segment is missing or the root isn't an object at that point.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Stringify a JSON value the way the template expander needs: strings
/// unquoted, numbers without a trailing `.0`, objects/arrays as compact
/// JSON, booleans and null as their literal words.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64() {
                let trimmed = format!("{f}");
                trimmed
            } else {
                n.to_string()
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
    }
}

/// Truthy per spec §4.7 step 4's bare `payload.a` form: present and not
/// `false`/`null`/empty-string/zero.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Object(_) | Value::Array(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_object_paths() {
        let payload = json!({"a": {"b": {"c": "x"}}});
        assert_eq!(get_path(&payload, "a.b.c"), Some(&json!("x")));
    }

    #[test]
    fn missing_key_returns_none() {
        let payload = json!({"a": {}});
        assert_eq!(get_path(&payload, "a.b.c"), None);
    }

    #[test]
    fn stepping_into_a_non_object_returns_none() {
        let payload = json!({"a": "leaf"});
        assert_eq!(get_path(&payload, "a.b"), None);
    }

    #[test]
    fn numbers_stringify_without_trailing_zeros() {
        assert_eq!(stringify(&json!(42)), "42");
        assert_eq!(stringify(&json!(3.5)), "3.5");
    }

    #[test]
    fn objects_and_arrays_stringify_as_compact_json() {
        assert_eq!(stringify(&json!({"x": 1})), "{\"x\":1}");
        assert_eq!(stringify(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn truthiness_follows_common_falsy_rules() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!({})));
    }
}
