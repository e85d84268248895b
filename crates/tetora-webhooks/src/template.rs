//! `{{payload.a.b}}` template expansion (spec §4.7 step 5). Missing keys
//! keep the literal placeholder so a misconfigured template is visible in
//! the resulting task prompt rather than silently blanked.

use serde_json::Value;

use crate::payload::{get_path, stringify};

pub fn expand(template: &str, payload: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            // Unterminated placeholder: keep the rest verbatim.
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after_open[..end].trim();
        let placeholder = &rest[start..start + 2 + end + 2];

        match key.strip_prefix("payload.").and_then(|path| get_path(payload, path)) {
            Some(value) => out.push_str(&stringify(value)),
            None => out.push_str(placeholder),
        }

        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}
