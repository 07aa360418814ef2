//! Variable resolution for `{{ path.to.value }}` placeholders and dotted
//! lookup paths.
//!
//! Both functions are pure and never fail: an unresolvable placeholder is
//! left in the output verbatim, and an unresolvable path yields `None`.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*(.+?)\s*\}\}").expect("placeholder pattern is a valid regex")
    })
}

/// Replace every `{{ path }}` in `template` with the value found in `data`.
///
/// Path segments only walk through objects. Strings are inserted as-is,
/// other scalars via their JSON text, and arrays/objects as compact JSON.
pub fn substitute(template: &str, data: &Value) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| {
            let path = caps[1].trim();
            match lookup_fields(data, path) {
                Some(value) => render_value(value),
                None => caps[0].to_owned(),
            }
        })
        .into_owned()
}

/// Apply [`substitute`] to every string leaf of a structured value.
pub fn substitute_value(value: &Value, data: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(s, data)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_value(v, data)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, data)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Walk `path` through `data`, accepting numeric segments as array indices.
///
/// `resolve_path(&json!({"a": {"b": [10, 20, 30]}}), "a.b.1")` is `Some(&20)`.
pub fn resolve_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) if is_index(segment) => {
            segment.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    })
}

/// Text form of a value as it appears inside a rendered template.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lookup_fields<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(data, |current, segment| current.as_object()?.get(segment))
}

fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_simple_placeholder() {
        assert_eq!(substitute("hello {{name}}", &json!({ "name": "world" })), "hello world");
    }

    #[test]
    fn missing_placeholder_is_left_verbatim() {
        assert_eq!(substitute("{{missing}}", &json!({})), "{{missing}}");
        assert_eq!(
            substitute("{{ a.b }} and {{a.c}}", &json!({ "a": { "b": 1 } })),
            "1 and {{a.c}}"
        );
    }

    #[test]
    fn structured_values_render_as_compact_json() {
        let data = json!({ "n": { "list": [1, 2], "flag": true, "none": null } });
        assert_eq!(substitute("{{ n.list }}", &data), "[1,2]");
        assert_eq!(substitute("{{n.flag}}/{{n.none}}", &data), "true/null");
    }

    #[test]
    fn substitution_does_not_index_into_arrays() {
        let data = json!({ "items": ["x", "y"] });
        assert_eq!(substitute("{{items.0}}", &data), "{{items.0}}");
    }

    #[test]
    fn substitute_value_rewrites_nested_strings() {
        let data = json!({ "id": 7 });
        let out = substitute_value(&json!({ "q": "id={{id}}", "n": [ "{{id}}", 3 ] }), &data);
        assert_eq!(out, json!({ "q": "id=7", "n": ["7", 3] }));
    }

    #[test]
    fn resolve_path_walks_objects_and_indices() {
        let data = json!({ "a": { "b": [10, 20, 30] } });
        assert_eq!(resolve_path(&data, "a.b.1"), Some(&json!(20)));
        assert_eq!(resolve_path(&data, "a.b.3"), None);
        assert_eq!(resolve_path(&data, "a.b.-1"), None);
    }

    #[test]
    fn resolve_path_is_absent_on_scalar() {
        assert_eq!(resolve_path(&json!({ "a": 1 }), "a.b"), None);
        assert_eq!(resolve_path(&json!({ "a": 1 }), ""), None);
    }
}
