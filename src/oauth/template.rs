//! Template parameter substitution over configuration trees
//!
//! Templated provider definitions carry `${name}` placeholders in their
//! string leaves. Materialization replaces each placeholder with the
//! supplied parameter value (empty string when the parameter is absent)
//! and un-escapes backslash escapes, so `\$` yields a literal dollar sign.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Matches either an escaped character or a `${name}` parameter reference.
fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\\.)|\$\{([A-Za-z][A-Za-z0-9_]*)\}").expect("template pattern is valid")
    })
}

/// Substitute `${name}` placeholders throughout a configuration tree.
///
/// Walks every string leaf of `value`, replacing parameter references with
/// entries from `params` and collapsing escapes. Non-string leaves and
/// strings without a `$` are left untouched. Unmatched parameter names
/// substitute to the empty string.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use serde_json::json;
/// use authgate::oauth::template;
///
/// let mut config = json!({"x": "prefix-${p}-suffix"});
/// let params = HashMap::from([("p".to_string(), "Z".to_string())]);
/// template::inject(&mut config, &params);
/// assert_eq!(config["x"], "prefix-Z-suffix");
/// ```
pub fn inject(value: &mut Value, params: &HashMap<String, String>) {
    match value {
        Value::String(text) => {
            if text.contains('$') || text.contains('\\') {
                *text = substitute(text, params);
            }
        }
        Value::Array(items) => {
            for item in items {
                inject(item, params);
            }
        }
        Value::Object(entries) => {
            for (_, entry) in entries.iter_mut() {
                inject(entry, params);
            }
        }
        _ => {}
    }
}

/// Substitute placeholders within one string leaf.
fn substitute(text: &str, params: &HashMap<String, String>) -> String {
    pattern()
        .replace_all(text, |caps: &regex::Captures| {
            if let Some(escaped) = caps.get(1) {
                // Escaped character, e.g. '\$' => '$'
                escaped.as_str()[1..].to_string()
            } else {
                let name = &caps[2];
                params.get(name).cloned().unwrap_or_default()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_inject_substitutes_parameter() {
        let mut value = json!({"x": "prefix-${p}-suffix"});
        inject(&mut value, &params(&[("p", "Z")]));
        assert_eq!(value, json!({"x": "prefix-Z-suffix"}));
    }

    #[test]
    fn test_inject_escaped_placeholder_stays_literal() {
        let mut value = json!({"x": r"prefix-\${p}-suffix"});
        inject(&mut value, &params(&[("p", "Z")]));
        assert_eq!(value, json!({"x": "prefix-${p}-suffix"}));
    }

    #[test]
    fn test_inject_unmatched_parameter_becomes_empty() {
        let mut value = json!({"x": "a-${missing}-b"});
        inject(&mut value, &params(&[]));
        assert_eq!(value, json!({"x": "a--b"}));
    }

    #[test]
    fn test_inject_walks_nested_structures() {
        let mut value = json!({
            "provider": {
                "client_id": "${id}",
                "scopes": ["${scope}", "static"]
            }
        });
        inject(&mut value, &params(&[("id", "abc"), ("scope", "read")]));
        assert_eq!(
            value,
            json!({
                "provider": {
                    "client_id": "abc",
                    "scopes": ["read", "static"]
                }
            })
        );
    }

    #[test]
    fn test_inject_leaves_non_strings_untouched() {
        let mut value = json!({"n": 7, "b": true, "x": null});
        inject(&mut value, &params(&[("n", "nope")]));
        assert_eq!(value, json!({"n": 7, "b": true, "x": null}));
    }

    #[test]
    fn test_inject_multiple_references_in_one_string() {
        let mut value = json!("${a}/${b}");
        inject(&mut value, &params(&[("a", "x"), ("b", "y")]));
        assert_eq!(value, json!("x/y"));
    }

    #[test]
    fn test_inject_dollar_without_braces_untouched() {
        let mut value = json!("price is $5");
        inject(&mut value, &params(&[]));
        assert_eq!(value, json!("price is $5"));
    }

    #[test]
    fn test_inject_generic_escape_unescapes() {
        let mut value = json!(r"a\\b");
        inject(&mut value, &params(&[]));
        assert_eq!(value, json!(r"a\b"));
    }
}
