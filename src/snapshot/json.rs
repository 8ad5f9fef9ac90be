//! Structural comparison and typed field access over parsed snapshot trees.
//!
//! # Design Decisions
//! - Object key order never matters; array element order always does
//! - Scalars compare by their parsed value (`1` and `1.0` differ, as in the source document)
//! - Lenient readers: booleans may arrive as `true` or `"true"`

use serde_json::{Map, Value};

/// Deep equality that ignores object key order but respects array order.
pub fn json_eq(a: &Value, b: &Value) -> bool {
    json_eq_except(a, b, None)
}

/// Like [`json_eq`], but skips `except` when it appears as a key of the two
/// top-level objects being compared.
pub fn json_eq_except(a: &Value, b: &Value, except: Option<&str>) -> bool {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => objects_eq(left, right, except),
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| json_eq(l, r))
        }
        _ => a == b,
    }
}

fn objects_eq(left: &Map<String, Value>, right: &Map<String, Value>, except: Option<&str>) -> bool {
    let keep = |key: &str| except != Some(key);

    if left.keys().filter(|k| keep(k.as_str())).count() != right.keys().filter(|k| keep(k.as_str())).count() {
        return false;
    }

    left.iter()
        .filter(|(k, _)| keep(k.as_str()))
        .all(|(k, v)| right.get(k).is_some_and(|other| json_eq(v, other)))
}

/// Compares the `key` sub-trees of two objects. Both missing counts as equal.
pub fn subtree_eq(a: &Map<String, Value>, b: &Map<String, Value>, key: &str, except: Option<&str>) -> bool {
    match (a.get(key), b.get(key)) {
        (None, None) => true,
        (Some(left), Some(right)) => json_eq_except(left, right, except),
        _ => false,
    }
}

pub fn opt_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Reads a flag stored either as a JSON boolean or as a `"true"`/`"false"` string.
pub fn opt_bool(value: &Value, key: &str) -> Option<bool> {
    match value.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Reads an unsigned integer stored as a JSON number or a numeric string.
pub fn opt_u64(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn opt_f64(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Renders a scalar the way an operator would type it: strings without quotes.
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_is_ignored() {
        let a: Value = serde_json::from_str(r#"{"acceptHttp": true, "acceptHttps": false}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"acceptHttps": false, "acceptHttp": true}"#).unwrap();
        assert!(json_eq(&a, &b));
    }

    #[test]
    fn test_array_order_matters() {
        let a = json!({"matchlist": [{"regex": "a"}, {"regex": "b"}]});
        let b = json!({"matchlist": [{"regex": "b"}, {"regex": "a"}]});
        assert!(!json_eq(&a, &b));
    }

    #[test]
    fn test_nested_value_change_detected() {
        let a = json!({"dispersion": {"limit": 1, "shuffled": "true"}});
        let b = json!({"dispersion": {"shuffled": "true", "limit": 2}});
        assert!(!json_eq(&a, &b));
    }

    #[test]
    fn test_extra_key_detected() {
        let a = json!({"a": 1});
        let b = json!({"a": 1, "b": null});
        assert!(!json_eq(&a, &b));
        assert!(!json_eq(&b, &a));
    }

    #[test]
    fn test_except_skips_only_top_level_key() {
        let a = json!({"date": 1, "tm_host": "to.example.com"});
        let b = json!({"date": 2, "tm_host": "to.example.com"});
        assert!(json_eq_except(&a, &b, Some("date")));
        assert!(!json_eq(&a, &b));

        let nested_a = json!({"inner": {"date": 1}});
        let nested_b = json!({"inner": {"date": 2}});
        assert!(!json_eq_except(&nested_a, &nested_b, Some("date")));
    }

    #[test]
    fn test_subtree_eq_missing_sections() {
        let a = json!({"monitors": {}}).as_object().cloned().unwrap();
        let b = json!({}).as_object().cloned().unwrap();
        assert!(subtree_eq(&b, &b, "monitors", None));
        assert!(!subtree_eq(&a, &b, "monitors", None));
    }

    #[test]
    fn test_lenient_readers() {
        let v = json!({"s": "true", "b": false, "n": "42", "f": 1.5, "junk": "maybe"});
        assert_eq!(opt_bool(&v, "s"), Some(true));
        assert_eq!(opt_bool(&v, "b"), Some(false));
        assert_eq!(opt_bool(&v, "junk"), None);
        assert_eq!(opt_u64(&v, "n"), Some(42));
        assert_eq!(opt_f64(&v, "f"), Some(1.5));
        assert_eq!(as_text(&json!("edge")), "edge");
        assert_eq!(as_text(&json!(7)), "7");
    }
}
